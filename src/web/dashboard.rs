use anyhow::{anyhow, Result};
use axum::extract::{Query, State};
use axum::response::Html;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::warn;

use super::views::render_page;
use super::AppState;
use crate::availability;
use crate::commands;
use crate::models::{Catalog, Config};
use crate::scheduler;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PreviewQuery {
    pub(crate) barber: Option<String>,
    pub(crate) date: Option<String>,
    pub(crate) services: Option<String>,
}

pub(super) struct Listing {
    pub(super) barbers: Vec<(String, String)>,
    pub(super) services: Vec<ServiceRow>,
}

pub(super) struct ServiceRow {
    pub(super) id: String,
    pub(super) name: String,
    pub(super) minutes: u32,
    pub(super) price: f64,
}

pub(super) struct Preview {
    pub(super) barber: String,
    pub(super) date: NaiveDate,
    pub(super) minutes: u32,
    pub(super) slots: Vec<String>,
    pub(super) agenda: Vec<AgendaRow>,
}

pub(super) struct AgendaRow {
    pub(super) start: String,
    pub(super) end: String,
    pub(super) services: String,
    pub(super) client: String,
}

fn listing(catalog: &Catalog) -> Listing {
    Listing {
        barbers: catalog
            .barbers()
            .map(|b| (b.id.clone(), b.name.clone()))
            .collect(),
        services: catalog
            .services
            .iter()
            .filter(|s| s.active)
            .map(|s| ServiceRow {
                id: s.id.clone(),
                name: s.name.clone(),
                minutes: availability::total_duration(std::slice::from_ref(s)),
                price: s.price,
            })
            .collect(),
    }
}

fn preview(
    cfg: &Config,
    catalog: &Catalog,
    barber_key: &str,
    date: NaiveDate,
    service_list: &str,
) -> Result<Preview> {
    let tz = cfg.app.timezone;
    let barber = commands::resolve_barber(catalog, barber_key)?;
    let services = commands::resolve_services(catalog, service_list)?;

    let slots = scheduler::open_slots(
        &barber.id,
        date,
        &services,
        &catalog.appointments,
        None,
        scheduler::now(tz),
        &cfg.rules.business_rules()?,
        cfg.rules.slot_step()?,
    )?;

    let agenda = scheduler::agenda(&barber.id, date, tz, &catalog.appointments)
        .into_iter()
        .map(|a| AgendaRow {
            start: a.start.format("%H:%M").to_string(),
            end: a.end().format("%H:%M").to_string(),
            services: a
                .services
                .iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            client: a.client_id.clone().unwrap_or_default(),
        })
        .collect();

    Ok(Preview {
        barber: barber.name.clone(),
        date,
        minutes: availability::total_duration(&services),
        slots: slots.iter().map(|t| t.format("%H:%M").to_string()).collect(),
        agenda,
    })
}

pub(crate) async fn dashboard_handler(
    State(state): State<AppState>,
    Query(query): Query<PreviewQuery>,
) -> Html<String> {
    let cfg = &state.config;
    let today = scheduler::now(cfg.app.timezone).date_naive();

    let date = match query.date.as_deref().filter(|d| !d.trim().is_empty()) {
        Some(raw) => scheduler::parse_date(raw).ok_or_else(|| anyhow!("Invalid date '{}'", raw)),
        None => Ok(today),
    };

    let loaded = match date {
        Ok(date) => commands::load_catalog(cfg, state.snapshot.as_deref().map(|p| p.as_path()), Some(date))
            .await
            .map(|catalog| (date, catalog)),
        Err(e) => Err(e),
    };

    let (date, catalog) = match loaded {
        Ok(pair) => pair,
        Err(e) => {
            warn!("Dashboard: {:#}", e);
            let html = render_page(cfg, &query, today, None, None, Some(format!("{e:#}")));
            return Html(html);
        }
    };

    let list = listing(&catalog);
    let (result, error) = match (query.barber.as_deref(), query.services.as_deref()) {
        (Some(b), Some(s)) if !b.trim().is_empty() && !s.trim().is_empty() => {
            match preview(cfg, &catalog, b, date, s) {
                Ok(p) => (Some(p), None),
                Err(e) => (None, Some(format!("{e:#}"))),
            }
        }
        _ => (None, None),
    };

    Html(render_page(cfg, &query, date, Some(&list), result.as_ref(), error))
}
