use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{NaiveDate, NaiveTime};
use tracing::{info, warn};

use crate::availability::{self, Availability};
use crate::client::{BackendClient, SubmitOutcome};
use crate::config;
use crate::models::{Appointment, CandidateBooking, Catalog, Config, Employee, NewAppointment, Service};
use crate::scheduler;

/// A booking request as typed on the command line.
pub struct BookingInput<'a> {
    pub barber: &'a str,
    pub date: &'a str,
    pub time: Option<&'a str>,
    pub services: &'a str,
    pub edit: Option<&'a str>,
}

/// Log in to the backend when credentials are configured.
pub async fn connect(cfg: &Config) -> Result<BackendClient> {
    let mut client = BackendClient::new(&cfg.app.base_url)?;
    match (&cfg.app.email, &cfg.app.password) {
        (Some(email), Some(password)) => client.login(email, password).await?,
        _ => warn!("No backend credentials configured, continuing anonymously"),
    }
    Ok(client)
}

/// Gather services, employees and appointments from a snapshot file or the backend.
pub async fn load_catalog(
    cfg: &Config,
    snapshot: Option<&Path>,
    date: Option<NaiveDate>,
) -> Result<Catalog> {
    let raw = match snapshot {
        Some(path) => config::load_snapshot(path)?,
        None => {
            connect(cfg)
                .await?
                .fetch_snapshot(date)
                .await?
        }
    };
    Ok(Catalog::normalize(raw, cfg.app.timezone))
}

pub fn resolve_barber<'a>(catalog: &'a Catalog, key: &str) -> Result<&'a Employee> {
    let barber = catalog
        .find_employee(key)
        .ok_or_else(|| anyhow!("Unknown barber '{}'", key))?;
    if !barber.is_schedulable() {
        bail!("{} is not an active barber", barber.name);
    }
    Ok(barber)
}

/// Resolve a comma-separated list of service ids or names.
pub fn resolve_services(catalog: &Catalog, list: &str) -> Result<Vec<Service>> {
    let keys: Vec<&str> = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if keys.is_empty() {
        bail!("No services specified");
    }

    keys.iter()
        .map(|key| -> Result<Service> {
            let service = catalog
                .find_service(key)
                .ok_or_else(|| anyhow!("Unknown service '{}'", key))?;
            if !service.active {
                bail!("Service '{}' is not offered anymore", service.name);
            }
            Ok(service.clone())
        })
        .collect()
}

fn parse_date_arg(date: &str) -> Result<NaiveDate> {
    scheduler::parse_date(date).ok_or_else(|| anyhow!("Invalid date '{}', expected YYYY-MM-DD", date))
}

fn parse_time_arg(time: Option<&str>) -> Result<NaiveTime> {
    let time = time.context("A start time is required (--time HH:MM)")?;
    scheduler::parse_time(time).ok_or_else(|| anyhow!("Invalid time '{}', expected HH:MM", time))
}

fn print_appointment(a: &Appointment) {
    let names: Vec<&str> = a.services.iter().map(|s| s.name.as_str()).collect();
    let client = a.client_id.as_deref().unwrap_or("?");
    println!(
        "  {} to {} — {} (client {}, #{})",
        a.start.format("%Y-%m-%d %H:%M"),
        a.end().format("%H:%M"),
        names.join(", "),
        client,
        a.id
    );
}

fn print_verdict(verdict: &Availability) {
    match verdict {
        Availability::Available => println!("Available."),
        Availability::Unavailable {
            violations,
            conflicts,
        } => {
            println!("Not available:");
            for v in violations {
                println!("  - {}", v);
            }
            if !conflicts.is_empty() {
                println!("Conflicting appointments:");
                for a in conflicts {
                    print_appointment(a);
                }
            }
        }
    }
}

pub fn run_catalog(catalog: &Catalog) {
    let barbers: Vec<&Employee> = catalog.barbers().collect();
    if barbers.is_empty() {
        println!("No active barbers.");
        return;
    }
    println!("Barbers:\n");
    for b in barbers {
        println!("  [{}] {}", b.id, b.name);
    }

    println!("\nServices:\n");
    for s in catalog.services.iter().filter(|s| s.active) {
        let minutes = s
            .duration_minutes
            .map(|m| format!("{m} min"))
            .unwrap_or_else(|| format!("{} min (default)", availability::DEFAULT_SERVICE_MINUTES));
        println!("  [{}] {} — {}, {:.2}", s.id, s.name, minutes, s.price);
    }
}

/// Build the candidate from command-line input and run the availability check.
fn evaluate(
    cfg: &Config,
    catalog: &Catalog,
    input: &BookingInput<'_>,
) -> Result<(CandidateBooking, Availability)> {
    let barber = resolve_barber(catalog, input.barber)?;
    let date = parse_date_arg(input.date)?;
    let time = parse_time_arg(input.time)?;
    let services = resolve_services(catalog, input.services)?;
    let rules = cfg.rules.business_rules()?;

    let candidate = CandidateBooking::new(&barber.id, date, time, services).editing(input.edit);
    let verdict = availability::check_availability(
        &candidate,
        &catalog.appointments,
        scheduler::now(cfg.app.timezone),
        &rules,
    )?;
    Ok((candidate, verdict))
}

pub async fn run_check(cfg: &Config, snapshot: Option<&Path>, input: &BookingInput<'_>) -> Result<()> {
    let date = parse_date_arg(input.date)?;
    let catalog = load_catalog(cfg, snapshot, Some(date)).await?;
    let (_, verdict) = evaluate(cfg, &catalog, input)?;
    print_verdict(&verdict);
    Ok(())
}

pub async fn run_slots(cfg: &Config, snapshot: Option<&Path>, input: &BookingInput<'_>) -> Result<()> {
    let date = parse_date_arg(input.date)?;
    let catalog = load_catalog(cfg, snapshot, Some(date)).await?;
    let barber = resolve_barber(&catalog, input.barber)?;
    let services = resolve_services(&catalog, input.services)?;
    let tz = cfg.app.timezone;

    let slots = scheduler::open_slots(
        &barber.id,
        date,
        &services,
        &catalog.appointments,
        input.edit,
        scheduler::now(tz),
        &cfg.rules.business_rules()?,
        cfg.rules.slot_step()?,
    )?;

    let day = scheduler::agenda(&barber.id, date, tz, &catalog.appointments);
    if day.is_empty() {
        println!("{} has no appointments on {}.", barber.name, date);
    } else {
        println!("{} on {}:\n", barber.name, date);
        for a in day {
            print_appointment(a);
        }
    }

    let minutes = availability::total_duration(&services);
    if slots.is_empty() {
        println!("\nNo free {}-minute slots on {}.", minutes, date);
    } else {
        let times: Vec<String> = slots.iter().map(|t| t.format("%H:%M").to_string()).collect();
        println!("\nFree {}-minute slots:\n  {}", minutes, times.join(" "));
    }
    Ok(())
}

pub async fn run_book(
    cfg: &Config,
    snapshot: Option<&Path>,
    input: &BookingInput<'_>,
    client_id: Option<&str>,
    dry_run: bool,
) -> Result<()> {
    let date = parse_date_arg(input.date)?;
    let catalog = load_catalog(cfg, snapshot, Some(date)).await?;
    let (candidate, verdict) = evaluate(cfg, &catalog, input)?;

    if !verdict.is_available() {
        print_verdict(&verdict);
        bail!("Booking not submitted");
    }

    let start = candidate.start(cfg.app.timezone)?;
    let mut booking = NewAppointment {
        start: start.fixed_offset(),
        barber: candidate.barber_id.clone(),
        client: client_id.map(str::to_string),
        services: candidate.services.iter().map(|s| s.id.clone()).collect(),
    };

    if dry_run {
        println!(
            "[DRY RUN] Would submit {}",
            serde_json::to_string_pretty(&booking)?
        );
        return Ok(());
    }
    if snapshot.is_some() {
        bail!("Booking needs the backend; drop --snapshot or use --dry-run");
    }

    let backend = connect(cfg).await?;
    if booking.client.is_none() {
        booking.client = backend.user_id().map(str::to_string);
    }

    let outcome = match candidate.editing.as_deref() {
        Some(id) => backend.update_appointment(id, &booking).await?,
        None => backend.create_appointment(&booking).await?,
    };

    match outcome {
        SubmitOutcome::Saved(body) => {
            let saved = body.get("data").unwrap_or(&body);
            let id = saved
                .get("id")
                .or_else(|| saved.get("_id"))
                .map(|v| v.to_string().trim_matches('"').to_string())
                .unwrap_or_else(|| "?".into());
            info!(
                "Saved appointment {} for barber {} at {}",
                id,
                booking.barber,
                start.format("%Y-%m-%d %H:%M")
            );
            println!("Booked {} at {} (#{}).", input.barber, start.format("%Y-%m-%d %H:%M"), id);
        }
        SubmitOutcome::SlotTaken(msg) => {
            warn!("Slot taken between check and submit: {}", msg);
            println!("That slot was just taken ({msg}). Re-check availability and pick another time.");
        }
    }
    Ok(())
}
