use chrono::NaiveDate;
use leptos::prelude::*;

use super::dashboard::{AgendaRow, Listing, Preview, PreviewQuery};
use crate::models::Config;

const STYLE: &str = include_str!("../style.css");

pub(super) fn render_page(
    cfg: &Config,
    query: &PreviewQuery,
    date: NaiveDate,
    listing: Option<&Listing>,
    preview: Option<&Preview>,
    error: Option<String>,
) -> String {
    let now = crate::scheduler::now(cfg.app.timezone)
        .format("%Y-%m-%d %H:%M:%S %Z")
        .to_string();
    let hours = format!(
        "Open {} to {}, last start {}, {} min notice for same-day bookings",
        cfg.rules.opening.format("%H:%M"),
        cfg.rules.closing.format("%H:%M"),
        cfg.rules.last_start.format("%H:%M"),
        cfg.rules.min_lead_minutes
    );
    let form_html = render_form(query, date);
    let listing_html = listing.map(render_listing).unwrap_or_default();
    let preview_html = preview.map(render_preview).unwrap_or_default();
    let error_html = error
        .map(|e| view! { <div class="error">{e}</div> }.to_html())
        .unwrap_or_default();

    view! {
        <html lang="en">
            <head>
                <meta charset="utf-8" />
                <meta name="viewport" content="width=device-width, initial-scale=1" />
                <title>"Barbershop Availability"</title>
                <style>{STYLE}</style>
            </head>
            <body>
                <h1>"Barbershop Availability"</h1>
                <p class="timestamp">"Updated: " {now}</p>
                <p class="rules">{hours}</p>
                <div inner_html=form_html />
                <div inner_html=error_html />
                <div inner_html=preview_html />
                <div inner_html=listing_html />
            </body>
        </html>
    }
    .to_html()
}

fn render_form(query: &PreviewQuery, date: NaiveDate) -> String {
    let barber = query.barber.clone().unwrap_or_default();
    let services = query.services.clone().unwrap_or_default();
    let date = date.format("%Y-%m-%d").to_string();

    view! {
        <form method="get" action="/">
            <label>"Barber " <input name="barber" value=barber /></label>
            <label>"Date " <input type="date" name="date" value=date /></label>
            <label>"Services " <input name="services" value=services /></label>
            <button type="submit">"Find free slots"</button>
        </form>
    }
    .to_html()
}

fn render_listing(listing: &Listing) -> String {
    let barbers_html: String = if listing.barbers.is_empty() {
        view! { <p class="empty">"No active barbers."</p> }.to_html()
    } else {
        listing
            .barbers
            .iter()
            .map(|(id, name)| {
                let id = id.clone();
                let name = name.clone();
                view! { <li><code>{id}</code> " " {name}</li> }.to_html()
            })
            .collect()
    };

    let rows_html: String = listing
        .services
        .iter()
        .map(|s| {
            let id = s.id.clone();
            let name = s.name.clone();
            let minutes = format!("{} min", s.minutes);
            let price = format!("{:.2}", s.price);
            view! {
                <tr>
                    <td><code>{id}</code></td>
                    <td>{name}</td>
                    <td>{minutes}</td>
                    <td class="price">{price}</td>
                </tr>
            }
            .to_html()
        })
        .collect();

    view! {
        <section>
            <h2>"Barbers"</h2>
            <ul inner_html=barbers_html />
            <h2>"Services"</h2>
            <table>
                <thead>
                    <tr><th>"Id"</th><th>"Service"</th><th>"Duration"</th><th>"Price"</th></tr>
                </thead>
                <tbody inner_html=rows_html />
            </table>
        </section>
    }
    .to_html()
}

fn render_preview(preview: &Preview) -> String {
    let title = format!(
        "{} on {} ({} min)",
        preview.barber,
        preview.date.format("%A %Y-%m-%d"),
        preview.minutes
    );
    let agenda_html = render_agenda(&preview.agenda);
    let slots_html: String = if preview.slots.is_empty() {
        view! { <p class="empty">"No free slots on this day."</p> }.to_html()
    } else {
        preview
            .slots
            .iter()
            .map(|t| {
                let t = t.clone();
                view! { <span class="slot">{t}</span> }.to_html()
            })
            .collect()
    };

    view! {
        <section>
            <h2>{title}</h2>
            <h3>"Free start times"</h3>
            <div class="slots" inner_html=slots_html />
            <h3>"Booked"</h3>
            <div inner_html=agenda_html />
        </section>
    }
    .to_html()
}

fn render_agenda(rows: &[AgendaRow]) -> String {
    if rows.is_empty() {
        return view! { <p class="empty">"Nothing booked yet."</p> }.to_html();
    }

    let rows_html: String = rows
        .iter()
        .map(|r| {
            let start = r.start.clone();
            let end = r.end.clone();
            let services = r.services.clone();
            let client = r.client.clone();
            view! {
                <tr>
                    <td>{start}</td>
                    <td>{end}</td>
                    <td>{services}</td>
                    <td>{client}</td>
                </tr>
            }
            .to_html()
        })
        .collect();

    view! {
        <table>
            <thead>
                <tr><th>"Start"</th><th>"End"</th><th>"Services"</th><th>"Client"</th></tr>
            </thead>
            <tbody inner_html=rows_html />
        </table>
    }
    .to_html()
}
