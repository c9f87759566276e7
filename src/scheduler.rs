use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

use crate::availability::{self, BusinessRules, InputError};
use crate::interval::Interval;
use crate::models::{Appointment, CandidateBooking, Service};

/// Current time in the shop's timezone.
pub fn now(tz: Tz) -> DateTime<Tz> {
    Utc::now().with_timezone(&tz)
}

/// Parse a date given as "YYYY-MM-DD" or "DD-MM-YYYY".
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%d-%m-%Y"))
        .ok()
}

/// Parse a wall-clock time given as "HH:MM" or "HH:MM:SS".
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

/// Start (inclusive) and end (exclusive) of a calendar day in `tz`.
pub fn day_bounds(date: NaiveDate, tz: Tz) -> Option<(DateTime<Tz>, DateTime<Tz>)> {
    let start = tz.from_local_datetime(&date.and_time(NaiveTime::MIN)).earliest()?;
    let next = date.succ_opt()?;
    let end = tz.from_local_datetime(&next.and_time(NaiveTime::MIN)).earliest()?;
    Some((start, end))
}

/// Appointments of one barber starting on `date`, in start order.
pub fn agenda<'a>(
    barber_id: &str,
    date: NaiveDate,
    tz: Tz,
    appointments: &'a [Appointment],
) -> Vec<&'a Appointment> {
    let Some((from, to)) = day_bounds(date, tz) else {
        return Vec::new();
    };
    let day_span = Interval::new(from, to);
    let mut day: Vec<&Appointment> = appointments
        .iter()
        .filter(|a| a.barber_id == barber_id && day_span.contains(a.start))
        .collect();
    day.sort_by_key(|a| a.start);
    day
}

/// Candidate start times from opening to the last bookable start, `step` apart.
pub fn slot_grid(rules: &BusinessRules, step: TimeDelta) -> Vec<NaiveTime> {
    let mut grid = Vec::new();
    if step <= TimeDelta::zero() {
        return grid;
    }
    let mut t = rules.opening;
    while t <= rules.last_start {
        grid.push(t);
        let (next, wrapped) = t.overflowing_add_signed(step);
        if wrapped != 0 {
            break;
        }
        t = next;
    }
    grid
}

/// Grid start times at which the barber could take the given services.
/// When `editing` names an appointment, that appointment never blocks a slot.
#[allow(clippy::too_many_arguments)]
pub fn open_slots(
    barber_id: &str,
    date: NaiveDate,
    services: &[Service],
    existing: &[Appointment],
    editing: Option<&str>,
    now: DateTime<Tz>,
    rules: &BusinessRules,
    step: TimeDelta,
) -> Result<Vec<NaiveTime>, InputError> {
    let mut open = Vec::new();
    for time in slot_grid(rules, step) {
        let candidate =
            CandidateBooking::new(barber_id, date, time, services.to_vec()).editing(editing);
        match availability::check_availability(&candidate, existing, now, rules) {
            Ok(verdict) if verdict.is_available() => open.push(time),
            Ok(_) | Err(InputError::NonexistentLocalTime(_)) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(open)
}
