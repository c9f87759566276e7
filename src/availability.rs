//! Appointment availability: the single place that decides whether a
//! barber can take a booking at a given time.
//!
//! Everything here is a pure function of its arguments. Create, edit and
//! the open-slots preview all go through [`check_availability`].

use std::fmt;

use chrono::{DateTime, NaiveDateTime, NaiveTime, TimeDelta};
use chrono_tz::Tz;
use thiserror::Error;
use tracing::debug;

use crate::interval::Interval;
use crate::models::{Appointment, CandidateBooking, Service};

/// Minutes charged for a service whose duration is missing or invalid.
pub const DEFAULT_SERVICE_MINUTES: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessRules {
    pub opening: NaiveTime,
    /// Latest wall-clock time an appointment may start at (inclusive).
    pub last_start: NaiveTime,
    /// Every appointment must end by this time on its start day.
    pub closing: NaiveTime,
    /// Minimum gap between now and a same-day appointment.
    pub min_lead_time: TimeDelta,
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            opening: NaiveTime::MIN + TimeDelta::hours(8),
            last_start: NaiveTime::MIN + TimeDelta::hours(21),
            closing: NaiveTime::MIN + TimeDelta::hours(22),
            min_lead_time: TimeDelta::hours(2),
        }
    }
}

/// Caller mistakes. These are never a statement about the schedule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("no barber selected")]
    MissingBarber,

    #[error("at least one service is required")]
    NoServices,

    #[error("invalid date {year:04}-{month:02}-{day:02}")]
    InvalidDate { year: i32, month: u32, day: u32 },

    #[error("invalid time {hour:02}:{minute:02}")]
    InvalidTime { hour: u32, minute: u32 },

    #[error("{0} does not exist in the shop's timezone")]
    NonexistentLocalTime(NaiveDateTime),
}

/// A business rule the candidate start time breaks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleViolation {
    PastDate,
    InsufficientLeadTime { lead: TimeDelta, required: TimeDelta },
    OutsideBusinessHours { start: NaiveTime },
    ExceedsClosingTime { end: DateTime<Tz> },
}

impl fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PastDate => write!(f, "the requested time is in the past"),
            Self::InsufficientLeadTime { lead, required } => write!(
                f,
                "same-day bookings need {} minutes of notice, only {} left",
                required.num_minutes(),
                lead.num_minutes()
            ),
            Self::OutsideBusinessHours { start } => {
                write!(f, "{} is outside business hours", start.format("%H:%M"))
            }
            Self::ExceedsClosingTime { end } => {
                write!(f, "the appointment would end at {}, after closing", end.format("%H:%M"))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Availability {
    Available,
    /// At least one of the two lists is non-empty.
    Unavailable {
        violations: Vec<RuleViolation>,
        conflicts: Vec<Appointment>,
    },
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }
}

fn service_minutes(service: &Service) -> u32 {
    match service.duration_minutes {
        Some(minutes) if minutes >= 1 => minutes,
        _ => DEFAULT_SERVICE_MINUTES,
    }
}

/// Sum of the service durations, saturating at `u32::MAX`.
pub fn total_duration(services: &[Service]) -> u32 {
    services
        .iter()
        .map(service_minutes)
        .fold(0, u32::saturating_add)
}

pub fn end_time(start: DateTime<Tz>, duration_minutes: u32) -> DateTime<Tz> {
    start + TimeDelta::minutes(i64::from(duration_minutes))
}

/// Returns every rule the start time breaks; empty means all rules pass.
pub fn validate_business_rules(
    start: DateTime<Tz>,
    duration_minutes: u32,
    now: DateTime<Tz>,
    rules: &BusinessRules,
) -> Vec<RuleViolation> {
    let mut violations = Vec::new();
    let now = now.with_timezone(&start.timezone());

    if start < now {
        violations.push(RuleViolation::PastDate);
    } else if start.date_naive() == now.date_naive() {
        let lead = start - now;
        if lead < rules.min_lead_time {
            violations.push(RuleViolation::InsufficientLeadTime {
                lead,
                required: rules.min_lead_time,
            });
        }
    }

    let start_time = start.time();
    if start_time < rules.opening || start_time > rules.last_start {
        violations.push(RuleViolation::OutsideBusinessHours { start: start_time });
    }

    let end = end_time(start, duration_minutes);
    if end.naive_local() > start.date_naive().and_time(rules.closing) {
        violations.push(RuleViolation::ExceedsClosingTime { end });
    }

    violations
}

/// Appointments of `barber_id` overlapping `[start, end)`, earliest first.
pub fn find_conflicts(
    barber_id: &str,
    start: DateTime<Tz>,
    end: DateTime<Tz>,
    existing: &[Appointment],
    exclude_appointment_id: Option<&str>,
) -> Vec<Appointment> {
    let requested = Interval::new(start, end);
    let mut conflicts: Vec<Appointment> = existing
        .iter()
        .filter(|a| a.barber_id == barber_id)
        .filter(|a| exclude_appointment_id.map_or(true, |id| a.id != id))
        .filter(|a| a.interval().overlaps(requested))
        .cloned()
        .collect();
    conflicts.sort_by_key(|a| a.start);
    conflicts
}

pub fn check_availability(
    request: &CandidateBooking,
    existing: &[Appointment],
    now: DateTime<Tz>,
    rules: &BusinessRules,
) -> Result<Availability, InputError> {
    if request.barber_id.trim().is_empty() {
        return Err(InputError::MissingBarber);
    }
    if request.services.is_empty() {
        return Err(InputError::NoServices);
    }

    let start = request.start(now.timezone())?;
    let duration = total_duration(&request.services);
    let end = end_time(start, duration);

    let violations = validate_business_rules(start, duration, now, rules);
    let conflicts = find_conflicts(
        &request.barber_id,
        start,
        end,
        existing,
        request.editing.as_deref(),
    );

    debug!(
        "Barber {} {}..{}: {} rule violation(s), {} conflict(s)",
        request.barber_id,
        start.format("%Y-%m-%d %H:%M"),
        end.format("%H:%M"),
        violations.len(),
        conflicts.len()
    );

    if violations.is_empty() && conflicts.is_empty() {
        Ok(Availability::Available)
    } else {
        Ok(Availability::Unavailable {
            violations,
            conflicts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use chrono_tz::America::Bogota;

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Tz> {
        Bogota.with_ymd_and_hms(2026, 3, day, hour, minute, 0).unwrap()
    }

    fn service(id: &str, minutes: Option<u32>) -> Service {
        Service {
            id: id.to_string(),
            name: id.to_string(),
            duration_minutes: minutes,
            price: 0.0,
            active: true,
        }
    }

    fn appointment(id: &str, barber: &str, start: DateTime<Tz>, minutes: &[u32]) -> Appointment {
        Appointment {
            id: id.to_string(),
            start,
            barber_id: barber.to_string(),
            client_id: None,
            services: minutes
                .iter()
                .enumerate()
                .map(|(i, m)| service(&format!("{id}-{i}"), Some(*m)))
                .collect(),
        }
    }

    fn candidate(barber: &str, hour: u32, minute: u32, minutes: &[u32]) -> CandidateBooking {
        CandidateBooking::new(
            barber,
            NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            NaiveTime::from_hms_opt(hour, minute, 0).unwrap(),
            minutes.iter().map(|m| service("s", Some(*m))).collect(),
        )
    }

    #[test]
    fn test_total_duration_sums_valid_durations() {
        let services = vec![service("a", Some(45)), service("b", Some(60))];
        assert_eq!(total_duration(&services), 105);
    }

    #[test]
    fn test_total_duration_falls_back_for_invalid() {
        let services = vec![
            service("a", Some(20)),
            service("b", None),
            service("c", Some(0)),
        ];
        assert_eq!(total_duration(&services), 20 + 2 * DEFAULT_SERVICE_MINUTES);
        assert_eq!(total_duration(&[]), 0);
    }

    #[test]
    fn test_total_duration_saturates() {
        let services = vec![service("a", Some(u32::MAX)), service("b", Some(u32::MAX))];
        assert_eq!(total_duration(&services), u32::MAX);
        assert!(end_time(at(10, 9, 0), total_duration(&services)) > at(10, 9, 0));
    }

    #[test]
    fn test_end_time_rolls_past_closing() {
        let end = end_time(at(10, 21, 45), 30);
        assert_eq!(end, at(10, 22, 15));
        assert_eq!(end - TimeDelta::minutes(30), at(10, 21, 45));
    }

    #[test]
    fn test_end_time_crosses_midnight() {
        assert_eq!(end_time(at(10, 23, 50), 20), at(11, 0, 10));
    }

    #[test]
    fn test_past_date_independent_of_hour() {
        let rules = BusinessRules::default();
        let now = at(10, 9, 0);
        for hour in [8, 12, 20] {
            let violations = validate_business_rules(at(9, hour, 0), 30, now, &rules);
            assert_eq!(violations, vec![RuleViolation::PastDate]);
        }
    }

    #[test]
    fn test_lead_time_boundary() {
        let rules = BusinessRules::default();
        let start = at(10, 9, 0);

        let exactly_two_hours = Bogota.with_ymd_and_hms(2026, 3, 10, 7, 0, 0).unwrap();
        assert!(validate_business_rules(start, 30, exactly_two_hours, &rules).is_empty());

        let one_second_short = Bogota.with_ymd_and_hms(2026, 3, 10, 7, 0, 1).unwrap();
        assert_eq!(
            validate_business_rules(start, 30, one_second_short, &rules),
            vec![RuleViolation::InsufficientLeadTime {
                lead: TimeDelta::hours(2) - TimeDelta::seconds(1),
                required: TimeDelta::hours(2),
            }]
        );
    }

    #[test]
    fn test_lead_time_only_applies_same_day() {
        let rules = BusinessRules {
            min_lead_time: TimeDelta::hours(12),
            ..BusinessRules::default()
        };
        let now = at(9, 22, 0);
        assert!(validate_business_rules(at(10, 8, 0), 30, now, &rules).is_empty());

        let now = at(10, 0, 0);
        assert!(matches!(
            validate_business_rules(at(10, 8, 0), 30, now, &rules).as_slice(),
            [RuleViolation::InsufficientLeadTime { .. }]
        ));
    }

    #[test]
    fn test_business_hours_window() {
        let rules = BusinessRules::default();
        let now = at(1, 8, 0);

        assert!(validate_business_rules(at(10, 8, 0), 30, now, &rules).is_empty());
        assert!(validate_business_rules(at(10, 21, 0), 30, now, &rules).is_empty());

        for (hour, minute) in [(7, 59), (21, 1), (21, 30), (22, 0)] {
            let violations = validate_business_rules(at(10, hour, minute), 15, now, &rules);
            assert!(
                violations.contains(&RuleViolation::OutsideBusinessHours {
                    start: NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
                }),
                "{hour}:{minute} should be outside business hours"
            );
        }
    }

    #[test]
    fn test_exceeds_closing_time() {
        let rules = BusinessRules::default();
        let now = at(1, 8, 0);

        let violations = validate_business_rules(at(10, 21, 45), 30, now, &rules);
        assert!(violations.contains(&RuleViolation::ExceedsClosingTime { end: at(10, 22, 15) }));

        // Ending exactly at closing is fine.
        assert!(validate_business_rules(at(10, 21, 0), 60, now, &rules).is_empty());
        let violations = validate_business_rules(at(10, 21, 0), 61, now, &rules);
        assert_eq!(
            violations,
            vec![RuleViolation::ExceedsClosingTime {
                end: at(10, 22, 1)
            }]
        );
    }

    #[test]
    fn test_find_conflicts_overlap() {
        let existing = vec![appointment("a1", "b1", at(10, 10, 0), &[30])];
        let conflicts = find_conflicts("b1", at(10, 10, 15), at(10, 10, 45), &existing, None);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].id, "a1");
    }

    #[test]
    fn test_find_conflicts_ignores_other_barbers_and_touching() {
        let existing = vec![
            appointment("a1", "b2", at(10, 10, 0), &[60]),
            appointment("a2", "b1", at(10, 9, 30), &[30]),
            appointment("a3", "b1", at(10, 10, 30), &[30]),
        ];
        let conflicts = find_conflicts("b1", at(10, 10, 0), at(10, 10, 30), &existing, None);
        assert!(conflicts.is_empty());
    }

    #[test]
    fn test_find_conflicts_sorted_by_start() {
        let existing = vec![
            appointment("late", "b1", at(10, 11, 0), &[30]),
            appointment("early", "b1", at(10, 10, 0), &[30]),
            appointment("mid", "b1", at(10, 10, 30), &[30]),
        ];
        let conflicts = find_conflicts("b1", at(10, 10, 0), at(10, 12, 0), &existing, None);
        let ids: Vec<&str> = conflicts.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "mid", "late"]);
    }

    #[test]
    fn test_find_conflicts_symmetric() {
        let windows = [
            (at(10, 10, 0), at(10, 10, 30)),
            (at(10, 10, 15), at(10, 10, 45)),
            (at(10, 10, 30), at(10, 11, 0)),
            (at(10, 9, 0), at(10, 12, 0)),
        ];
        for (a_start, a_end) in windows {
            for (b_start, b_end) in windows {
                let a_mins = u32::try_from((a_end - a_start).num_minutes()).unwrap();
                let b_mins = u32::try_from((b_end - b_start).num_minutes()).unwrap();
                let a = [appointment("a", "b1", a_start, &[a_mins])];
                let b = [appointment("b", "b1", b_start, &[b_mins])];
                assert_eq!(
                    find_conflicts("b1", b_start, b_end, &a, None).is_empty(),
                    find_conflicts("b1", a_start, a_end, &b, None).is_empty(),
                );
            }
        }
    }

    #[test]
    fn test_find_conflicts_uses_fallback_duration() {
        let mut existing = appointment("a1", "b1", at(10, 10, 0), &[]);
        existing.services.push(service("unknown", None));
        let conflicts = find_conflicts("b1", at(10, 10, 20), at(10, 10, 50), &[existing], None);
        assert_eq!(conflicts.len(), 1);
    }

    #[test]
    fn test_noop_edit_has_no_conflicts() {
        let existing = vec![appointment("a1", "b1", at(10, 10, 0), &[30])];
        let request = candidate("b1", 10, 0, &[30]).editing(Some("a1"));
        let now = at(1, 8, 0);
        let result = check_availability(&request, &existing, now, &BusinessRules::default()).unwrap();
        assert_eq!(result, Availability::Available);
    }

    #[test]
    fn test_check_reports_conflict() {
        let existing = vec![appointment("a1", "b1", at(10, 10, 0), &[30])];
        let request = candidate("b1", 10, 15, &[30]);
        let now = at(1, 8, 0);
        let result = check_availability(&request, &existing, now, &BusinessRules::default()).unwrap();
        match result {
            Availability::Unavailable {
                violations,
                conflicts,
            } => {
                assert!(violations.is_empty());
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].id, "a1");
            }
            Availability::Available => panic!("expected a conflict"),
        }
    }

    #[test]
    fn test_check_reports_rules_and_conflicts_together() {
        let existing = vec![appointment("a1", "b1", at(10, 21, 30), &[30])];
        let request = candidate("b1", 21, 45, &[30]);
        let now = at(1, 8, 0);
        let result = check_availability(&request, &existing, now, &BusinessRules::default()).unwrap();
        let Availability::Unavailable {
            violations,
            conflicts,
        } = result
        else {
            panic!("expected unavailable");
        };
        assert!(violations.contains(&RuleViolation::ExceedsClosingTime { end: at(10, 22, 15) }));
        assert!(violations.contains(&RuleViolation::OutsideBusinessHours {
            start: NaiveTime::from_hms_opt(21, 45, 0).unwrap()
        }));
        assert_eq!(conflicts.len(), 1);
    }

    #[test]
    fn test_check_available_with_two_services() {
        let existing = vec![appointment("a1", "b2", at(10, 10, 0), &[60])];
        let request = candidate("b1", 10, 0, &[45, 60]);
        let now = at(9, 12, 0);
        let result = check_availability(&request, &existing, now, &BusinessRules::default()).unwrap();
        assert!(result.is_available());
    }

    #[test]
    fn test_check_input_errors() {
        let now = at(1, 8, 0);
        let rules = BusinessRules::default();

        let request = candidate(" ", 10, 0, &[30]);
        assert_eq!(
            check_availability(&request, &[], now, &rules),
            Err(InputError::MissingBarber)
        );

        let request = candidate("b1", 10, 0, &[]);
        assert_eq!(
            check_availability(&request, &[], now, &rules),
            Err(InputError::NoServices)
        );

        let mut request = candidate("b1", 10, 0, &[30]);
        request.month = 13;
        assert!(matches!(
            check_availability(&request, &[], now, &rules),
            Err(InputError::InvalidDate { .. })
        ));
    }

    #[test]
    fn test_custom_rules() {
        let rules = BusinessRules {
            opening: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            last_start: NaiveTime::from_hms_opt(18, 30, 0).unwrap(),
            closing: NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
            min_lead_time: TimeDelta::minutes(30),
        };
        let now = at(10, 17, 45);
        assert!(validate_business_rules(at(10, 18, 15), 45, now, &rules).is_empty());
        assert_eq!(
            validate_business_rules(at(10, 18, 0), 30, now, &rules),
            vec![RuleViolation::InsufficientLeadTime {
                lead: TimeDelta::minutes(15),
                required: TimeDelta::minutes(30),
            }]
        );
    }
}
