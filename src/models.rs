use std::collections::HashMap;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, TimeZone, Timelike};
use chrono_tz::Tz;
use serde::{de, Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::availability::{self, InputError};
use crate::interval::Interval;

/// Longest duration a single service may declare; anything above is treated as invalid.
pub const MAX_SERVICE_MINUTES: u32 = 24 * 60;

/// Role an employee must carry to be offered for booking.
pub const BARBER_ROLE: &str = "barbero";

#[derive(Debug, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    #[serde(default)]
    pub rules: RulesConfig,
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub base_url: String,
    #[serde(deserialize_with = "deserialize_tz")]
    pub timezone: Tz,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    #[serde(deserialize_with = "deserialize_clock")]
    pub opening: NaiveTime,
    #[serde(deserialize_with = "deserialize_clock")]
    pub last_start: NaiveTime,
    #[serde(deserialize_with = "deserialize_clock")]
    pub closing: NaiveTime,
    pub min_lead_minutes: i64,
    pub slot_step_minutes: i64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        let rules = availability::BusinessRules::default();
        Self {
            opening: rules.opening,
            last_start: rules.last_start,
            closing: rules.closing,
            min_lead_minutes: rules.min_lead_time.num_minutes(),
            slot_step_minutes: 15,
        }
    }
}

// ---------------------------------------------------------------------------
// Domain types. Everything the validator sees is already normalized.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    pub id: String,
    pub name: String,
    /// `None` when the backend sent a missing or non-positive duration.
    pub duration_minutes: Option<u32>,
    pub price: f64,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Employee {
    pub id: String,
    pub name: String,
    pub role: String,
    pub active: bool,
}

impl Employee {
    pub fn is_schedulable(&self) -> bool {
        self.active && self.role.trim().eq_ignore_ascii_case(BARBER_ROLE)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Appointment {
    pub id: String,
    pub start: DateTime<Tz>,
    pub barber_id: String,
    pub client_id: Option<String>,
    pub services: Vec<Service>,
}

impl Appointment {
    pub fn duration_minutes(&self) -> u32 {
        availability::total_duration(&self.services)
    }

    pub fn end(&self) -> DateTime<Tz> {
        availability::end_time(self.start, self.duration_minutes())
    }

    pub fn interval(&self) -> Interval {
        Interval::new(self.start, self.end())
    }
}

/// A proposed appointment, expressed in the shop's wall-clock time.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateBooking {
    pub barber_id: String,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub services: Vec<Service>,
    /// Id of the appointment being edited, if any.
    pub editing: Option<String>,
}

impl CandidateBooking {
    pub fn new(barber_id: &str, date: NaiveDate, time: NaiveTime, services: Vec<Service>) -> Self {
        Self {
            barber_id: barber_id.to_string(),
            year: date.year(),
            month: date.month(),
            day: date.day(),
            hour: time.hour(),
            minute: time.minute(),
            services,
            editing: None,
        }
    }

    pub fn editing(mut self, appointment_id: Option<&str>) -> Self {
        self.editing = appointment_id.map(str::to_string);
        self
    }

    /// Resolve the wall-clock components into an instant in `tz`.
    pub fn start(&self, tz: Tz) -> Result<DateTime<Tz>, InputError> {
        let date = NaiveDate::from_ymd_opt(self.year, self.month, self.day).ok_or(
            InputError::InvalidDate {
                year: self.year,
                month: self.month,
                day: self.day,
            },
        )?;
        let time = NaiveTime::from_hms_opt(self.hour, self.minute, 0).ok_or(
            InputError::InvalidTime {
                hour: self.hour,
                minute: self.minute,
            },
        )?;
        let local = date.and_time(time);
        tz.from_local_datetime(&local)
            .earliest()
            .ok_or(InputError::NonexistentLocalTime(local))
    }
}

// ---------------------------------------------------------------------------
// Wire records, as the backend (or a snapshot file) sends them.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceRecord {
    #[serde(flatten, deserialize_with = "deserialize_record_id")]
    pub id: String,
    #[serde(default, alias = "nombre")]
    pub name: Option<String>,
    #[serde(
        default,
        alias = "duracion",
        alias = "duration_minutes",
        deserialize_with = "deserialize_minutes"
    )]
    pub duration: Option<u32>,
    #[serde(default, alias = "precio", deserialize_with = "deserialize_price")]
    pub price: Option<f64>,
    #[serde(default = "default_active", alias = "activo")]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmployeeRecord {
    #[serde(flatten, deserialize_with = "deserialize_record_id")]
    pub id: String,
    #[serde(default, alias = "nombre")]
    pub name: Option<String>,
    #[serde(default, alias = "rol")]
    pub role: Option<String>,
    #[serde(default = "default_active", alias = "activo")]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentRecord {
    #[serde(flatten, deserialize_with = "deserialize_record_id")]
    pub id: String,
    #[serde(alias = "fecha", alias = "start_time", alias = "date")]
    pub start: DateTime<FixedOffset>,
    #[serde(default, alias = "barbero", alias = "barber_id")]
    pub barber: Option<EntityRef>,
    #[serde(default, alias = "cliente", alias = "client_id")]
    pub client: Option<EntityRef>,
    #[serde(default, alias = "servicios")]
    pub services: Vec<ServiceRef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Identified {
    #[serde(flatten, deserialize_with = "deserialize_record_id")]
    pub id: String,
}

/// Either a bare id or an embedded object, depending on the endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EntityRef {
    Id(RawId),
    Embedded(Identified),
}

impl EntityRef {
    pub fn into_id(self) -> String {
        match self {
            Self::Id(raw) => raw.into_string(),
            Self::Embedded(e) => e.id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ServiceRef {
    Id(RawId),
    Embedded(ServiceRecord),
}

/// Request body for creating or updating an appointment.
#[derive(Debug, Clone, Serialize)]
pub struct NewAppointment {
    pub start: DateTime<FixedOffset>,
    pub barber: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    pub services: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Snapshot {
    #[serde(default, alias = "servicios")]
    pub services: Vec<ServiceRecord>,
    #[serde(default, alias = "empleados")]
    pub employees: Vec<EmployeeRecord>,
    #[serde(default, alias = "citas")]
    pub appointments: Vec<AppointmentRecord>,
}

impl From<ServiceRecord> for Service {
    fn from(r: ServiceRecord) -> Self {
        Self {
            name: r.name.unwrap_or_else(|| r.id.clone()),
            id: r.id,
            duration_minutes: r.duration,
            price: r.price.unwrap_or_default(),
            active: r.active,
        }
    }
}

impl From<EmployeeRecord> for Employee {
    fn from(r: EmployeeRecord) -> Self {
        Self {
            name: r.name.unwrap_or_else(|| r.id.clone()),
            id: r.id,
            role: r.role.unwrap_or_default(),
            active: r.active,
        }
    }
}

/// Normalized view of everything the booking flows need.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub services: Vec<Service>,
    pub employees: Vec<Employee>,
    pub appointments: Vec<Appointment>,
}

impl Catalog {
    pub fn normalize(snapshot: Snapshot, tz: Tz) -> Self {
        let services: Vec<Service> = snapshot.services.into_iter().map(Service::from).collect();
        for s in services.iter().filter(|s| s.duration_minutes.is_none()) {
            warn!(
                "Service {} ({}) has no valid duration, assuming {} minutes",
                s.id,
                s.name,
                availability::DEFAULT_SERVICE_MINUTES
            );
        }
        let employees: Vec<Employee> = snapshot.employees.into_iter().map(Employee::from).collect();

        let by_id: HashMap<&str, &Service> = services.iter().map(|s| (s.id.as_str(), s)).collect();

        let appointments = snapshot
            .appointments
            .into_iter()
            .filter_map(|record| {
                let Some(barber) = record.barber else {
                    warn!("Appointment {} has no barber, ignoring it", record.id);
                    return None;
                };
                let services = record
                    .services
                    .into_iter()
                    .map(|r| resolve_service(r, &by_id, &record.id))
                    .collect();
                Some(Appointment {
                    start: record.start.with_timezone(&tz),
                    barber_id: barber.into_id(),
                    client_id: record.client.map(EntityRef::into_id),
                    services,
                    id: record.id,
                })
            })
            .collect();

        Self {
            services,
            employees,
            appointments,
        }
    }

    pub fn barbers(&self) -> impl Iterator<Item = &Employee> {
        self.employees.iter().filter(|e| e.is_schedulable())
    }

    /// Look up a service by id or case-insensitive name.
    pub fn find_service(&self, key: &str) -> Option<&Service> {
        let key = key.trim();
        self.services
            .iter()
            .find(|s| s.id == key)
            .or_else(|| self.services.iter().find(|s| s.name.eq_ignore_ascii_case(key)))
    }

    /// Look up an employee by id or case-insensitive name.
    pub fn find_employee(&self, key: &str) -> Option<&Employee> {
        let key = key.trim();
        self.employees
            .iter()
            .find(|e| e.id == key)
            .or_else(|| self.employees.iter().find(|e| e.name.eq_ignore_ascii_case(key)))
    }
}

fn resolve_service(r: ServiceRef, by_id: &HashMap<&str, &Service>, appointment_id: &str) -> Service {
    match r {
        ServiceRef::Id(raw) => {
            let id = raw.into_string();
            match by_id.get(id.as_str()) {
                Some(s) => (*s).clone(),
                None => {
                    warn!(
                        "Appointment {} references unknown service {}, assuming {} minutes",
                        appointment_id,
                        id,
                        availability::DEFAULT_SERVICE_MINUTES
                    );
                    Service {
                        name: id.clone(),
                        id,
                        duration_minutes: None,
                        price: 0.0,
                        active: false,
                    }
                }
            }
        }
        ServiceRef::Embedded(record) => {
            let mut service = Service::from(record);
            // Some endpoints embed a trimmed-down service without its duration.
            if service.duration_minutes.is_none() {
                if let Some(known) = by_id.get(service.id.as_str()) {
                    service.duration_minutes = known.duration_minutes;
                }
            }
            service
        }
    }
}

fn default_active() -> bool {
    true
}

/// Both keys of a record: `id`, and Mongo's `_id` which may sit next to it.
#[derive(Deserialize)]
struct RecordKeys {
    #[serde(default)]
    id: Option<RawId>,
    #[serde(default, rename = "_id")]
    mongo_id: Option<RawId>,
}

/// Prefers `id` and falls back to `_id`.
fn deserialize_record_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let keys = RecordKeys::deserialize(d)?;
    keys.id
        .or(keys.mongo_id)
        .map(RawId::into_string)
        .ok_or_else(|| de::Error::missing_field("id"))
}

/// Lenient: anything that is not a whole number of minutes in
/// `1..=MAX_SERVICE_MINUTES` becomes `None`.
fn deserialize_minutes<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(parse_minutes(&value))
}

fn parse_minutes(value: &serde_json::Value) -> Option<u32> {
    let minutes = match value {
        serde_json::Value::Number(n) => match n.as_u64() {
            Some(m) => Some(m),
            None => n
                .as_f64()
                .filter(|f| f.fract() == 0.0 && *f > 0.0 && *f <= f64::from(u32::MAX))
                .map(|f| f as u64),
        },
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    minutes
        .filter(|m| (1..=u64::from(MAX_SERVICE_MINUTES)).contains(m))
        .and_then(|m| u32::try_from(m).ok())
}

fn deserialize_price<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn deserialize_tz<'de, D: Deserializer<'de>>(d: D) -> Result<Tz, D::Error> {
    let name = String::deserialize(d)?;
    name.parse::<Tz>()
        .map_err(|e| serde::de::Error::custom(format!("unknown timezone '{name}': {e}")))
}

fn deserialize_clock<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
    let raw = String::deserialize(d)?;
    crate::scheduler::parse_time(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid time '{raw}', expected HH:MM")))
}
