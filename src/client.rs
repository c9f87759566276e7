use anyhow::{bail, Context, Result};
use base64::prelude::*;
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::models::{AppointmentRecord, EmployeeRecord, NewAppointment, ServiceRecord, Snapshot};

/// Result of submitting a booking to the backend.
#[derive(Debug)]
pub enum SubmitOutcome {
    Saved(serde_json::Value),
    /// The backend rejected the write because the slot was taken in the
    /// meantime. The caller should re-check and let the user pick again.
    SlotTaken(String),
}

pub struct BackendClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    user_id: Option<String>,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            user_id: None,
        })
    }

    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(ref token) = self.token {
            if let Ok(val) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                headers.insert(AUTHORIZATION, val);
            }
        }
        headers
    }

    /// Id of the logged-in user, taken from the session token.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Authenticate and keep the bearer token for later requests.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<()> {
        let url = format!("{}/auth/login", self.base_url);

        let resp = self
            .client
            .post(&url)
            .headers(self.default_headers())
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .context("Failed to send login request")?;

        let status = resp.status();
        let text = resp.text().await.context("Failed to read login response")?;
        debug!("Login response (status {})", status);
        if !status.is_success() {
            bail!("Login failed (status {status}): {text}");
        }

        let body: serde_json::Value = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse login response (status {status}): {text}"))?;

        let token = body
            .get("token")
            .or_else(|| body.get("data").and_then(|d| d.get("token")))
            .and_then(|t| t.as_str())
            .context("Login response carries no token")?;

        self.user_id = token_subject(token);
        self.token = Some(token.to_string());
        info!("Logged in as {} (user id: {:?})", email, self.user_id);
        Ok(())
    }

    async fn get_list<T: DeserializeOwned>(&self, path_and_query: &str) -> Result<Vec<T>> {
        let url = format!("{}{}", self.base_url, path_and_query);

        let resp = self
            .client
            .get(&url)
            .headers(self.default_headers())
            .send()
            .await
            .with_context(|| format!("Failed to fetch {path_and_query}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .with_context(|| format!("Failed to read {path_and_query} response"))?;
        debug!("GET {} (status {}): {} bytes", path_and_query, status, text.len());
        if !status.is_success() {
            bail!("GET {path_and_query} failed (status {status}): {text}");
        }

        // Lists come either bare or wrapped as {"data": [...]}.
        let body: serde_json::Value = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse {path_and_query} (status {status})"))?;
        let list = match body {
            serde_json::Value::Object(mut obj) => obj
                .remove("data")
                .unwrap_or(serde_json::Value::Array(vec![])),
            other => other,
        };

        serde_json::from_value(list)
            .with_context(|| format!("Unexpected shape in {path_and_query} response"))
    }

    pub async fn get_services(&self) -> Result<Vec<ServiceRecord>> {
        self.get_list("/services").await
    }

    pub async fn get_employees(&self) -> Result<Vec<EmployeeRecord>> {
        self.get_list("/employees").await
    }

    /// Appointments, optionally narrowed to one day.
    pub async fn get_appointments(&self, date: Option<NaiveDate>) -> Result<Vec<AppointmentRecord>> {
        let path = match date {
            Some(d) => format!(
                "/appointments?date={}",
                urlencoding::encode(&d.format("%Y-%m-%d").to_string())
            ),
            None => "/appointments".to_string(),
        };
        let appointments = self.get_list(&path).await?;
        Ok(appointments)
    }

    pub async fn fetch_snapshot(&self, date: Option<NaiveDate>) -> Result<Snapshot> {
        let services = self.get_services().await?;
        let employees = self.get_employees().await?;
        let appointments = self.get_appointments(date).await?;
        debug!(
            "Fetched {} services, {} employees, {} appointments",
            services.len(),
            employees.len(),
            appointments.len()
        );
        Ok(Snapshot {
            services,
            employees,
            appointments,
        })
    }

    pub async fn create_appointment(&self, booking: &NewAppointment) -> Result<SubmitOutcome> {
        self.submit(Method::POST, "/appointments".to_string(), booking)
            .await
    }

    pub async fn update_appointment(
        &self,
        appointment_id: &str,
        booking: &NewAppointment,
    ) -> Result<SubmitOutcome> {
        let path = format!("/appointments/{}", urlencoding::encode(appointment_id));
        self.submit(Method::PUT, path, booking).await
    }

    async fn submit(
        &self,
        method: Method,
        path: String,
        booking: &NewAppointment,
    ) -> Result<SubmitOutcome> {
        let url = format!("{}{}", self.base_url, path);

        let resp = self
            .client
            .request(method.clone(), &url)
            .headers(self.default_headers())
            .json(booking)
            .send()
            .await
            .with_context(|| format!("Failed to send {method} {path}"))?;

        let status = resp.status();
        let text = resp.text().await.context("Failed to read booking response")?;
        debug!("{} {} (status {}): {}", method, path, status, text);

        if status == StatusCode::CONFLICT {
            return Ok(SubmitOutcome::SlotTaken(error_message(&text)));
        }
        if !status.is_success() {
            bail!("{method} {path} failed (status {status}): {}", error_message(&text));
        }

        let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::Null);
        Ok(SubmitOutcome::Saved(body))
    }
}

/// Pull a readable message out of an error body, falling back to the raw text.
fn error_message(text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|body| {
            body.get("message")
                .or_else(|| body.get("error"))
                .or_else(|| body.get("msg"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| text.trim().to_string())
}

/// Decode the JWT payload (without verifying it) and return the user id claim.
fn token_subject(token: &str) -> Option<String> {
    let payload = token.split('.').nth(1)?;
    let bytes = BASE64_URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    ["id", "sub", "userId", "uid"]
        .iter()
        .find_map(|key| claims.get(*key))
        .map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
}
