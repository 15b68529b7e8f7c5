//! Telemetry session upload.
//!
//! The node authenticates once with its device ID, then posts one
//! reading per wake cycle to the backend's `/new-data` endpoint. Field
//! names follow the backend's JSON schema exactly (`sessionID`,
//! `usageCounter`, `soilMoisture`, ...), so the structs here are the
//! wire contract.
//!
//! Upload failures are logged and dropped — the node deep-sleeps and
//! retries on the next wake, so losing one sample is cheaper than
//! burning battery on retries.

use core::fmt;

use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigStore;
use crate::config::keys;
use crate::sensors::Sample;

/// Device login request body for `/auth-device`.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceLogin<'a> {
    #[serde(rename = "deviceID")]
    pub device_id: &'a str,
}

/// Session handle returned by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionGrant {
    #[serde(rename = "sessionID")]
    pub session_id: String,
}

/// One sample as posted to `/new-data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    #[serde(rename = "usageCounter")]
    pub usage_counter: u32,
    pub timestamp: String,
    pub temperature: i32,
    pub humidity: i32,
    #[serde(rename = "soilMoisture")]
    pub soil_moisture: f64,
    pub light: f64,
}

impl SessionReport {
    /// Stamp a sample with session metadata and the current wall clock.
    pub fn from_sample(session_id: &str, usage_counter: u32, sample: &Sample) -> Self {
        Self {
            session_id: session_id.to_string(),
            usage_counter,
            timestamp: Utc::now().to_rfc3339(),
            temperature: sample.temperature_c,
            humidity: sample.humidity_pct,
            soil_moisture: sample.soil_moisture_pct as f64,
            light: sample.light_pct as f64,
        }
    }
}

/// Errors from a telemetry exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    /// Request or response body could not be (de)serialised.
    Encoding,
    /// Transport-level HTTP failure.
    Http(&'static str),
    /// The backend answered with a non-success status.
    Status(u16),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encoding => write!(f, "telemetry encoding failed"),
            Self::Http(msg) => write!(f, "telemetry HTTP failure: {}", msg),
            Self::Status(code) => write!(f, "backend answered {}", code),
        }
    }
}

/// Read-increment-persist of the per-session upload counter.
pub fn next_usage_counter(store: &mut impl ConfigStore) -> u32 {
    let next = store
        .get(keys::USAGE_COUNTER)
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0)
        .wrapping_add(1);
    if let Err(e) = store.set(keys::USAGE_COUNTER, &next.to_string()) {
        warn!("failed to persist usage counter: {}", e);
    }
    next
}

/// HTTP client for the telemetry backend.
pub struct TelemetryClient {
    base_url: String,
    #[cfg(not(target_os = "espidf"))]
    sim_uploads: Vec<SessionReport>,
    #[cfg(not(target_os = "espidf"))]
    sim_fail: bool,
}

impl TelemetryClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            #[cfg(not(target_os = "espidf"))]
            sim_uploads: Vec::new(),
            #[cfg(not(target_os = "espidf"))]
            sim_fail: false,
        }
    }

    /// Exchange the device ID for a session ID via `/auth-device`.
    pub fn authenticate(&mut self, device_id: &str) -> Result<String, TelemetryError> {
        let body =
            serde_json::to_string(&DeviceLogin { device_id }).map_err(|_| TelemetryError::Encoding)?;
        let response = self.post_json("/auth-device", &body)?;
        let grant: SessionGrant =
            serde_json::from_str(&response).map_err(|_| TelemetryError::Encoding)?;
        info!("telemetry: session '{}' granted", grant.session_id);
        Ok(grant.session_id)
    }

    /// Post one report to `/new-data`.
    pub fn upload(&mut self, report: &SessionReport) -> Result<(), TelemetryError> {
        let body = serde_json::to_string(report).map_err(|_| TelemetryError::Encoding)?;
        self.post_json("/new-data", &body)?;
        info!(
            "telemetry: uploaded sample #{} for session '{}'",
            report.usage_counter, report.session_id
        );
        Ok(())
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn post_json(&mut self, path: &str, body: &str) -> Result<String, TelemetryError> {
        use embedded_svc::http::client::Client;
        use embedded_svc::io::{Read, Write};
        use esp_idf_svc::http::client::{Configuration, EspHttpConnection};

        let connection = EspHttpConnection::new(&Configuration {
            timeout: Some(core::time::Duration::from_secs(10)),
            ..Default::default()
        })
        .map_err(|_| TelemetryError::Http("connection"))?;
        let mut client = Client::wrap(connection);

        let url = format!("{}{}", self.base_url, path);
        let headers = [("content-type", "application/json")];
        let mut request = client
            .post(&url, &headers)
            .map_err(|_| TelemetryError::Http("request"))?;
        request
            .write_all(body.as_bytes())
            .map_err(|_| TelemetryError::Http("write"))?;
        let mut response = request.submit().map_err(|_| TelemetryError::Http("submit"))?;

        let status = response.status();
        if !(200..300).contains(&status) {
            return Err(TelemetryError::Status(status));
        }

        let mut buf = [0u8; 512];
        let mut text = String::new();
        loop {
            let n = response
                .read(&mut buf)
                .map_err(|_| TelemetryError::Http("read"))?;
            if n == 0 {
                break;
            }
            text.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
        Ok(text)
    }

    #[cfg(not(target_os = "espidf"))]
    fn post_json(&mut self, path: &str, body: &str) -> Result<String, TelemetryError> {
        if self.sim_fail {
            return Err(TelemetryError::Http("simulated outage"));
        }
        info!("telemetry(sim): POST {}{} {}", self.base_url, path, body);
        match path {
            "/auth-device" => {
                let login: serde_json::Value =
                    serde_json::from_str(body).map_err(|_| TelemetryError::Encoding)?;
                let device = login["deviceID"].as_str().unwrap_or("unknown");
                Ok(format!(r#"{{"sessionID":"sim-{}"}}"#, device))
            }
            "/new-data" => {
                let report: SessionReport =
                    serde_json::from_str(body).map_err(|_| TelemetryError::Encoding)?;
                self.sim_uploads.push(report);
                Ok(String::new())
            }
            _ => Err(TelemetryError::Status(404)),
        }
    }

    // ── Simulation inspection (host tests) ────────────────────

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_fail(&mut self, fail: bool) {
        self.sim_fail = fail;
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_uploads(&self) -> &[SessionReport] {
        &self.sim_uploads
    }
}
