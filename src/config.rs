//! Node configuration.
//!
//! Tunable parameters for the PlantDaddy node, persisted as a blob in
//! the config store. WiFi credentials and per-device metadata are *not*
//! part of this struct — they live as individual keys (see [`keys`]) so
//! the provisioning path can write them without touching the tunables.

use serde::{Deserialize, Serialize};

/// Well-known keys in the persistent key-value store.
pub mod keys {
    /// WiFi network name written by the provisioning service.
    pub const SSID: &str = "ssid";
    /// WiFi passphrase written by the provisioning service.
    pub const PASSWORD: &str = "password";
    /// Backend-assigned device identifier (falls back to the MAC-derived one).
    pub const DEVICE_ID: &str = "device_id";
    /// Backend-assigned telemetry session.
    pub const SESSION_ID: &str = "session_id";
    /// Monotonic per-session upload counter.
    pub const USAGE_COUNTER: &str = "usage_counter";
    /// Driest raw ADC reading seen from the soil probe.
    pub const MOISTURE_DRY_MAX: &str = "dry_max";
    /// Wettest raw ADC reading seen from the soil probe.
    pub const MOISTURE_WET_MAX: &str = "wet_max";
}

/// Core node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Deep-sleep period between sampling cycles (seconds).
    pub sample_period_secs: u32,
    /// Awake window after a cycle so a central can still reach the node (seconds).
    pub command_window_secs: u32,
    /// Deadline for a single WiFi association attempt (seconds).
    pub connect_timeout_secs: u32,
    /// Telemetry backend base URL.
    pub backend_url: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            sample_period_secs: 600,
            command_window_secs: 5,
            connect_timeout_secs: 15,
            backend_url: "http://plantdaddy.local:8000".to_string(),
        }
    }
}

impl NodeConfig {
    /// Range-check the configuration. Out-of-range values are rejected,
    /// not clamped, so a corrupted blob cannot silently change timing.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !(30..=86_400).contains(&self.sample_period_secs) {
            return Err("sample_period_secs must be 30-86400");
        }
        if !(1..=60).contains(&self.command_window_secs) {
            return Err("command_window_secs must be 1-60");
        }
        if !(1..=120).contains(&self.connect_timeout_secs) {
            return Err("connect_timeout_secs must be 1-120");
        }
        if self.backend_url.is_empty() {
            return Err("backend_url must not be empty");
        }
        Ok(())
    }
}
