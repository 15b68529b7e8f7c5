//! WiFi station adapter.
//!
//! Implements [`NetworkConnector`] — a one-shot association attempt
//! with a real monotonic deadline. The provisioning machine calls this
//! inline, so the deadline is the only thing standing between a bad
//! credential and a wedged event loop.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: drives `esp_idf_svc::wifi::EspWifi` in
//!   client mode and polls the link state until it is up or the
//!   deadline passes.
//! - **all other targets**: scripted simulation for host-side tests.

use core::time::Duration;

use log::{info, warn};

use crate::app::ports::{ConnectError, NetworkConnector};

/// WiFi station driver wrapper.
pub struct WifiConnector {
    #[cfg(target_os = "espidf")]
    driver: esp_idf_svc::wifi::EspWifi<'static>,
    /// Simulation: outcome of the next `connect` call.
    #[cfg(not(target_os = "espidf"))]
    sim_outcome: Result<(), ConnectError>,
    #[cfg(not(target_os = "espidf"))]
    sim_attempts: u32,
}

#[cfg(target_os = "espidf")]
impl WifiConnector {
    /// Wrap an initialised WiFi driver (modem, event loop and NVS are
    /// threaded in from the entry point).
    pub fn new(driver: esp_idf_svc::wifi::EspWifi<'static>) -> Self {
        Self { driver }
    }
}

#[cfg(not(target_os = "espidf"))]
impl WifiConnector {
    pub fn new() -> Self {
        Self {
            sim_outcome: Ok(()),
            sim_attempts: 0,
        }
    }

    /// Script the outcome of the next association attempt.
    pub fn sim_set_outcome(&mut self, outcome: Result<(), ConnectError>) {
        self.sim_outcome = outcome;
    }

    pub fn sim_attempts(&self) -> u32 {
        self.sim_attempts
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for WifiConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkConnector for WifiConnector {
    #[cfg(target_os = "espidf")]
    fn connect(
        &mut self,
        ssid: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<(), ConnectError> {
        use esp_idf_svc::hal::delay::FreeRtos;
        use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};
        use std::time::Instant;

        let auth_method = if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let client = ClientConfiguration {
            ssid: ssid
                .try_into()
                .map_err(|_| ConnectError::AssociationFailed)?,
            password: password
                .try_into()
                .map_err(|_| ConnectError::AssociationFailed)?,
            auth_method,
            ..Default::default()
        };

        self.driver
            .set_configuration(&Configuration::Client(client))
            .map_err(|_| ConnectError::Transport("set_configuration"))?;
        self.driver
            .start()
            .map_err(|_| ConnectError::Transport("start"))?;
        self.driver
            .connect()
            .map_err(|_| ConnectError::Transport("connect"))?;

        info!("WiFi: associating with '{}' ({:?} deadline)", ssid, timeout);

        // Genuine elapsed-time bound: poll the link until it is up and
        // has an address, or the monotonic deadline passes.
        let started = Instant::now();
        while started.elapsed() < timeout {
            if self.driver.is_up().unwrap_or(false) {
                info!("WiFi: connected to '{}'", ssid);
                return Ok(());
            }
            FreeRtos::delay_ms(100);
        }

        warn!("WiFi: association with '{}' timed out", ssid);
        self.driver.disconnect().ok();
        Err(ConnectError::Timeout)
    }

    #[cfg(not(target_os = "espidf"))]
    fn connect(
        &mut self,
        ssid: &str,
        _password: &str,
        timeout: Duration,
    ) -> Result<(), ConnectError> {
        self.sim_attempts += 1;
        match self.sim_outcome {
            Ok(()) => {
                info!("WiFi(sim): connected to '{}'", ssid);
                Ok(())
            }
            Err(e) => {
                warn!(
                    "WiFi(sim): '{}' failed within {:?} — {}",
                    ssid, timeout, e
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_simulation_connects() {
        let mut wifi = WifiConnector::new();
        assert!(wifi
            .connect("HomeWiFi", "secret123", Duration::from_secs(15))
            .is_ok());
        assert_eq!(wifi.sim_attempts(), 1);
    }

    #[test]
    fn scripted_timeout_is_returned() {
        let mut wifi = WifiConnector::new();
        wifi.sim_set_outcome(Err(ConnectError::Timeout));
        assert_eq!(
            wifi.connect("HomeWiFi", "wrong", Duration::from_secs(15)),
            Err(ConnectError::Timeout)
        );
    }

    #[test]
    fn scripted_transport_fault_is_returned() {
        let mut wifi = WifiConnector::new();
        wifi.sim_set_outcome(Err(ConnectError::Transport("driver reset")));
        assert!(matches!(
            wifi.connect("Net", "pw", Duration::from_secs(1)),
            Err(ConnectError::Transport(_))
        ));
    }
}
