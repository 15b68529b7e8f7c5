//! Device restart adapter.
//!
//! Implements [`DeviceReset`]. On device this calls `esp_restart()` and
//! never returns; the host simulation just records that a restart was
//! requested so tests can assert on it.
//!
//! The provisioning machine itself never calls this — it returns a
//! restart directive and the main loop pulls the trigger, strictly
//! after the credentials have been persisted.

use log::info;

use crate::app::ports::DeviceReset;

/// Hardware restart (device) / restart recorder (host).
#[derive(Debug, Default)]
pub struct SystemReset {
    #[cfg(not(target_os = "espidf"))]
    sim_restarts: u32,
}

impl SystemReset {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many restarts were requested (host tests only).
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_restarts(&self) -> u32 {
        self.sim_restarts
    }
}

impl DeviceReset for SystemReset {
    #[cfg(target_os = "espidf")]
    fn restart(&mut self) {
        info!("restarting device");
        unsafe {
            esp_idf_svc::sys::esp_restart();
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn restart(&mut self) {
        info!("reset(sim): restart requested");
        self.sim_restarts += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulation_counts_restarts() {
        let mut reset = SystemReset::new();
        assert_eq!(reset.sim_restarts(), 0);
        reset.restart();
        assert_eq!(reset.sim_restarts(), 1);
    }
}
