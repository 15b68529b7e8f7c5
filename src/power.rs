//! Duty-cycle / deep-sleep scheduling.
//!
//! Between sampling cycles the node deep-sleeps for the configured
//! period. Before sleeping it stays awake for a short command window so
//! a just-connected central (or the serial console) can still reach it.

use core::time::Duration;

use log::info;

use crate::config::NodeConfig;

/// Wake/sleep plan for one duty cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepSchedule {
    pub sleep_for: Duration,
    pub command_window: Duration,
}

impl SleepSchedule {
    pub fn from_config(config: &NodeConfig) -> Self {
        Self {
            sleep_for: Duration::from_secs(config.sample_period_secs as u64),
            command_window: Duration::from_secs(config.command_window_secs as u64),
        }
    }
}

/// Hold the node awake for the command window, then deep-sleep.
///
/// On device this does not return — the next thing that runs is the
/// bootloader on wake.
#[cfg(target_os = "espidf")]
pub fn wind_down(schedule: SleepSchedule) -> ! {
    use esp_idf_svc::hal::delay::FreeRtos;

    info!(
        "holding {}s for commands, then sleeping {}s",
        schedule.command_window.as_secs(),
        schedule.sleep_for.as_secs()
    );
    FreeRtos::delay_ms(schedule.command_window.as_millis() as u32);

    info!("entering deep sleep");
    unsafe {
        esp_idf_svc::sys::esp_deep_sleep(schedule.sleep_for.as_micros() as u64);
    }
    unreachable!("esp_deep_sleep does not return");
}

/// Host simulation: log the plan and return.
#[cfg(not(target_os = "espidf"))]
pub fn wind_down(schedule: SleepSchedule) {
    info!(
        "power(sim): would hold {}s then sleep {}s",
        schedule.command_window.as_secs(),
        schedule.sleep_for.as_secs()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_follows_config() {
        let config = NodeConfig::default();
        let schedule = SleepSchedule::from_config(&config);
        assert_eq!(schedule.sleep_for, Duration::from_secs(600));
        assert_eq!(schedule.command_window, Duration::from_secs(5));
    }

    #[test]
    fn simulated_wind_down_returns() {
        let schedule = SleepSchedule::from_config(&NodeConfig::default());
        wind_down(schedule);
    }
}
