//! Soil moisture probe on the ADC, with self-widening calibration.
//!
//! The probe's useful range differs per soil and per unit, so the node
//! learns it: `dry_max` is the highest raw reading ever seen (bone dry,
//! 0 %) and `wet_max` the lowest (saturated, 100 %). A reading outside
//! the current window widens it, and the widened bound is persisted so
//! the calibration survives deep sleep.

use super::percentage;
use crate::app::ports::{ConfigStore, StorageError};
use crate::config::keys;

/// ADC1 channel for the moisture probe (GPIO34).
#[cfg(target_os = "espidf")]
const MOISTURE_ADC_CHANNEL: u32 = 6;

/// Factory window before any calibration has been learned (12-bit raw).
const DEFAULT_DRY_MAX: u16 = 3300;
const DEFAULT_WET_MAX: u16 = 1200;

/// Learned raw-reading window of the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoistureCalibration {
    pub dry_max: u16,
    pub wet_max: u16,
}

impl Default for MoistureCalibration {
    fn default() -> Self {
        Self {
            dry_max: DEFAULT_DRY_MAX,
            wet_max: DEFAULT_WET_MAX,
        }
    }
}

impl MoistureCalibration {
    /// Load stored bounds, keeping the factory defaults for anything
    /// missing or unparseable.
    pub fn load(store: &impl ConfigStore) -> Self {
        let default = Self::default();
        let parse = |key: &str, fallback: u16| {
            store
                .get(key)
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(fallback)
        };
        Self {
            dry_max: parse(keys::MOISTURE_DRY_MAX, default.dry_max),
            wet_max: parse(keys::MOISTURE_WET_MAX, default.wet_max),
        }
    }

    /// Widen the window to cover `raw`. Returns `true` when a bound moved.
    pub fn widen(&mut self, raw: u16) -> bool {
        if raw > self.dry_max {
            self.dry_max = raw;
            true
        } else if raw < self.wet_max {
            self.wet_max = raw;
            true
        } else {
            false
        }
    }

    /// Persist both bounds.
    pub fn persist(&self, store: &mut impl ConfigStore) -> Result<(), StorageError> {
        store.set(keys::MOISTURE_DRY_MAX, &self.dry_max.to_string())?;
        store.set(keys::MOISTURE_WET_MAX, &self.wet_max.to_string())
    }

    /// Map a raw reading into the window: `dry_max` → 0 %, `wet_max` → 100 %.
    pub fn percent(&self, raw: u16) -> f32 {
        percentage(self.dry_max, self.wet_max, raw)
    }
}

pub struct MoistureSensor {
    #[cfg(not(target_os = "espidf"))]
    sim_raw: u16,
}

impl MoistureSensor {
    pub fn new() -> Self {
        #[cfg(target_os = "espidf")]
        unsafe {
            use esp_idf_svc::sys::*;
            adc1_config_width(adc_bits_width_t_ADC_WIDTH_BIT_12);
            adc1_config_channel_atten(MOISTURE_ADC_CHANNEL, adc_atten_t_ADC_ATTEN_DB_11);
        }
        Self {
            #[cfg(not(target_os = "espidf"))]
            sim_raw: 2200,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_set_raw(&mut self, raw: u16) {
        self.sim_raw = raw;
    }

    #[cfg(target_os = "espidf")]
    pub fn read_raw(&mut self) -> u16 {
        let raw = unsafe { esp_idf_svc::sys::adc1_get_raw(MOISTURE_ADC_CHANNEL) };
        raw.max(0) as u16
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn read_raw(&mut self) -> u16 {
        self.sim_raw
    }
}

impl Default for MoistureSensor {
    fn default() -> Self {
        Self::new()
    }
}
