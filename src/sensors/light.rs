//! Ambient light from a photoresistor divider on the ADC.
//!
//! The divider pulls the ADC high in darkness, so the percentage is
//! inverted: full-scale raw → 0 % light, zero raw → 100 %.

use super::percentage;

/// ADC1 channel for the photoresistor (GPIO33).
#[cfg(target_os = "espidf")]
const LIGHT_ADC_CHANNEL: u32 = 5;

/// Full scale of the 12-bit ADC.
const ADC_FULL_SCALE: u16 = 4095;

pub struct LightSensor {
    #[cfg(not(target_os = "espidf"))]
    sim_raw: u16,
}

impl LightSensor {
    pub fn new() -> Self {
        #[cfg(target_os = "espidf")]
        unsafe {
            use esp_idf_svc::sys::*;
            adc1_config_width(adc_bits_width_t_ADC_WIDTH_BIT_12);
            adc1_config_channel_atten(LIGHT_ADC_CHANNEL, adc_atten_t_ADC_ATTEN_DB_11);
        }
        Self {
            #[cfg(not(target_os = "espidf"))]
            sim_raw: 2048,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_set_raw(&mut self, raw: u16) {
        self.sim_raw = raw;
    }

    #[cfg(target_os = "espidf")]
    fn read_raw(&mut self) -> u16 {
        let raw = unsafe { esp_idf_svc::sys::adc1_get_raw(LIGHT_ADC_CHANNEL) };
        raw.max(0) as u16
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_raw(&mut self) -> u16 {
        self.sim_raw
    }

    /// Ambient light as 0–100 %.
    pub fn read_percent(&mut self) -> f32 {
        percentage(ADC_FULL_SCALE, 0, self.read_raw())
    }
}

impl Default for LightSensor {
    fn default() -> Self {
        Self::new()
    }
}
