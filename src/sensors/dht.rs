//! DHT11 temperature / relative-humidity sensor.
//!
//! Single-wire protocol: the host pulls the line low for ≥18 ms, the
//! sensor answers with an 80 µs low + 80 µs high preamble and then 40
//! data bits, each a 50 µs low followed by a high whose width encodes
//! the bit (~27 µs = 0, ~70 µs = 1). The 5th byte is the sum of the
//! first four.
//!
//! ## Dual-target design
//!
//! On ESP-IDF the bus is bit-banged with raw GPIO calls inside a tight
//! timing loop. On host the frame is synthesised from injected values.

use super::SensorError;

/// GPIO the DHT11 data line is wired to.
pub const DHT_GPIO: i32 = 4;

/// One DHT11 measurement. The part reports whole degrees / percents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DhtReading {
    pub temperature_c: i32,
    pub humidity_pct: i32,
}

pub struct DhtSensor {
    gpio: i32,
    #[cfg(not(target_os = "espidf"))]
    sim_temperature_c: i32,
    #[cfg(not(target_os = "espidf"))]
    sim_humidity_pct: i32,
}

impl DhtSensor {
    pub fn new(gpio: i32) -> Self {
        Self {
            gpio,
            #[cfg(not(target_os = "espidf"))]
            sim_temperature_c: 22,
            #[cfg(not(target_os = "espidf"))]
            sim_humidity_pct: 45,
        }
    }

    /// Inject the reading the simulation backend returns.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_set_reading(&mut self, temperature_c: i32, humidity_pct: i32) {
        self.sim_temperature_c = temperature_c;
        self.sim_humidity_pct = humidity_pct;
    }

    pub fn read(&mut self) -> Result<DhtReading, SensorError> {
        let frame = self.read_frame()?;
        let sum = frame[0]
            .wrapping_add(frame[1])
            .wrapping_add(frame[2])
            .wrapping_add(frame[3]);
        if sum != frame[4] {
            return Err(SensorError::ChecksumMismatch);
        }
        Ok(DhtReading {
            humidity_pct: frame[0] as i32,
            temperature_c: frame[2] as i32,
        })
    }

    #[cfg(target_os = "espidf")]
    fn read_frame(&mut self) -> Result<[u8; 5], SensorError> {
        use esp_idf_svc::sys::*;

        let pin = self.gpio;

        // Microsecond-resolution level wait; DHT11 phases are all <100 µs.
        unsafe fn wait_level(pin: i32, level: u32, timeout_us: u32) -> Result<u32, SensorError> {
            let mut waited = 0;
            while unsafe { gpio_get_level(pin) } as u32 != level {
                if waited >= timeout_us {
                    return Err(SensorError::Timeout);
                }
                unsafe { esp_rom_delay_us(1) };
                waited += 1;
            }
            Ok(waited)
        }

        let mut frame = [0u8; 5];
        unsafe {
            gpio_set_direction(pin, gpio_mode_t_GPIO_MODE_OUTPUT);
            gpio_set_level(pin, 0);
            esp_rom_delay_us(20_000);
            gpio_set_level(pin, 1);
            esp_rom_delay_us(40);
            gpio_set_direction(pin, gpio_mode_t_GPIO_MODE_INPUT);

            // Sensor preamble: 80 µs low, 80 µs high.
            wait_level(pin, 0, 100)?;
            wait_level(pin, 1, 100)?;
            wait_level(pin, 0, 100)?;

            for bit in 0..40 {
                wait_level(pin, 1, 70)?;
                let high_us = wait_level(pin, 0, 100)?;
                if high_us > 40 {
                    frame[bit / 8] |= 1 << (7 - (bit % 8));
                }
            }
        }
        Ok(frame)
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_frame(&mut self) -> Result<[u8; 5], SensorError> {
        let humidity = self.sim_humidity_pct.clamp(0, 100) as u8;
        let temperature = self.sim_temperature_c.clamp(0, 50) as u8;
        let checksum = humidity.wrapping_add(temperature);
        Ok([humidity, 0, temperature, 0, checksum])
    }
}
