//! Device identity derived from the factory MAC address.
//!
//! Produces a stable identifier in the form `PDXXYYZZ` (last 3 bytes of
//! the 6-byte MAC in uppercase hex). The backend may later assign its
//! own device ID, which then takes precedence (see
//! [`resolve`]); the MAC-derived form is the out-of-box default and the
//! BLE advertising local name. At 8 ASCII bytes it fits the advertising
//! payload alongside the 128-bit service UUID record.

use crate::app::ports::ConfigStore;
use crate::config::keys;

/// Fixed-size device ID string.
pub type DeviceIdString = heapless::String<16>;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// Derive the default device ID from the last 3 MAC bytes.
pub fn derived_id(mac: &MacAddress) -> DeviceIdString {
    let mut id = DeviceIdString::new();
    use core::fmt::Write;
    let _ = write!(id, "PD{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5]);
    id
}

/// The node's effective identity: the backend-assigned ID from the
/// store when present, the MAC-derived one otherwise.
pub fn resolve(store: &impl ConfigStore) -> String {
    match store.get(keys::DEVICE_ID) {
        Some(id) if !id.is_empty() => id,
        _ => derived_id(&read_mac()).as_str().to_string(),
    }
}
