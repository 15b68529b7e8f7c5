//! Adapters — concrete implementations of the port traits.
//!
//! | Adapter     | Implements       | Connects to               |
//! |-------------|------------------|---------------------------|
//! | `ble`       | RadioLink        | Bluedroid GATT server     |
//! | `wifi`      | NetworkConnector | ESP-IDF WiFi STA          |
//! | `nvs`       | ConfigStore      | NVS / in-memory store     |
//! | `reset`     | DeviceReset      | `esp_restart` / recorder  |
//! | `device_id` | —                | eFuse MAC                 |

pub mod ble;
pub mod device_id;
pub mod nvs;
pub mod reset;
pub mod wifi;
