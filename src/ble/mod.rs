//! Pure BLE protocol pieces: the advertising payload codec and the
//! connected-central registry. No radio calls live here — the Bluedroid
//! wiring is in `adapters::ble`.

pub mod advertising;
pub mod registry;

/// UUID of the provisioning GATT service.
///
/// The shipped companion app discovers both characteristics by this
/// same value, so the service, the write characteristic and the notify
/// characteristic all carry it. Changing any of the three breaks
/// provisioning from existing app installs.
pub const PROVISIONING_UUID: u128 = 0x5f7937b4_039f_11ec_9a03_0242ac130003;
