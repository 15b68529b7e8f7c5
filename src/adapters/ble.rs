//! BLE GATT peripheral adapter.
//!
//! Hosts the provisioning GATT service: one primary service carrying a
//! write-only RX characteristic (credential chunks in) and a
//! read+notify TX characteristic (status out), and drives advertising.
//! Implements [`RadioLink`] so the provisioning machine can notify
//! centrals and re-arm advertising without knowing about Bluedroid.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid GATT server via raw
//!   `esp_idf_svc::sys` calls; callbacks push [`RadioEvent`]s onto the
//!   global queue.
//! - **all other targets**: simulation stub that records notifications
//!   and advertising restarts for host-side tests.
//!
//! ## GATT layout
//!
//! | Attribute | UUID                                   | Perms        |
//! |-----------|----------------------------------------|--------------|
//! | Service   | `5f7937b4-039f-11ec-9a03-0242ac130003` | —            |
//! | RX        | same as service                        | Write        |
//! | TX        | same as service                        | Read+Notify  |
//!
//! The companion app looks the characteristics up by the service UUID
//! itself, which is why all three attributes share one value.

use log::{info, warn};

use crate::app::ports::RadioLink;
use crate::ble::advertising::{self, AdvFlags, AdvertisingError, ServiceUuid};
use crate::ble::registry::ConnectionHandle;
use crate::ble::PROVISIONING_UUID;

/// Advertising interval, microseconds.
pub const ADV_INTERVAL_US: u32 = 100_000;

// ── ESP-IDF static state ──────────────────────────────────────
//
// Bluedroid callbacks are C function pointers that cannot capture Rust
// state. These atomics bridge the callback context to the adapter; the
// event payloads themselves go through `events::RADIO_EVENTS`.

#[cfg(target_os = "espidf")]
use core::sync::atomic::{AtomicU32, Ordering};

#[cfg(target_os = "espidf")]
static BLE_GATTS_IF: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_SVC_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_RX_CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_TX_CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_CHAR_STEP: AtomicU32 = AtomicU32::new(0);

#[cfg(target_os = "espidf")]
fn uuid128_to_esp(uuid: u128) -> esp_idf_svc::sys::esp_bt_uuid_t {
    let mut t: esp_idf_svc::sys::esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 16;
    unsafe {
        t.uuid.uuid128 = uuid.to_le_bytes();
    }
    t
}

#[cfg(target_os = "espidf")]
fn adv_params() -> esp_idf_svc::sys::esp_ble_adv_params_t {
    use esp_idf_svc::sys::*;
    // Advertising interval is in 625 µs units.
    let units = (ADV_INTERVAL_US / 625) as u16;
    esp_ble_adv_params_t {
        adv_int_min: units,
        adv_int_max: units,
        adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
        own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
        channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
        adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
        ..unsafe { core::mem::zeroed() }
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gap_event_handler(
    event: esp_idf_svc::sys::esp_gap_ble_cb_event_t,
    _param: *mut esp_idf_svc::sys::esp_ble_gap_cb_param_t,
) {
    use esp_idf_svc::sys::*;
    match event {
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
            info!("BLE GAP: advertising started");
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_STOP_COMPLETE_EVT => {
            info!("BLE GAP: advertising stopped");
        }
        _ => {}
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gatts_event_handler(
    event: esp_idf_svc::sys::esp_gatts_cb_event_t,
    gatts_if: esp_idf_svc::sys::esp_gatt_if_t,
    param: *mut esp_idf_svc::sys::esp_ble_gatts_cb_param_t,
) {
    use crate::app::events::RadioEvent;
    use crate::events::RADIO_EVENTS;
    use esp_idf_svc::sys::*;

    BLE_GATTS_IF.store(gatts_if as u32, Ordering::Relaxed);

    match event {
        esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
            info!("BLE GATTS: app registered (if={})", gatts_if);
            let mut svc_id = esp_gatt_srvc_id_t {
                id: esp_gatt_id_t {
                    uuid: uuid128_to_esp(PROVISIONING_UUID),
                    inst_id: 0,
                },
                is_primary: true,
            };
            unsafe {
                esp_ble_gatts_create_service(gatts_if, &mut svc_id, 8);
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
            let p = unsafe { &(*param).create };
            let svc_handle = p.service_handle;
            BLE_SVC_HANDLE.store(svc_handle as u32, Ordering::Relaxed);
            info!("BLE GATTS: service created (handle={})", svc_handle);
            unsafe {
                esp_ble_gatts_start_service(svc_handle);
            }
            BLE_CHAR_STEP.store(1, Ordering::Relaxed);
            let mut rx_uuid = uuid128_to_esp(PROVISIONING_UUID);
            unsafe {
                esp_ble_gatts_add_char(
                    svc_handle,
                    &mut rx_uuid,
                    ESP_GATT_PERM_WRITE as esp_gatt_perm_t,
                    ESP_GATT_CHAR_PROP_BIT_WRITE as esp_gatt_char_prop_t,
                    core::ptr::null_mut(),
                    core::ptr::null_mut(),
                );
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
            let p = unsafe { &(*param).add_char };
            let handle = p.attr_handle;
            match BLE_CHAR_STEP.load(Ordering::Relaxed) {
                1 => {
                    BLE_RX_CHAR_HANDLE.store(handle as u32, Ordering::Relaxed);
                    info!("BLE GATTS: RX char (handle={})", handle);
                    BLE_CHAR_STEP.store(2, Ordering::Relaxed);
                    let svc_handle = BLE_SVC_HANDLE.load(Ordering::Relaxed) as u16;
                    let mut tx_uuid = uuid128_to_esp(PROVISIONING_UUID);
                    unsafe {
                        esp_ble_gatts_add_char(
                            svc_handle,
                            &mut tx_uuid,
                            ESP_GATT_PERM_READ as esp_gatt_perm_t,
                            (ESP_GATT_CHAR_PROP_BIT_READ | ESP_GATT_CHAR_PROP_BIT_NOTIFY)
                                as esp_gatt_char_prop_t,
                            core::ptr::null_mut(),
                            core::ptr::null_mut(),
                        );
                    }
                }
                2 => {
                    BLE_TX_CHAR_HANDLE.store(handle as u32, Ordering::Relaxed);
                    BLE_CHAR_STEP.store(3, Ordering::Relaxed);
                    info!("BLE GATTS: TX char (handle={}) — service ready", handle);
                }
                _ => {}
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
            let p = unsafe { &(*param).connect };
            info!("BLE GATTS: central connected (conn_id={})", p.conn_id);
            RADIO_EVENTS.push(RadioEvent::Connected(p.conn_id));
        }
        esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
            let p = unsafe { &(*param).disconnect };
            info!("BLE GATTS: central disconnected (conn_id={})", p.conn_id);
            // Re-arming advertising is the state machine's call; it
            // arrives back through RadioLink::restart_advertising.
            RADIO_EVENTS.push(RadioEvent::Disconnected(p.conn_id));
        }
        esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
            let p = unsafe { &(*param).write };
            if p.is_prep {
                // Long-write prepare phases are not part of the
                // provisioning protocol; the app sends plain writes.
                return;
            }
            if p.handle as u32 != BLE_RX_CHAR_HANDLE.load(Ordering::Relaxed) {
                return;
            }
            let data = unsafe { core::slice::from_raw_parts(p.value, p.len as usize) };
            RADIO_EVENTS.push(RadioEvent::Written(p.conn_id, data.to_vec()));
        }
        _ => {}
    }
}

// ───────────────────────────────────────────────────────────────
// Peripheral
// ───────────────────────────────────────────────────────────────

/// The provisioning GATT peripheral.
pub struct BlePeripheral {
    device_name: heapless::String<24>,
    active: bool,
    #[cfg(not(target_os = "espidf"))]
    sim_notifications: Vec<(ConnectionHandle, Vec<u8>)>,
    #[cfg(not(target_os = "espidf"))]
    sim_advert_restarts: u32,
}

impl BlePeripheral {
    pub fn new(device_name: &str) -> Self {
        // Longer identifiers are cut to the heapless capacity; the
        // advertising builder re-checks the 31-byte budget anyway.
        let mut name = heapless::String::new();
        for ch in device_name.chars() {
            if name.push(ch).is_err() {
                break;
            }
        }
        Self {
            device_name: name,
            active: false,
            #[cfg(not(target_os = "espidf"))]
            sim_notifications: Vec::new(),
            #[cfg(not(target_os = "espidf"))]
            sim_advert_restarts: 0,
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Compute the advertising payload for this peripheral: local name
    /// plus the provisioning service UUID. A backend-assigned device
    /// name can push the pair past the 31-byte budget; the service list
    /// is then dropped in favour of the name the companion app scans
    /// for.
    pub fn advertising_payload(&self) -> Result<Vec<u8>, AdvertisingError> {
        let flags = AdvFlags::default();
        let uuid = ServiceUuid::from_u128(PROVISIONING_UUID);
        match advertising::build(flags, Some(&self.device_name), &[uuid], None) {
            Ok(payload) => Ok(payload),
            Err(AdvertisingError::PayloadTooLong { len }) => {
                warn!(
                    "advertising name '{}' + service UUID is {} bytes, dropping UUID record",
                    self.device_name, len
                );
                advertising::build(flags, Some(&self.device_name), &[], None)
            }
        }
    }

    /// Bring up the radio, register the GATT service and start
    /// advertising.
    pub fn start(&mut self) -> Result<(), AdvertisingError> {
        let payload = self.advertising_payload()?;
        info!(
            "BLE: starting provisioning service as '{}' ({} byte payload)",
            self.device_name,
            payload.len()
        );
        self.platform_start(&payload);
        self.active = true;
        Ok(())
    }

    /// Tear the radio down.
    pub fn stop(&mut self) {
        self.platform_stop();
        self.active = false;
        info!("BLE: stopped");
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start(&mut self, payload: &[u8]) {
        use esp_idf_svc::sys::*;
        unsafe {
            // Release classic BT memory; this node is LE-only.
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();
            if esp_bt_controller_init(&mut bt_cfg) != ESP_OK {
                warn!("BLE: controller init failed");
                return;
            }
            if esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE) != ESP_OK {
                warn!("BLE: controller enable failed");
                return;
            }
            if esp_bluedroid_init() != ESP_OK || esp_bluedroid_enable() != ESP_OK {
                warn!("BLE: bluedroid bring-up failed");
                return;
            }

            esp_ble_gap_register_callback(Some(ble_gap_event_handler));
            esp_ble_gatts_register_callback(Some(ble_gatts_event_handler));
            esp_ble_gatts_app_register(0);

            let name = self.device_name.as_bytes();
            esp_ble_gap_set_device_name(name.as_ptr() as *const _);

            // Bluedroid copies the raw payload, so a stack buffer is fine.
            esp_ble_gap_config_adv_data_raw(payload.as_ptr() as *mut u8, payload.len() as u32);

            let mut params = adv_params();
            esp_ble_gap_start_advertising(&mut params);
        }
        info!("BLE(espidf): advertising every {} µs", ADV_INTERVAL_US);
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&mut self, payload: &[u8]) {
        info!(
            "BLE(sim): advertising '{}' ({} bytes, every {} µs)",
            self.device_name,
            payload.len(),
            ADV_INTERVAL_US
        );
    }

    #[cfg(target_os = "espidf")]
    fn platform_stop(&mut self) {
        use esp_idf_svc::sys::*;
        unsafe {
            esp_ble_gap_stop_advertising();
            esp_bluedroid_disable();
            esp_bluedroid_deinit();
            esp_bt_controller_disable();
            esp_bt_controller_deinit();
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_stop(&mut self) {}

    // ── Simulation inspection (host tests) ────────────────────

    /// Notifications sent so far, in order.
    #[cfg(not(target_os = "espidf"))]
    pub fn notifications(&self) -> &[(ConnectionHandle, Vec<u8>)] {
        &self.sim_notifications
    }

    /// How many times advertising was re-armed.
    #[cfg(not(target_os = "espidf"))]
    pub fn advert_restarts(&self) -> u32 {
        self.sim_advert_restarts
    }
}

impl RadioLink for BlePeripheral {
    #[cfg(target_os = "espidf")]
    fn notify(&mut self, handle: ConnectionHandle, payload: &[u8]) {
        use esp_idf_svc::sys::*;
        let tx = BLE_TX_CHAR_HANDLE.load(Ordering::Relaxed);
        if tx == 0 {
            return;
        }
        // Best-effort: a stale handle makes the stack return an error,
        // which is ignored so the rest of the fan-out continues.
        unsafe {
            esp_ble_gatts_send_indicate(
                BLE_GATTS_IF.load(Ordering::Relaxed) as u8,
                handle,
                tx as u16,
                payload.len() as u16,
                payload.as_ptr() as *mut u8,
                false,
            );
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn notify(&mut self, handle: ConnectionHandle, payload: &[u8]) {
        self.sim_notifications.push((handle, payload.to_vec()));
    }

    #[cfg(target_os = "espidf")]
    fn restart_advertising(&mut self) {
        let mut params = adv_params();
        unsafe {
            esp_idf_svc::sys::esp_ble_gap_start_advertising(&mut params);
        }
        info!("BLE: advertising re-armed");
    }

    #[cfg(not(target_os = "espidf"))]
    fn restart_advertising(&mut self) {
        self.sim_advert_restarts += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::events::ProvisioningResult;
    use crate::ble::advertising::{decode_name, decode_services};

    #[test]
    fn start_stop_lifecycle() {
        let mut ble = BlePeripheral::new("PDEFCAFE");
        assert!(!ble.is_active());
        ble.start().unwrap();
        assert!(ble.is_active());
        ble.stop();
        assert!(!ble.is_active());
    }

    #[test]
    fn payload_carries_name_and_service() {
        let ble = BlePeripheral::new("PDEFCAFE");
        let payload = ble.advertising_payload().unwrap();
        assert_eq!(decode_name(&payload), "PDEFCAFE");
        assert_eq!(
            decode_services(&payload),
            vec![ServiceUuid::from_u128(PROVISIONING_UUID)]
        );
    }

    #[test]
    fn long_name_drops_service_record_not_the_name() {
        let ble = BlePeripheral::new("greenhouse-east-bench");
        let payload = ble.advertising_payload().unwrap();
        assert_eq!(decode_name(&payload), "greenhouse-east-bench");
        assert!(decode_services(&payload).is_empty());
        assert!(payload.len() <= crate::ble::advertising::ADV_MAX_LEN);
    }

    #[test]
    fn notify_is_recorded_in_simulation() {
        let mut ble = BlePeripheral::new("PDEFCAFE");
        ble.notify(3, ProvisioningResult::Connected.as_notify());
        assert_eq!(ble.notifications(), &[(3, b"CONNECT".to_vec())]);
    }

    #[test]
    fn restart_advertising_counts_in_simulation() {
        let mut ble = BlePeripheral::new("PDEFCAFE");
        ble.restart_advertising();
        ble.restart_advertising();
        assert_eq!(ble.advert_restarts(), 2);
    }
}
