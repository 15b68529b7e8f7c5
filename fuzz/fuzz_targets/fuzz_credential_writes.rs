//! Fuzz target: provisioning machine under arbitrary write chunks.
//!
//! Splits the fuzz input into GATT-sized writes and pumps them through
//! the state machine with simulation adapters. The machine must never
//! panic and never start an association attempt unless the bytes
//! really formed a credential object.
//!
//! cargo fuzz run fuzz_credential_writes

#![no_main]

use core::time::Duration;

use libfuzzer_sys::fuzz_target;
use plantdaddy::adapters::ble::BlePeripheral;
use plantdaddy::adapters::nvs::NvsConfigStore;
use plantdaddy::adapters::wifi::WifiConnector;
use plantdaddy::app::events::RadioEvent;
use plantdaddy::app::service::ProvisioningService;

fuzz_target!(|data: &[u8]| {
    let mut service = ProvisioningService::new(Duration::from_secs(15));
    let mut ble = BlePeripheral::new("PDEFCAFE");
    let mut wifi = WifiConnector::new();
    let Ok(mut store) = NvsConfigStore::new() else {
        return;
    };

    service.handle_event(RadioEvent::Connected(1), &mut ble, &mut wifi, &mut store);
    for chunk in data.chunks(20) {
        service.handle_event(
            RadioEvent::Written(1, chunk.to_vec()),
            &mut ble,
            &mut wifi,
            &mut store,
        );
    }
    service.handle_event(RadioEvent::Disconnected(1), &mut ble, &mut wifi, &mut store);
});
