//! Property tests for the advertising codec and the credential
//! accumulation protocol.
//!
//! Runs on host only — proptest is not available for ESP32 targets.

#![cfg(not(target_os = "espidf"))]

use core::time::Duration;

use proptest::prelude::*;

use plantdaddy::adapters::ble::BlePeripheral;
use plantdaddy::adapters::nvs::NvsConfigStore;
use plantdaddy::adapters::wifi::WifiConnector;
use plantdaddy::app::events::RadioEvent;
use plantdaddy::app::service::ProvisioningService;
use plantdaddy::ble::advertising::{
    build, decode_field, decode_name, decode_services, AdType, AdvFlags, ServiceUuid,
};

// ── Advertising codec ─────────────────────────────────────────

// Decoding yields 16-bit lists before 32-bit ones, so the generated
// set is ordered the same way to make the round trip comparable.
fn arb_services() -> impl Strategy<Value = Vec<ServiceUuid>> {
    (
        proptest::collection::vec(any::<u16>().prop_map(ServiceUuid::Uuid16), 0..3),
        proptest::collection::vec(any::<u32>().prop_map(ServiceUuid::Uuid32), 0..3),
    )
        .prop_map(|(mut u16s, u32s)| {
            u16s.extend(u32s);
            u16s
        })
}

proptest! {
    /// Any payload that builds within the 31-byte budget decodes back
    /// to the same name and service set.
    #[test]
    fn codec_round_trip(
        name in "[a-zA-Z0-9_-]{1,8}",
        services in arb_services(),
    ) {
        if let Ok(payload) = build(AdvFlags::default(), Some(&name), &services, None) {
            prop_assert!(payload.len() <= 31);
            prop_assert_eq!(decode_name(&payload), name);
            prop_assert_eq!(decode_services(&payload), services);
        }
    }

    /// The record scanner never reads past the payload end, whatever
    /// bytes it is handed.
    #[test]
    fn decoder_never_panics(payload in proptest::collection::vec(any::<u8>(), 0..64)) {
        let _ = decode_name(&payload);
        let _ = decode_services(&payload);
        for ad_type in [AdType::Flags, AdType::CompleteLocalName, AdType::Appearance] {
            for value in decode_field(&payload, ad_type) {
                prop_assert!(value.len() < payload.len());
            }
        }
    }

    /// Oversized inputs must be rejected, never truncated.
    #[test]
    fn build_never_exceeds_budget(name in "[a-z]{0,40}") {
        match build(AdvFlags::default(), Some(&name), &[], None) {
            Ok(payload) => prop_assert!(payload.len() <= 31),
            Err(_) => prop_assert!(name.len() + 5 > 31),
        }
    }
}

// ── Credential accumulation ───────────────────────────────────

proptest! {
    /// However a valid credential payload is split into ordered write
    /// chunks, the machine attempts association exactly once.
    #[test]
    fn any_chunking_yields_one_attempt(
        splits in proptest::collection::vec(1usize..40, 0..6),
    ) {
        let credential = br#"{"ssid":"MyWifi","password":"secret123"}"#;

        let mut service = ProvisioningService::new(Duration::from_secs(15));
        let mut ble = BlePeripheral::new("PDEFCAFE");
        let mut wifi = WifiConnector::new();
        let mut store = NvsConfigStore::new().unwrap();

        service.handle_event(RadioEvent::Connected(1), &mut ble, &mut wifi, &mut store);

        // Cut the payload at the (sorted, deduplicated) split offsets.
        let mut offsets: Vec<usize> = splits
            .into_iter()
            .map(|s| s % credential.len())
            .filter(|s| *s > 0)
            .collect();
        offsets.sort_unstable();
        offsets.dedup();
        offsets.push(credential.len());

        let mut start = 0;
        for end in offsets {
            if end <= start {
                continue;
            }
            service.handle_event(
                RadioEvent::Written(1, credential[start..end].to_vec()),
                &mut ble,
                &mut wifi,
                &mut store,
            );
            start = end;
        }

        prop_assert_eq!(wifi.sim_attempts(), 1);
        prop_assert_eq!(service.buffered_len(), 0);
    }

    /// Arbitrary garbage writes never reach the network and never
    /// crash the machine.
    #[test]
    fn garbage_writes_never_attempt(
        chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..32), 0..8),
    ) {
        let mut service = ProvisioningService::new(Duration::from_secs(15));
        let mut ble = BlePeripheral::new("PDEFCAFE");
        let mut wifi = WifiConnector::new();
        let mut store = NvsConfigStore::new().unwrap();

        for chunk in chunks {
            // Skip anything that happens to be a complete credential.
            if serde_json::from_slice::<serde_json::Value>(&chunk).is_ok() {
                continue;
            }
            service.handle_event(
                RadioEvent::Written(1, chunk),
                &mut ble,
                &mut wifi,
                &mut store,
            );
        }

        prop_assert_eq!(wifi.sim_attempts(), 0);
    }
}
