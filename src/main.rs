//! PlantDaddy Node Firmware — Main Entry Point
//!
//! Boot flow:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ boot → load config + identity from NVS                  │
//! │   ├─ credentials stored and WiFi joins                  │
//! │   │     → sample sensors → upload telemetry → deep sleep│
//! │   └─ no credentials / join failed                       │
//! │         → BLE provisioning service until a central      │
//! │           commits credentials → restart                 │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The provisioning loop drains the serialized radio event queue into
//! the state machine; the machine answers with a restart directive
//! once credentials are committed, and the loop pulls the reset line.

use anyhow::{anyhow, Result};
use core::time::Duration;
use log::{info, warn};

use plantdaddy::adapters::ble::BlePeripheral;
use plantdaddy::adapters::device_id;
use plantdaddy::adapters::nvs::NvsConfigStore;
use plantdaddy::adapters::reset::SystemReset;
use plantdaddy::adapters::wifi::WifiConnector;
use plantdaddy::app::events::Directive;
use plantdaddy::app::ports::{ConfigStore, DeviceReset, NetworkConnector};
use plantdaddy::app::service::ProvisioningService;
use plantdaddy::config::{keys, NodeConfig};
use plantdaddy::events::RADIO_EVENTS;
use plantdaddy::power::{self, SleepSchedule};
use plantdaddy::sensors::SensorSuite;
use plantdaddy::telemetry::{self, SessionReport, TelemetryClient};

fn main() -> Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("PlantDaddy node v{}", env!("CARGO_PKG_VERSION"));

    // ── Storage + identity ────────────────────────────────────
    let mut store = NvsConfigStore::new().map_err(|e| anyhow!("NVS init failed: {}", e))?;
    let config = store.load_node_config();
    let device_id = device_id::resolve(&store);
    info!("device id: {}", device_id);

    // ── WiFi driver ───────────────────────────────────────────
    let peripherals = esp_idf_svc::hal::peripherals::Peripherals::take()?;
    let sysloop = esp_idf_svc::eventloop::EspSystemEventLoop::take()?;
    let nvs_partition = esp_idf_svc::nvs::EspDefaultNvsPartition::take()?;
    let driver =
        esp_idf_svc::wifi::EspWifi::new(peripherals.modem, sysloop, Some(nvs_partition))?;
    let mut wifi = WifiConnector::new(driver);

    let timeout = Duration::from_secs(config.connect_timeout_secs as u64);
    let credentials = store.get(keys::SSID).zip(store.get(keys::PASSWORD));

    // ── Normal duty cycle when the network is reachable ───────
    if let Some((ssid, password)) = credentials {
        match wifi.connect(&ssid, &password, timeout) {
            Ok(()) => return sampling_cycle(&mut store, &config, &device_id),
            Err(e) => warn!("stored credentials failed ({}), entering provisioning", e),
        }
    } else {
        info!("no stored credentials, entering provisioning");
    }

    // ── Provisioning mode ─────────────────────────────────────
    run_provisioning(&device_id, timeout, wifi, store)
}

/// One sample → upload → deep sleep pass. Does not return: the device
/// sleeps and the next wake starts over from `main`.
fn sampling_cycle(store: &mut NvsConfigStore, config: &NodeConfig, device_id: &str) -> Result<()> {
    let mut backend = TelemetryClient::new(&config.backend_url);

    let session_id = match store.get(keys::SESSION_ID) {
        Some(s) if !s.is_empty() => s,
        _ => match backend.authenticate(device_id) {
            Ok(granted) => {
                if let Err(e) = store.set(keys::SESSION_ID, &granted) {
                    warn!("failed to persist session id: {}", e);
                }
                granted
            }
            Err(e) => {
                warn!("device auth failed ({}), skipping upload this cycle", e);
                String::new()
            }
        },
    };

    let mut sensors = SensorSuite::new(store);
    match sensors.sample(store) {
        Ok(sample) => {
            info!(
                "T={}°C RH={}% soil={:.1}% light={:.1}%",
                sample.temperature_c,
                sample.humidity_pct,
                sample.soil_moisture_pct,
                sample.light_pct
            );
            if !session_id.is_empty() {
                let counter = telemetry::next_usage_counter(store);
                let report = SessionReport::from_sample(&session_id, counter, &sample);
                if let Err(e) = backend.upload(&report) {
                    warn!("upload failed ({}), sample dropped", e);
                }
            }
        }
        Err(e) => warn!("sensor read failed: {}", e),
    }

    power::wind_down(SleepSchedule::from_config(config));
}

/// Advertise and serve the provisioning GATT service until a central
/// delivers working credentials; the commit restarts the device.
fn run_provisioning(
    device_name: &str,
    timeout: Duration,
    mut wifi: WifiConnector,
    mut store: NvsConfigStore,
) -> Result<()> {
    let mut ble = BlePeripheral::new(device_name);
    ble.start().map_err(|e| anyhow!("advertising setup failed: {}", e))?;

    let mut service = ProvisioningService::new(timeout);
    let mut reset = SystemReset::new();

    info!("provisioning service live, waiting for a companion app");
    loop {
        while let Some(event) = RADIO_EVENTS.pop() {
            let directive = service.handle_event(event, &mut ble, &mut wifi, &mut store);
            if directive == Directive::Restart {
                reset.restart();
            }
        }
        esp_idf_svc::hal::delay::FreeRtos::delay_ms(100);
    }
}
