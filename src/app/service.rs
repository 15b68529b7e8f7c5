//! Provisioning state machine — the domain core.
//!
//! Consumes [`RadioEvent`]s one at a time, accumulates credential bytes
//! across writes, and drives the association/commit sequence:
//!
//! ```text
//!            connect/disconnect
//!               ┌─────────┐
//!               ▼         │
//!  ┌──────┐  write   ┌──────────────┐  full JSON   ┌────────────┐
//!  │ Idle │ ───────▶ │ Accumulating │ ───────────▶ │ Attempting │
//!  └──────┘          └──────────────┘              └────────────┘
//!     ▲                    ▲      parse failed │      │       │
//!     │                    └──────────────────┘       │ ok    │ failed
//!     │                                               ▼       ▼
//!     │ restart                                  commit +   notify and
//!     └───────────────────────────────────────── notify     keep listening
//! ```
//!
//! The credential buffer is a single accumulator shared by all centrals
//! and surviving connect/disconnect cycles; it is cleared whenever the
//! accumulated text parses as JSON (credentials or not), which bounds
//! its growth. Only a committed attempt ends the machine — everything
//! else loops back to listening.
//!
//! The association attempt runs inline and blocks event processing for
//! up to the connect timeout. That head-of-line blocking is deliberate:
//! no further writes are handled until the attempt resolves, and a
//! pending attempt cannot be cancelled by a later write.

use core::time::Duration;

use log::{info, warn};
use serde::Deserialize;
use serde_json::error::Category;

use crate::ble::registry::ConnectionRegistry;
use crate::config::keys;

use super::events::{Directive, ProvisioningResult, RadioEvent};
use super::ports::{ConfigStore, ConnectError, NetworkConnector, RadioLink};

/// Listening states. The association attempt is transient — it runs to
/// completion inside a single event, so it never appears here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing buffered.
    Idle,
    /// Partial credential text buffered, waiting for more writes.
    Accumulating,
}

#[derive(Debug, Deserialize)]
struct Credential {
    ssid: String,
    password: String,
}

/// The provisioning domain service.
pub struct ProvisioningService {
    registry: ConnectionRegistry,
    buffer: String,
    phase: Phase,
    connect_timeout: Duration,
}

impl ProvisioningService {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            buffer: String::new(),
            phase: Phase::Idle,
            connect_timeout,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Bytes currently buffered (partial credential text).
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one radio event through the machine.
    ///
    /// All events must arrive on one logical execution context — the
    /// machine holds no locks of its own.
    pub fn handle_event(
        &mut self,
        event: RadioEvent,
        radio: &mut impl RadioLink,
        network: &mut impl NetworkConnector,
        store: &mut impl ConfigStore,
    ) -> Directive {
        match event {
            RadioEvent::Connected(handle) => {
                info!("central connected (handle={})", handle);
                self.registry.add(handle);
                Directive::Continue
            }
            RadioEvent::Disconnected(handle) => {
                info!("central disconnected (handle={})", handle);
                self.registry.remove(handle);
                // The radio stops advertising once linked; re-arm so the
                // next central can find the node.
                radio.restart_advertising();
                Directive::Continue
            }
            RadioEvent::Written(handle, chunk) => self.on_write(handle, &chunk, radio, network, store),
        }
    }

    fn on_write(
        &mut self,
        handle: u16,
        chunk: &[u8],
        radio: &mut impl RadioLink,
        network: &mut impl NetworkConnector,
        store: &mut impl ConfigStore,
    ) -> Directive {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        self.phase = Phase::Accumulating;
        info!(
            "write of {} bytes from handle {} ({} buffered)",
            chunk.len(),
            handle,
            self.buffer.len()
        );

        let credential = match serde_json::from_str::<Credential>(&self.buffer) {
            Ok(credential) => {
                self.buffer.clear();
                credential
            }
            Err(e) if matches!(e.classify(), Category::Data) => {
                // Complete JSON, but not a {ssid, password} object. The
                // buffer would otherwise grow without bound, so it is
                // cleared, and the central gets an explicit failure
                // instead of silence.
                warn!("credential payload parsed but lacks ssid/password");
                self.buffer.clear();
                self.notify_all(radio, ProvisioningResult::NotConnected);
                return Directive::Continue;
            }
            Err(_) => {
                // Not valid JSON yet — keep accumulating.
                return Directive::Continue;
            }
        };

        self.attempt(credential, radio, network, store)
    }

    fn attempt(
        &mut self,
        credential: Credential,
        radio: &mut impl RadioLink,
        network: &mut impl NetworkConnector,
        store: &mut impl ConfigStore,
    ) -> Directive {
        info!("attempting association with '{}'", credential.ssid);
        match network.connect(&credential.ssid, &credential.password, self.connect_timeout) {
            Ok(()) => self.commit(&credential, radio, store),
            Err(ConnectError::AssociationFailed) | Err(ConnectError::Timeout) => {
                warn!("association with '{}' failed", credential.ssid);
                self.notify_all(radio, ProvisioningResult::NotConnected);
                Directive::Continue
            }
            Err(ConnectError::Transport(msg)) => {
                warn!("radio fault during association: {}", msg);
                self.notify_all(radio, ProvisioningResult::TransportError);
                Directive::Continue
            }
        }
    }

    fn commit(
        &mut self,
        credential: &Credential,
        radio: &mut impl RadioLink,
        store: &mut impl ConfigStore,
    ) -> Directive {
        // The restart must only happen once both keys are committed —
        // resetting after a failed persist would lose the credentials
        // for good and strand the node unprovisioned.
        let persisted = store
            .set(keys::SSID, &credential.ssid)
            .and_then(|()| store.set(keys::PASSWORD, &credential.password));
        if let Err(e) = persisted {
            warn!("credential persist failed: {}", e);
            self.notify_all(radio, ProvisioningResult::TransportError);
            return Directive::Continue;
        }

        info!("credentials committed, restarting");
        self.notify_all(radio, ProvisioningResult::Connected);
        Directive::Restart
    }

    fn notify_all(&self, radio: &mut impl RadioLink, result: ProvisioningResult) {
        for handle in self.registry.snapshot() {
            radio.notify(handle, result.as_notify());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::StorageError;
    use std::collections::HashMap;

    // ── Mock ports ────────────────────────────────────────────

    #[derive(Default)]
    struct MockRadio {
        notifications: Vec<(u16, Vec<u8>)>,
        advert_restarts: u32,
    }

    impl RadioLink for MockRadio {
        fn notify(&mut self, handle: u16, payload: &[u8]) {
            self.notifications.push((handle, payload.to_vec()));
        }
        fn restart_advertising(&mut self) {
            self.advert_restarts += 1;
        }
    }

    #[derive(Default)]
    struct MockNetwork {
        outcome: Option<ConnectError>,
        attempts: Vec<(String, String)>,
    }

    impl MockNetwork {
        fn failing(outcome: ConnectError) -> Self {
            Self {
                outcome: Some(outcome),
                attempts: Vec::new(),
            }
        }
    }

    impl NetworkConnector for MockNetwork {
        fn connect(
            &mut self,
            ssid: &str,
            password: &str,
            _timeout: Duration,
        ) -> Result<(), ConnectError> {
            self.attempts.push((ssid.to_string(), password.to_string()));
            match self.outcome {
                None => Ok(()),
                Some(e) => Err(e),
            }
        }
    }

    #[derive(Default)]
    struct MockStore {
        values: HashMap<String, String>,
        fail_writes: bool,
    }

    impl ConfigStore for MockStore {
        fn get(&self, key: &str) -> Option<String> {
            self.values.get(key).cloned()
        }
        fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
            if self.fail_writes {
                return Err(StorageError::IoError);
            }
            self.values.insert(key.to_string(), value.to_string());
            Ok(())
        }
        fn remove(&mut self, key: &str) -> Result<(), StorageError> {
            self.values.remove(key);
            Ok(())
        }
    }

    fn service() -> ProvisioningService {
        ProvisioningService::new(Duration::from_secs(15))
    }

    const CREDENTIAL: &str = r#"{"ssid":"MyWifi","password":"secret123"}"#;

    // ── Connection lifecycle ──────────────────────────────────

    #[test]
    fn connect_and_disconnect_track_registry() {
        let mut svc = service();
        let (mut radio, mut net, mut store) =
            (MockRadio::default(), MockNetwork::default(), MockStore::default());

        assert!(!svc.registry().is_connected());
        svc.handle_event(RadioEvent::Connected(1), &mut radio, &mut net, &mut store);
        assert!(svc.registry().is_connected());
        svc.handle_event(RadioEvent::Disconnected(1), &mut radio, &mut net, &mut store);
        assert!(!svc.registry().is_connected());
    }

    #[test]
    fn disconnect_restarts_advertising() {
        let mut svc = service();
        let (mut radio, mut net, mut store) =
            (MockRadio::default(), MockNetwork::default(), MockStore::default());

        svc.handle_event(RadioEvent::Connected(1), &mut radio, &mut net, &mut store);
        assert_eq!(radio.advert_restarts, 0);
        svc.handle_event(RadioEvent::Disconnected(1), &mut radio, &mut net, &mut store);
        assert_eq!(radio.advert_restarts, 1);
    }

    #[test]
    fn disconnect_of_unknown_handle_still_rearms() {
        let mut svc = service();
        let (mut radio, mut net, mut store) =
            (MockRadio::default(), MockNetwork::default(), MockStore::default());

        svc.handle_event(RadioEvent::Disconnected(42), &mut radio, &mut net, &mut store);
        assert_eq!(radio.advert_restarts, 1);
    }

    // ── Accumulation ──────────────────────────────────────────

    #[test]
    fn partial_json_keeps_accumulating() {
        let mut svc = service();
        let (mut radio, mut net, mut store) =
            (MockRadio::default(), MockNetwork::default(), MockStore::default());

        let d = svc.handle_event(
            RadioEvent::Written(1, br#"{"ssid":"Net""#.to_vec()),
            &mut radio,
            &mut net,
            &mut store,
        );
        assert_eq!(d, Directive::Continue);
        assert_eq!(svc.phase(), Phase::Accumulating);
        assert!(svc.buffered_len() > 0);
        assert!(net.attempts.is_empty());
    }

    #[test]
    fn two_chunks_complete_one_attempt() {
        let mut svc = service();
        let (mut radio, mut store) = (MockRadio::default(), MockStore::default());
        let mut net = MockNetwork::failing(ConnectError::AssociationFailed);

        svc.handle_event(
            RadioEvent::Written(1, br#"{"ssid":"Net""#.to_vec()),
            &mut radio,
            &mut net,
            &mut store,
        );
        svc.handle_event(
            RadioEvent::Written(1, br#","password":"pw"}"#.to_vec()),
            &mut radio,
            &mut net,
            &mut store,
        );

        assert_eq!(net.attempts, vec![("Net".to_string(), "pw".to_string())]);
        assert_eq!(svc.buffered_len(), 0);
    }

    #[test]
    fn buffer_survives_disconnect_between_chunks() {
        let mut svc = service();
        let (mut radio, mut store) = (MockRadio::default(), MockStore::default());
        let mut net = MockNetwork::failing(ConnectError::AssociationFailed);

        svc.handle_event(RadioEvent::Connected(1), &mut radio, &mut net, &mut store);
        svc.handle_event(
            RadioEvent::Written(1, br#"{"ssid":"Net""#.to_vec()),
            &mut radio,
            &mut net,
            &mut store,
        );
        svc.handle_event(RadioEvent::Disconnected(1), &mut radio, &mut net, &mut store);
        svc.handle_event(RadioEvent::Connected(2), &mut radio, &mut net, &mut store);
        svc.handle_event(
            RadioEvent::Written(2, br#","password":"pw"}"#.to_vec()),
            &mut radio,
            &mut net,
            &mut store,
        );

        assert_eq!(net.attempts.len(), 1);
    }

    #[test]
    fn json_without_credentials_clears_and_notifies() {
        let mut svc = service();
        let (mut radio, mut net, mut store) =
            (MockRadio::default(), MockNetwork::default(), MockStore::default());

        svc.handle_event(RadioEvent::Connected(1), &mut radio, &mut net, &mut store);
        let d = svc.handle_event(
            RadioEvent::Written(1, br#"{"hello":"world"}"#.to_vec()),
            &mut radio,
            &mut net,
            &mut store,
        );

        assert_eq!(d, Directive::Continue);
        assert_eq!(svc.buffered_len(), 0);
        assert!(net.attempts.is_empty());
        assert_eq!(radio.notifications, vec![(1, b"NO CONNECT".to_vec())]);
    }

    // ── Association outcomes ──────────────────────────────────

    #[test]
    fn successful_attempt_commits_notifies_and_restarts() {
        let mut svc = service();
        let (mut radio, mut net, mut store) =
            (MockRadio::default(), MockNetwork::default(), MockStore::default());

        svc.handle_event(RadioEvent::Connected(1), &mut radio, &mut net, &mut store);
        svc.handle_event(RadioEvent::Connected(2), &mut radio, &mut net, &mut store);
        let d = svc.handle_event(
            RadioEvent::Written(1, CREDENTIAL.as_bytes().to_vec()),
            &mut radio,
            &mut net,
            &mut store,
        );

        assert_eq!(d, Directive::Restart);
        assert_eq!(store.get(keys::SSID).as_deref(), Some("MyWifi"));
        assert_eq!(store.get(keys::PASSWORD).as_deref(), Some("secret123"));
        // One CONNECT per registered central.
        assert_eq!(
            radio.notifications,
            vec![(1, b"CONNECT".to_vec()), (2, b"CONNECT".to_vec())]
        );
    }

    #[test]
    fn failed_association_notifies_no_connect_and_persists_nothing() {
        let mut svc = service();
        let (mut radio, mut store) = (MockRadio::default(), MockStore::default());
        let mut net = MockNetwork::failing(ConnectError::Timeout);

        svc.handle_event(RadioEvent::Connected(1), &mut radio, &mut net, &mut store);
        let d = svc.handle_event(
            RadioEvent::Written(1, CREDENTIAL.as_bytes().to_vec()),
            &mut radio,
            &mut net,
            &mut store,
        );

        assert_eq!(d, Directive::Continue);
        assert!(store.values.is_empty());
        assert_eq!(radio.notifications, vec![(1, b"NO CONNECT".to_vec())]);
    }

    #[test]
    fn transport_fault_notifies_os_error() {
        let mut svc = service();
        let (mut radio, mut store) = (MockRadio::default(), MockStore::default());
        let mut net = MockNetwork::failing(ConnectError::Transport("driver reset"));

        svc.handle_event(RadioEvent::Connected(1), &mut radio, &mut net, &mut store);
        let d = svc.handle_event(
            RadioEvent::Written(1, CREDENTIAL.as_bytes().to_vec()),
            &mut radio,
            &mut net,
            &mut store,
        );

        assert_eq!(d, Directive::Continue);
        assert_eq!(radio.notifications, vec![(1, b"OS ERROR".to_vec())]);
    }

    #[test]
    fn persist_failure_aborts_before_restart() {
        let mut svc = service();
        let (mut radio, mut net) = (MockRadio::default(), MockNetwork::default());
        let mut store = MockStore {
            fail_writes: true,
            ..Default::default()
        };

        svc.handle_event(RadioEvent::Connected(1), &mut radio, &mut net, &mut store);
        let d = svc.handle_event(
            RadioEvent::Written(1, CREDENTIAL.as_bytes().to_vec()),
            &mut radio,
            &mut net,
            &mut store,
        );

        assert_eq!(d, Directive::Continue);
        assert_eq!(radio.notifications, vec![(1, b"OS ERROR".to_vec())]);
    }

    #[test]
    fn failed_attempt_allows_retry() {
        let mut svc = service();
        let (mut radio, mut store) = (MockRadio::default(), MockStore::default());
        let mut net = MockNetwork::failing(ConnectError::AssociationFailed);

        svc.handle_event(RadioEvent::Connected(1), &mut radio, &mut net, &mut store);
        svc.handle_event(
            RadioEvent::Written(1, CREDENTIAL.as_bytes().to_vec()),
            &mut radio,
            &mut net,
            &mut store,
        );

        // Second attempt with a working network succeeds.
        net.outcome = None;
        let d = svc.handle_event(
            RadioEvent::Written(1, CREDENTIAL.as_bytes().to_vec()),
            &mut radio,
            &mut net,
            &mut store,
        );
        assert_eq!(d, Directive::Restart);
        assert_eq!(net.attempts.len(), 2);
    }

    #[test]
    fn invalid_utf8_chunk_does_not_fault() {
        let mut svc = service();
        let (mut radio, mut net, mut store) =
            (MockRadio::default(), MockNetwork::default(), MockStore::default());

        let d = svc.handle_event(
            RadioEvent::Written(1, vec![0xFF, 0xFE, 0x80]),
            &mut radio,
            &mut net,
            &mut store,
        );
        assert_eq!(d, Directive::Continue);
        assert!(net.attempts.is_empty());
    }
}
