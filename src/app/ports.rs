//! Port traits — the boundary between the provisioning core and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ ProvisioningService (domain)
//! ```
//!
//! Driven adapters (radio, WiFi driver, NVS, reset line) implement
//! these traits. The domain core consumes them via generics, so the
//! state machine never touches hardware directly and runs unmodified
//! under test mocks.

use core::fmt;
use core::time::Duration;

use crate::ble::registry::ConnectionHandle;

// ───────────────────────────────────────────────────────────────
// Config store (domain ↔ persistent key-value storage)
// ───────────────────────────────────────────────────────────────

/// Persistent string key-value store.
///
/// `set` persists synchronously — when it returns `Ok` the value has
/// been committed, which is what makes the restart after a successful
/// provisioning commit safe.
pub trait ConfigStore {
    /// Read a value. `None` when the key has never been written.
    fn get(&self, key: &str) -> Option<String>;

    /// Write and commit a value.
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a key. `Ok` even if the key did not exist.
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

/// Errors from [`ConfigStore`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Storage partition is full.
    Full,
    /// Generic I/O error from the storage backend.
    IoError,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "storage I/O error"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Network connector (domain → WiFi association)
// ───────────────────────────────────────────────────────────────

/// One-shot WiFi association attempt.
pub trait NetworkConnector {
    /// Try to join `ssid` with `password`, waiting at most `timeout`.
    ///
    /// Implementations must enforce the deadline against a monotonic
    /// clock and return [`ConnectError::Timeout`] on expiry — never
    /// block past it.
    fn connect(
        &mut self,
        ssid: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<(), ConnectError>;
}

/// Why an association attempt did not produce a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectError {
    /// The access point rejected or never completed the association.
    AssociationFailed,
    /// The deadline expired before the link came up.
    Timeout,
    /// The radio or driver itself faulted (not a credential problem).
    Transport(&'static str),
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AssociationFailed => write!(f, "association failed"),
            Self::Timeout => write!(f, "association timed out"),
            Self::Transport(msg) => write!(f, "transport fault: {}", msg),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Radio link (domain → GATT notify / advertising)
// ───────────────────────────────────────────────────────────────

/// Outbound radio operations the state machine commands.
pub trait RadioLink {
    /// Send a notification to one central. Best-effort: a handle that
    /// disconnected since the registry snapshot is silently skipped so
    /// the remaining fan-out proceeds.
    fn notify(&mut self, handle: ConnectionHandle, payload: &[u8]);

    /// Re-arm advertising. Required after every disconnect — the radio
    /// stops advertising once a central links.
    fn restart_advertising(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Device reset (host process → hardware restart)
// ───────────────────────────────────────────────────────────────

/// Irreversible restart primitive.
///
/// The state machine never calls this itself — it returns a restart
/// directive and the host loop invokes the reset, keeping the core
/// pure and restartable under test.
pub trait DeviceReset {
    /// Restart the device. On hardware this does not return.
    fn restart(&mut self);
}
