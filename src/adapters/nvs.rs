//! NVS-backed config store adapter.
//!
//! Implements [`ConfigStore`] — the persistent key-value store holding
//! WiFi credentials, device/session metadata and sensor calibration —
//! and load/save of the [`NodeConfig`] tunables blob (postcard-encoded
//! under a single key).
//!
//! # Persistence contract
//!
//! Every write commits before returning (`nvs_commit` on device). The
//! provisioning flow relies on this: the device only restarts after
//! `set` has returned `Ok` for both credential keys.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: ESP-IDF NVS string/blob API, one
//!   namespace for the whole node.
//! - **all other targets**: in-memory map for host-side tests.

use log::{info, warn};

use crate::app::ports::{ConfigStore, StorageError};
use crate::config::NodeConfig;

#[cfg(not(target_os = "espidf"))]
use std::cell::RefCell;
#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const NVS_NAMESPACE: &str = "plantdaddy";
const CONFIG_BLOB_KEY: &str = "nodecfg";
#[cfg(target_os = "espidf")]
const MAX_VALUE_LEN: usize = 256;

/// Key-value store over NVS (device) or a hash map (host).
pub struct NvsConfigStore {
    #[cfg(not(target_os = "espidf"))]
    store: RefCell<HashMap<String, String>>,
    #[cfg(not(target_os = "espidf"))]
    sim_fail_writes: bool,
}

impl NvsConfigStore {
    /// Open the store, initialising the NVS flash partition on device.
    /// First boot (or a partition version bump) erases and re-creates
    /// the partition.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from the main task before any other
            // NVS user exists.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(StorageError::IoError);
            }
            info!("NVS: flash partition ready");
            Ok(Self {})
        }

        #[cfg(not(target_os = "espidf"))]
        {
            info!("NVS(sim): in-memory backend");
            Ok(Self {
                store: RefCell::new(HashMap::new()),
                sim_fail_writes: false,
            })
        }
    }

    /// Make every subsequent write fail (host tests only).
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_fail_writes(&mut self, fail: bool) {
        self.sim_fail_writes = fail;
    }

    /// Load the tunables blob, falling back to defaults when missing or
    /// corrupted (a bad blob must not brick the node).
    pub fn load_node_config(&self) -> NodeConfig {
        match self.read_blob(CONFIG_BLOB_KEY) {
            Some(bytes) => match postcard::from_bytes::<NodeConfig>(&bytes) {
                Ok(cfg) if cfg.validate().is_ok() => {
                    info!("config: loaded stored tunables");
                    cfg
                }
                Ok(_) | Err(_) => {
                    warn!("config: stored tunables invalid, using defaults");
                    NodeConfig::default()
                }
            },
            None => {
                info!("config: no stored tunables, using defaults");
                NodeConfig::default()
            }
        }
    }

    /// Validate and persist the tunables blob.
    pub fn save_node_config(&mut self, config: &NodeConfig) -> Result<(), StorageError> {
        if let Err(reason) = config.validate() {
            warn!("config: rejecting invalid tunables — {}", reason);
            return Err(StorageError::IoError);
        }
        let bytes = postcard::to_allocvec(config).map_err(|_| StorageError::IoError)?;
        self.write_blob(CONFIG_BLOB_KEY, &bytes)
    }

    // ── Platform plumbing ─────────────────────────────────────

    /// Open the node namespace, run `f` with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_handle<F, T>(write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        let ns = NVS_NAMESPACE.as_bytes();
        ns_buf[..ns.len()].copy_from_slice(ns);

        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };
        let mut handle: nvs_handle_t = 0;
        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }
        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    #[cfg(target_os = "espidf")]
    fn key_buf(key: &str) -> [u8; 16] {
        let mut buf = [0u8; 16];
        let kb = key.as_bytes();
        let len = kb.len().min(15);
        buf[..len].copy_from_slice(&kb[..len]);
        buf
    }

    #[cfg(target_os = "espidf")]
    fn read_blob(&self, key: &str) -> Option<Vec<u8>> {
        Self::with_handle(false, |handle| {
            let key = Self::key_buf(key);
            let mut size: usize = 0;
            let ret = unsafe {
                nvs_get_blob(handle, key.as_ptr() as *const _, core::ptr::null_mut(), &mut size)
            };
            if ret != ESP_OK || size == 0 {
                return Err(ret);
            }
            let mut buf = vec![0u8; size];
            let ret = unsafe {
                nvs_get_blob(handle, key.as_ptr() as *const _, buf.as_mut_ptr() as *mut _, &mut size)
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(buf)
        })
        .ok()
    }

    #[cfg(target_os = "espidf")]
    fn write_blob(&mut self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        Self::with_handle(true, |handle| {
            let key = Self::key_buf(key);
            let ret = unsafe {
                nvs_set_blob(handle, key.as_ptr() as *const _, data.as_ptr() as *const _, data.len())
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        })
        .map_err(|e| {
            if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE {
                StorageError::Full
            } else {
                StorageError::IoError
            }
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_blob(&self, key: &str) -> Option<Vec<u8>> {
        // The simulation keeps blobs in the same map, hex-encoded so a
        // single string map suffices.
        let hex = self.store.borrow().get(key).cloned()?;
        let mut bytes = Vec::with_capacity(hex.len() / 2);
        let raw = hex.as_bytes();
        for pair in raw.chunks_exact(2) {
            let hi = (pair[0] as char).to_digit(16)?;
            let lo = (pair[1] as char).to_digit(16)?;
            bytes.push(((hi << 4) | lo) as u8);
        }
        Some(bytes)
    }

    #[cfg(not(target_os = "espidf"))]
    fn write_blob(&mut self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if self.sim_fail_writes {
            return Err(StorageError::IoError);
        }
        use core::fmt::Write;
        let mut hex = String::with_capacity(data.len() * 2);
        for b in data {
            write!(hex, "{:02x}", b).map_err(|_| StorageError::IoError)?;
        }
        self.store.borrow_mut().insert(key.to_string(), hex);
        Ok(())
    }
}

impl ConfigStore for NvsConfigStore {
    #[cfg(target_os = "espidf")]
    fn get(&self, key: &str) -> Option<String> {
        Self::with_handle(false, |handle| {
            let key = Self::key_buf(key);
            let mut buf = [0u8; MAX_VALUE_LEN];
            let mut size = buf.len();
            let ret = unsafe {
                nvs_get_str(handle, key.as_ptr() as *const _, buf.as_mut_ptr() as *mut _, &mut size)
            };
            if ret != ESP_OK || size == 0 {
                return Err(ret);
            }
            // size includes the trailing NUL.
            let text = core::str::from_utf8(&buf[..size - 1]).map_err(|_| ESP_FAIL)?;
            Ok(text.to_string())
        })
        .ok()
    }

    #[cfg(not(target_os = "espidf"))]
    fn get(&self, key: &str) -> Option<String> {
        self.store.borrow().get(key).cloned()
    }

    #[cfg(target_os = "espidf")]
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let value = std::ffi::CString::new(value).map_err(|_| StorageError::IoError)?;
        Self::with_handle(true, |handle| {
            let key = Self::key_buf(key);
            let ret = unsafe { nvs_set_str(handle, key.as_ptr() as *const _, value.as_ptr()) };
            if ret != ESP_OK {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        })
        .map_err(|e| {
            if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE {
                StorageError::Full
            } else {
                StorageError::IoError
            }
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.sim_fail_writes {
            return Err(StorageError::IoError);
        }
        self.store
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        Self::with_handle(true, |handle| {
            let key = Self::key_buf(key);
            let ret = unsafe { nvs_erase_key(handle, key.as_ptr() as *const _) };
            if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        })
        .map_err(|_| StorageError::IoError)
    }

    #[cfg(not(target_os = "espidf"))]
    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.store.borrow_mut().remove(key);
        Ok(())
    }
}
