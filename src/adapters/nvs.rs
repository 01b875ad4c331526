//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`PersistencePort`] and [`ConfigPort`].
//!
//! Every value is paired with a one-byte validity flag stored under
//! `<key>.ok`. Writes store the value first and the flag second; clears
//! remove the flag first. A crash between the two leaves the value reading
//! as absent rather than half-written.
//!
//! | Namespace | Keys                                   |
//! |-----------|----------------------------------------|
//! | `relay`   | `max-time`, `max-temp` (f32 LE)        |
//! | `auth`    | `ssid`, `password`, `broker`, `fw-url` |
//! | `cfg`     | `syscfg` (postcard blob)               |

use std::sync::{Mutex, PoisonError};

use log::{info, warn};

use crate::app::ports::{ConfigPort, CredentialKey, NumberKey, PersistencePort};
use crate::config::SystemConfig;
use crate::error::StorageError;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "cfg";
const CONFIG_KEY: &str = "syscfg";

const MAX_BLOB_SIZE: usize = 1024;

/// Suffix of the validity flag stored beside every value.
const FLAG_SUFFIX: &str = ".ok";

pub struct NvsAdapter {
    /// Serialises value+flag pairs for the numeric settings.
    numbers: Mutex<()>,
    /// Serialises value+flag pairs for the credentials.
    credentials: Mutex<()>,
    #[cfg(not(target_os = "espidf"))]
    store: Mutex<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Create a new NvsAdapter and initialise NVS flash.
    ///
    /// On first boot or after a version mismatch the NVS partition is
    /// erased and re-initialised automatically.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called from the
            // single main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(StorageError::OpenFailed);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(StorageError::OpenFailed);
                }
            } else if ret != ESP_OK {
                return Err(StorageError::OpenFailed);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            numbers: Mutex::new(()),
            credentials: Mutex::new(()),
            #[cfg(not(target_os = "espidf"))]
            store: Mutex::new(HashMap::new()),
        })
    }

    fn flag_key(key: &str) -> String {
        format!("{key}{FLAG_SUFFIX}")
    }

    fn is_valid(&self, namespace: &str, key: &str) -> bool {
        matches!(
            self.read_blob(namespace, &Self::flag_key(key)),
            Ok(Some(flag)) if flag.first() == Some(&1)
        )
    }

    fn read_flagged(&self, namespace: &str, key: &str) -> Option<Vec<u8>> {
        if !self.is_valid(namespace, key) {
            return None;
        }
        match self.read_blob(namespace, key) {
            Ok(value) => value,
            Err(e) => {
                warn!("NvsAdapter: read {}::{} failed: {}", namespace, key, e);
                None
            }
        }
    }

    fn write_flagged(&self, namespace: &str, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.write_blob(namespace, key, value)?;
        self.write_blob(namespace, &Self::flag_key(key), &[1])
    }

    fn clear_flagged(&self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.erase(namespace, &Self::flag_key(key))?;
        self.erase(namespace, key)
    }
}

// ── Raw blob access: simulation backend ──────────────────────

#[cfg(not(target_os = "espidf"))]
impl NvsAdapter {
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    fn read_blob(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(store.get(&Self::composite_key(namespace, key)).cloned())
    }

    fn write_blob(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if data.len() > MAX_BLOB_SIZE {
            return Err(StorageError::TooLong);
        }
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        store.insert(Self::composite_key(namespace, key), data.to_vec());
        Ok(())
    }

    fn erase(&self, namespace: &str, key: &str) -> Result<(), StorageError> {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        store.remove(&Self::composite_key(namespace, key));
        Ok(())
    }
}

// ── Raw blob access: ESP-IDF backend ─────────────────────────

#[cfg(target_os = "espidf")]
impl NvsAdapter {
    /// NUL-terminated copy of a namespace or key (NVS limit: 15 chars).
    fn c_name(name: &str) -> [u8; 16] {
        let mut buf = [0u8; 16];
        let bytes = name.as_bytes();
        let len = bytes.len().min(15);
        buf[..len].copy_from_slice(&bytes[..len]);
        buf
    }

    /// Open an NVS namespace, execute a closure with the handle, then close.
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns_buf = Self::c_name(namespace);
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret == ESP_ERR_NVS_NOT_FOUND {
            // Namespace never written: nothing stored yet.
            return Err(ESP_ERR_NVS_NOT_FOUND);
        }
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    fn read_blob(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let key_buf = Self::c_name(key);
        let result = Self::with_nvs_handle(namespace, false, |handle| {
            let mut size: usize = 0;
            let ret = unsafe {
                nvs_get_blob(
                    handle,
                    key_buf.as_ptr() as *const _,
                    core::ptr::null_mut(),
                    &mut size,
                )
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            if size > MAX_BLOB_SIZE {
                return Err(ESP_ERR_NVS_INVALID_LENGTH);
            }
            let mut buf = vec![0u8; size];
            let ret = unsafe {
                nvs_get_blob(
                    handle,
                    key_buf.as_ptr() as *const _,
                    buf.as_mut_ptr() as *mut _,
                    &mut size,
                )
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            buf.truncate(size);
            Ok(buf)
        });
        match result {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Ok(None),
            Err(_) => Err(StorageError::ReadFailed),
        }
    }

    fn write_blob(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if data.len() > MAX_BLOB_SIZE {
            return Err(StorageError::TooLong);
        }
        let key_buf = Self::c_name(key);
        let result = Self::with_nvs_handle(namespace, true, |handle| {
            let ret = unsafe {
                nvs_set_blob(
                    handle,
                    key_buf.as_ptr() as *const _,
                    data.as_ptr() as *const _,
                    data.len(),
                )
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        });
        result.map_err(|e| {
            warn!("NvsAdapter: write {}::{} error {}", namespace, key, e);
            StorageError::WriteFailed
        })
    }

    fn erase(&self, namespace: &str, key: &str) -> Result<(), StorageError> {
        let key_buf = Self::c_name(key);
        let result = Self::with_nvs_handle(namespace, true, |handle| {
            let ret = unsafe { nvs_erase_key(handle, key_buf.as_ptr() as *const _) };
            if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        });
        match result {
            Ok(()) => Ok(()),
            Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Ok(()),
            Err(_) => Err(StorageError::WriteFailed),
        }
    }
}

// ── Ports ────────────────────────────────────────────────────

impl PersistencePort for NvsAdapter {
    fn get_number(&self, key: NumberKey) -> Option<f32> {
        let _guard = self.numbers.lock().unwrap_or_else(PoisonError::into_inner);
        let bytes = self.read_flagged(key.namespace(), key.key())?;
        let raw: [u8; 4] = bytes.as_slice().try_into().ok()?;
        Some(f32::from_le_bytes(raw))
    }

    fn set_number(&self, key: NumberKey, value: f32) -> Result<(), StorageError> {
        let _guard = self.numbers.lock().unwrap_or_else(PoisonError::into_inner);
        self.write_flagged(key.namespace(), key.key(), &value.to_le_bytes())?;
        info!("NvsAdapter: {} = {}", key.key(), value);
        Ok(())
    }

    fn get_credential(&self, key: CredentialKey) -> Option<String> {
        let _guard = self
            .credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let bytes = self.read_flagged(key.namespace(), key.key())?;
        String::from_utf8(bytes).ok()
    }

    fn set_credential(&self, key: CredentialKey, value: &str) -> Result<(), StorageError> {
        if value.len() > key.max_len() {
            return Err(StorageError::TooLong);
        }
        let _guard = self
            .credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.write_flagged(key.namespace(), key.key(), value.as_bytes())?;
        info!("NvsAdapter: credential {} stored ({} bytes)", key.key(), value.len());
        Ok(())
    }

    fn clear_credential(&self, key: CredentialKey) -> Result<(), StorageError> {
        let _guard = self
            .credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.clear_flagged(key.namespace(), key.key())
    }
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<SystemConfig, StorageError> {
        match self.read_blob(CONFIG_NAMESPACE, CONFIG_KEY)? {
            Some(bytes) => {
                let cfg: SystemConfig =
                    postcard::from_bytes(&bytes).map_err(|_| StorageError::Corrupt)?;
                if let Err(reason) = cfg.validate() {
                    warn!("NvsAdapter: stored config invalid ({}), using defaults", reason);
                    return Ok(SystemConfig::default());
                }
                info!("NvsAdapter: loaded config ({} bytes)", bytes.len());
                Ok(cfg)
            }
            None => {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(SystemConfig::default())
            }
        }
    }

    fn save(&self, config: &SystemConfig) -> Result<(), StorageError> {
        if let Err(reason) = config.validate() {
            warn!("NvsAdapter: refusing to save config: {}", reason);
            return Err(StorageError::Corrupt);
        }
        let bytes = postcard::to_allocvec(config).map_err(|_| StorageError::WriteFailed)?;
        self.write_blob(CONFIG_NAMESPACE, CONFIG_KEY, &bytes)?;
        info!("NvsAdapter: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_round_trip() {
        let nvs = NvsAdapter::new().unwrap();
        nvs.set_number(NumberKey::MaxRunSecs, 300.0).unwrap();
        assert_eq!(nvs.get_number(NumberKey::MaxRunSecs), Some(300.0));
    }

    #[test]
    fn unset_number_is_absent_not_zero() {
        let nvs = NvsAdapter::new().unwrap();
        assert_eq!(nvs.get_number(NumberKey::MaxTemperature), None);
    }

    #[test]
    fn nan_is_stored_as_nan() {
        let nvs = NvsAdapter::new().unwrap();
        nvs.set_number(NumberKey::MaxTemperature, f32::NAN).unwrap();
        assert!(nvs.get_number(NumberKey::MaxTemperature).unwrap().is_nan());
    }

    #[test]
    fn value_without_flag_reads_absent() {
        let nvs = NvsAdapter::new().unwrap();
        nvs.write_blob("relay", "max-time", &60f32.to_le_bytes()).unwrap();
        assert_eq!(nvs.get_number(NumberKey::MaxRunSecs), None);
    }

    #[test]
    fn credential_round_trip_and_clear() {
        let nvs = NvsAdapter::new().unwrap();
        nvs.set_credential(CredentialKey::WifiSsid, "HomeNet").unwrap();
        assert_eq!(
            nvs.get_credential(CredentialKey::WifiSsid).as_deref(),
            Some("HomeNet")
        );
        nvs.clear_credential(CredentialKey::WifiSsid).unwrap();
        assert_eq!(nvs.get_credential(CredentialKey::WifiSsid), None);
        // Clearing twice is fine.
        nvs.clear_credential(CredentialKey::WifiSsid).unwrap();
    }

    #[test]
    fn long_credential_rejected() {
        let nvs = NvsAdapter::new().unwrap();
        let long = "x".repeat(65);
        assert_eq!(
            nvs.set_credential(CredentialKey::WifiPassword, &long),
            Err(StorageError::TooLong)
        );
        assert_eq!(nvs.get_credential(CredentialKey::WifiPassword), None);
    }

    #[test]
    fn config_defaults_then_round_trip() {
        let nvs = NvsAdapter::new().unwrap();
        assert_eq!(nvs.load().unwrap(), SystemConfig::default());

        let cfg = SystemConfig {
            status_interval_secs: 10,
            ..SystemConfig::default()
        };
        nvs.save(&cfg).unwrap();
        assert_eq!(nvs.load().unwrap(), cfg);
    }

    #[test]
    fn invalid_config_not_saved() {
        let nvs = NvsAdapter::new().unwrap();
        let cfg = SystemConfig {
            relay_period_ms: 0,
            ..SystemConfig::default()
        };
        assert!(nvs.save(&cfg).is_err());
        assert_eq!(nvs.load().unwrap(), SystemConfig::default());
    }

    #[test]
    fn namespaces_do_not_collide() {
        let nvs = NvsAdapter::new().unwrap();
        nvs.set_number(NumberKey::MaxRunSecs, 90.0).unwrap();
        nvs.set_credential(CredentialKey::BrokerEndpoint, "mqtt://broker")
            .unwrap();
        assert_eq!(nvs.get_number(NumberKey::MaxRunSecs), Some(90.0));
        assert_eq!(
            nvs.get_credential(CredentialKey::BrokerEndpoint).as_deref(),
            Some("mqtt://broker")
        );
    }
}
