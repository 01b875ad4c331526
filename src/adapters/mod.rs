//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter        | Implements                     | Connects to                 |
//! |----------------|--------------------------------|-----------------------------|
//! | `device_id`    |                                | eFuse base MAC              |
//! | `log_display`  | DisplayPort                    | Serial log output           |
//! | `mqtt`         | TransportPort, BrokerLink      | ESP-IDF MQTT client (TLS)   |
//! | `nvs`          | PersistencePort, ConfigPort    | NVS / in-memory store       |
//! | `ota`          | UpdatePort                     | HTTPS download + OTA slots  |
//! | `provisioning` | ProvisioningPort               | Endpoint derivation         |
//! | `system`       | SystemPort                     | esp_restart, heap stats     |
//! | `time`         | Clock                          | ESP32 system timer          |
//! | `wifi`         | NetworkPort                    | Wi-Fi STA + portal AP       |

pub mod device_id;
pub mod log_display;
pub mod mqtt;
pub mod nvs;
pub mod ota;
pub mod provisioning;
pub mod system;
pub mod time;
pub(super) mod utils;
pub mod wifi;
