//! Port traits: the hexagonal boundary between the core and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Relay controller / Coordinator / Workers
//! ```
//!
//! Driven adapters (storage, broker transport, probe, update transport,
//! buzzer, relay pin) implement these traits. The core holds them as
//! `Arc<dyn …>` so every worker thread can share one adapter instance,
//! and tests swap in recording mocks.
//!
//! ## Threading notes
//!
//! - Shared ports take `&self` and are `Send + Sync`; adapters keep their
//!   own short-lived locks.
//! - Single-owner ports (relay output, display, network radio) take
//!   `&mut self` and are wrapped by whoever owns them.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{MAX_CREDENTIAL_LEN, SystemConfig};
use crate::error::{NetworkError, RelayError, StorageError, TransportError, UpdateError};

// ───────────────────────────────────────────────────────────────
// Persistence port
// ───────────────────────────────────────────────────────────────

/// Numeric settings the relay controller reads once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumberKey {
    /// Run-time ceiling in seconds.
    MaxRunSecs,
    /// Temperature ceiling in °C.
    MaxTemperature,
}

impl NumberKey {
    pub const fn namespace(self) -> &'static str {
        "relay"
    }

    pub const fn key(self) -> &'static str {
        match self {
            Self::MaxRunSecs => "max-time",
            Self::MaxTemperature => "max-temp",
        }
    }
}

/// String credentials kept in the `auth` namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKey {
    WifiSsid,
    WifiPassword,
    BrokerEndpoint,
    FirmwareUrl,
}

impl CredentialKey {
    pub const ALL: [Self; 4] = [
        Self::WifiSsid,
        Self::WifiPassword,
        Self::BrokerEndpoint,
        Self::FirmwareUrl,
    ];

    pub const fn namespace(self) -> &'static str {
        "auth"
    }

    pub const fn key(self) -> &'static str {
        match self {
            Self::WifiSsid => "ssid",
            Self::WifiPassword => "password",
            Self::BrokerEndpoint => "broker",
            Self::FirmwareUrl => "fw-url",
        }
    }

    /// Longest value accepted for this key.
    pub const fn max_len(self) -> usize {
        match self {
            Self::WifiSsid | Self::WifiPassword => MAX_CREDENTIAL_LEN,
            Self::BrokerEndpoint | Self::FirmwareUrl => 256,
        }
    }
}

/// Persistent key-value storage for ceilings and credentials.
///
/// Every value is written with a validity flag beside it; a value whose
/// flag is missing reads as absent, never as zero or an empty string.
pub trait PersistencePort: Send + Sync {
    fn get_number(&self, key: NumberKey) -> Option<f32>;

    fn set_number(&self, key: NumberKey, value: f32) -> Result<(), StorageError>;

    fn get_credential(&self, key: CredentialKey) -> Option<String>;

    /// Rejects values longer than [`CredentialKey::max_len`].
    fn set_credential(&self, key: CredentialKey, value: &str) -> Result<(), StorageError>;

    /// Removes the value and its flag. `Ok(())` if it was already absent.
    fn clear_credential(&self, key: CredentialKey) -> Result<(), StorageError>;
}

/// Loads and persists [`SystemConfig`].
///
/// Implementations validate before persisting and fall back to defaults
/// when nothing is stored.
pub trait ConfigPort {
    fn load(&self) -> Result<SystemConfig, StorageError>;

    fn save(&self, config: &SystemConfig) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Messaging transport port
// ───────────────────────────────────────────────────────────────

/// Callback for an exact-match subscription. Receives the raw payload.
pub type MessageHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Asynchronous, queued broker transport.
pub trait TransportPort: Send + Sync {
    /// Enqueue a message. Fails on oversize topic/payload or a full queue.
    fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> Result<(), TransportError>;

    /// Register an exact-match handler. Subscribing the same topic twice is
    /// accepted and keeps the first handler.
    fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Sensor port
// ───────────────────────────────────────────────────────────────

/// Reading reported while the probe is disconnected or faulty.
pub const FAULT_SENTINEL: f32 = -127.0;

/// True when `reading` is the fault sentinel (or otherwise unusable).
pub fn is_fault(reading: f32) -> bool {
    !reading.is_finite() || reading <= FAULT_SENTINEL
}

/// Read side of the latest-reading cache.
pub trait SensorPort: Send + Sync {
    /// Most recent temperature in °C, or [`FAULT_SENTINEL`].
    fn latest_reading(&self) -> f32;
}

// ───────────────────────────────────────────────────────────────
// Update transport port
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Image written; the caller restarts.
    Success,
    /// Server reported the running image is current.
    NoUpdate,
    Failed(UpdateError),
}

pub trait UpdatePort: Send + Sync {
    fn perform_update(&self, url: &str) -> UpdateOutcome;
}

// ───────────────────────────────────────────────────────────────
// Actuator / feedback ports
// ───────────────────────────────────────────────────────────────

/// Single writer of the relay pin. Only the relay controller holds one.
pub trait RelayOutput: Send {
    fn set(&mut self, on: bool) -> Result<(), RelayError>;
}

/// Audible feedback sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tune {
    /// Session ended because the water reached the target.
    TargetReached,
    /// Session ended on the run-time ceiling.
    Timeout,
    /// One long buzz for a faulty probe.
    FaultAlarm,
    /// Short chirp at boot.
    SelfTest,
}

pub trait BuzzerPort: Send + Sync {
    /// Play `tune` to completion.
    fn play(&self, tune: Tune);

    /// Silence for `ms` between repetitions.
    fn rest(&self, ms: u32);
}

/// What the front-panel display shows.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayFrame {
    /// Latest reading, `None` while the probe is faulty.
    pub temperature_c: Option<f32>,
    pub relay_on: bool,
    pub max_temperature_c: f32,
}

pub trait DisplayPort: Send {
    fn render(&mut self, frame: &DisplayFrame);
}

// ───────────────────────────────────────────────────────────────
// Platform ports
// ───────────────────────────────────────────────────────────────

/// Monotonic milliseconds since boot.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

pub trait SystemPort: Send + Sync {
    /// Reboot the device. Returns only on the host simulation.
    fn restart(&self);

    fn free_heap(&self) -> u32;
}

// ───────────────────────────────────────────────────────────────
// Connectivity ports
// ───────────────────────────────────────────────────────────────

/// Station credentials submitted through the portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalSubmission {
    pub ssid: String,
    pub password: String,
}

/// Station/AP radio. Owned by the network and portal workers in turn.
pub trait NetworkPort: Send {
    fn connect(&mut self, ssid: &str, password: &str, timeout: Duration)
    -> Result<(), NetworkError>;

    fn is_connected(&self) -> bool;

    fn start_portal(&mut self, ap_ssid: &str) -> Result<(), NetworkError>;

    /// Take a pending form submission, if any.
    fn poll_portal(&mut self) -> Option<PortalSubmission>;

    fn stop_portal(&mut self);
}

/// Source of broker endpoint credentials when none are stored.
pub trait ProvisioningPort: Send + Sync {
    fn fetch_broker_endpoint(&self, device_id: &str) -> Result<String, NetworkError>;
}

/// Session control for the broker link, beyond the publish/subscribe
/// surface of [`TransportPort`].
pub trait BrokerLink: Send + Sync {
    /// Open (or reopen) the session and replay every registered subscription.
    fn connect(&self, endpoint: &str, client_id: &str) -> Result<(), TransportError>;
}
