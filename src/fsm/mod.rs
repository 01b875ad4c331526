//! System mode and the state coordinator.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │  Coordinator (one thread, fixed period)                       │
//! │                                                               │
//! │   drain(EventChannel) ──▶ global rules ──▶ TRANSITIONS table  │
//! │                              │                  │             │
//! │                              ▼                  ▼             │
//! │                       RelayController      ModeCell::set      │
//! │                                                 │             │
//! │                   policy::directive(mode, id) ◀─┘             │
//! │                              │                                │
//! │                              ▼                                │
//! │                        WorkerTable::apply                     │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! The mode lives in a [`ModeCell`]. Anyone may read it; only the
//! coordinator writes it.

pub mod coordinator;
pub mod policy;
pub mod table;

use core::fmt;
use std::sync::{Mutex, PoisonError};

pub use coordinator::{Coordinator, CoordinatorPorts, CoordinatorTiming};

// ---------------------------------------------------------------------------
// Mode identity
// ---------------------------------------------------------------------------

/// Top-level operating mode. Exactly one is active at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SystemMode {
    /// Joining the stored Wi-Fi network.
    Connecting = 0,
    /// Network up, broker credentials in hand, broker session pending.
    ConnectedNetwork = 1,
    /// Network up, acquiring broker endpoint credentials.
    ConfiguringBroker = 2,
    ConnectedBroker = 3,
    /// Access point open for credential entry.
    ConfigPortal = 4,
    FirmwareUpdating = 5,
    /// Terminal within a boot: the device restarts after a grace delay.
    FatalError = 6,
}

impl SystemMode {
    pub const COUNT: usize = 7;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Connecting,
        Self::ConnectedNetwork,
        Self::ConfiguringBroker,
        Self::ConnectedBroker,
        Self::ConfigPortal,
        Self::FirmwareUpdating,
        Self::FatalError,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::ConnectedNetwork => "connected-network",
            Self::ConfiguringBroker => "configuring-broker",
            Self::ConnectedBroker => "connected-broker",
            Self::ConfigPortal => "config-portal",
            Self::FirmwareUpdating => "firmware-updating",
            Self::FatalError => "fatal-error",
        }
    }

    /// Modes in which the relay may not be switched on.
    pub const fn blocks_activation(self) -> bool {
        matches!(self, Self::FirmwareUpdating | Self::FatalError)
    }
}

impl fmt::Display for SystemMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Mode cell
// ---------------------------------------------------------------------------

/// Lock-guarded holder of the current [`SystemMode`].
///
/// The lock is held only for the copy in or out, never across a wait.
pub struct ModeCell {
    mode: Mutex<SystemMode>,
}

impl ModeCell {
    pub const fn new(initial: SystemMode) -> Self {
        Self {
            mode: Mutex::new(initial),
        }
    }

    pub fn get(&self) -> SystemMode {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Coordinator only.
    pub(crate) fn set(&self, mode: SystemMode) {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner) = mode;
    }
}

/// The mode the device coordinator drives.
pub static SYSTEM_MODE: ModeCell = ModeCell::new(SystemMode::Connecting);

/// Current mode of the device. Callable from any thread.
pub fn current_mode() -> SystemMode {
    SYSTEM_MODE.get()
}
