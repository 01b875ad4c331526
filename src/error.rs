//! Unified error types for the recirculator firmware.
//!
//! Each concern owns a small `Copy` enum; all of them convert into the
//! top-level [`Error`] so boot code can funnel failures through one type.
//! None of these ever reach the coordinator: workers log them and report
//! semantic events instead.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Storage(StorageError),
    Transport(TransportError),
    Worker(WorkerError),
    Relay(RelayError),
    Network(NetworkError),
    Update(UpdateError),
    /// Peripheral initialisation failed.
    Init(&'static str),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Worker(e) => write!(f, "worker: {e}"),
            Self::Relay(e) => write!(f, "relay: {e}"),
            Self::Network(e) => write!(f, "network: {e}"),
            Self::Update(e) => write!(f, "update: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// The backing store could not be opened.
    OpenFailed,
    ReadFailed,
    WriteFailed,
    /// Value exceeds the storage slot.
    TooLong,
    /// Stored blob failed to decode.
    Corrupt,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenFailed => write!(f, "open failed"),
            Self::ReadFailed => write!(f, "read failed"),
            Self::WriteFailed => write!(f, "write failed"),
            Self::TooLong => write!(f, "value too long"),
            Self::Corrupt => write!(f, "stored value corrupt"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Messaging transport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Topic exceeds the fixed topic buffer.
    TopicTooLong,
    /// Payload exceeds the fixed payload buffer.
    PayloadTooLarge,
    /// Outbound queue is full; message dropped.
    QueueFull,
    /// Subscription table is full.
    TooManySubscriptions,
    NotConnected,
    ConnectFailed,
    /// Broker rejected a publish or subscribe.
    Rejected,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TopicTooLong => write!(f, "topic too long"),
            Self::PayloadTooLarge => write!(f, "payload too large"),
            Self::QueueFull => write!(f, "outbound queue full"),
            Self::TooManySubscriptions => write!(f, "subscription table full"),
            Self::NotConnected => write!(f, "not connected"),
            Self::ConnectFailed => write!(f, "connect failed"),
            Self::Rejected => write!(f, "rejected by broker"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Worker lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerError {
    /// The OS refused to create the worker thread.
    SpawnFailed,
    /// Operation requires a started worker.
    NotStarted,
    /// Worker was stopped and cannot be resumed.
    Stopped,
    /// A one-shot worker is already in flight.
    Busy,
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpawnFailed => write!(f, "spawn failed"),
            Self::NotStarted => write!(f, "not started"),
            Self::Stopped => write!(f, "stopped"),
            Self::Busy => write!(f, "already running"),
        }
    }
}

impl From<WorkerError> for Error {
    fn from(e: WorkerError) -> Self {
        Self::Worker(e)
    }
}

// ---------------------------------------------------------------------------
// Relay output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayError {
    /// GPIO set failed.
    GpioWriteFailed,
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GpioWriteFailed => write!(f, "GPIO write failed"),
        }
    }
}

impl From<RelayError> for Error {
    fn from(e: RelayError) -> Self {
        Self::Relay(e)
    }
}

// ---------------------------------------------------------------------------
// Network association
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkError {
    NotInitialised,
    ConnectFailed,
    Timeout,
    InvalidCredentials,
    PortalFailed,
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialised => write!(f, "driver not initialised"),
            Self::ConnectFailed => write!(f, "connect failed"),
            Self::Timeout => write!(f, "connect timed out"),
            Self::InvalidCredentials => write!(f, "invalid credentials"),
            Self::PortalFailed => write!(f, "access point failed"),
        }
    }
}

impl From<NetworkError> for Error {
    fn from(e: NetworkError) -> Self {
        Self::Network(e)
    }
}

// ---------------------------------------------------------------------------
// Firmware update
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateError {
    /// No firmware URL has been stored.
    MissingUrl,
    Download,
    Flash,
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingUrl => write!(f, "no firmware URL"),
            Self::Download => write!(f, "download failed"),
            Self::Flash => write!(f, "flash write failed"),
        }
    }
}

impl From<UpdateError> for Error {
    fn from(e: UpdateError) -> Self {
        Self::Update(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
