//! Inbound broker commands.
//!
//! | Leaf              | Payload                      | Effect                         |
//! |-------------------|------------------------------|--------------------------------|
//! | `max-temperature` | float text                   | persist temperature ceiling    |
//! | `max-time`        | integer seconds, 1..=3600    | persist run ceiling            |
//! | `power-state`     | `ON` / `OFF`                 | post relay-on / relay-off      |
//! | `ota`             | `{"firmwareUrl": "..."}`     | persist URL, post update       |
//!
//! Handlers never touch the relay or the mode directly: persisted values
//! are picked up by the next relay session, everything else becomes an
//! event for the coordinator.

use core::fmt;
use std::sync::Arc;

use log::{error, info, warn};
use serde::Deserialize;

use super::ports::{CredentialKey, MessageHandler, NumberKey, PersistencePort, TransportPort};
use super::topics::Topics;
use crate::config::MAX_TIME_RANGE_SECS;
use crate::error::{StorageError, TransportError};
use crate::events::{Event, EventChannel};

/// A command that was received but not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// Payload is not valid UTF-8 / JSON / number.
    Malformed,
    /// Parsed, but outside the accepted range.
    OutOfRange,
    /// Unknown `power-state` value.
    UnknownState,
    /// `ota` payload without a firmware URL.
    MissingUrl,
    Storage(StorageError),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed payload"),
            Self::OutOfRange => write!(f, "value out of range"),
            Self::UnknownState => write!(f, "unknown power state"),
            Self::MissingUrl => write!(f, "no firmwareUrl"),
            Self::Storage(e) => write!(f, "storage: {e}"),
        }
    }
}

impl From<StorageError> for CommandError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

fn text(payload: &[u8]) -> Result<&str, CommandError> {
    core::str::from_utf8(payload)
        .map(str::trim)
        .map_err(|_| CommandError::Malformed)
}

// ── Handlers ──────────────────────────────────────────────────

pub fn apply_max_temperature(
    payload: &[u8],
    store: &dyn PersistencePort,
) -> Result<f32, CommandError> {
    let value: f32 = text(payload)?
        .parse()
        .map_err(|_| CommandError::Malformed)?;
    if !value.is_finite() {
        return Err(CommandError::OutOfRange);
    }
    store.set_number(NumberKey::MaxTemperature, value)?;
    Ok(value)
}

pub fn apply_max_time(payload: &[u8], store: &dyn PersistencePort) -> Result<u32, CommandError> {
    let secs: i64 = text(payload)?
        .parse()
        .map_err(|_| CommandError::Malformed)?;
    let secs = u32::try_from(secs).map_err(|_| CommandError::OutOfRange)?;
    if !MAX_TIME_RANGE_SECS.contains(&secs) {
        return Err(CommandError::OutOfRange);
    }
    store.set_number(NumberKey::MaxRunSecs, secs as f32)?;
    Ok(secs)
}

pub fn apply_power_state(payload: &[u8], events: &EventChannel) -> Result<Event, CommandError> {
    let event = match text(payload)? {
        "ON" => Event::RelayOn,
        "OFF" => Event::RelayOff,
        _ => return Err(CommandError::UnknownState),
    };
    events.post(event);
    Ok(event)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OtaRequest {
    firmware_url: Option<String>,
}

pub fn apply_ota(
    payload: &[u8],
    store: &dyn PersistencePort,
    events: &EventChannel,
) -> Result<(), CommandError> {
    let req: OtaRequest = serde_json::from_slice(payload).map_err(|_| CommandError::Malformed)?;
    let url = req
        .firmware_url
        .filter(|u| !u.is_empty())
        .ok_or(CommandError::MissingUrl)?;
    store.set_credential(CredentialKey::FirmwareUrl, &url)?;
    info!("Command: firmware URL stored ({} bytes)", url.len());
    events.post(Event::UpdateRequested);
    Ok(())
}

// ── Subscription wiring ───────────────────────────────────────

fn handler<F>(name: &'static str, f: F) -> MessageHandler
where
    F: Fn(&[u8]) -> Result<String, CommandError> + Send + Sync + 'static,
{
    Arc::new(move |payload: &[u8]| match f(payload) {
        Ok(applied) => info!("Command {}: {}", name, applied),
        Err(CommandError::UnknownState) => error!("Command {}: unknown value", name),
        Err(e) => warn!("Command {} rejected: {}", name, e),
    })
}

/// Register every command handler on the transport.
///
/// Returns the number of topics now subscribed.
pub fn subscribe_commands(
    transport: &dyn TransportPort,
    topics: &Topics,
    store: &Arc<dyn PersistencePort>,
    events: &'static EventChannel,
) -> Result<usize, TransportError> {
    let s = Arc::clone(store);
    transport.subscribe(
        &topics.cmd_max_temperature,
        handler("max-temperature", move |p| {
            apply_max_temperature(p, s.as_ref()).map(|v| format!("{v:.1}"))
        }),
    )?;

    let s = Arc::clone(store);
    transport.subscribe(
        &topics.cmd_max_time,
        handler("max-time", move |p| {
            apply_max_time(p, s.as_ref()).map(|v| format!("{v}s"))
        }),
    )?;

    transport.subscribe(
        &topics.cmd_power_state,
        handler("power-state", move |p| {
            apply_power_state(p, events).map(|e| e.to_string())
        }),
    )?;

    let s = Arc::clone(store);
    transport.subscribe(
        &topics.cmd_ota,
        handler("ota", move |p| {
            apply_ota(p, s.as_ref(), events).map(|()| String::from("update requested"))
        }),
    )?;

    info!("Command subscriptions installed");
    Ok(4)
}
