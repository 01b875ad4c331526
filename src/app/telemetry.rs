//! Outbound telemetry payloads.
//!
//! Each struct serialises to the JSON object published on its topic.
//! Field names are camelCase on the wire.

use serde::Serialize;

/// `…/power-state`, retained.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerState<'a> {
    pub device_id: &'a str,
    pub state: &'static str,
    /// Milliseconds since boot.
    pub timestamp: u64,
}

impl<'a> PowerState<'a> {
    pub fn new(device_id: &'a str, on: bool, timestamp: u64) -> Self {
        Self {
            device_id,
            state: if on { "ON" } else { "OFF" },
            timestamp,
        }
    }
}

/// `…/relay-timer`, sent while a session runs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayTimer<'a> {
    pub device_id: &'a str,
    pub elapsed: u32,
    pub remaining: u32,
    pub max_time: u32,
    pub timestamp: u64,
}

/// `…/temperature`, retained.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Temperature<'a> {
    pub device_id: &'a str,
    pub temperature: f32,
    pub uptime: u64,
}

/// `…/healthcheck` on the status branch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Healthcheck<'a> {
    pub device_id: &'a str,
    pub uptime: u64,
    pub free_heap: u32,
}

/// Serialise a payload. Encoding plain structs cannot fail in practice,
/// so an error only yields an empty body that the transport drops.
pub fn encode<T: Serialize>(payload: &T) -> Vec<u8> {
    serde_json::to_vec(payload).unwrap_or_default()
}
