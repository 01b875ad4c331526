//! Water temperature sensing.
//!
//! ```text
//!   Probe ──sample()──▶ sensor worker ──store()──▶ ReadingCache ──▶ relay supervisor
//!                             │                                 └─▶ display worker
//!                             └──▶ FaultAlarm ──▶ buzzer
//! ```
//!
//! The sensor worker is the only writer of the [`ReadingCache`]; every
//! other component reads the latest value through [`SensorPort`].

pub mod temperature;

use std::sync::{Mutex, PoisonError};

use crate::app::ports::{FAULT_SENTINEL, SensorPort, is_fault};
use crate::config::SystemConfig;

/// A source of raw temperature samples.
pub trait Probe: Send {
    /// °C, or [`FAULT_SENTINEL`] when the probe cannot be read.
    fn sample(&mut self) -> f32;
}

// ── Latest-reading cache ──────────────────────────────────────

/// Single-value cache of the most recent reading.
///
/// Starts at the fault sentinel so nothing acts on a temperature before
/// the first sample lands.
pub struct ReadingCache {
    latest: Mutex<f32>,
}

impl ReadingCache {
    pub const fn new() -> Self {
        Self {
            latest: Mutex::new(FAULT_SENTINEL),
        }
    }

    pub fn store(&self, reading: f32) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = reading;
    }
}

impl Default for ReadingCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorPort for ReadingCache {
    fn latest_reading(&self) -> f32 {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Fault alarm rate limiter ──────────────────────────────────

/// Decides when a faulty probe earns an audible alarm.
///
/// At most `limit` alarms, each at least `spacing_ms` after the previous
/// one. The count resets once a valid reading arrives more than
/// `reset_ms` after the last alarm.
#[derive(Debug, Clone)]
pub struct FaultAlarm {
    limit: u8,
    spacing_ms: u64,
    reset_ms: u64,
    count: u8,
    last_alarm_ms: Option<u64>,
}

impl FaultAlarm {
    pub fn new(limit: u8, spacing_ms: u32, reset_ms: u32) -> Self {
        Self {
            limit,
            spacing_ms: u64::from(spacing_ms),
            reset_ms: u64::from(reset_ms),
            count: 0,
            last_alarm_ms: None,
        }
    }

    pub fn from_config(config: &SystemConfig) -> Self {
        Self::new(
            config.fault_alarm_limit,
            config.fault_alarm_spacing_ms,
            config.fault_alarm_reset_ms,
        )
    }

    /// Alarms raised since the last reset.
    pub fn count(&self) -> u8 {
        self.count
    }

    /// Feed one reading taken at `now_ms`. Returns `true` when the caller
    /// should sound the alarm now.
    pub fn observe(&mut self, now_ms: u64, reading: f32) -> bool {
        if is_fault(reading) {
            if self.count >= self.limit {
                return false;
            }
            let spaced = self
                .last_alarm_ms
                .is_none_or(|last| now_ms.saturating_sub(last) > self.spacing_ms);
            if spaced {
                self.count += 1;
                self.last_alarm_ms = Some(now_ms);
            }
            return spaced;
        }

        if let Some(last) = self.last_alarm_ms {
            if now_ms.saturating_sub(last) > self.reset_ms {
                self.count = 0;
                self.last_alarm_ms = None;
            }
        }
        false
    }
}
