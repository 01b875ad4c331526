//! Per-activation session data and ceiling loading.

use crate::app::ports::{NumberKey, PersistencePort};

use super::RelaySettings;

/// Limits for one session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ceilings {
    pub max_run_secs: u32,
    pub max_temperature_c: f32,
}

/// Read both ceilings, substituting defaults for absent or unusable values.
pub fn load_ceilings(store: &dyn PersistencePort, settings: &RelaySettings) -> Ceilings {
    let max_run_secs = store
        .get_number(NumberKey::MaxRunSecs)
        .filter(|v| v.is_finite() && *v >= 1.0)
        .map_or(settings.default_max_run_secs, |v| v as u32);
    let max_temperature_c = store
        .get_number(NumberKey::MaxTemperature)
        .filter(|v| v.is_finite())
        .unwrap_or(settings.default_max_temperature_c);
    Ceilings {
        max_run_secs,
        max_temperature_c,
    }
}

/// Valid only while the relay is on.
#[derive(Debug)]
pub(super) struct Session {
    pub started_ms: u64,
    /// Loaded on the first supervisory tick.
    pub ceilings: Option<Ceilings>,
    pub last_status_mark: Option<u32>,
}

impl Session {
    pub fn new(started_ms: u64) -> Self {
        Self {
            started_ms,
            ceilings: None,
            last_status_mark: None,
        }
    }

    /// Interval marker to publish under, if it advanced since the last one.
    /// The first status goes out one full interval into the session.
    pub fn status_due(&self, elapsed_secs: u32, interval_secs: u32) -> Option<u32> {
        if interval_secs == 0 {
            return None;
        }
        let mark = elapsed_secs / interval_secs;
        (mark > 0 && self.last_status_mark != Some(mark)).then_some(mark)
    }
}
