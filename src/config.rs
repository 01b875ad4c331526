//! System configuration parameters
//!
//! All tunable timing and limit values for the recirculator. The struct is
//! persisted as a postcard blob; fixed buffer sizes are plain constants.

use serde::{Deserialize, Serialize};

// ── Compile-time limits ───────────────────────────────────────

/// Maximum broker topic length in bytes.
pub const MAX_TOPIC_LEN: usize = 128;
/// Maximum broker payload length in bytes.
pub const MAX_PAYLOAD_LEN: usize = 512;
/// Depth of the outbound publish queue.
pub const PUBLISH_QUEUE_DEPTH: usize = 20;
/// Depth of the inbound message queue.
pub const INBOUND_QUEUE_DEPTH: usize = 8;
/// Maximum number of exact-match subscriptions.
pub const MAX_SUBSCRIPTIONS: usize = 10;
/// Maximum stored credential length in bytes.
pub const MAX_CREDENTIAL_LEN: usize = 64;
/// Accepted range for the `max-time` command, in seconds.
pub const MAX_TIME_RANGE_SECS: core::ops::RangeInclusive<u32> = 1..=3600;

/// Device class used in every topic.
pub const DEVICE_CLASS: &str = "recirculator";
/// Access-point name opened by the configuration portal.
pub const PORTAL_SSID: &str = "MICA-Recirculator";

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Coordinator ---
    /// Bounded wait for pending events per cycle (ms)
    pub event_wait_ms: u32,
    /// Pause between coordinator cycles (ms)
    pub coordinator_period_ms: u32,
    /// Delay before restarting out of the fatal-error mode (ms)
    pub fatal_grace_ms: u32,

    // --- Relay ---
    /// Supervisory tick period (ms)
    pub relay_period_ms: u32,
    /// Run ceiling when none is stored (s)
    pub default_max_run_secs: u32,
    /// Temperature ceiling when none is stored (°C)
    pub default_max_temperature_c: f32,
    /// Relay-timer telemetry interval (s), 0 disables it
    pub status_interval_secs: u32,

    // --- Sensor ---
    /// Probe sample interval (ms)
    pub sensor_period_ms: u32,
    /// Alarms allowed per quiet window
    pub fault_alarm_limit: u8,
    /// Minimum spacing between alarms (ms)
    pub fault_alarm_spacing_ms: u32,
    /// Fault-free time after which the alarm count resets (ms)
    pub fault_alarm_reset_ms: u32,

    // --- Connectivity ---
    /// Station connect timeout (ms)
    pub network_timeout_ms: u32,
    /// Retry / re-announce interval for the network worker (ms)
    pub network_retry_ms: u32,
    /// Broker connect attempts per cycle
    pub broker_connect_attempts: u8,
    /// Spacing between broker connect attempts (ms)
    pub broker_retry_ms: u32,
    /// Healthcheck publish interval (s)
    pub healthcheck_interval_secs: u32,

    // --- Input ---
    /// Button poll interval (ms)
    pub button_poll_ms: u32,
    /// Debounce window (ms)
    pub debounce_ms: u32,
    /// Hold time that counts as a long press (ms)
    pub long_press_ms: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            event_wait_ms: 50,
            coordinator_period_ms: 100,
            fatal_grace_ms: 5000,

            relay_period_ms: 1000,
            default_max_run_secs: 120,
            default_max_temperature_c: 30.0,
            status_interval_secs: 5,

            sensor_period_ms: 5000,
            fault_alarm_limit: 3,
            fault_alarm_spacing_ms: 60_000,
            fault_alarm_reset_ms: 300_000,

            network_timeout_ms: 15_000,
            network_retry_ms: 5000,
            broker_connect_attempts: 3,
            broker_retry_ms: 2000,
            healthcheck_interval_secs: 60,

            button_poll_ms: 50,
            debounce_ms: 50,
            long_press_ms: 5000,
        }
    }
}

impl SystemConfig {
    /// Reject values that would stall a loop or disable a safety ceiling.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.coordinator_period_ms == 0 || self.relay_period_ms == 0 {
            return Err("loop periods must be non-zero");
        }
        if self.sensor_period_ms == 0 || self.button_poll_ms == 0 {
            return Err("poll periods must be non-zero");
        }
        if !MAX_TIME_RANGE_SECS.contains(&self.default_max_run_secs) {
            return Err("default run ceiling out of range");
        }
        if !self.default_max_temperature_c.is_finite() {
            return Err("default temperature ceiling must be finite");
        }
        if self.long_press_ms <= self.debounce_ms {
            return Err("long press must outlast debounce");
        }
        if self.broker_connect_attempts == 0 {
            return Err("at least one broker attempt required");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(SystemConfig::default().validate(), Ok(()));
    }

    #[test]
    fn zero_period_rejected() {
        let c = SystemConfig {
            relay_period_ms: 0,
            ..SystemConfig::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn nan_temperature_rejected() {
        let c = SystemConfig {
            default_max_temperature_c: f32::NAN,
            ..SystemConfig::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn run_ceiling_outside_command_range_rejected() {
        let c = SystemConfig {
            default_max_run_secs: 7200,
            ..SystemConfig::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn timing_ratios_make_sense() {
        let c = SystemConfig::default();
        assert!(c.event_wait_ms < c.coordinator_period_ms);
        assert!(c.coordinator_period_ms < c.relay_period_ms);
        assert!(c.relay_period_ms < c.sensor_period_ms);
    }

    #[test]
    fn postcard_roundtrip() {
        let c = SystemConfig::default();
        let bytes = postcard::to_allocvec(&c).unwrap();
        let c2: SystemConfig = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(c, c2);
    }
}
