//! Broker topic names.
//!
//! ```text
//!   mica/dev/{purpose}/{class}/{device-id}/{leaf}
//!
//!   purpose = telemetry | command | status
//! ```
//!
//! All topics for one device are rendered once at boot into fixed-size
//! strings so nothing on the hot path formats.

use core::fmt::Write;

use crate::config::MAX_TOPIC_LEN;

pub type Topic = heapless::String<MAX_TOPIC_LEN>;

const ROOT: &str = "mica/dev";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Telemetry,
    Command,
    Status,
}

impl Purpose {
    const fn segment(self) -> &'static str {
        match self {
            Self::Telemetry => "telemetry",
            Self::Command => "command",
            Self::Status => "status",
        }
    }
}

/// Render one topic. `None` if it would not fit in [`MAX_TOPIC_LEN`].
pub fn topic(purpose: Purpose, class: &str, device_id: &str, leaf: &str) -> Option<Topic> {
    let mut t = Topic::new();
    write!(t, "{ROOT}/{}/{class}/{device_id}/{leaf}", purpose.segment()).ok()?;
    Some(t)
}

/// Every topic one device publishes to or subscribes on.
#[derive(Debug, Clone)]
pub struct Topics {
    pub power_state: Topic,
    pub relay_timer: Topic,
    pub temperature: Topic,
    pub healthcheck: Topic,
    pub cmd_max_temperature: Topic,
    pub cmd_max_time: Topic,
    pub cmd_power_state: Topic,
    pub cmd_ota: Topic,
}

impl Topics {
    pub fn new(class: &str, device_id: &str) -> Option<Self> {
        use Purpose::{Command, Status, Telemetry};
        Some(Self {
            power_state: topic(Telemetry, class, device_id, "power-state")?,
            relay_timer: topic(Telemetry, class, device_id, "relay-timer")?,
            temperature: topic(Telemetry, class, device_id, "temperature")?,
            healthcheck: topic(Status, class, device_id, "healthcheck")?,
            cmd_max_temperature: topic(Command, class, device_id, "max-temperature")?,
            cmd_max_time: topic(Command, class, device_id, "max-time")?,
            cmd_power_state: topic(Command, class, device_id, "power-state")?,
            cmd_ota: topic(Command, class, device_id, "ota")?,
        })
    }
}
