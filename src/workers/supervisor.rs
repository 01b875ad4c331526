//! Relay supervisor: ticks the relay controller so the session ceilings
//! are enforced even while the network is down.

use std::sync::Arc;
use std::time::Duration;

use super::Task;
use crate::config::SystemConfig;
use crate::drivers::task_pin::{Core, TaskSpec};
use crate::drivers::watchdog::Watchdog;
use crate::relay::RelayController;

pub const TASK: TaskSpec = TaskSpec::new("relay\0", Core::App, 5, 4);

pub struct RelaySupervisor {
    relay: Arc<RelayController>,
    period: Duration,
    /// Subscribed from the worker thread on the first step.
    watchdog: Option<Watchdog>,
}

impl RelaySupervisor {
    pub fn new(relay: Arc<RelayController>, config: &SystemConfig) -> Self {
        Self {
            relay,
            period: Duration::from_millis(u64::from(config.relay_period_ms)),
            watchdog: None,
        }
    }
}

impl Task for RelaySupervisor {
    fn step(&mut self) -> Duration {
        self.watchdog.get_or_insert_with(Watchdog::new).feed();
        self.relay.tick();
        self.period
    }
}
