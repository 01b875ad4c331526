//! Station network worker.
//!
//! Joins the stored network and reports milestones as events:
//!
//! | Situation                           | Event            |
//! |-------------------------------------|------------------|
//! | No SSID stored                      | `NoCredentials`  |
//! | Join succeeded                      | `NetworkGained`  |
//! | Join failed or timed out            | `NetworkFailed`  |
//! | Link dropped while connected        | `NetworkLost`    |
//! | Still connected, mode `Connecting`  | `NetworkGained`  |
//!
//! The last row re-announces a link the coordinator may have missed, for
//! example after leaving the portal with the station already up.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use super::Task;
use crate::adapters::wifi::{SharedRadio, lock_radio};
use crate::app::ports::{Clock, CredentialKey, PersistencePort};
use crate::config::SystemConfig;
use crate::drivers::task_pin::{Core, TaskSpec};
use crate::events::{Event, EventChannel};
use crate::fsm::{ModeCell, SystemMode};

pub const TASK: TaskSpec = TaskSpec::new("network\0", Core::Pro, 4, 8);

pub struct NetworkTask {
    radio: SharedRadio,
    store: Arc<dyn PersistencePort>,
    clock: Arc<dyn Clock>,
    events: &'static EventChannel,
    mode: &'static ModeCell,
    join_timeout: Duration,
    retry: Duration,
    was_connected: bool,
    last_announce_ms: Option<u64>,
}

impl NetworkTask {
    pub fn new(
        radio: SharedRadio,
        store: Arc<dyn PersistencePort>,
        clock: Arc<dyn Clock>,
        events: &'static EventChannel,
        mode: &'static ModeCell,
        config: &SystemConfig,
    ) -> Self {
        Self {
            radio,
            store,
            clock,
            events,
            mode,
            join_timeout: Duration::from_millis(u64::from(config.network_timeout_ms)),
            retry: Duration::from_millis(u64::from(config.network_retry_ms)),
            was_connected: false,
            last_announce_ms: None,
        }
    }

    fn announce_due(&self, now: u64) -> bool {
        self.last_announce_ms
            .is_none_or(|last| now.saturating_sub(last) >= self.retry.as_millis() as u64)
    }

    fn join(&mut self) {
        let Some(ssid) = self
            .store
            .get_credential(CredentialKey::WifiSsid)
            .filter(|s| !s.is_empty())
        else {
            warn!("Network: no stored credentials");
            self.events.post(Event::NoCredentials);
            return;
        };
        let password = self
            .store
            .get_credential(CredentialKey::WifiPassword)
            .unwrap_or_default();

        let result = lock_radio(&self.radio).connect(&ssid, &password, self.join_timeout);
        match result {
            Ok(()) => {
                info!("Network: joined '{}'", ssid);
                self.was_connected = true;
                self.last_announce_ms = Some(self.clock.now_ms());
                self.events.post(Event::NetworkGained);
            }
            Err(e) => {
                warn!("Network: join '{}' failed: {}", ssid, e);
                self.events.post(Event::NetworkFailed);
            }
        }
    }
}

impl Task for NetworkTask {
    fn step(&mut self) -> Duration {
        let connected = lock_radio(&self.radio).is_connected();

        if connected {
            self.was_connected = true;
            let now = self.clock.now_ms();
            if self.mode.get() == SystemMode::Connecting && self.announce_due(now) {
                self.last_announce_ms = Some(now);
                self.events.post(Event::NetworkGained);
            }
            return self.retry;
        }

        if self.was_connected {
            warn!("Network: link lost");
            self.was_connected = false;
            self.events.post(Event::NetworkLost);
        }
        self.join();
        self.retry
    }
}
