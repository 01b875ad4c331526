//! Configuration portal worker.
//!
//! ```text
//!   open AP ──▶ PortalStarted
//!      │
//!      ▼  poll every 200 ms
//!   submission ──invalid──▶ PortalFailed
//!      │ valid
//!      ▼
//!   persist ssid/password ──▶ PortalSaved
//!      │
//!      ▼
//!   join (closes AP) ──▶ PortalStopped, then NetworkGained | PortalFailed
//! ```
//!
//! A failed join reopens the access point on the next step. Suspending
//! the worker closes it.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};

use super::Task;
use crate::adapters::wifi::{SharedRadio, lock_radio, validate_credentials};
use crate::app::ports::{CredentialKey, PersistencePort, PortalSubmission};
use crate::config::{PORTAL_SSID, SystemConfig};
use crate::drivers::task_pin::{Core, TaskSpec};
use crate::error::StorageError;
use crate::events::{Event, EventChannel};

pub const TASK: TaskSpec = TaskSpec::new("portal\0", Core::Pro, 3, 8);

const POLL: Duration = Duration::from_millis(200);

pub struct PortalTask {
    radio: SharedRadio,
    store: Arc<dyn PersistencePort>,
    events: &'static EventChannel,
    join_timeout: Duration,
    retry: Duration,
    open: bool,
}

impl PortalTask {
    pub fn new(
        radio: SharedRadio,
        store: Arc<dyn PersistencePort>,
        events: &'static EventChannel,
        config: &SystemConfig,
    ) -> Self {
        Self {
            radio,
            store,
            events,
            join_timeout: Duration::from_millis(u64::from(config.network_timeout_ms)),
            retry: Duration::from_millis(u64::from(config.network_retry_ms)),
            open: false,
        }
    }

    fn persist(&self, sub: &PortalSubmission) -> Result<(), StorageError> {
        self.store
            .set_credential(CredentialKey::WifiSsid, &sub.ssid)?;
        self.store
            .set_credential(CredentialKey::WifiPassword, &sub.password)
    }

    fn close(&mut self) {
        self.open = false;
        self.events.post(Event::PortalStopped);
    }

    fn handle(&mut self, sub: PortalSubmission) {
        if let Err(e) = validate_credentials(&sub.ssid, &sub.password) {
            warn!("Portal: submission rejected: {}", e);
            self.events.post(Event::PortalFailed);
            return;
        }
        if let Err(e) = self.persist(&sub) {
            error!("Portal: saving credentials failed: {}", e);
            self.events.post(Event::PortalFailed);
            return;
        }
        info!("Portal: credentials for '{}' saved", sub.ssid);
        self.events.post(Event::PortalSaved);

        let result = lock_radio(&self.radio).connect(&sub.ssid, &sub.password, self.join_timeout);
        // Joining takes the radio out of access-point mode.
        self.close();
        match result {
            Ok(()) => {
                info!("Portal: joined '{}'", sub.ssid);
                self.events.post(Event::NetworkGained);
            }
            Err(e) => {
                warn!("Portal: join failed: {}", e);
                self.events.post(Event::PortalFailed);
            }
        }
    }
}

impl Task for PortalTask {
    fn step(&mut self) -> Duration {
        if !self.open {
            match lock_radio(&self.radio).start_portal(PORTAL_SSID) {
                Ok(()) => {
                    self.open = true;
                    info!("Portal: waiting for credentials on '{}'", PORTAL_SSID);
                    self.events.post(Event::PortalStarted);
                }
                Err(e) => {
                    error!("Portal: access point failed: {}", e);
                    self.events.post(Event::PortalFailed);
                    return self.retry;
                }
            }
        }

        let submission = lock_radio(&self.radio).poll_portal();
        if let Some(sub) = submission {
            self.handle(sub);
        }
        POLL
    }

    fn on_suspend(&mut self) {
        if self.open {
            lock_radio(&self.radio).stop_portal();
            self.close();
        }
    }
}
