//! Broker workers.
//!
//! Two tasks, run in different modes:
//!
//! - [`BrokerSessionTask`] (`ConfiguringBroker`): makes sure an endpoint
//!   credential exists, from storage or the provisioning port, and posts
//!   `CredentialsAcquired`.
//! - [`BrokerTransportTask`] (`ConnectedNetwork`, `ConnectedBroker`):
//!   opens the session, watches it, and publishes the healthcheck.
//!
//! ```text
//!   endpoint? ──no──▶ ProvisioningPort ──▶ store ──▶ CredentialsAcquired
//!
//!   connected? ──no──▶ connect x3 (2 s apart) ──▶ BrokerGained | BrokerLost
//!       │yes
//!       ├──▶ mode == ConnectedNetwork ──▶ BrokerGained (re-announce)
//!       └──▶ every 60 s ──▶ healthcheck
//! ```

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};

use super::Task;
use crate::adapters::device_id::DeviceIdString;
use crate::app::ports::{
    BrokerLink, Clock, CredentialKey, PersistencePort, ProvisioningPort, SystemPort,
    TransportPort,
};
use crate::app::telemetry::{self, Healthcheck};
use crate::app::topics::Topic;
use crate::config::SystemConfig;
use crate::drivers::task_pin::{Core, TaskSpec};
use crate::events::{Event, EventChannel};
use crate::fsm::{ModeCell, SystemMode};

pub const SESSION_TASK: TaskSpec = TaskSpec::new("broker-session\0", Core::Pro, 3, 10);
pub const TRANSPORT_TASK: TaskSpec = TaskSpec::new("broker-link\0", Core::Pro, 4, 8);

/// Session watch interval while connected.
const WATCH: Duration = Duration::from_millis(1000);

fn stored_endpoint(store: &dyn PersistencePort) -> Option<String> {
    store
        .get_credential(CredentialKey::BrokerEndpoint)
        .filter(|e| !e.is_empty())
}

// ── Session credentials ──────────────────────────────────────

pub struct BrokerSessionTask {
    store: Arc<dyn PersistencePort>,
    provisioner: Arc<dyn ProvisioningPort>,
    events: &'static EventChannel,
    device_id: DeviceIdString,
    retry: Duration,
    /// `CredentialsAcquired` already posted since the last resume.
    announced: bool,
}

impl BrokerSessionTask {
    pub fn new(
        store: Arc<dyn PersistencePort>,
        provisioner: Arc<dyn ProvisioningPort>,
        events: &'static EventChannel,
        device_id: DeviceIdString,
        config: &SystemConfig,
    ) -> Self {
        Self {
            store,
            provisioner,
            events,
            device_id,
            retry: Duration::from_millis(u64::from(config.network_retry_ms)),
            announced: false,
        }
    }

    fn announce(&mut self) {
        if !self.announced {
            self.announced = true;
            self.events.post(Event::CredentialsAcquired);
        }
    }
}

impl Task for BrokerSessionTask {
    fn step(&mut self) -> Duration {
        if stored_endpoint(self.store.as_ref()).is_some() {
            if !self.announced {
                debug!("Broker: endpoint loaded from storage");
            }
            self.announce();
            return self.retry;
        }

        info!("Broker: no endpoint stored, provisioning");
        match self.provisioner.fetch_broker_endpoint(&self.device_id) {
            Ok(endpoint) => match self
                .store
                .set_credential(CredentialKey::BrokerEndpoint, &endpoint)
            {
                Ok(()) => {
                    info!("Broker: endpoint provisioned");
                    self.announce();
                }
                Err(e) => error!("Broker: storing endpoint failed: {}", e),
            },
            Err(e) => warn!("Broker: provisioning failed: {}", e),
        }
        self.retry
    }

    fn on_resume(&mut self) {
        self.announced = false;
    }
}

// ── Session link ─────────────────────────────────────────────

pub struct BrokerTransportDeps {
    pub link: Arc<dyn BrokerLink>,
    pub transport: Arc<dyn TransportPort>,
    pub store: Arc<dyn PersistencePort>,
    pub system: Arc<dyn SystemPort>,
    pub clock: Arc<dyn Clock>,
    pub events: &'static EventChannel,
    pub mode: &'static ModeCell,
}

pub struct BrokerTransportTask {
    deps: BrokerTransportDeps,
    device_id: DeviceIdString,
    healthcheck_topic: Topic,
    attempts: u8,
    spacing: Duration,
    retry: Duration,
    healthcheck_ms: u64,
    was_connected: bool,
    /// `BrokerLost` posted and no session opened since.
    lost_reported: bool,
    last_announce_ms: Option<u64>,
    last_health_ms: Option<u64>,
}

impl BrokerTransportTask {
    pub fn new(
        deps: BrokerTransportDeps,
        device_id: DeviceIdString,
        healthcheck_topic: Topic,
        config: &SystemConfig,
    ) -> Self {
        Self {
            deps,
            device_id,
            healthcheck_topic,
            attempts: config.broker_connect_attempts.max(1),
            spacing: Duration::from_millis(u64::from(config.broker_retry_ms)),
            retry: Duration::from_millis(u64::from(config.network_retry_ms)),
            healthcheck_ms: u64::from(config.healthcheck_interval_secs) * 1000,
            was_connected: false,
            lost_reported: false,
            last_announce_ms: None,
            last_health_ms: None,
        }
    }

    fn report_lost(&mut self) {
        if !self.lost_reported {
            self.lost_reported = true;
            self.deps.events.post(Event::BrokerLost);
        }
    }

    fn due(last: Option<u64>, now: u64, interval_ms: u64) -> bool {
        last.is_none_or(|t| now.saturating_sub(t) >= interval_ms)
    }

    fn publish_healthcheck(&mut self, now: u64) {
        self.last_health_ms = Some(now);
        let body = telemetry::encode(&Healthcheck {
            device_id: &self.device_id,
            uptime: now,
            free_heap: self.deps.system.free_heap(),
        });
        match self
            .deps
            .transport
            .publish(&self.healthcheck_topic, &body, false)
        {
            Ok(()) => debug!("Broker: healthcheck queued"),
            Err(e) => warn!("Broker: healthcheck dropped: {}", e),
        }
    }

    /// Up to `attempts` connects, `spacing` apart.
    fn open_session(&mut self, endpoint: &str) -> bool {
        for attempt in 1..=self.attempts {
            match self.deps.link.connect(endpoint, &self.device_id) {
                Ok(()) => return true,
                Err(e) => {
                    warn!(
                        "Broker: connect attempt {}/{} failed: {}",
                        attempt, self.attempts, e
                    );
                    if attempt < self.attempts {
                        std::thread::sleep(self.spacing);
                    }
                }
            }
        }
        false
    }
}

impl Task for BrokerTransportTask {
    fn step(&mut self) -> Duration {
        let now = self.deps.clock.now_ms();

        if self.deps.transport.is_connected() {
            self.was_connected = true;
            if self.deps.mode.get() == SystemMode::ConnectedNetwork
                && Self::due(self.last_announce_ms, now, self.retry.as_millis() as u64)
            {
                self.last_announce_ms = Some(now);
                self.deps.events.post(Event::BrokerGained);
            }
            if Self::due(self.last_health_ms, now, self.healthcheck_ms) {
                self.publish_healthcheck(now);
            }
            return WATCH;
        }

        if self.was_connected {
            warn!("Broker: session lost");
            self.was_connected = false;
            self.report_lost();
        }

        let Some(endpoint) = stored_endpoint(self.deps.store.as_ref()) else {
            warn!("Broker: no endpoint stored");
            self.report_lost();
            return self.retry;
        };

        if self.open_session(&endpoint) {
            info!("Broker: session up");
            let now = self.deps.clock.now_ms();
            self.was_connected = true;
            self.lost_reported = false;
            self.last_announce_ms = Some(now);
            self.deps.events.post(Event::BrokerGained);
            self.publish_healthcheck(now);
            WATCH
        } else {
            self.report_lost();
            self.retry
        }
    }
}
