//! Relay safety controller.
//!
//! The only writer of the relay pin. Callers switch it with
//! [`RelayController::activate`] / [`RelayController::deactivate`]; a
//! supervisor thread calls [`RelayController::tick`] once a second to
//! enforce the session ceilings.
//!
//! ```text
//!            activate()                 elapsed >= max run
//!   ┌──────┐ ─────────▶ ┌─────────┐ ──────────────────────▶ ┌────────────────┐
//!   │ Idle │            │ Running │                         │ StoppedTimeout │──┐
//!   └──────┘ ◀───────── └─────────┘ ──────────────────────▶ └────────────────┘  │
//!      ▲     deactivate()     │       reading > max temp    ┌──────────────────┐ │
//!      │                      └───────────────────────────▶ │ StoppedTarget    │ │
//!      │                                                    │ Reached          │ │
//!      │        feedback x2, post RelayAutoStopped          └──────────────────┘ │
//!      └─────────────────────────────────────────────────────────────┴──────────┘
//! ```
//!
//! Ceilings are read from persistence lazily, on the first tick of a
//! session, and held until the session ends. A missing or NaN value falls
//! back to the configured default.

mod session;

pub use session::{Ceilings, load_ceilings};

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};

use crate::adapters::device_id::DeviceIdString;
use crate::app::ports::{
    BuzzerPort, Clock, PersistencePort, RelayOutput, SensorPort, TransportPort, Tune, is_fault,
};
use crate::app::telemetry::{self, PowerState, RelayTimer};
use crate::app::topics::{Topic, Topics};
use crate::config::SystemConfig;
use crate::error::RelayError;
use crate::events::{Event, EventChannel};
use session::Session;

/// Times each feedback tune is played.
pub const FEEDBACK_REPETITIONS: u32 = 2;
/// Pause between feedback repetitions (ms).
pub const FEEDBACK_PAUSE_MS: u32 = 500;

/// Why the relay was switched off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonOff {
    Manual,
    Timeout,
    Temperature,
    Command,
    Button,
}

impl fmt::Display for ReasonOff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Manual => "manual",
            Self::Timeout => "timeout",
            Self::Temperature => "temperature",
            Self::Command => "command",
            Self::Button => "button",
        })
    }
}

/// Supervisor view of the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayPhase {
    Idle,
    Running,
    StoppedTimeout,
    StoppedTargetReached,
}

impl RelayPhase {
    const fn feedback(self) -> Option<Tune> {
        match self {
            Self::StoppedTimeout => Some(Tune::Timeout),
            Self::StoppedTargetReached => Some(Tune::TargetReached),
            Self::Idle | Self::Running => None,
        }
    }
}

/// Fixed settings for one controller.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub device_id: DeviceIdString,
    pub power_topic: Topic,
    pub timer_topic: Topic,
    pub default_max_run_secs: u32,
    pub default_max_temperature_c: f32,
    /// Relay-timer telemetry interval, 0 disables it.
    pub status_interval_secs: u32,
}

impl RelaySettings {
    pub fn new(config: &SystemConfig, topics: &Topics, device_id: DeviceIdString) -> Self {
        Self {
            device_id,
            power_topic: topics.power_state.clone(),
            timer_topic: topics.relay_timer.clone(),
            default_max_run_secs: config.default_max_run_secs,
            default_max_temperature_c: config.default_max_temperature_c,
            status_interval_secs: config.status_interval_secs,
        }
    }
}

/// Collaborators the controller talks to.
pub struct RelayPorts {
    pub output: Box<dyn RelayOutput>,
    pub transport: Arc<dyn TransportPort>,
    pub store: Arc<dyn PersistencePort>,
    pub sensor: Arc<dyn SensorPort>,
    pub buzzer: Arc<dyn BuzzerPort>,
    pub clock: Arc<dyn Clock>,
    pub events: &'static EventChannel,
}

struct RelayInner {
    output: Box<dyn RelayOutput>,
    session: Option<Session>,
    phase: RelayPhase,
}

pub struct RelayController {
    inner: Mutex<RelayInner>,
    /// Mirror of `inner.session.is_some()` for lock-free reads.
    active: AtomicBool,
    transport: Arc<dyn TransportPort>,
    store: Arc<dyn PersistencePort>,
    sensor: Arc<dyn SensorPort>,
    buzzer: Arc<dyn BuzzerPort>,
    clock: Arc<dyn Clock>,
    events: &'static EventChannel,
    settings: RelaySettings,
}

impl RelayController {
    pub fn new(ports: RelayPorts, settings: RelaySettings) -> Self {
        Self {
            inner: Mutex::new(RelayInner {
                output: ports.output,
                session: None,
                phase: RelayPhase::Idle,
            }),
            active: AtomicBool::new(false),
            transport: ports.transport,
            store: ports.store,
            sensor: ports.sensor,
            buzzer: ports.buzzer,
            clock: ports.clock,
            events: ports.events,
            settings,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RelayInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drive the pin low at boot without publishing anything.
    pub fn force_off_at_boot(&self) -> Result<(), RelayError> {
        self.lock().output.set(false)
    }

    /// Switch the relay on and start a session. No-op if already on.
    pub fn activate(&self) -> Result<(), RelayError> {
        let mut inner = self.lock();
        if inner.session.is_some() {
            debug!("Relay: already on");
            return Ok(());
        }
        inner.output.set(true)?;
        let now = self.clock.now_ms();
        inner.session = Some(Session::new(now));
        inner.phase = RelayPhase::Running;
        self.active.store(true, Ordering::Release);
        self.publish_power(true, now);
        info!("Relay ON");
        Ok(())
    }

    /// Switch the relay off and end the session. No-op if already off.
    pub fn deactivate(&self, reason: ReasonOff) -> Result<(), RelayError> {
        let mut inner = self.lock();
        self.switch_off(&mut inner, reason).map(|_| ())
    }

    /// Non-blocking state read.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> RelayPhase {
        self.lock().phase
    }

    /// Ceilings of the running session, once loaded.
    pub fn session_ceilings(&self) -> Option<Ceilings> {
        self.lock().session.as_ref().and_then(|s| s.ceilings)
    }

    /// Ceilings a session started now would use.
    pub fn configured_ceilings(&self) -> Ceilings {
        load_ceilings(self.store.as_ref(), &self.settings)
    }

    /// One supervisory step. Returns the phase this step ended in; a
    /// `Stopped*` value means this step ended the session.
    pub fn tick(&self) -> RelayPhase {
        let stopped = {
            let mut inner = self.lock();
            let now = self.clock.now_ms();
            let Some(session) = inner.session.as_mut() else {
                inner.phase = RelayPhase::Idle;
                return RelayPhase::Idle;
            };

            let ceilings = *session
                .ceilings
                .get_or_insert_with(|| load_ceilings(self.store.as_ref(), &self.settings));
            let elapsed_ms = now.saturating_sub(session.started_ms);
            let elapsed_secs = (elapsed_ms / 1000) as u32;

            if let Some(mark) = session.status_due(elapsed_secs, self.settings.status_interval_secs)
            {
                self.publish_timer(elapsed_secs, ceilings, now);
                session.last_status_mark = Some(mark);
            }

            let verdict = if elapsed_ms >= u64::from(ceilings.max_run_secs) * 1000 {
                Some((RelayPhase::StoppedTimeout, ReasonOff::Timeout))
            } else {
                let reading = self.sensor.latest_reading();
                (!is_fault(reading) && reading > ceilings.max_temperature_c).then_some((
                    RelayPhase::StoppedTargetReached,
                    ReasonOff::Temperature,
                ))
            };

            let Some((phase, reason)) = verdict else {
                return RelayPhase::Running;
            };
            if let Err(e) = self.switch_off(&mut inner, reason) {
                error!("Relay: auto-stop ({}) failed: {}", reason, e);
                return RelayPhase::Running;
            }
            inner.phase = phase;
            phase
        };

        if let Some(tune) = stopped.feedback() {
            self.play_feedback(tune);
        }
        self.events.post(Event::RelayAutoStopped);

        let mut inner = self.lock();
        if inner.phase == stopped {
            inner.phase = RelayPhase::Idle;
        }
        stopped
    }

    /// Returns whether the relay was on.
    fn switch_off(&self, inner: &mut RelayInner, reason: ReasonOff) -> Result<bool, RelayError> {
        if inner.session.is_none() {
            debug!("Relay: already off ({})", reason);
            return Ok(false);
        }
        inner.output.set(false)?;
        inner.session = None;
        inner.phase = RelayPhase::Idle;
        self.active.store(false, Ordering::Release);
        self.publish_power(false, self.clock.now_ms());
        info!("Relay OFF, reason: {}", reason);
        Ok(true)
    }

    fn play_feedback(&self, tune: Tune) {
        for rep in 0..FEEDBACK_REPETITIONS {
            if rep > 0 {
                self.buzzer.rest(FEEDBACK_PAUSE_MS);
            }
            self.buzzer.play(tune);
        }
    }

    fn publish_power(&self, on: bool, now: u64) {
        let body = telemetry::encode(&PowerState::new(&self.settings.device_id, on, now));
        if let Err(e) = self.transport.publish(&self.settings.power_topic, &body, true) {
            warn!("Relay: power-state publish failed: {}", e);
        }
    }

    fn publish_timer(&self, elapsed_secs: u32, ceilings: Ceilings, now: u64) {
        let body = telemetry::encode(&RelayTimer {
            device_id: &self.settings.device_id,
            elapsed: elapsed_secs,
            remaining: ceilings.max_run_secs.saturating_sub(elapsed_secs),
            max_time: ceilings.max_run_secs,
            timestamp: now,
        });
        if let Err(e) = self.transport.publish(&self.settings.timer_topic, &body, false) {
            debug!("Relay: timer publish dropped: {}", e);
        }
    }
}
