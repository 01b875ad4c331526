//! The state coordinator: sole writer of the system mode and sole holder
//! of the worker suspend/resume right.
//!
//! One cycle:
//!
//! 1. Drain the event channel (bounded wait; zero when bits were carried).
//! 2. Long press forces `ConfigPortal` and ends interpretation.
//! 3. Relay requests (short press, relay-on, relay-off) go to the relay
//!    controller and end interpretation; remaining bits carry over.
//! 4. Otherwise the transition table decides, at most one mode change.
//! 5. Re-apply the worker policy of the (possibly new) mode, launch the
//!    update worker once per `FirmwareUpdating` visit, and restart the
//!    device once the `FatalError` grace delay has passed.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, log, warn};

use super::table::{self, Effect, Next};
use super::{ModeCell, SystemMode, policy};
use crate::app::commands::subscribe_commands;
use crate::app::ports::{Clock, PersistencePort, SystemPort, TransportPort};
use crate::app::topics::Topics;
use crate::config::SystemConfig;
use crate::drivers::watchdog::Watchdog;
use crate::error::WorkerError;
use crate::events::{Event, EventChannel, EventSet};
use crate::relay::{ReasonOff, RelayController};
use crate::workers::{Directive, WorkerTable};
use crate::workers::update::UpdateLauncher;

/// Events handled by the relay rules, in every mode.
const RELAY_REQUESTS: EventSet = EventSet::EMPTY
    .with(Event::ShortPress)
    .with(Event::RelayOn)
    .with(Event::RelayOff);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorTiming {
    /// Longest wait for events per cycle.
    pub event_wait: Duration,
    /// Pause between cycles.
    pub period: Duration,
    pub fatal_grace_ms: u64,
}

impl CoordinatorTiming {
    pub fn from_config(config: &SystemConfig) -> Self {
        Self {
            event_wait: Duration::from_millis(u64::from(config.event_wait_ms)),
            period: Duration::from_millis(u64::from(config.coordinator_period_ms)),
            fatal_grace_ms: u64::from(config.fatal_grace_ms),
        }
    }
}

pub struct CoordinatorPorts {
    pub relay: Arc<RelayController>,
    pub transport: Arc<dyn TransportPort>,
    pub store: Arc<dyn PersistencePort>,
    pub system: Arc<dyn SystemPort>,
    pub clock: Arc<dyn Clock>,
    pub events: &'static EventChannel,
    pub mode: &'static ModeCell,
}

pub struct Coordinator {
    ports: CoordinatorPorts,
    topics: Topics,
    workers: WorkerTable,
    updater: Box<dyn UpdateLauncher>,
    timing: CoordinatorTiming,
    /// Bits deferred to the next cycle.
    carry: EventSet,
    /// Clock reading when the current mode was entered.
    entered_ms: u64,
    update_launched: bool,
    restart_requested: bool,
}

impl Coordinator {
    pub fn new(
        ports: CoordinatorPorts,
        topics: Topics,
        workers: WorkerTable,
        updater: Box<dyn UpdateLauncher>,
        timing: CoordinatorTiming,
    ) -> Self {
        let entered_ms = ports.clock.now_ms();
        Self {
            ports,
            topics,
            workers,
            updater,
            timing,
            carry: EventSet::EMPTY,
            entered_ms,
            update_launched: false,
            restart_requested: false,
        }
    }

    pub fn mode(&self) -> SystemMode {
        self.ports.mode.get()
    }

    /// Bits waiting for the next cycle.
    pub fn carried(&self) -> EventSet {
        self.carry
    }

    pub fn workers(&self) -> &WorkerTable {
        &self.workers
    }

    /// Start the workers the starting mode does not suspend, then apply
    /// its policy. Call once before the first cycle.
    pub fn start(&mut self) -> Result<(), WorkerError> {
        let mode = self.mode();
        info!("FSM starting in mode: {}", mode);
        self.entered_ms = self.ports.clock.now_ms();
        self.workers
            .start_where(|id| policy::directive(mode, id) != Directive::Suspend)?;
        self.workers.apply(|id| policy::directive(mode, id));
        Ok(())
    }

    /// Drain the channel once and run one cycle.
    pub fn run_once(&mut self) -> SystemMode {
        let wait = if self.carry.is_empty() {
            self.timing.event_wait
        } else {
            Duration::ZERO
        };
        let drained = self.ports.events.drain(wait);
        self.cycle(drained)
    }

    /// Supervisory loop, entered after [`Coordinator::start`]. Never
    /// returns; the device leaves it by restarting.
    pub fn run(mut self, watchdog: &Watchdog) -> ! {
        loop {
            watchdog.feed();
            self.run_once();
            std::thread::sleep(self.timing.period);
        }
    }

    /// One cycle over `drained` plus any carried bits. Returns the mode
    /// the cycle ended in.
    pub fn cycle(&mut self, drained: EventSet) -> SystemMode {
        let pending = self.carry.union(drained);
        self.carry = EventSet::EMPTY;
        if !pending.is_empty() {
            debug!("Coordinator: pending {}", pending);
            self.interpret(pending);
        }
        self.enact();
        self.mode()
    }

    // -----------------------------------------------------------------------
    // Interpretation
    // -----------------------------------------------------------------------

    fn interpret(&mut self, pending: EventSet) {
        let informational: EventSet = pending.iter().filter(|e| e.is_informational()).collect();
        for e in informational.iter() {
            info!("Event: {}", e);
        }

        if pending.contains(Event::LongPress) {
            info!("Long press: entering config portal");
            self.carry = pending.intersection(RELAY_REQUESTS);
            self.enter(SystemMode::ConfigPortal);
            return;
        }

        let relay = pending.intersection(RELAY_REQUESTS);
        let rest = pending.difference(RELAY_REQUESTS).difference(informational);
        if !relay.is_empty() {
            self.handle_relay(relay);
            self.carry = rest;
            return;
        }
        self.apply_rules(rest);
    }

    fn handle_relay(&self, requests: EventSet) {
        if requests.contains(Event::ShortPress) {
            if self.ports.relay.is_active() {
                self.switch_off(ReasonOff::Button);
            } else {
                self.switch_on(Event::ShortPress);
            }
        }
        if requests.contains(Event::RelayOn) {
            self.switch_on(Event::RelayOn);
        }
        if requests.contains(Event::RelayOff) {
            self.switch_off(ReasonOff::Command);
        }
    }

    fn switch_on(&self, source: Event) {
        let mode = self.mode();
        if mode.blocks_activation() {
            warn!("Relay: {} refused in {}", source, mode);
            return;
        }
        if let Err(e) = self.ports.relay.activate() {
            error!("Relay: activate on {} failed: {}", source, e);
        }
    }

    fn switch_off(&self, reason: ReasonOff) {
        if let Err(e) = self.ports.relay.deactivate(reason) {
            error!("Relay: deactivate ({}) failed: {}", reason, e);
        }
    }

    fn apply_rules(&mut self, pending: EventSet) {
        if pending.is_empty() {
            return;
        }
        let mode = self.mode();
        let mut moved = false;
        for rule in table::matching(mode, pending) {
            match rule.next {
                Next::Stay => log!(rule.level, "{}: {}", mode, rule.note),
                Next::To(next) if !moved => {
                    log!(rule.level, "{}: {}", mode, rule.note);
                    self.enter(next);
                    self.run_effect(rule.effect);
                    moved = true;
                }
                Next::To(_) => debug!("{}: {} superseded this cycle", mode, rule.event),
            }
        }

        let unexpected = pending.difference(table::handled_in(mode));
        for e in unexpected.iter() {
            warn!("Unexpected event {} in mode {}", e, mode);
        }
    }

    fn enter(&mut self, next: SystemMode) {
        let prev = self.mode();
        if prev == next {
            debug!("Coordinator: already in {}", next);
            return;
        }
        info!("FSM transition: {} -> {}", prev, next);
        self.ports.mode.set(next);
        self.entered_ms = self.ports.clock.now_ms();
        self.update_launched = false;

        if next == SystemMode::FatalError {
            self.switch_off(ReasonOff::Manual);
            error!(
                "Critical error: restarting in {} ms",
                self.timing.fatal_grace_ms
            );
        }
    }

    fn run_effect(&self, effect: Effect) {
        match effect {
            Effect::None => {}
            Effect::SubscribeCommands => match subscribe_commands(
                self.ports.transport.as_ref(),
                &self.topics,
                &self.ports.store,
                self.ports.events,
            ) {
                Ok(n) => info!("Coordinator: {} command topics active", n),
                Err(e) => error!("Coordinator: command subscription failed: {}", e),
            },
        }
    }

    // -----------------------------------------------------------------------
    // Enactment
    // -----------------------------------------------------------------------

    fn enact(&mut self) {
        let mode = self.mode();
        self.workers.apply(|id| policy::directive(mode, id));
        match mode {
            SystemMode::FirmwareUpdating if !self.update_launched => self.launch_update(),
            SystemMode::FatalError => self.restart_when_due(),
            _ => {}
        }
    }

    fn launch_update(&mut self) {
        self.update_launched = true;
        match self.updater.launch() {
            Ok(()) => info!("Coordinator: update worker launched"),
            Err(WorkerError::Busy) => info!("Coordinator: update worker already running"),
            Err(e) => {
                error!("Coordinator: update worker failed to start: {}", e);
                self.enter(SystemMode::FatalError);
                self.workers
                    .apply(|id| policy::directive(SystemMode::FatalError, id));
            }
        }
    }

    fn restart_when_due(&mut self) {
        if self.restart_requested {
            return;
        }
        let in_mode = self.ports.clock.now_ms().saturating_sub(self.entered_ms);
        if in_mode >= self.timing.fatal_grace_ms {
            self.restart_requested = true;
            error!("Coordinator: restarting device");
            self.ports.system.restart();
        }
    }
}
