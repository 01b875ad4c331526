//! Worker lifecycle table.
//!
//! Every long-lived background concern runs as a [`Worker`]: a capability
//! object with start/pause/resume/stop. The coordinator owns a
//! [`WorkerTable`] and is the only caller of those methods; workers never
//! pause themselves or each other.
//!
//! ```text
//!  Coordinator ──apply(policy)──▶ WorkerTable
//!                                  ├─ network          TaskWorker ─▶ thread ─▶ Task::step()
//!                                  ├─ portal           TaskWorker ─▶ thread ─▶ Task::step()
//!                                  ├─ broker-session   …
//!                                  ├─ broker-transport …
//!                                  ├─ sensor / display / input
//!                                  └─ relay / status-led  (never policy-managed)
//! ```
//!
//! The update worker is not in the table: it is a one-shot thread
//! launched through [`update::UpdateLauncher`].

pub mod broker;
pub mod display;
pub mod gate;
pub mod input;
pub mod network;
pub mod portal;
pub mod sensor;
pub mod status_led;
pub mod supervisor;
pub mod update;

use core::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{info, warn};

use crate::drivers::task_pin::{self, TaskSpec};
use crate::error::WorkerError;
use gate::{Gate, GateState};

// ── Identity ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WorkerId {
    Network = 0,
    Portal = 1,
    BrokerSession = 2,
    BrokerTransport = 3,
    Sensor = 4,
    Display = 5,
    Input = 6,
    Relay = 7,
    StatusLed = 8,
    Update = 9,
}

impl WorkerId {
    pub const COUNT: usize = 10;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Network,
        Self::Portal,
        Self::BrokerSession,
        Self::BrokerTransport,
        Self::Sensor,
        Self::Display,
        Self::Input,
        Self::Relay,
        Self::StatusLed,
        Self::Update,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Portal => "portal",
            Self::BrokerSession => "broker-session",
            Self::BrokerTransport => "broker-transport",
            Self::Sensor => "sensor",
            Self::Display => "display",
            Self::Input => "input",
            Self::Relay => "relay",
            Self::StatusLed => "status-led",
            Self::Update => "update",
        }
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Registered, thread not yet created.
    Idle,
    Running,
    Suspended,
    Stopped,
}

/// What the active mode wants from one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Run,
    Suspend,
    /// Leave as is.
    Keep,
}

// ── Worker capability ────────────────────────────────────────

pub trait Worker: Send {
    fn id(&self) -> WorkerId;

    fn state(&self) -> WorkerState;

    /// Create the thread. Idempotent once running.
    fn start(&mut self) -> Result<(), WorkerError>;

    /// Takes effect at the worker's next step boundary.
    fn pause(&mut self) -> Result<(), WorkerError>;

    fn resume(&mut self) -> Result<(), WorkerError>;

    /// Final. The thread exits at its next step boundary.
    fn stop(&mut self);
}

/// The body of a thread-backed worker.
pub trait Task: Send + 'static {
    /// One iteration. Returns the delay before the next one.
    fn step(&mut self) -> Duration;

    /// Runs on the worker thread when a pause takes effect.
    fn on_suspend(&mut self) {}

    /// Runs on the worker thread when it continues after a pause.
    fn on_resume(&mut self) {}
}

fn run_task(gate: &Gate, task: &mut dyn Task) {
    loop {
        match gate.state() {
            GateState::Stopped => break,
            GateState::Paused => {
                task.on_suspend();
                if !gate.wait_open() {
                    break;
                }
                task.on_resume();
            }
            GateState::Open => {}
        }
        let delay = task.step();
        if !gate.sleep(delay) {
            break;
        }
    }
}

/// A [`Task`] on its own core-pinned thread.
pub struct TaskWorker {
    id: WorkerId,
    spec: TaskSpec,
    gate: Arc<Gate>,
    task: Option<Box<dyn Task>>,
    handle: Option<JoinHandle<()>>,
    state: WorkerState,
}

impl TaskWorker {
    pub fn new(id: WorkerId, spec: TaskSpec, task: Box<dyn Task>) -> Self {
        Self {
            id,
            spec,
            gate: Arc::new(Gate::new()),
            task: Some(task),
            handle: None,
            state: WorkerState::Idle,
        }
    }

    /// True once the thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_some_and(JoinHandle::is_finished)
    }
}

impl Worker for TaskWorker {
    fn id(&self) -> WorkerId {
        self.id
    }

    fn state(&self) -> WorkerState {
        self.state
    }

    fn start(&mut self) -> Result<(), WorkerError> {
        match self.state {
            WorkerState::Running | WorkerState::Suspended => return Ok(()),
            WorkerState::Stopped => return Err(WorkerError::Stopped),
            WorkerState::Idle => {}
        }
        let mut task = self.task.take().ok_or(WorkerError::Stopped)?;
        let gate = Arc::clone(&self.gate);
        let handle = task_pin::spawn_on_core(self.spec, move || run_task(&gate, task.as_mut()))
            .map_err(|e| {
                warn!("Worker {}: spawn failed: {}", self.id, e);
                WorkerError::SpawnFailed
            })?;
        self.handle = Some(handle);
        self.state = WorkerState::Running;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), WorkerError> {
        match self.state {
            WorkerState::Running => {
                self.gate.set(GateState::Paused);
                self.state = WorkerState::Suspended;
                Ok(())
            }
            WorkerState::Suspended => Ok(()),
            WorkerState::Idle => Err(WorkerError::NotStarted),
            WorkerState::Stopped => Err(WorkerError::Stopped),
        }
    }

    fn resume(&mut self) -> Result<(), WorkerError> {
        match self.state {
            WorkerState::Suspended => {
                self.gate.set(GateState::Open);
                self.state = WorkerState::Running;
                Ok(())
            }
            WorkerState::Running => Ok(()),
            WorkerState::Idle => Err(WorkerError::NotStarted),
            WorkerState::Stopped => Err(WorkerError::Stopped),
        }
    }

    fn stop(&mut self) {
        self.gate.set(GateState::Stopped);
        self.task = None;
        self.state = WorkerState::Stopped;
    }
}

// ── Table ────────────────────────────────────────────────────

/// Registry of workers, indexed by [`WorkerId`].
pub struct WorkerTable {
    workers: Vec<Box<dyn Worker>>,
    reported: [Option<WorkerState>; WorkerId::COUNT],
}

impl WorkerTable {
    pub fn new() -> Self {
        Self {
            workers: Vec::new(),
            reported: [None; WorkerId::COUNT],
        }
    }

    /// Add a worker, replacing any previous one with the same id.
    pub fn register(&mut self, worker: Box<dyn Worker>) {
        let id = worker.id();
        self.workers.retain(|w| w.id() != id);
        self.workers.push(worker);
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn state(&self, id: WorkerId) -> Option<WorkerState> {
        self.workers.iter().find(|w| w.id() == id).map(|w| w.state())
    }

    /// Start every registered worker. The first failure aborts boot.
    pub fn start_all(&mut self) -> Result<(), WorkerError> {
        self.start_where(|_| true)
    }

    /// Start the workers `wanted` selects; the rest stay idle until a
    /// policy asks for them. The first failure aborts boot.
    pub fn start_where(&mut self, wanted: impl Fn(WorkerId) -> bool) -> Result<(), WorkerError> {
        let mut started = 0;
        for w in self.workers.iter_mut().filter(|w| wanted(w.id())) {
            w.start().inspect_err(|e| warn!("Worker {}: start failed: {}", w.id(), e))?;
            started += 1;
        }
        info!("Workers: {} of {} started", started, self.workers.len());
        Ok(())
    }

    /// Bring every worker in line with `directive_for`. Failures are logged
    /// and counted, never fatal. Returns the failure count.
    pub fn apply(&mut self, directive_for: impl Fn(WorkerId) -> Directive) -> usize {
        let mut failures = 0;
        for w in &mut self.workers {
            let result = match (directive_for(w.id()), w.state()) {
                (Directive::Keep, _)
                | (Directive::Run, WorkerState::Running)
                | (Directive::Suspend, WorkerState::Suspended | WorkerState::Idle) => Ok(()),
                (Directive::Run, WorkerState::Idle) => w.start(),
                (Directive::Run, _) => w.resume(),
                (Directive::Suspend, _) => w.pause(),
            };
            if let Err(e) = result {
                warn!("Worker {}: policy not applied: {}", w.id(), e);
                failures += 1;
            }
        }
        self.log_changes();
        failures
    }

    /// Log each worker whose state differs from the last report.
    fn log_changes(&mut self) {
        for w in &self.workers {
            let id = w.id() as usize;
            let state = w.state();
            if self.reported[id] != Some(state) {
                info!("Worker {}: {:?}", w.id(), state);
                self.reported[id] = Some(state);
            }
        }
    }

    pub fn stop_all(&mut self) {
        for w in &mut self.workers {
            w.stop();
        }
    }
}

impl Default for WorkerTable {
    fn default() -> Self {
        Self::new()
    }
}
