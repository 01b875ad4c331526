//! One-shot firmware update worker.
//!
//! Launched by the coordinator on entering `FirmwareUpdating`. It runs to
//! completion on its own thread and reports back through events:
//!
//! | Outcome    | Action                    |
//! |------------|---------------------------|
//! | Success    | restart into the new image|
//! | NoUpdate   | post `UpdateNotNeeded`    |
//! | Failed     | post `UpdateFailed`       |
//!
//! The in-flight slot is cleared when the thread exits, whatever the
//! outcome, so a later visit can launch again.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info, warn};

use crate::app::ports::{CredentialKey, PersistencePort, SystemPort, UpdateOutcome, UpdatePort};
use crate::drivers::task_pin::{self, Core, TaskSpec};
use crate::error::{UpdateError, WorkerError};
use crate::events::{Event, EventChannel};

pub const TASK: TaskSpec = TaskSpec::new("update\0", Core::Pro, 3, 12);

/// Starts the update worker. Held by the coordinator.
pub trait UpdateLauncher: Send {
    /// Spawn the worker. [`WorkerError::Busy`] if one is still running.
    fn launch(&mut self) -> Result<(), WorkerError>;

    fn in_flight(&self) -> bool;
}

/// Fetch the stored firmware URL, run the update and report the outcome.
pub fn run_update(
    updater: &dyn UpdatePort,
    store: &dyn PersistencePort,
    system: &dyn SystemPort,
    events: &EventChannel,
) -> UpdateOutcome {
    let Some(url) = store
        .get_credential(CredentialKey::FirmwareUrl)
        .filter(|u| !u.is_empty())
    else {
        error!("Update: no firmware URL stored");
        events.post(Event::UpdateFailed);
        return UpdateOutcome::Failed(UpdateError::MissingUrl);
    };

    info!("Update: fetching {}", url);
    let outcome = updater.perform_update(&url);
    match outcome {
        UpdateOutcome::Success => {
            info!("Update: image written, restarting");
            system.restart();
        }
        UpdateOutcome::NoUpdate => {
            info!("Update: firmware already current");
            events.post(Event::UpdateNotNeeded);
        }
        UpdateOutcome::Failed(e) => {
            error!("Update: failed: {}", e);
            events.post(Event::UpdateFailed);
        }
    }
    outcome
}

/// Clears the in-flight flag when dropped.
struct SlotGuard(Arc<AtomicBool>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct UpdateWorker {
    updater: Arc<dyn UpdatePort>,
    store: Arc<dyn PersistencePort>,
    system: Arc<dyn SystemPort>,
    events: &'static EventChannel,
    slot: Arc<AtomicBool>,
}

impl UpdateWorker {
    pub fn new(
        updater: Arc<dyn UpdatePort>,
        store: Arc<dyn PersistencePort>,
        system: Arc<dyn SystemPort>,
        events: &'static EventChannel,
    ) -> Self {
        Self {
            updater,
            store,
            system,
            events,
            slot: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl UpdateLauncher for UpdateWorker {
    fn launch(&mut self) -> Result<(), WorkerError> {
        if self
            .slot
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(WorkerError::Busy);
        }
        let guard = SlotGuard(Arc::clone(&self.slot));
        let updater = Arc::clone(&self.updater);
        let store = Arc::clone(&self.store);
        let system = Arc::clone(&self.system);
        let events = self.events;

        // On spawn failure the closure, and with it the guard, is dropped.
        task_pin::spawn_on_core(TASK, move || {
            let _guard = guard;
            run_update(updater.as_ref(), store.as_ref(), system.as_ref(), events);
        })
        .map(drop)
        .map_err(|e| {
            warn!("Update: spawn failed: {}", e);
            WorkerError::SpawnFailed
        })
    }

    fn in_flight(&self) -> bool {
        self.slot.load(Ordering::Acquire)
    }
}
