//! Run/pause/stop gate shared between a worker handle and its thread.
//!
//! The handle flips the gate; the thread checks it between steps. A step
//! in progress always completes, so a pause takes effect at the next
//! step boundary.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Open,
    Paused,
    Stopped,
}

pub struct Gate {
    state: Mutex<GateState>,
    changed: Condvar,
}

impl Gate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState::Open),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> GateState {
        *self.lock()
    }

    pub fn set(&self, state: GateState) {
        let mut s = self.lock();
        // Stopped is final.
        if *s != GateState::Stopped {
            *s = state;
        }
        drop(s);
        self.changed.notify_all();
    }

    /// Block while paused. Returns `false` once stopped.
    pub fn wait_open(&self) -> bool {
        let mut s = self.lock();
        while *s == GateState::Paused {
            s = self
                .changed
                .wait(s)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *s == GateState::Open
    }

    /// Sleep for `delay`, waking early only on stop. Returns `false` once
    /// stopped.
    pub fn sleep(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        let mut s = self.lock();
        loop {
            if *s == GateState::Stopped {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            s = self
                .changed
                .wait_timeout(s, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}
