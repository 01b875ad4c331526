//! Platform services: restart and heap statistics.

use core::sync::atomic::{AtomicU32, Ordering};

use log::{info, warn};

use crate::app::ports::SystemPort;

pub struct SystemAdapter {
    /// Simulation: number of restart requests seen.
    restarts: AtomicU32,
}

impl SystemAdapter {
    pub const fn new() -> Self {
        Self {
            restarts: AtomicU32::new(0),
        }
    }

    pub fn restart_count(&self) -> u32 {
        self.restarts.load(Ordering::Relaxed)
    }

    /// Lowest free heap since boot.
    #[cfg(target_os = "espidf")]
    pub fn min_free_heap(&self) -> u32 {
        // SAFETY: read-only heap statistics.
        unsafe { esp_idf_svc::sys::esp_get_minimum_free_heap_size() }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn min_free_heap(&self) -> u32 {
        self.free_heap()
    }
}

impl Default for SystemAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemPort for SystemAdapter {
    #[cfg(target_os = "espidf")]
    fn restart(&self) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
        warn!("System: restarting");
        // SAFETY: does not return.
        unsafe { esp_idf_svc::sys::esp_restart() }
    }

    #[cfg(not(target_os = "espidf"))]
    fn restart(&self) {
        let n = self.restarts.fetch_add(1, Ordering::Relaxed) + 1;
        warn!("System(sim): restart requested ({})", n);
    }

    #[cfg(target_os = "espidf")]
    fn free_heap(&self) -> u32 {
        // SAFETY: read-only heap statistics.
        unsafe { esp_idf_svc::sys::esp_get_free_heap_size() }
    }

    #[cfg(not(target_os = "espidf"))]
    fn free_heap(&self) -> u32 {
        256 * 1024
    }
}

/// Log heap headroom once at boot.
pub fn log_heap(system: &SystemAdapter) {
    info!(
        "System: heap free={} min={}",
        system.free_heap(),
        system.min_free_heap()
    );
}
