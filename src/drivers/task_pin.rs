//! Core-pinned thread spawning for the ESP32 dual-core.
//!
//! Wraps `esp_pthread_set_cfg()` so that `std::thread::Builder::spawn`
//! creates a FreeRTOS task pinned to a specific CPU core with explicit
//! priority and stack size. On non-ESP targets, falls back to a plain
//! named thread.
//!
//! # ESP-IDF Threading Model
//!
//! `esp_pthread_set_cfg()` sets thread-local configuration that applies to
//! the *next* `pthread_create()` call from the calling thread, so the
//! config→spawn pair must not be interleaved with other thread creation on
//! the same thread. All workers are spawned from the coordinator thread.

use std::io;
use std::thread::JoinHandle;

/// CPU core identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Core {
    /// Core 0 (PRO_CPU): protocol stacks (WiFi, lwIP, MQTT).
    Pro = 0,
    /// Core 1 (APP_CPU): relay supervision, sensing, input.
    App = 1,
}

/// Where and how a worker thread runs.
#[derive(Debug, Clone, Copy)]
pub struct TaskSpec {
    /// NUL-terminated (e.g. `"relay\0"`).
    pub name: &'static str,
    pub core: Core,
    pub priority: u8,
    pub stack_kb: usize,
}

impl TaskSpec {
    pub const fn new(name: &'static str, core: Core, priority: u8, stack_kb: usize) -> Self {
        Self {
            name,
            core,
            priority,
            stack_kb,
        }
    }

    pub fn display_name(&self) -> &'static str {
        self.name.trim_end_matches('\0')
    }
}

/// Spawn a thread pinned to a specific core with explicit priority and stack.
///
/// Fails if the pthread config is rejected or the OS cannot create the task.
#[cfg(target_os = "espidf")]
pub fn spawn_on_core(
    spec: TaskSpec,
    f: impl FnOnce() + Send + 'static,
) -> io::Result<JoinHandle<()>> {
    // SAFETY: the config struct is fully initialised by the IDF helper and
    // `name` is a 'static NUL-terminated string.
    let ret = unsafe {
        let mut cfg = esp_idf_sys::esp_create_default_pthread_config();
        cfg.pin_to_core = spec.core as i32;
        cfg.prio = spec.priority as i32;
        cfg.stack_size = (spec.stack_kb * 1024) as i32;
        cfg.thread_name = spec.name.as_ptr() as *const _;
        esp_idf_sys::esp_pthread_set_cfg(&cfg)
    };
    if ret != esp_idf_sys::ESP_OK as i32 {
        return Err(io::Error::other(format!("esp_pthread_set_cfg failed: {ret}")));
    }

    log::info!(
        "Spawning '{}' on {:?} (pri={}, stack={}KB)",
        spec.display_name(),
        spec.core,
        spec.priority,
        spec.stack_kb
    );

    std::thread::Builder::new()
        .name(spec.display_name().into())
        .spawn(f)
}

/// Simulation fallback: ignores core affinity and priority.
#[cfg(not(target_os = "espidf"))]
pub fn spawn_on_core(
    spec: TaskSpec,
    f: impl FnOnce() + Send + 'static,
) -> io::Result<JoinHandle<()>> {
    log::debug!(
        "Spawning '{}' (sim, no core pinning, stack={}KB)",
        spec.display_name(),
        spec.stack_kb
    );

    std::thread::Builder::new()
        .name(spec.display_name().into())
        .stack_size(spec.stack_kb.max(64) * 1024)
        .spawn(f)
}
