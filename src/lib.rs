//! Recirculator firmware library.
//!
//! Everything except the entry point lives here so the host test suites
//! can drive it. ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod error;
pub mod events;
pub mod fsm;
pub mod pins;
pub mod relay;
pub mod sensors;
pub mod workers;

mod esp_link_shims;
