//! Application core: port traits, topic layout, payloads, and command
//! handling.
//!
//! Nothing here touches hardware. Everything reaches the outside world
//! through the traits in [`ports`], so this layer is testable on the host.

pub mod commands;
pub mod ports;
pub mod telemetry;
pub mod topics;
