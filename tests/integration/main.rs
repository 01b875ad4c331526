//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises one subsystem against
//! the simulated adapters. All tests run on the host with no hardware.

mod coordinator_tests;
mod mock_hw;
mod relay_tests;
mod transport_tests;
mod workers_tests;
