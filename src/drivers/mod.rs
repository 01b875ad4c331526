//! Actuator drivers, hardware initialisation, and peripheral helpers.

pub mod button;
pub mod buzzer;
pub mod hw_init;
pub mod led_patterns;
pub mod relay;
pub mod status_led;
pub mod task_pin;
pub mod watchdog;
