//! GPIO / peripheral assignments for the recirculator board (ESP32 DevKit).
//!
//! Every driver references this module rather than hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Relay (pump contactor)
// ---------------------------------------------------------------------------

/// Digital output: HIGH = pump running.
pub const RELAY_GPIO: i32 = 12;

// ---------------------------------------------------------------------------
// Temperature probe (NTC on ADC1)
// ---------------------------------------------------------------------------

/// NTC thermistor, 10 kΩ @ 25 °C, voltage divider to ADC1 channel 6.
pub const TEMP_ADC_GPIO: i32 = 34;

// ---------------------------------------------------------------------------
// Front panel
// ---------------------------------------------------------------------------

/// Momentary push-button, active-low with internal pull-up.
pub const BUTTON_GPIO: i32 = 13;

/// Passive piezo buzzer, driven by LEDC.
pub const BUZZER_GPIO: i32 = 18;

pub const LED_R_GPIO: i32 = 4;
pub const LED_G_GPIO: i32 = 27;
pub const LED_B_GPIO: i32 = 15;

// ---------------------------------------------------------------------------
// PWM configuration
// ---------------------------------------------------------------------------

/// LEDC frequency for the status LED.
pub const LED_PWM_FREQ_HZ: u32 = 1_000;
/// Initial buzzer frequency; each tone retunes the timer.
pub const BUZZER_BASE_FREQ_HZ: u32 = 2_000;
