//! NTC thermistor water probe (10 kOhm @ 25 C, B = 3950).
//!
//! Wired in a voltage divider with a fixed 10 kOhm resistor and read
//! through ADC1. The simplified Beta equation converts resistance to
//! temperature.
//!
//! A reading the probe cannot physically produce (open or shorted
//! divider, failed ADC read, result outside the rated range) comes back
//! as [`FAULT_SENTINEL`] so downstream code has one fault value to test.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: reads `ADC1_CH_TEMP` via the oneshot API (set up by hw_init).
//! On host/test: reads from a static AtomicU16 for injection.

use core::ops::RangeInclusive;
#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicU16, Ordering};

use super::Probe;
use crate::app::ports::FAULT_SENTINEL;
#[cfg(target_os = "espidf")]
use crate::drivers::hw_init;

#[cfg(not(target_os = "espidf"))]
static SIM_TEMP_ADC: AtomicU16 = AtomicU16::new(2048);

/// Set the raw ADC value the simulated probe returns.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_temp_adc(raw: u16) {
    SIM_TEMP_ADC.store(raw, Ordering::Relaxed);
}

const R25: f32 = 10_000.0;
const BETA: f32 = 3950.0;
const T25_K: f32 = 298.15;
const R_DIVIDER: f32 = 10_000.0;
const ADC_MAX: f32 = 4095.0;
const V_REF: f32 = 3.3;
/// Rail margin below which the divider reads as open or shorted.
const RAIL_MARGIN_V: f32 = 0.01;

/// Rated probe range in °C.
pub const VALID_RANGE_C: RangeInclusive<f32> = -40.0..=125.0;

pub struct TemperatureSensor {
    _adc_gpio: i32,
}

impl TemperatureSensor {
    pub fn new(adc_gpio: i32) -> Self {
        Self {
            _adc_gpio: adc_gpio,
        }
    }

    /// Degrees Celsius, or [`FAULT_SENTINEL`].
    pub fn read(&self) -> f32 {
        self.read_adc().map_or(FAULT_SENTINEL, adc_to_celsius)
    }

    #[cfg(target_os = "espidf")]
    fn read_adc(&self) -> Option<u16> {
        hw_init::adc1_read(hw_init::ADC1_CH_TEMP)
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_adc(&self) -> Option<u16> {
        Some(SIM_TEMP_ADC.load(Ordering::Relaxed))
    }
}

impl Probe for TemperatureSensor {
    fn sample(&mut self) -> f32 {
        self.read()
    }
}

/// Convert a raw 12-bit divider reading to °C.
pub fn adc_to_celsius(raw: u16) -> f32 {
    let voltage = (f32::from(raw) / ADC_MAX) * V_REF;
    if voltage <= RAIL_MARGIN_V || voltage >= V_REF - RAIL_MARGIN_V {
        return FAULT_SENTINEL;
    }
    let r_ntc = R_DIVIDER * voltage / (V_REF - voltage);
    let inv_t = (1.0 / T25_K) + (1.0 / BETA) * (r_ntc / R25).ln();
    if inv_t <= 0.0 {
        return FAULT_SENTINEL;
    }
    let celsius = 1.0 / inv_t - 273.15;
    if VALID_RANGE_C.contains(&celsius) {
        celsius
    } else {
        FAULT_SENTINEL
    }
}
