//! RGB status LED driver.
//!
//! Three LEDC PWM channels (CH1-3) drive discrete R/G/B LEDs.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: drives the LEDC channels via hw_init.
//! On host/test: tracks state in-memory only.

use crate::drivers::hw_init;
use crate::drivers::led_patterns::Rgb;

pub struct StatusLed {
    current: Rgb,
}

impl StatusLed {
    pub fn new() -> Self {
        Self { current: (0, 0, 0) }
    }

    pub fn set_colour(&mut self, (r, g, b): Rgb) {
        if (r, g, b) == self.current {
            return;
        }
        hw_init::ledc_set(hw_init::LEDC_CH_LED_R, r);
        hw_init::ledc_set(hw_init::LEDC_CH_LED_G, g);
        hw_init::ledc_set(hw_init::LEDC_CH_LED_B, b);
        self.current = (r, g, b);
    }

    pub fn off(&mut self) {
        self.set_colour((0, 0, 0));
    }

    pub fn current_colour(&self) -> Rgb {
        self.current
    }
}

impl Default for StatusLed {
    fn default() -> Self {
        Self::new()
    }
}
