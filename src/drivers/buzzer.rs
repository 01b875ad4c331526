//! Passive piezo buzzer on an LEDC channel.
//!
//! A tune is a short list of `(frequency, duration)` notes played
//! synchronously by the calling thread. Playback is serialized so two
//! workers never interleave notes.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use log::debug;

use crate::app::ports::{BuzzerPort, Tune};
use crate::drivers::hw_init;

/// Duty for an audible square wave (50 % at 8-bit).
const TONE_DUTY: u8 = 128;

/// `(Hz, ms)`; a frequency of 0 is a rest.
type Note = (u32, u32);

fn notes(tune: Tune) -> &'static [Note] {
    match tune {
        Tune::TargetReached => &[(1_760, 120), (0, 40), (2_093, 120), (0, 40), (2_637, 240)],
        Tune::Timeout => &[(880, 300), (0, 80), (659, 300), (0, 80), (440, 500)],
        Tune::FaultAlarm => &[(2_000, 1_000)],
        Tune::SelfTest => &[(2_400, 80)],
    }
}

pub struct BuzzerDriver {
    lock: Mutex<()>,
}

impl BuzzerDriver {
    pub fn new() -> Self {
        hw_init::ledc_set(hw_init::LEDC_CH_BUZZER, 0);
        Self {
            lock: Mutex::new(()),
        }
    }

    fn note(freq_hz: u32, ms: u32) {
        if freq_hz == 0 {
            hw_init::ledc_set(hw_init::LEDC_CH_BUZZER, 0);
        } else {
            hw_init::buzzer_freq(freq_hz);
            hw_init::ledc_set(hw_init::LEDC_CH_BUZZER, TONE_DUTY);
        }
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

impl Default for BuzzerDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl BuzzerPort for BuzzerDriver {
    fn play(&self, tune: Tune) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        debug!("Buzzer: {:?}", tune);
        for &(freq, ms) in notes(tune) {
            Self::note(freq, ms);
        }
        hw_init::ledc_set(hw_init::LEDC_CH_BUZZER, 0);
    }

    fn rest(&self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}
