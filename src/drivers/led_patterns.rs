//! Status LED pattern engine.
//!
//! Generates time-varying RGB values for the status LED. The status-LED
//! worker selects a [`Pattern`] for the current mode and calls
//! [`LedPatternEngine::tick`] every step; the returned colour feeds
//! `StatusLed::set_colour()`.
//!
//! | Pattern | Description                                   |
//! |---------|-----------------------------------------------|
//! | Solid   | Constant colour                               |
//! | Blink   | Colour and off alternate, each for `toggle_ms` |
//! | Off     | Dark                                          |

/// Colour as (R, G, B) tuple, each 0–255.
pub type Rgb = (u8, u8, u8);

pub const BLACK: Rgb = (0, 0, 0);
pub const RED: Rgb = (255, 0, 0);
pub const GREEN: Rgb = (0, 255, 0);
pub const BLUE: Rgb = (0, 0, 255);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Solid(Rgb),
    Blink { colour: Rgb, toggle_ms: u32 },
    Off,
}

impl Pattern {
    /// How long the output stays constant; the worker's step delay.
    pub const fn step_ms(self) -> u32 {
        match self {
            Self::Blink { toggle_ms, .. } => toggle_ms,
            Self::Solid(_) | Self::Off => 1000,
        }
    }
}

/// Pattern phase tracker. Stack-allocated, no heap.
pub struct LedPatternEngine {
    phase_ms: u32,
    active: Pattern,
}

impl LedPatternEngine {
    pub fn new() -> Self {
        Self {
            phase_ms: 0,
            active: Pattern::Off,
        }
    }

    pub fn active(&self) -> Pattern {
        self.active
    }

    /// Switch pattern. Restarts the phase only when the pattern changes,
    /// so a blink starts lit.
    pub fn set(&mut self, pattern: Pattern) {
        if pattern != self.active {
            self.active = pattern;
            self.phase_ms = 0;
        }
    }

    /// Output for the current phase, then advance by `delta_ms`.
    pub fn tick(&mut self, delta_ms: u32) -> Rgb {
        let rgb = self.generate();
        self.phase_ms = self.phase_ms.wrapping_add(delta_ms);
        rgb
    }

    fn generate(&self) -> Rgb {
        match self.active {
            Pattern::Solid(colour) => colour,
            Pattern::Off => BLACK,
            Pattern::Blink { colour, toggle_ms } => {
                let lit = toggle_ms == 0 || (self.phase_ms / toggle_ms) % 2 == 0;
                if lit { colour } else { BLACK }
            }
        }
    }
}

impl Default for LedPatternEngine {
    fn default() -> Self {
        Self::new()
    }
}
