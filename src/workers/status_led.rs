//! Status LED worker: shows the system mode as a colour pattern.
//!
//! | Mode                                  | Pattern            |
//! |---------------------------------------|--------------------|
//! | `Connecting`                          | red, blink 500 ms  |
//! | `ConnectedNetwork`, `ConfiguringBroker` | green, blink 1 s |
//! | `ConnectedBroker`                     | green, solid       |
//! | `ConfigPortal`                        | green, blink 200 ms |
//! | `FirmwareUpdating`                    | blue, blink 200 ms |
//! | `FatalError`                          | red, solid         |

use std::time::Duration;

use super::Task;
use crate::drivers::led_patterns::{BLUE, GREEN, LedPatternEngine, Pattern, RED};
use crate::drivers::status_led::StatusLed;
use crate::drivers::task_pin::{Core, TaskSpec};
use crate::fsm::{ModeCell, SystemMode};

pub const TASK: TaskSpec = TaskSpec::new("status-led\0", Core::App, 1, 3);

/// Longest step, so a mode change shows promptly.
const MAX_STEP_MS: u32 = 250;

pub const fn pattern_for(mode: SystemMode) -> Pattern {
    match mode {
        SystemMode::Connecting => Pattern::Blink {
            colour: RED,
            toggle_ms: 500,
        },
        SystemMode::ConnectedNetwork | SystemMode::ConfiguringBroker => Pattern::Blink {
            colour: GREEN,
            toggle_ms: 1000,
        },
        SystemMode::ConnectedBroker => Pattern::Solid(GREEN),
        SystemMode::ConfigPortal => Pattern::Blink {
            colour: GREEN,
            toggle_ms: 200,
        },
        SystemMode::FirmwareUpdating => Pattern::Blink {
            colour: BLUE,
            toggle_ms: 200,
        },
        SystemMode::FatalError => Pattern::Solid(RED),
    }
}

pub struct StatusLedTask {
    led: StatusLed,
    engine: LedPatternEngine,
    mode: &'static ModeCell,
}

impl StatusLedTask {
    pub fn new(led: StatusLed, mode: &'static ModeCell) -> Self {
        Self {
            led,
            engine: LedPatternEngine::new(),
            mode,
        }
    }

    pub fn colour(&self) -> crate::drivers::led_patterns::Rgb {
        self.led.current_colour()
    }
}

impl Task for StatusLedTask {
    fn step(&mut self) -> Duration {
        let pattern = pattern_for(self.mode.get());
        self.engine.set(pattern);
        let step = pattern.step_ms().min(MAX_STEP_MS);
        self.led.set_colour(self.engine.tick(step));
        Duration::from_millis(u64::from(step))
    }

    fn on_suspend(&mut self) {
        self.led.off();
    }
}
