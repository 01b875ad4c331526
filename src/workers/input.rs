//! Button worker: samples the pin every poll period and posts
//! `ShortPress` / `LongPress`.

use std::sync::Arc;
use std::time::Duration;

use log::info;

use super::Task;
use crate::app::ports::Clock;
use crate::config::SystemConfig;
use crate::drivers::button::{ButtonDriver, ButtonEvent};
use crate::drivers::task_pin::{Core, TaskSpec};
use crate::events::{Event, EventChannel};

pub const TASK: TaskSpec = TaskSpec::new("input\0", Core::App, 4, 3);

/// Level source; `true` means pressed.
pub type Sampler = Box<dyn FnMut() -> bool + Send>;

pub struct InputTask {
    button: ButtonDriver,
    sampler: Option<Sampler>,
    clock: Arc<dyn Clock>,
    events: &'static EventChannel,
    poll: Duration,
}

impl InputTask {
    pub fn new(
        button: ButtonDriver,
        clock: Arc<dyn Clock>,
        events: &'static EventChannel,
        config: &SystemConfig,
    ) -> Self {
        Self {
            button,
            sampler: None,
            clock,
            events,
            poll: Duration::from_millis(u64::from(config.button_poll_ms)),
        }
    }

    /// Read levels from `sampler` instead of the button pin.
    pub fn with_sampler(mut self, sampler: Sampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    fn pressed(&mut self) -> bool {
        match self.sampler.as_mut() {
            Some(sample) => sample(),
            None => self.button.read_pressed(),
        }
    }
}

impl Task for InputTask {
    fn step(&mut self) -> Duration {
        let pressed = self.pressed();
        let now = self.clock.now_ms();
        match self.button.tick(now, pressed) {
            Some(ButtonEvent::ShortPress) => {
                info!("Button: short press");
                self.events.post(Event::ShortPress);
            }
            Some(ButtonEvent::LongPress) => {
                info!("Button: long press");
                self.events.post(Event::LongPress);
            }
            None => {}
        }
        self.poll
    }
}
