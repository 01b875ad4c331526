//! Polled, debounced button with short and long press detection.
//!
//! ## Hardware
//!
//! Active-low momentary switch with pull-up. The input worker samples the
//! level every poll period and feeds it to [`ButtonDriver::tick`], which
//! runs the debounce + gesture state machine.
//!
//! ## Gesture detection
//!
//! | Gesture     | Condition                           | Event        |
//! |-------------|-------------------------------------|--------------|
//! | Short press | Stable press released before 5 s    | `ShortPress` |
//! | Long press  | Held for 5 s (emitted once, at 5 s) | `LongPress`  |

/// Button events emitted after gesture classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    ShortPress,
    LongPress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GestureState {
    Idle,
    DebounceWait { since_ms: u64 },
    Pressed { since_ms: u64 },
    /// Long press already reported; wait for release.
    Held,
}

pub struct ButtonDriver {
    gpio: i32,
    debounce_ms: u64,
    long_press_ms: u64,
    state: GestureState,
}

impl ButtonDriver {
    pub fn new(gpio: i32, debounce_ms: u32, long_press_ms: u32) -> Self {
        Self {
            gpio,
            debounce_ms: u64::from(debounce_ms),
            long_press_ms: u64::from(long_press_ms),
            state: GestureState::Idle,
        }
    }

    /// GPIO pin this button is attached to.
    pub fn gpio(&self) -> i32 {
        self.gpio
    }

    /// Advance with one raw sample taken at `now_ms`.
    pub fn tick(&mut self, now_ms: u64, pressed: bool) -> Option<ButtonEvent> {
        match self.state {
            GestureState::Idle => {
                if pressed {
                    self.state = GestureState::DebounceWait { since_ms: now_ms };
                }
                None
            }

            GestureState::DebounceWait { since_ms } => {
                if !pressed {
                    // Bounce shorter than the debounce window.
                    self.state = GestureState::Idle;
                } else if now_ms.saturating_sub(since_ms) >= self.debounce_ms {
                    self.state = GestureState::Pressed { since_ms };
                }
                None
            }

            GestureState::Pressed { since_ms } => {
                if !pressed {
                    self.state = GestureState::Idle;
                    return Some(ButtonEvent::ShortPress);
                }
                if now_ms.saturating_sub(since_ms) >= self.long_press_ms {
                    self.state = GestureState::Held;
                    return Some(ButtonEvent::LongPress);
                }
                None
            }

            GestureState::Held => {
                if !pressed {
                    self.state = GestureState::Idle;
                }
                None
            }
        }
    }

    /// Sample the pin. Active-low.
    pub fn read_pressed(&self) -> bool {
        !crate::drivers::hw_init::gpio_read(self.gpio)
    }
}
