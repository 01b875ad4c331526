//! Serial-console display adapter.
//!
//! Implements [`DisplayPort`] by writing each frame to the log (UART /
//! USB-CDC in production). The panel driver renders the same three lines.

use core::fmt::Write;

use log::info;

use crate::app::ports::{DisplayFrame, DisplayPort};

/// One panel line; the panel is 20 columns wide.
pub type Line = heapless::String<20>;

/// Render a frame into the three panel lines.
pub fn render_lines(frame: &DisplayFrame) -> [Line; 3] {
    let mut temp = Line::new();
    let mut relay = Line::new();
    let mut max = Line::new();
    // Every line fits in 20 columns for any f32 in the probe range;
    // a longer value is truncated by the failed write.
    let _ = match frame.temperature_c {
        Some(t) => write!(temp, "Temp: {t:.1}C"),
        None => write!(temp, "Temp: ERROR"),
    };
    let _ = write!(relay, "Relay: {}", if frame.relay_on { "ON" } else { "OFF" });
    let _ = write!(max, "Max: {:.1}C", frame.max_temperature_c);
    [temp, relay, max]
}

/// Adapter that logs every rendered frame to the serial console.
pub struct LogDisplay {
    frames: u32,
}

impl LogDisplay {
    pub fn new() -> Self {
        Self { frames: 0 }
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }
}

impl Default for LogDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayPort for LogDisplay {
    fn render(&mut self, frame: &DisplayFrame) {
        let [temp, relay, max] = render_lines(frame);
        self.frames = self.frames.wrapping_add(1);
        info!("DISPLAY | {} | {} | {}", temp, relay, max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_reading_and_state() {
        let lines = render_lines(&DisplayFrame {
            temperature_c: Some(42.5),
            relay_on: true,
            max_temperature_c: 30.0,
        });
        assert_eq!(lines[0].as_str(), "Temp: 42.5C");
        assert_eq!(lines[1].as_str(), "Relay: ON");
        assert_eq!(lines[2].as_str(), "Max: 30.0C");
    }

    #[test]
    fn fault_renders_error() {
        let lines = render_lines(&DisplayFrame {
            temperature_c: None,
            relay_on: false,
            max_temperature_c: 35.5,
        });
        assert_eq!(lines[0].as_str(), "Temp: ERROR");
        assert_eq!(lines[1].as_str(), "Relay: OFF");
    }
}
