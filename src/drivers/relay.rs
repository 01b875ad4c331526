//! Relay output driver.
//!
//! Generic over any `embedded_hal` output pin so the controller can be
//! driven by a raw ESP-IDF GPIO on the device and by a recording pin in
//! tests. The only instance is handed to the relay controller at boot.

use core::convert::Infallible;

use embedded_hal::digital::{ErrorKind, ErrorType, OutputPin};
use log::debug;

use crate::app::ports::RelayOutput;
use crate::drivers::hw_init;
use crate::error::RelayError;

pub struct RelayDriver<P> {
    pin: P,
    on: bool,
}

impl<P: OutputPin> RelayDriver<P> {
    pub fn new(pin: P) -> Self {
        Self { pin, on: false }
    }

    /// Last level written successfully.
    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn release(self) -> P {
        self.pin
    }
}

impl<P: OutputPin + Send> RelayOutput for RelayDriver<P> {
    fn set(&mut self, on: bool) -> Result<(), RelayError> {
        let result = if on {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        result.map_err(|_| RelayError::GpioWriteFailed)?;
        self.on = on;
        debug!("Relay pin -> {}", if on { "HIGH" } else { "LOW" });
        Ok(())
    }
}

/// A GPIO configured as output by [`hw_init`].
#[derive(Debug, Clone, Copy)]
pub struct GpioPin(pub i32);

impl ErrorType for GpioPin {
    type Error = ErrorKind;
}

impl OutputPin for GpioPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        hw_init::gpio_write(self.0, false).map_err(|_| ErrorKind::Other)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        hw_init::gpio_write(self.0, true).map_err(|_| ErrorKind::Other)
    }
}

/// Pin that records its level; stands in for hardware on the host.
#[derive(Debug, Default)]
pub struct MemoryPin {
    pub high: bool,
    pub writes: u32,
}

impl ErrorType for MemoryPin {
    type Error = Infallible;
}

impl OutputPin for MemoryPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high = false;
        self.writes += 1;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high = true;
        self.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_drives_pin() {
        let mut r = RelayDriver::new(MemoryPin::default());
        r.set(true).unwrap();
        assert!(r.is_on());
        r.set(false).unwrap();
        let pin = r.release();
        assert!(!pin.high);
        assert_eq!(pin.writes, 2);
    }

    #[test]
    fn gpio_pin_sim_accepts_writes() {
        let mut r = RelayDriver::new(GpioPin(12));
        assert!(r.set(true).is_ok());
    }
}
