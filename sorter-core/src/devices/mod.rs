//! Drivers for the I2C peripherals on the sorter board.
//!
//! Each driver is a zero-sized description of one device and borrows the
//! shared [`RegisterBus`](crate::bus::RegisterBus) per call, so a single bus
//! engine serves all of them without interior mutability.

use core::fmt;

use crate::bus::BusError;

pub mod lcd1602;
pub mod pca9685;
pub mod tcs34725;

pub use lcd1602::{DisplayLine, LCD_COLUMNS, Lcd1602};
pub use pca9685::Pca9685;
pub use tcs34725::{RawColor, Tcs34725};

/// Errors raised by the device drivers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceError {
    /// The underlying bus transaction failed.
    Bus(BusError),
    /// PWM channel outside `0..=15`.
    InvalidChannel(u8),
    /// Display line other than 1 or 2.
    InvalidDisplayLine(u8),
}

impl From<BusError> for DeviceError {
    fn from(error: BusError) -> Self {
        Self::Bus(error)
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Bus(error) => write!(f, "bus: {error}"),
            DeviceError::InvalidChannel(channel) => write!(f, "invalid pwm channel {channel}"),
            DeviceError::InvalidDisplayLine(line) => write!(f, "invalid display line {line}"),
        }
    }
}
