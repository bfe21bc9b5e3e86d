//! PCA9685 16-channel PWM controller driving the platform servos.

use crate::bus::{Address, RegisterBus};

use super::DeviceError;

/// Default slave address with all address pins low.
pub const DEFAULT_ADDRESS: Address = Address::new(0x40);

pub const REG_MODE1: u8 = 0x00;
pub const REG_PRESCALE: u8 = 0xFE;
pub const REG_LED0_ON_L: u8 = 0x06;

/// Prescale for a 50 Hz frame from the 25 MHz internal oscillator.
pub const PRESCALE_50HZ: u8 = 0x79;
/// MODE1 with register auto-increment and ALLCALL enabled.
pub const MODE1_AUTO_INCREMENT: u8 = 0x21;

pub const CHANNEL_COUNT: u8 = 16;
pub const MAX_PULSE: u16 = 0x0FFF;

/// First register of a channel's four ON/OFF registers.
#[must_use]
pub const fn channel_base(channel: u8) -> u8 {
    REG_LED0_ON_L + 4 * channel
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Pca9685 {
    address: Address,
}

impl Pca9685 {
    #[must_use]
    pub const fn new(address: Address) -> Self {
        Self { address }
    }

    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Sets the 50 Hz prescaler and enables auto-increment.
    ///
    /// # Errors
    ///
    /// Propagates bus failures.
    pub fn init<B>(&self, bus: &mut B) -> Result<(), DeviceError>
    where
        B: RegisterBus + ?Sized,
    {
        bus.write(self.address, &[REG_PRESCALE, PRESCALE_50HZ])?;
        bus.write(self.address, &[REG_MODE1, MODE1_AUTO_INCREMENT])?;
        Ok(())
    }

    /// Programs `channel` to go high at count 0 and low at `pulse`.
    ///
    /// # Errors
    ///
    /// [`DeviceError::InvalidChannel`] without any bus traffic for channels
    /// past 15; bus failures otherwise.
    pub fn set_channel_pulse<B>(&self, bus: &mut B, channel: u8, pulse: u16) -> Result<(), DeviceError>
    where
        B: RegisterBus + ?Sized,
    {
        if channel >= CHANNEL_COUNT {
            return Err(DeviceError::InvalidChannel(channel));
        }
        let [off_low, off_high] = (pulse & MAX_PULSE).to_le_bytes();
        bus.write(
            self.address,
            &[channel_base(channel), 0x00, 0x00, off_low, off_high],
        )?;
        Ok(())
    }
}

impl Default for Pca9685 {
    fn default() -> Self {
        Self::new(DEFAULT_ADDRESS)
    }
}
