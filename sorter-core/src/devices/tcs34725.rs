//! TCS34725 RGBC light sensor used for presence detection and classification.
//!
//! The bus engine only reads one register per transaction, so every 16-bit
//! channel is assembled from two reads, low byte first.

use embedded_hal::delay::DelayNs;

use crate::bus::{Address, RegisterBus};

use super::DeviceError;

pub const DEFAULT_ADDRESS: Address = Address::new(0x29);

/// Command bit that has to accompany every register address.
pub const COMMAND_BIT: u8 = 0x80;

pub const REG_ENABLE: u8 = 0x00;
pub const REG_ATIME: u8 = 0x01;
pub const REG_CONTROL: u8 = 0x0F;
pub const REG_CDATAL: u8 = 0x14;
pub const REG_RDATAL: u8 = 0x16;
pub const REG_GDATAL: u8 = 0x18;
pub const REG_BDATAL: u8 = 0x1A;

/// 100 ms integration time.
pub const ATIME_100MS: u8 = 0xD6;
/// 4x analog gain.
pub const GAIN_4X: u8 = 0x01;
pub const ENABLE_PON: u8 = 0x01;
pub const ENABLE_AEN: u8 = 0x02;

/// Oscillator warm-up between power-on and enabling the ADC.
const POWER_ON_DELAY_MS: u32 = 3;
/// One 100 ms integration plus margin.
pub const INTEGRATION_WAIT_MS: u32 = 120;

/// Unscaled 16-bit channel counts.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawColor {
    pub clear: u16,
    pub red: u16,
    pub green: u16,
    pub blue: u16,
}

impl RawColor {
    /// Scales R/G/B proportionally into a byte each.
    ///
    /// All three channels are halved together until the largest fits, so the
    /// ratios used for classification survive. A zero clear channel means
    /// no light reached the sensor and yields black.
    #[must_use]
    pub fn to_rgb8(self) -> (u8, u8, u8) {
        if self.clear == 0 {
            return (0, 0, 0);
        }
        let (mut r, mut g, mut b) = (self.red, self.green, self.blue);
        while r.max(g).max(b) > u16::from(u8::MAX) {
            r >>= 1;
            g >>= 1;
            b >>= 1;
        }
        (narrow(r), narrow(g), narrow(b))
    }
}

fn narrow(value: u16) -> u8 {
    u8::try_from(value).unwrap_or(u8::MAX)
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Tcs34725 {
    address: Address,
}

impl Tcs34725 {
    #[must_use]
    pub const fn new(address: Address) -> Self {
        Self { address }
    }

    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Programs integration time and gain, then powers up the ADC.
    ///
    /// # Errors
    ///
    /// Propagates bus failures.
    pub fn init<B, D>(&self, bus: &mut B, delay: &mut D) -> Result<(), DeviceError>
    where
        B: RegisterBus + ?Sized,
        D: DelayNs + ?Sized,
    {
        self.write_register(bus, REG_ATIME, ATIME_100MS)?;
        self.write_register(bus, REG_CONTROL, GAIN_4X)?;
        self.write_register(bus, REG_ENABLE, ENABLE_PON)?;
        delay.delay_ms(POWER_ON_DELAY_MS);
        self.write_register(bus, REG_ENABLE, ENABLE_PON | ENABLE_AEN)?;
        Ok(())
    }

    /// Clear (unfiltered) channel.
    ///
    /// # Errors
    ///
    /// Propagates bus failures.
    pub fn read_clear<B>(&self, bus: &mut B) -> Result<u16, DeviceError>
    where
        B: RegisterBus + ?Sized,
    {
        self.read_channel(bus, REG_CDATAL)
    }

    /// All four channels, unscaled.
    ///
    /// # Errors
    ///
    /// Propagates bus failures.
    pub fn read_raw<B>(&self, bus: &mut B) -> Result<RawColor, DeviceError>
    where
        B: RegisterBus + ?Sized,
    {
        Ok(RawColor {
            clear: self.read_channel(bus, REG_CDATAL)?,
            red: self.read_channel(bus, REG_RDATAL)?,
            green: self.read_channel(bus, REG_GDATAL)?,
            blue: self.read_channel(bus, REG_BDATAL)?,
        })
    }

    /// Takes a fresh sample and scales red, green, and blue into 8 bits.
    ///
    /// Dropping AEN restarts the ADC, so the channels read afterwards come
    /// from an integration that began inside this call, not from whatever the
    /// free-running ADC latched before the object settled. The ADC is left
    /// running for presence polling.
    ///
    /// # Errors
    ///
    /// Propagates bus failures.
    pub fn read_rgb<B, D>(&self, bus: &mut B, delay: &mut D) -> Result<(u8, u8, u8), DeviceError>
    where
        B: RegisterBus + ?Sized,
        D: DelayNs + ?Sized,
    {
        self.write_register(bus, REG_ENABLE, ENABLE_PON)?;
        delay.delay_ms(POWER_ON_DELAY_MS);
        self.write_register(bus, REG_ENABLE, ENABLE_PON | ENABLE_AEN)?;
        delay.delay_ms(INTEGRATION_WAIT_MS);
        Ok(self.read_raw(bus)?.to_rgb8())
    }

    fn write_register<B>(&self, bus: &mut B, register: u8, value: u8) -> Result<(), DeviceError>
    where
        B: RegisterBus + ?Sized,
    {
        bus.write(self.address, &[COMMAND_BIT | register, value])?;
        Ok(())
    }

    fn read_channel<B>(&self, bus: &mut B, low_register: u8) -> Result<u16, DeviceError>
    where
        B: RegisterBus + ?Sized,
    {
        let low = bus.read_register(self.address, COMMAND_BIT | low_register)?;
        let high = bus.read_register(self.address, COMMAND_BIT | (low_register + 1))?;
        Ok(u16::from_le_bytes([low, high]))
    }
}

impl Default for Tcs34725 {
    fn default() -> Self {
        Self::new(DEFAULT_ADDRESS)
    }
}
