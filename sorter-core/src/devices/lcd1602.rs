//! 16x2 HD44780 character display behind a PCF8574 I2C backpack.
//!
//! The backpack maps its eight outputs to RS, RW, EN, the backlight switch, and
//! the display's upper four data lines, so every controller byte is sent as two
//! nibbles, each latched by an EN pulse. One bus write carries a whole byte
//! (four expander states).

use embedded_hal::delay::DelayNs;

use crate::bus::{Address, RegisterBus};

use super::DeviceError;

pub const DEFAULT_ADDRESS: Address = Address::new(0x27);

pub const LCD_COLUMNS: usize = 16;

/// Expander bit driving the register-select line.
pub const PIN_RS: u8 = 0x01;
/// Expander bit driving the enable strobe.
pub const PIN_EN: u8 = 0x04;
/// Expander bit switching the backlight transistor.
pub const PIN_BACKLIGHT: u8 = 0x08;

pub const CMD_CLEAR: u8 = 0x01;
pub const CMD_HOME: u8 = 0x02;
pub const CMD_ENTRY_INCREMENT: u8 = 0x06;
pub const CMD_DISPLAY_OFF: u8 = 0x08;
pub const CMD_DISPLAY_ON: u8 = 0x0C;
pub const CMD_FUNCTION_4BIT_2LINE: u8 = 0x28;
pub const CMD_LINE2: u8 = 0xC0;

const WAKE_NIBBLE: u8 = 0x30;
const FOUR_BIT_NIBBLE: u8 = 0x20;
const POWER_UP_DELAY_MS: u32 = 50;
const WAKE_DELAY_US: u32 = 4_500;
const SHORT_DELAY_US: u32 = 150;
const SLOW_COMMAND_DELAY_US: u32 = 2_000;

/// One of the two display rows.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DisplayLine {
    First,
    Second,
}

impl DisplayLine {
    /// Maps the 1-based row number used by callers.
    ///
    /// # Errors
    ///
    /// [`DeviceError::InvalidDisplayLine`] for anything but 1 or 2.
    pub const fn from_number(line: u8) -> Result<Self, DeviceError> {
        match line {
            1 => Ok(DisplayLine::First),
            2 => Ok(DisplayLine::Second),
            other => Err(DeviceError::InvalidDisplayLine(other)),
        }
    }

    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            DisplayLine::First => 1,
            DisplayLine::Second => 2,
        }
    }

    const fn cursor_command(self) -> u8 {
        match self {
            DisplayLine::First => CMD_HOME,
            DisplayLine::Second => CMD_LINE2,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Lcd1602 {
    address: Address,
    backlight: bool,
}

impl Lcd1602 {
    #[must_use]
    pub const fn new(address: Address) -> Self {
        Self {
            address,
            backlight: true,
        }
    }

    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    #[must_use]
    pub const fn backlight(&self) -> bool {
        self.backlight
    }

    /// Runs the HD44780 reset-by-instruction sequence and selects 4-bit mode.
    ///
    /// # Errors
    ///
    /// Propagates bus failures.
    pub fn init<B, D>(&mut self, bus: &mut B, delay: &mut D) -> Result<(), DeviceError>
    where
        B: RegisterBus + ?Sized,
        D: DelayNs + ?Sized,
    {
        delay.delay_ms(POWER_UP_DELAY_MS);
        self.write_nibble(bus, WAKE_NIBBLE, false)?;
        delay.delay_us(WAKE_DELAY_US);
        self.write_nibble(bus, WAKE_NIBBLE, false)?;
        delay.delay_us(WAKE_DELAY_US);
        self.write_nibble(bus, WAKE_NIBBLE, false)?;
        delay.delay_us(SHORT_DELAY_US);
        self.write_nibble(bus, FOUR_BIT_NIBBLE, false)?;

        self.command(bus, CMD_FUNCTION_4BIT_2LINE)?;
        self.command(bus, CMD_DISPLAY_OFF)?;
        self.command(bus, CMD_CLEAR)?;
        delay.delay_us(SLOW_COMMAND_DELAY_US);
        self.command(bus, CMD_ENTRY_INCREMENT)?;
        self.command(bus, CMD_DISPLAY_ON)?;
        Ok(())
    }

    /// Writes `text` to a row, truncated to 16 characters and padded with blanks.
    ///
    /// # Errors
    ///
    /// [`DeviceError::InvalidDisplayLine`] without bus traffic for rows other
    /// than 1 and 2; bus failures otherwise.
    pub fn write_line<B, D>(
        &mut self,
        bus: &mut B,
        delay: &mut D,
        line: u8,
        text: &str,
    ) -> Result<(), DeviceError>
    where
        B: RegisterBus + ?Sized,
        D: DelayNs + ?Sized,
    {
        let line = DisplayLine::from_number(line)?;
        self.command(bus, line.cursor_command())?;
        if line == DisplayLine::First {
            delay.delay_us(SLOW_COMMAND_DELAY_US);
        }

        let glyphs = text
            .chars()
            .map(|ch| u8::try_from(ch).ok().filter(u8::is_ascii).unwrap_or(b'?'))
            .chain(core::iter::repeat(b' '))
            .take(LCD_COLUMNS);
        for glyph in glyphs {
            self.data(bus, glyph)?;
        }
        Ok(())
    }

    /// Clears both rows and homes the cursor.
    ///
    /// # Errors
    ///
    /// Propagates bus failures.
    pub fn clear<B, D>(&mut self, bus: &mut B, delay: &mut D) -> Result<(), DeviceError>
    where
        B: RegisterBus + ?Sized,
        D: DelayNs + ?Sized,
    {
        self.command(bus, CMD_CLEAR)?;
        delay.delay_us(SLOW_COMMAND_DELAY_US);
        Ok(())
    }

    /// Switches the backlight; the setting sticks to every later write.
    ///
    /// # Errors
    ///
    /// Propagates bus failures.
    pub fn set_backlight<B>(&mut self, bus: &mut B, on: bool) -> Result<(), DeviceError>
    where
        B: RegisterBus + ?Sized,
    {
        self.backlight = on;
        bus.write(self.address, &[self.backlight_bit()])?;
        Ok(())
    }

    fn backlight_bit(&self) -> u8 {
        if self.backlight { PIN_BACKLIGHT } else { 0 }
    }

    fn command<B>(&self, bus: &mut B, value: u8) -> Result<(), DeviceError>
    where
        B: RegisterBus + ?Sized,
    {
        self.write_byte(bus, value, false)
    }

    fn data<B>(&self, bus: &mut B, value: u8) -> Result<(), DeviceError>
    where
        B: RegisterBus + ?Sized,
    {
        self.write_byte(bus, value, true)
    }

    fn write_byte<B>(&self, bus: &mut B, value: u8, data: bool) -> Result<(), DeviceError>
    where
        B: RegisterBus + ?Sized,
    {
        let high = self.expander_state(value & 0xF0, data);
        let low = self.expander_state(value << 4, data);
        bus.write(self.address, &[high | PIN_EN, high, low | PIN_EN, low])?;
        Ok(())
    }

    fn write_nibble<B>(&self, bus: &mut B, nibble: u8, data: bool) -> Result<(), DeviceError>
    where
        B: RegisterBus + ?Sized,
    {
        let state = self.expander_state(nibble & 0xF0, data);
        bus.write(self.address, &[state | PIN_EN, state])?;
        Ok(())
    }

    fn expander_state(&self, upper_nibble: u8, data: bool) -> u8 {
        let rs = if data { PIN_RS } else { 0 };
        upper_nibble | rs | self.backlight_bit()
    }
}

impl Default for Lcd1602 {
    fn default() -> Self {
        Self::new(DEFAULT_ADDRESS)
    }
}
