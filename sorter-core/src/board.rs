//! The sorter's peripherals wired onto one bus.
//!
//! [`Board`] owns the bus engine (anything implementing [`RegisterBus`]), a
//! delay provider, and the front panel, and implements every collaborator
//! trait the [`Controller`](crate::scheduler::Controller) needs. Firmware and
//! the emulator build the same board over different bus hardware.

use embedded_hal::delay::DelayNs;

use crate::bus::RegisterBus;
use crate::devices::{DeviceError, Lcd1602, Pca9685, Tcs34725};
use crate::platform::{self, Pose};
use crate::scheduler::{ColorSensor, Indicators, ServoDriver, StatusDisplay, SystemTick};

pub struct Board<B, D, P> {
    bus: B,
    delay: D,
    panel: P,
    servos: Pca9685,
    sensor: Tcs34725,
    lcd: Lcd1602,
}

impl<B, D, P> Board<B, D, P>
where
    B: RegisterBus,
    D: DelayNs,
    P: Indicators + SystemTick,
{
    /// Board with the devices at their factory addresses.
    #[must_use]
    pub fn new(bus: B, delay: D, panel: P) -> Self {
        Self {
            bus,
            delay,
            panel,
            servos: Pca9685::default(),
            sensor: Tcs34725::default(),
            lcd: Lcd1602::default(),
        }
    }

    /// Brings up all devices and leaves the machine dark and parked.
    ///
    /// # Errors
    ///
    /// The first device that fails to initialise.
    pub fn init(&mut self) -> Result<(), DeviceError> {
        self.servos.init(&mut self.bus)?;
        self.sensor.init(&mut self.bus, &mut self.delay)?;
        self.lcd.init(&mut self.bus, &mut self.delay)?;
        self.lcd.clear(&mut self.bus, &mut self.delay)?;
        self.lcd.set_backlight(&mut self.bus, false)?;
        self.panel.set_ready(false);
        self.panel.set_sorting(false);
        self.panel.set_illumination(false);
        platform::apply_pose(self, Pose::PARKED)
    }

    #[must_use]
    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    #[must_use]
    pub fn panel(&self) -> &P {
        &self.panel
    }

    pub fn panel_mut(&mut self) -> &mut P {
        &mut self.panel
    }

    /// Last backlight setting sent to the display.
    #[must_use]
    pub fn backlight(&self) -> bool {
        self.lcd.backlight()
    }
}

impl<B, D, P> ServoDriver for Board<B, D, P>
where
    B: RegisterBus,
{
    fn set_channel_pulse(&mut self, channel: u8, pulse: u16) -> Result<(), DeviceError> {
        self.servos.set_channel_pulse(&mut self.bus, channel, pulse)
    }
}

impl<B, D, P> ColorSensor for Board<B, D, P>
where
    B: RegisterBus,
    D: DelayNs,
    P: Indicators,
{
    fn read_clear(&mut self) -> Result<u16, DeviceError> {
        self.sensor.read_clear(&mut self.bus)
    }

    /// Samples with the illumination LED on; the LED goes dark again even
    /// when the read fails.
    fn read_rgb(&mut self) -> Result<(u8, u8, u8), DeviceError> {
        self.panel.set_illumination(true);
        let sample = self.sensor.read_rgb(&mut self.bus, &mut self.delay);
        self.panel.set_illumination(false);
        sample
    }
}

impl<B, D, P> StatusDisplay for Board<B, D, P>
where
    B: RegisterBus,
    D: DelayNs,
{
    fn write_line(&mut self, line: u8, text: &str) -> Result<(), DeviceError> {
        self.lcd.write_line(&mut self.bus, &mut self.delay, line, text)
    }

    fn clear(&mut self) -> Result<(), DeviceError> {
        self.lcd.clear(&mut self.bus, &mut self.delay)
    }

    fn set_backlight(&mut self, on: bool) -> Result<(), DeviceError> {
        self.lcd.set_backlight(&mut self.bus, on)
    }
}

impl<B, D, P> Indicators for Board<B, D, P>
where
    P: Indicators,
{
    fn set_ready(&mut self, on: bool) {
        self.panel.set_ready(on);
    }

    fn set_sorting(&mut self, on: bool) {
        self.panel.set_sorting(on);
    }

    fn set_illumination(&mut self, on: bool) {
        self.panel.set_illumination(on);
    }
}

impl<B, D, P> SystemTick for Board<B, D, P>
where
    P: SystemTick,
{
    fn start_tick(&mut self) {
        self.panel.start_tick();
    }

    fn stop_tick(&mut self) {
        self.panel.stop_tick();
    }
}

impl<B, D, P> DelayNs for Board<B, D, P>
where
    D: DelayNs,
{
    fn delay_ns(&mut self, ns: u32) {
        self.delay.delay_ns(ns);
    }

    fn delay_us(&mut self, us: u32) {
        self.delay.delay_us(us);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }
}
