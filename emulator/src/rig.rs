//! Simulated I2C peripheral and the three devices hanging off it.
//!
//! [`SimBus`] implements [`BusHardware`] so the real [`BusEngine`] drives it.
//! `start` only latches the request; `wait_for_interrupt` then plays the whole
//! transfer through [`TransactionCell::on_interrupt_for`], the way the
//! peripheral's interrupt would while the caller sleeps. `abort` forgets a
//! latched transfer that has not been played yet. Addresses nobody answers to are
//! NACKed and followed by STOP, like the auto-end hardware does.
//!
//! [`BusEngine`]: sorter_core::bus::BusEngine

use sorter_core::bus::{
    Address, BusConfig, BusHardware, BusInterrupt, Direction, StartRequest, TransactionCell,
};
use sorter_core::devices::lcd1602::{self, LCD_COLUMNS, PIN_BACKLIGHT, PIN_EN, PIN_RS};
use sorter_core::devices::tcs34725::{self, COMMAND_BIT, ENABLE_AEN, ENABLE_PON};
use sorter_core::devices::{RawColor, pca9685};
use sorter_core::platform::{self, ServoAngle, TILT_DUMP};
use sorter_core::repl::Swatch;
use sorter_core::scheduler::Bin;

/// What the sensor sees with an empty tray.
pub const AMBIENT: RawColor = RawColor {
    clear: 1_200,
    red: 400,
    green: 400,
    blue: 400,
};

/// Clear count with an object shading the sensor.
pub const SHADED_CLEAR: u16 = 600;

const SWATCH_GAIN: u16 = 4;

/// TCS34725 register file fed by whatever sits on the tray.
#[derive(Debug, Default)]
pub struct SensorModel {
    pointer: u8,
    enable: u8,
    atime: u8,
    control: u8,
    tray: Option<Swatch>,
}

impl SensorModel {
    pub fn place(&mut self, swatch: Swatch) {
        self.tray = Some(swatch);
    }

    pub fn remove(&mut self) -> Option<Swatch> {
        self.tray.take()
    }

    pub fn tray(&self) -> Option<Swatch> {
        self.tray
    }

    /// Both the oscillator and the ADC are on.
    pub fn is_sampling(&self) -> bool {
        self.enable & (ENABLE_PON | ENABLE_AEN) == ENABLE_PON | ENABLE_AEN
    }

    pub fn integration(&self) -> (u8, u8) {
        (self.atime, self.control)
    }

    /// Channel counts the ADC would report right now.
    pub fn reading(&self) -> RawColor {
        if !self.is_sampling() {
            return RawColor::default();
        }
        match self.tray {
            None => AMBIENT,
            Some(swatch) => RawColor {
                clear: SHADED_CLEAR,
                red: u16::from(swatch.red) * SWATCH_GAIN,
                green: u16::from(swatch.green) * SWATCH_GAIN,
                blue: u16::from(swatch.blue) * SWATCH_GAIN,
            },
        }
    }

    fn write(&mut self, frame: &[u8]) {
        let Some((&command, data)) = frame.split_first() else {
            return;
        };
        if command & COMMAND_BIT == 0 {
            return;
        }
        self.pointer = command & 0x1F;
        if let Some(&value) = data.first() {
            match self.pointer {
                tcs34725::REG_ENABLE => self.enable = value,
                tcs34725::REG_ATIME => self.atime = value,
                tcs34725::REG_CONTROL => self.control = value,
                _ => {}
            }
        }
    }

    fn read(&self) -> u8 {
        let reading = self.reading();
        let channel = match self.pointer & !1 {
            tcs34725::REG_CDATAL => reading.clear,
            tcs34725::REG_RDATAL => reading.red,
            tcs34725::REG_GDATAL => reading.green,
            tcs34725::REG_BDATAL => reading.blue,
            _ => return 0,
        };
        let [low, high] = channel.to_le_bytes();
        if self.pointer & 1 == 0 { low } else { high }
    }
}

/// PCA9685 register file; only the channel OFF counts matter to the platform.
#[derive(Debug)]
pub struct ServoModel {
    registers: [u8; 256],
}

impl Default for ServoModel {
    fn default() -> Self {
        Self {
            registers: [0; 256],
        }
    }
}

impl ServoModel {
    /// OFF count of `channel`, masked to 12 bits.
    pub fn pulse(&self, channel: u8) -> u16 {
        let base = usize::from(pca9685::channel_base(channel));
        u16::from_le_bytes([self.registers[base + 2], self.registers[base + 3]]) & pca9685::MAX_PULSE
    }

    pub fn prescale(&self) -> u8 {
        self.registers[usize::from(pca9685::REG_PRESCALE)]
    }

    pub fn auto_increment(&self) -> bool {
        self.registers[usize::from(pca9685::REG_MODE1)] & 0x20 != 0
    }

    fn write(&mut self, frame: &[u8]) {
        let Some((&pointer, data)) = frame.split_first() else {
            return;
        };
        let step = u8::from(self.auto_increment());
        let mut register = pointer;
        for &value in data {
            self.registers[usize::from(register)] = value;
            register = register.wrapping_add(step);
        }
    }
}

/// HD44780 controller seen through the PCF8574 expander.
///
/// Nibbles are latched on the falling edge of EN. The controller starts in
/// 8-bit mode and switches to 4-bit on a function set with DL cleared.
#[derive(Debug)]
pub struct LcdModel {
    expander: u8,
    four_bit: bool,
    pending_high: Option<u8>,
    display_on: bool,
    address: u8,
    ddram: [[u8; 40]; 2],
}

impl Default for LcdModel {
    fn default() -> Self {
        Self {
            expander: 0,
            four_bit: false,
            pending_high: None,
            display_on: false,
            address: 0,
            ddram: [[b' '; 40]; 2],
        }
    }
}

impl LcdModel {
    pub fn backlight(&self) -> bool {
        self.expander & PIN_BACKLIGHT != 0
    }

    pub fn display_on(&self) -> bool {
        self.display_on
    }

    /// The visible sixteen columns of both rows.
    pub fn rows(&self) -> [String; 2] {
        self.ddram
            .map(|row| row[..LCD_COLUMNS].iter().copied().map(char::from).collect())
    }

    fn write(&mut self, frame: &[u8]) {
        for &state in frame {
            let falling = self.expander & PIN_EN != 0 && state & PIN_EN == 0;
            self.expander = state;
            if falling {
                self.latch(state & 0xF0, state & PIN_RS != 0);
            }
        }
    }

    fn latch(&mut self, nibble: u8, data: bool) {
        if !self.four_bit {
            // Low data lines are not wired; only function sets reach us here.
            self.instruction(nibble);
            return;
        }
        match self.pending_high.take() {
            None => self.pending_high = Some(nibble),
            Some(high) => {
                let value = high | (nibble >> 4);
                if data {
                    self.put(value);
                } else {
                    self.instruction(value);
                }
            }
        }
    }

    fn instruction(&mut self, value: u8) {
        match value {
            lcd1602::CMD_CLEAR => {
                self.ddram = [[b' '; 40]; 2];
                self.address = 0;
            }
            0x02..=0x03 => self.address = 0,
            0x08..=0x0F => self.display_on = value & 0x04 != 0,
            0x20..=0x3F => {
                if value & 0x10 == 0 {
                    self.four_bit = true;
                }
            }
            0x80..=0xFF => self.address = value & 0x7F,
            _ => {}
        }
    }

    fn put(&mut self, glyph: u8) {
        let (row, column) = if self.address >= 0x40 {
            (1, self.address - 0x40)
        } else {
            (0, self.address)
        };
        if let Some(cell) = self.ddram[row].get_mut(usize::from(column)) {
            *cell = glyph;
        }
        self.address = match self.address {
            0x27 => 0x40,
            0x67 => 0x00,
            other => other + 1,
        };
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Target {
    Servos,
    Sensor,
    Display,
}

/// The machine's I2C bus with all three devices attached.
pub struct SimBus {
    cell: &'static TransactionCell,
    config: Option<BusConfig>,
    pending: Option<StartRequest>,
    transactions: u64,
    nacks: u64,
    sensor: SensorModel,
    servos: ServoModel,
    lcd: LcdModel,
    bins: [u32; 3],
}

impl SimBus {
    pub fn new(cell: &'static TransactionCell) -> Self {
        Self {
            cell,
            config: None,
            pending: None,
            transactions: 0,
            nacks: 0,
            sensor: SensorModel::default(),
            servos: ServoModel::default(),
            lcd: LcdModel::default(),
            bins: [0; 3],
        }
    }

    pub fn config(&self) -> Option<&BusConfig> {
        self.config.as_ref()
    }

    pub fn sensor(&self) -> &SensorModel {
        &self.sensor
    }

    pub fn sensor_mut(&mut self) -> &mut SensorModel {
        &mut self.sensor
    }

    pub fn servos(&self) -> &ServoModel {
        &self.servos
    }

    pub fn lcd(&self) -> &LcdModel {
        &self.lcd
    }

    /// Objects that fell into each bin, indexed like [`Bin::ALL`].
    pub fn bins(&self) -> [u32; 3] {
        self.bins
    }

    /// Transactions played out and how many of them were NACKed.
    pub fn traffic(&self) -> (u64, u64) {
        (self.transactions, self.nacks)
    }

    fn target(address: Address) -> Option<Target> {
        if address == pca9685::DEFAULT_ADDRESS {
            Some(Target::Servos)
        } else if address == tcs34725::DEFAULT_ADDRESS {
            Some(Target::Sensor)
        } else if address == lcd1602::DEFAULT_ADDRESS {
            Some(Target::Display)
        } else {
            None
        }
    }

    fn play(&mut self, request: StartRequest) {
        let cell = self.cell;
        let irq = |event| cell.on_interrupt_for(request.generation, event);
        self.transactions += 1;
        let Some(target) = Self::target(request.address) else {
            self.nacks += 1;
            irq(BusInterrupt::Nack);
            irq(BusInterrupt::Stop);
            return;
        };

        match request.direction {
            Direction::Write => {
                let frame: Vec<u8> = (0..request.byte_count)
                    .map_while(|_| irq(BusInterrupt::TxReady).transmit)
                    .collect();
                match target {
                    Target::Servos => {
                        self.servos.write(&frame);
                        self.settle_tray();
                    }
                    Target::Sensor => self.sensor.write(&frame),
                    Target::Display => self.lcd.write(&frame),
                }
            }
            Direction::Read => {
                let value = match target {
                    Target::Sensor => self.sensor.read(),
                    Target::Servos | Target::Display => 0xFF,
                };
                irq(BusInterrupt::RxReady(value));
            }
        }
        irq(BusInterrupt::Stop);
    }

    /// Tipping the tray drops its object into the bin under the selector.
    fn settle_tray(&mut self) {
        if self.servos.pulse(platform::TILT_CHANNEL) != TILT_DUMP.pulse() {
            return;
        }
        let Some(bin) = selected_bin(&self.servos) else {
            return;
        };
        if self.sensor.remove().is_some()
            && let Some(index) = Bin::ALL.iter().position(|&candidate| candidate == bin)
        {
            self.bins[index] += 1;
        }
    }
}

impl BusHardware for SimBus {
    fn configure(&mut self, config: &BusConfig) {
        self.config = Some(*config);
    }

    fn start(&mut self, request: StartRequest) {
        self.pending = Some(request);
    }

    fn wait_for_interrupt(&mut self) {
        if let Some(request) = self.pending.take() {
            self.play(request);
        }
    }

    fn abort(&mut self) {
        self.pending = None;
    }
}

/// Reports which bin the selector currently points at, if any.
pub fn selected_bin(servos: &ServoModel) -> Option<Bin> {
    let selector = servos.pulse(platform::SELECTOR_CHANNEL);
    Bin::ALL
        .into_iter()
        .find(|&bin| platform::bin_angle(bin).pulse() == selector)
}

/// Tilt servo angle, when it matches one of the platform positions.
pub fn tilt_angle(servos: &ServoModel) -> Option<ServoAngle> {
    let tilt = servos.pulse(platform::TILT_CHANNEL);
    [ServoAngle::Deg45, ServoAngle::Deg90, ServoAngle::Deg135]
        .into_iter()
        .find(|angle| angle.pulse() == tilt)
}
