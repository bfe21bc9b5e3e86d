use std::collections::HashMap;

use embedded_hal::delay::DelayNs;
use sorter_core::board::Board;
use sorter_core::bus::{Address, BusError, RegisterBus};
use sorter_core::devices::lcd1602::{PIN_BACKLIGHT, PIN_EN, PIN_RS};
use sorter_core::devices::{DeviceError, Lcd1602, Pca9685, Tcs34725, tcs34725};
use sorter_core::scheduler::{ColorSensor, Indicators, SystemTick};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Op {
    Write(u8, Vec<u8>),
    Read(u8, u8),
}

/// Bus that records every call and answers reads from a register map.
#[derive(Default)]
struct RecordingBus {
    ops: Vec<Op>,
    registers: HashMap<(u8, u8), u8>,
    fail_writes: bool,
}

impl RegisterBus for RecordingBus {
    fn write(&mut self, address: Address, bytes: &[u8]) -> Result<(), BusError> {
        if self.fail_writes {
            return Err(BusError::Nack(address));
        }
        self.ops.push(Op::Write(address.raw(), bytes.to_vec()));
        Ok(())
    }

    fn read_register(&mut self, address: Address, register: u8) -> Result<u8, BusError> {
        self.ops.push(Op::Read(address.raw(), register));
        Ok(self
            .registers
            .get(&(address.raw(), register))
            .copied()
            .unwrap_or(0))
    }
}

#[derive(Default)]
struct NoDelay {
    total_ns: u64,
}

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }
}

/// Panel that only remembers illumination switching.
#[derive(Default)]
struct Lamp {
    log: Vec<bool>,
}

impl Indicators for Lamp {
    fn set_ready(&mut self, _on: bool) {}

    fn set_sorting(&mut self, _on: bool) {}

    fn set_illumination(&mut self, on: bool) {
        self.log.push(on);
    }
}

impl SystemTick for Lamp {
    fn start_tick(&mut self) {}

    fn stop_tick(&mut self) {}
}

#[test]
fn servo_controller_init_sets_prescaler_then_mode() {
    let mut bus = RecordingBus::default();
    Pca9685::default().init(&mut bus).unwrap();
    assert_eq!(
        bus.ops,
        vec![
            Op::Write(0x40, vec![0xFE, 0x79]),
            Op::Write(0x40, vec![0x00, 0x21]),
        ]
    );
}

#[test]
fn channel_pulse_layout_is_on_zero_off_little_endian() {
    let mut bus = RecordingBus::default();
    let servos = Pca9685::default();

    servos.set_channel_pulse(&mut bus, 4, 385).unwrap();
    servos.set_channel_pulse(&mut bus, 15, 0xFFFF).unwrap();

    assert_eq!(
        bus.ops,
        vec![
            Op::Write(0x40, vec![0x16, 0x00, 0x00, 0x81, 0x01]),
            Op::Write(0x40, vec![0x42, 0x00, 0x00, 0xFF, 0x0F]),
        ]
    );
}

#[test]
fn out_of_range_channel_touches_nothing() {
    let mut bus = RecordingBus::default();
    assert_eq!(
        Pca9685::default().set_channel_pulse(&mut bus, 16, 300),
        Err(DeviceError::InvalidChannel(16))
    );
    assert!(bus.ops.is_empty());
}

#[test]
fn sensor_channels_are_read_low_byte_first_with_command_bit() {
    let mut bus = RecordingBus::default();
    bus.registers.insert((0x29, 0x94), 0x34);
    bus.registers.insert((0x29, 0x95), 0x12);

    let clear = Tcs34725::default().read_clear(&mut bus).unwrap();

    assert_eq!(clear, 0x1234);
    assert_eq!(bus.ops, vec![Op::Read(0x29, 0x94), Op::Read(0x29, 0x95)]);
}

#[test]
fn sensor_rgb_restarts_integration_then_scales_raw_channels() {
    let mut bus = RecordingBus::default();
    let mut delay = NoDelay::default();
    for (register, value) in [(0x94, 1_000_u16), (0x96, 800), (0x98, 200), (0x9A, 100)] {
        let [low, high] = value.to_le_bytes();
        bus.registers.insert((0x29, register), low);
        bus.registers.insert((0x29, register + 1), high);
    }

    let rgb = Tcs34725::default().read_rgb(&mut bus, &mut delay).unwrap();

    assert_eq!(rgb, (200, 50, 25));
    assert_eq!(
        bus.ops[..2],
        [
            Op::Write(0x29, vec![0x80, 0x01]),
            Op::Write(0x29, vec![0x80, 0x03]),
        ]
    );
    let reads: Vec<u8> = bus.ops[2..]
        .iter()
        .map(|op| match op {
            Op::Read(0x29, register) => *register,
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(reads, [0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9A, 0x9B]);
    // Power-on warm-up plus one full integration.
    assert_eq!(
        delay.total_ns,
        u64::from(3 + tcs34725::INTEGRATION_WAIT_MS) * 1_000_000
    );
}

#[test]
fn board_lights_the_tray_only_while_sampling() {
    let mut bus = RecordingBus::default();
    bus.registers.insert((0x29, 0x94), 10);
    let mut board = Board::new(bus, NoDelay::default(), Lamp::default());

    assert_eq!(board.read_rgb(), Ok((0, 0, 0)));
    assert_eq!(board.panel().log, vec![true, false]);
    assert!(board.bus().ops.iter().any(|op| *op == Op::Read(0x29, 0x9A)));

    let mut failing = Board::new(
        RecordingBus {
            fail_writes: true,
            ..RecordingBus::default()
        },
        NoDelay::default(),
        Lamp::default(),
    );
    assert!(failing.read_rgb().is_err());
    assert_eq!(failing.panel().log, vec![true, false]);
}

#[test]
fn sensor_init_powers_up_before_enabling_the_adc() {
    let mut bus = RecordingBus::default();
    let mut delay = NoDelay::default();

    Tcs34725::default().init(&mut bus, &mut delay).unwrap();

    assert_eq!(
        bus.ops,
        vec![
            Op::Write(0x29, vec![0x81, 0xD6]),
            Op::Write(0x29, vec![0x8F, 0x01]),
            Op::Write(0x29, vec![0x80, 0x01]),
            Op::Write(0x29, vec![0x80, 0x03]),
        ]
    );
    assert!(delay.total_ns > 0);
}

#[test]
fn display_rejects_rows_other_than_one_and_two() {
    let mut bus = RecordingBus::default();
    let mut delay = NoDelay::default();
    let mut lcd = Lcd1602::default();

    assert_eq!(
        lcd.write_line(&mut bus, &mut delay, 3, "nope"),
        Err(DeviceError::InvalidDisplayLine(3))
    );
    assert!(bus.ops.is_empty());
}

#[test]
fn display_line_is_cursor_command_then_sixteen_glyphs() {
    let mut bus = RecordingBus::default();
    let mut delay = NoDelay::default();
    let mut lcd = Lcd1602::default();

    lcd.write_line(&mut bus, &mut delay, 2, "this text is far too long")
        .unwrap();

    assert_eq!(bus.ops.len(), 1 + 16);
    let bl = PIN_BACKLIGHT;
    assert_eq!(
        bus.ops[0],
        Op::Write(0x27, vec![0xC0 | PIN_EN | bl, 0xC0 | bl, PIN_EN | bl, bl])
    );
    // 't' = 0x74
    assert_eq!(
        bus.ops[1],
        Op::Write(
            0x27,
            vec![
                0x70 | PIN_RS | PIN_EN | bl,
                0x70 | PIN_RS | bl,
                0x40 | PIN_RS | PIN_EN | bl,
                0x40 | PIN_RS | bl,
            ]
        )
    );
}

#[test]
fn backlight_is_a_single_expander_write() {
    let mut bus = RecordingBus::default();
    let mut lcd = Lcd1602::default();

    lcd.set_backlight(&mut bus, false).unwrap();
    lcd.set_backlight(&mut bus, true).unwrap();

    assert_eq!(
        bus.ops,
        vec![Op::Write(0x27, vec![0x00]), Op::Write(0x27, vec![PIN_BACKLIGHT])]
    );
    assert!(lcd.backlight());
}

#[test]
fn bus_errors_propagate_through_drivers() {
    let mut bus = RecordingBus {
        fail_writes: true,
        ..RecordingBus::default()
    };
    assert_eq!(
        Pca9685::default().init(&mut bus),
        Err(DeviceError::Bus(BusError::Nack(Address::new(0x40))))
    );
}
