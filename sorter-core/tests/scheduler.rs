use std::collections::VecDeque;

use embedded_hal::delay::DelayNs;
use sorter_core::bus::{Address, BusError};
use sorter_core::config::SorterConfig;
use sorter_core::devices::DeviceError;
use sorter_core::events::{Event, EventChannel};
use sorter_core::platform::{SELECTOR_CHANNEL, ServoAngle, TILT_CHANNEL};
use sorter_core::scheduler::{
    Bin, ColorSensor, Controller, FaultSource, Indicators, ServoDriver, SorterState,
    StatusDisplay, SystemTick,
};
use sorter_core::telemetry::DispatchEffect;

/// Machine double that remembers what the controller asked for.
struct FakeMachine {
    lines: [String; 2],
    backlight: bool,
    pulses: Vec<(u8, u16)>,
    clear_readings: VecDeque<u16>,
    ambient: u16,
    rgb: (u8, u8, u8),
    ready: bool,
    sorting: bool,
    sorting_seen: bool,
    ticking: bool,
    slept_ms: u64,
    display_fails: bool,
}

impl FakeMachine {
    fn new() -> Self {
        Self {
            lines: [String::new(), String::new()],
            backlight: false,
            pulses: Vec::new(),
            clear_readings: VecDeque::new(),
            ambient: 1_000,
            rgb: (0, 0, 0),
            ready: false,
            sorting: false,
            sorting_seen: false,
            ticking: false,
            slept_ms: 0,
            display_fails: false,
        }
    }

    fn display_error(&self) -> Result<(), DeviceError> {
        if self.display_fails {
            Err(DeviceError::Bus(BusError::Nack(Address::new(0x27))))
        } else {
            Ok(())
        }
    }
}

impl ServoDriver for FakeMachine {
    fn set_channel_pulse(&mut self, channel: u8, pulse: u16) -> Result<(), DeviceError> {
        self.pulses.push((channel, pulse));
        Ok(())
    }
}

impl ColorSensor for FakeMachine {
    fn read_clear(&mut self) -> Result<u16, DeviceError> {
        Ok(self.clear_readings.pop_front().unwrap_or(self.ambient))
    }

    fn read_rgb(&mut self) -> Result<(u8, u8, u8), DeviceError> {
        Ok(self.rgb)
    }
}

impl StatusDisplay for FakeMachine {
    fn write_line(&mut self, line: u8, text: &str) -> Result<(), DeviceError> {
        self.display_error()?;
        match line {
            1 | 2 => {
                self.lines[usize::from(line - 1)] = text.to_string();
                Ok(())
            }
            other => Err(DeviceError::InvalidDisplayLine(other)),
        }
    }

    fn clear(&mut self) -> Result<(), DeviceError> {
        self.display_error()?;
        self.lines = [String::new(), String::new()];
        Ok(())
    }

    fn set_backlight(&mut self, on: bool) -> Result<(), DeviceError> {
        self.display_error()?;
        self.backlight = on;
        Ok(())
    }
}

impl Indicators for FakeMachine {
    fn set_ready(&mut self, on: bool) {
        self.ready = on;
    }

    fn set_sorting(&mut self, on: bool) {
        self.sorting = on;
        self.sorting_seen |= on;
    }

    fn set_illumination(&mut self, _on: bool) {}
}

impl SystemTick for FakeMachine {
    fn start_tick(&mut self) {
        self.ticking = true;
    }

    fn stop_tick(&mut self) {
        self.ticking = false;
    }
}

impl DelayNs for FakeMachine {
    fn delay_ns(&mut self, _ns: u32) {}

    fn delay_ms(&mut self, ms: u32) {
        self.slept_ms += u64::from(ms);
    }
}

fn post_and_drain(
    controller: &mut Controller,
    events: &EventChannel,
    machine: &mut FakeMachine,
    event: Event,
) {
    events.post(event);
    controller.drain(events, machine);
    assert!(events.is_empty());
}

fn auto_sort() -> (Controller, EventChannel, FakeMachine) {
    let mut controller = Controller::new(SorterConfig::DEFAULT);
    let events = EventChannel::new();
    let mut machine = FakeMachine::new();
    post_and_drain(&mut controller, &events, &mut machine, Event::Btn2);
    post_and_drain(&mut controller, &events, &mut machine, Event::Btn1);
    assert_eq!(controller.state(), SorterState::AutoSort);
    (controller, events, machine)
}

#[test]
fn boots_off_with_zero_counters() {
    let controller = Controller::default();
    assert_eq!(controller.state(), SorterState::Off);
    assert_eq!(controller.counters().total, 0);
    assert!(controller.last_fault().is_none());
    assert!(controller.history().is_empty());
}

#[test]
fn button_two_twice_enters_manual_sort_and_calibrates() {
    let mut controller = Controller::default();
    let events = EventChannel::new();
    let mut machine = FakeMachine::new();
    machine.ambient = 1_500;

    post_and_drain(&mut controller, &events, &mut machine, Event::Btn2);
    assert_eq!(controller.state(), SorterState::ModeSelection);
    assert_eq!(machine.lines[0], "Select mode");

    post_and_drain(&mut controller, &events, &mut machine, Event::Btn2);
    assert_eq!(controller.state(), SorterState::ManualSort);
    assert_eq!(controller.calibration().reference, 1_500);
    assert_eq!(controller.calibration().delta, 300);
    assert_eq!(machine.lines[0], "Manual mode");
    assert!(machine.ready);
    assert!(!machine.ticking);
}

#[test]
fn auto_sort_starts_tick_and_levels_platform() {
    let (controller, _events, machine) = auto_sort();
    assert!(machine.ticking);
    assert!(machine.ready);
    assert!(machine.backlight);
    assert_eq!(machine.lines[0], "Auto sort active");
    assert_eq!(
        machine.pulses,
        vec![
            (SELECTOR_CHANNEL, ServoAngle::Deg90.pulse()),
            (TILT_CHANNEL, ServoAngle::Deg90.pulse()),
        ]
    );
    assert_eq!(controller.calibration().reference, 1_000);
}

#[test]
fn blocked_sensor_on_tick_sorts_into_red_bin() {
    let (mut controller, events, mut machine) = auto_sort();
    machine.pulses.clear();
    machine.clear_readings.push_back(500);
    machine.rgb = (200, 50, 50);

    post_and_drain(&mut controller, &events, &mut machine, Event::Tick);

    let counters = controller.counters();
    assert_eq!((counters.total, counters.red), (1, 1));
    assert_eq!(machine.lines, ["Sorted so far".to_string(), "A:01R:01B:00G:00".to_string()]);
    assert_eq!(
        machine.pulses,
        vec![
            (SELECTOR_CHANNEL, 272),
            (TILT_CHANNEL, ServoAngle::Deg45.pulse()),
            (TILT_CHANNEL, ServoAngle::Deg90.pulse()),
        ]
    );
    assert_eq!(machine.slept_ms, 1_000);
    assert!(machine.sorting_seen);
    assert!(!machine.sorting);
    assert_eq!(
        controller.history().latest().map(|record| record.effect),
        Some(DispatchEffect::Sorted(Bin::Red))
    );
}

#[test]
fn ambient_tick_does_not_detect() {
    let (mut controller, events, mut machine) = auto_sort();
    machine.clear_readings.push_back(800);

    post_and_drain(&mut controller, &events, &mut machine, Event::Tick);

    assert_eq!(controller.counters().total, 0);
    assert!(!machine.sorting_seen);
}

#[test]
fn classification_follows_the_tie_break() {
    let cases = [
        ((200, 50, 50), Bin::Red),
        ((50, 200, 50), Bin::Green),
        ((50, 50, 200), Bin::Blue),
        ((100, 100, 100), Bin::Green),
    ];
    for (rgb, bin) in cases {
        let (mut controller, events, mut machine) = auto_sort();
        machine.rgb = rgb;
        post_and_drain(&mut controller, &events, &mut machine, Event::ObjectDetected);
        assert_eq!(controller.counters().for_bin(bin), 1, "{rgb:?}");
        assert_eq!(controller.counters().total, 1);
    }
}

#[test]
fn object_detected_is_handled_before_a_pending_tick() {
    let (mut controller, events, mut machine) = auto_sort();
    machine.rgb = (10, 10, 90);
    events.post(Event::Tick);
    events.post(Event::ObjectDetected);

    let report = controller.drain(&events, &mut machine);

    assert_eq!(report.handled, 2);
    let order: Vec<Event> = controller
        .history()
        .oldest_first()
        .map(|record| record.event)
        .collect();
    assert_eq!(&order[order.len() - 2..], &[Event::ObjectDetected, Event::Tick]);
}

#[test]
fn drain_handles_events_posted_by_handlers_before_returning() {
    let (mut controller, events, mut machine) = auto_sort();
    machine.clear_readings.push_back(100);
    machine.rgb = (20, 200, 20);
    events.post(Event::Tick);

    let report = controller.drain(&events, &mut machine);

    assert_eq!(report.handled, 2);
    assert!(events.is_empty());
    assert_eq!(controller.counters().green, 1);
}

#[test]
fn manual_mode_samples_on_button_one() {
    let mut controller = Controller::default();
    let events = EventChannel::new();
    let mut machine = FakeMachine::new();
    post_and_drain(&mut controller, &events, &mut machine, Event::Btn2);
    post_and_drain(&mut controller, &events, &mut machine, Event::Btn2);

    machine.clear_readings.push_back(200);
    machine.rgb = (10, 20, 200);
    post_and_drain(&mut controller, &events, &mut machine, Event::Btn1);
    assert_eq!(controller.counters().blue, 1);

    // Ticks are not part of manual mode.
    machine.clear_readings.push_back(200);
    post_and_drain(&mut controller, &events, &mut machine, Event::Tick);
    assert_eq!(controller.counters().total, 1);
}

#[test]
fn button_two_shuts_auto_sort_down() {
    let (mut controller, events, mut machine) = auto_sort();
    machine.pulses.clear();

    post_and_drain(&mut controller, &events, &mut machine, Event::Btn2);

    assert_eq!(controller.state(), SorterState::Off);
    assert!(!machine.ticking);
    assert!(!machine.ready);
    assert!(!machine.backlight);
    assert_eq!(machine.lines, [String::new(), String::new()]);
    assert_eq!(
        machine.pulses,
        vec![
            (SELECTOR_CHANNEL, ServoAngle::Deg90.pulse()),
            (TILT_CHANNEL, ServoAngle::Deg45.pulse()),
        ]
    );
}

#[test]
fn display_mode_shows_and_resets_counters() {
    let (mut controller, events, mut machine) = auto_sort();
    machine.rgb = (200, 10, 10);
    post_and_drain(&mut controller, &events, &mut machine, Event::ObjectDetected);
    post_and_drain(&mut controller, &events, &mut machine, Event::Btn2);

    post_and_drain(&mut controller, &events, &mut machine, Event::Btn1);
    assert_eq!(controller.state(), SorterState::Display);
    assert!(machine.backlight);
    assert_eq!(machine.lines[1], "A:01R:01B:00G:00");

    post_and_drain(&mut controller, &events, &mut machine, Event::Btn2);
    assert_eq!(controller.state(), SorterState::Display);
    assert_eq!(controller.counters().total, 0);
    assert_eq!(machine.lines[1], "A:00R:00B:00G:00");

    post_and_drain(&mut controller, &events, &mut machine, Event::Btn1);
    assert_eq!(controller.state(), SorterState::Off);
    assert!(!machine.backlight);
}

#[test]
fn events_without_a_handler_are_ignored() {
    let mut controller = Controller::default();
    let events = EventChannel::new();
    let mut machine = FakeMachine::new();

    for event in [Event::Tick, Event::ObjectDetected] {
        post_and_drain(&mut controller, &events, &mut machine, event);
        assert_eq!(controller.state(), SorterState::Off);
    }
    assert_eq!(
        controller.history().latest().map(|record| record.effect),
        Some(DispatchEffect::Ignored)
    );
    assert!(machine.pulses.is_empty());
}

#[test]
fn display_faults_are_recorded_without_blocking_transitions() {
    let mut controller = Controller::default();
    let events = EventChannel::new();
    let mut machine = FakeMachine::new();
    machine.display_fails = true;

    events.post(Event::Btn2);
    let report = controller.drain(&events, &mut machine);

    assert_eq!(controller.state(), SorterState::ModeSelection);
    assert_eq!(report.faults, 3);
    let fault = controller.last_fault().unwrap();
    assert_eq!(fault.source, FaultSource::Display);
    assert_eq!(fault.event, Event::Btn2);
    assert_eq!(controller.history().latest().map(|record| record.faults), Some(3));
}

#[test]
fn detection_threshold_is_configurable() {
    let config = SorterConfig::DEFAULT.with_detection_threshold_percent(50);
    let mut controller = Controller::new(config);
    let events = EventChannel::new();
    let mut machine = FakeMachine::new();
    post_and_drain(&mut controller, &events, &mut machine, Event::Btn2);
    post_and_drain(&mut controller, &events, &mut machine, Event::Btn1);

    // 30 % drop: enough for the default, not for 50 %.
    machine.clear_readings.push_back(700);
    post_and_drain(&mut controller, &events, &mut machine, Event::Tick);
    assert_eq!(controller.counters().total, 0);

    machine.clear_readings.push_back(400);
    post_and_drain(&mut controller, &events, &mut machine, Event::Tick);
    assert_eq!(controller.counters().total, 1);
}
