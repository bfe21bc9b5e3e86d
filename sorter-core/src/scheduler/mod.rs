//! Run-to-completion state machine driving the sorter.
//!
//! The [`Controller`] owns the operating mode, the sort counters, and the
//! ambient calibration. The main loop hands it events from the
//! [`EventChannel`] one at a time; every handler runs to completion and talks
//! to the hardware only through the collaborator traits below.
//!
//! | State         | Btn1                       | Btn2                     | Tick         | ObjectDetected |
//! |---------------|----------------------------|--------------------------|--------------|----------------|
//! | Off           | show counts, `Display`     | mode menu, `ModeSelection` |            |                |
//! | Display       | blank, `Off`               | reset counters           |              |                |
//! | ModeSelection | start auto, `AutoSort`     | start manual, `ManualSort` |            |                |
//! | AutoSort      |                            | shut down, `Off`         | sample       | sort           |
//! | ManualSort    | sample                     | shut down, `Off`         |              | sort           |
//!
//! Collaborator failures never block a transition. They are logged, counted in
//! the dispatch record, and kept as [`Controller::last_fault`].

use core::fmt;

use embedded_hal::delay::DelayNs;

use crate::config::SorterConfig;
use crate::devices::DeviceError;
use crate::events::{Event, EventChannel};
use crate::platform::{self, Pose};
use crate::telemetry::{DispatchEffect, TransitionLog};

mod classify;
mod screen;

pub use classify::{Bin, classify};
pub use screen::{Screen, ScreenLine};

/// Operating mode of the machine.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SorterState {
    #[default]
    Off,
    ModeSelection,
    AutoSort,
    ManualSort,
    Display,
}

impl fmt::Display for SorterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Objects sorted since boot. Each counter wraps at 256.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SortCounters {
    pub total: u8,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl SortCounters {
    /// Counts one object for `bin`.
    pub fn record(&mut self, bin: Bin) {
        let slot = match bin {
            Bin::Red => &mut self.red,
            Bin::Green => &mut self.green,
            Bin::Blue => &mut self.blue,
        };
        *slot = slot.wrapping_add(1);
        self.total = self.total.wrapping_add(1);
    }

    #[must_use]
    pub const fn for_bin(&self, bin: Bin) -> u8 {
        match bin {
            Bin::Red => self.red,
            Bin::Green => self.green,
            Bin::Blue => self.blue,
        }
    }
}

/// Ambient clear-channel reference captured when a sort mode starts.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibration {
    pub reference: u16,
    pub delta: u16,
}

impl Calibration {
    /// Reference of zero: nothing is ever detected.
    pub const UNCALIBRATED: Self = Self {
        reference: 0,
        delta: 0,
    };

    /// Captures `reference` with the configured threshold.
    #[must_use]
    pub fn from_reference(reference: u16, config: &SorterConfig) -> Self {
        Self {
            reference,
            delta: config.detection_delta(reference),
        }
    }

    /// An object blocks the sensor when the clear reading drops by more than `delta`.
    #[must_use]
    pub fn detects(&self, clear: u16) -> bool {
        u32::from(clear) + u32::from(self.delta) < u32::from(self.reference)
    }
}

/// Collaborator that failed during a dispatch.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultSource {
    Display,
    Sensor,
    Platform,
}

/// A swallowed collaborator error.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Fault {
    pub source: FaultSource,
    pub event: Event,
    pub error: DeviceError,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} during {}: {}", self.source, self.event, self.error)
    }
}

/// PWM outputs driving the platform servos.
pub trait ServoDriver {
    /// Programs one PWM channel.
    ///
    /// # Errors
    ///
    /// [`DeviceError::InvalidChannel`] past channel 15, bus errors otherwise.
    fn set_channel_pulse(&mut self, channel: u8, pulse: u16) -> Result<(), DeviceError>;
}

/// Light sensor used for detection and classification.
pub trait ColorSensor {
    /// Raw clear-channel count.
    ///
    /// # Errors
    ///
    /// Bus errors.
    fn read_clear(&mut self) -> Result<u16, DeviceError>;

    /// Red, green, and blue scaled into a byte each.
    ///
    /// # Errors
    ///
    /// Bus errors.
    fn read_rgb(&mut self) -> Result<(u8, u8, u8), DeviceError>;
}

/// Two-line character display.
pub trait StatusDisplay {
    /// Writes one row (1 or 2).
    ///
    /// # Errors
    ///
    /// [`DeviceError::InvalidDisplayLine`] for other rows, bus errors otherwise.
    fn write_line(&mut self, line: u8, text: &str) -> Result<(), DeviceError>;

    /// Blanks both rows.
    ///
    /// # Errors
    ///
    /// Bus errors.
    fn clear(&mut self) -> Result<(), DeviceError>;

    /// Switches the backlight.
    ///
    /// # Errors
    ///
    /// Bus errors.
    fn set_backlight(&mut self, on: bool) -> Result<(), DeviceError>;
}

/// Front-panel status LEDs and the sensor's illumination LED.
pub trait Indicators {
    fn set_ready(&mut self, on: bool);
    fn set_sorting(&mut self, on: bool);
    /// Lights the object on the tray for a colour sample.
    fn set_illumination(&mut self, on: bool);
}

/// Periodic tick source used for polling in automatic mode.
pub trait SystemTick {
    fn start_tick(&mut self);
    fn stop_tick(&mut self);
}

/// Everything the controller drives.
pub trait SorterIo:
    ServoDriver + ColorSensor + StatusDisplay + Indicators + SystemTick + DelayNs
{
}

impl<T> SorterIo for T where
    T: ServoDriver + ColorSensor + StatusDisplay + Indicators + SystemTick + DelayNs
{
}

/// Summary of one [`Controller::drain`] pass.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DrainReport {
    /// Events dispatched, including ones posted while draining.
    pub handled: usize,
    /// Collaborator faults swallowed during the pass.
    pub faults: usize,
}

/// Application state and event handlers.
pub struct Controller {
    config: SorterConfig,
    state: SorterState,
    counters: SortCounters,
    calibration: Calibration,
    last_fault: Option<Fault>,
    history: TransitionLog,
    dispatch_faults: u8,
}

impl Controller {
    /// Boot state: off, zero counters, uncalibrated.
    #[must_use]
    pub const fn new(config: SorterConfig) -> Self {
        Self {
            config,
            state: SorterState::Off,
            counters: SortCounters {
                total: 0,
                red: 0,
                green: 0,
                blue: 0,
            },
            calibration: Calibration::UNCALIBRATED,
            last_fault: None,
            history: TransitionLog::new(),
            dispatch_faults: 0,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &SorterConfig {
        &self.config
    }

    #[must_use]
    pub const fn state(&self) -> SorterState {
        self.state
    }

    #[must_use]
    pub const fn counters(&self) -> SortCounters {
        self.counters
    }

    #[must_use]
    pub const fn calibration(&self) -> Calibration {
        self.calibration
    }

    #[must_use]
    pub const fn last_fault(&self) -> Option<Fault> {
        self.last_fault
    }

    #[must_use]
    pub const fn history(&self) -> &TransitionLog {
        &self.history
    }

    /// Handles pending events in priority order until the channel is empty.
    ///
    /// Events posted by a handler (or by an interrupt meanwhile) are handled in
    /// the same pass, so the caller can sleep once this returns.
    pub fn drain<IO>(&mut self, events: &EventChannel, io: &mut IO) -> DrainReport
    where
        IO: SorterIo + ?Sized,
    {
        let mut report = DrainReport::default();
        while let Some(event) = events.take_next() {
            self.dispatch(event, events, io);
            report.handled += 1;
            report.faults += usize::from(self.dispatch_faults);
        }
        report
    }

    /// Runs the handler for `event` in the current state and returns the new state.
    pub fn dispatch<IO>(&mut self, event: Event, events: &EventChannel, io: &mut IO) -> SorterState
    where
        IO: SorterIo + ?Sized,
    {
        let from = self.state;
        self.dispatch_faults = 0;

        let (to, effect) = match (from, event) {
            (SorterState::Off, Event::Btn1) => {
                self.attempt(event, FaultSource::Display, io.set_backlight(true));
                self.show(event, io, Screen::Counts(self.counters));
                (SorterState::Display, DispatchEffect::None)
            }
            (SorterState::Off, Event::Btn2) => {
                self.attempt(event, FaultSource::Display, io.set_backlight(true));
                self.show(event, io, Screen::ModeMenu);
                (SorterState::ModeSelection, DispatchEffect::None)
            }
            (SorterState::Display, Event::Btn1) => {
                self.blank(event, io);
                (SorterState::Off, DispatchEffect::None)
            }
            (SorterState::Display, Event::Btn2) => {
                self.counters = SortCounters::default();
                self.show(event, io, Screen::Counts(self.counters));
                (SorterState::Display, DispatchEffect::None)
            }
            (SorterState::ModeSelection, Event::Btn1) => {
                self.announce(event, io, Screen::AutoBanner);
                self.attempt(
                    event,
                    FaultSource::Platform,
                    platform::apply_pose(io, Pose::DEFAULT),
                );
                io.start_tick();
                self.calibrate(event, io);
                io.set_ready(true);
                info!("auto sort, reference {}", self.calibration.reference);
                (SorterState::AutoSort, DispatchEffect::None)
            }
            (SorterState::ModeSelection, Event::Btn2) => {
                self.announce(event, io, Screen::ManualBanner);
                self.calibrate(event, io);
                io.set_ready(true);
                info!("manual sort, reference {}", self.calibration.reference);
                (SorterState::ManualSort, DispatchEffect::None)
            }
            (SorterState::AutoSort, Event::Btn2) => {
                io.stop_tick();
                self.shut_down(event, io);
                (SorterState::Off, DispatchEffect::None)
            }
            (SorterState::ManualSort, Event::Btn2) => {
                self.shut_down(event, io);
                (SorterState::Off, DispatchEffect::None)
            }
            (SorterState::AutoSort, Event::Tick) | (SorterState::ManualSort, Event::Btn1) => {
                (from, self.sample(event, events, io))
            }
            (SorterState::AutoSort | SorterState::ManualSort, Event::ObjectDetected) => {
                (from, self.sort(event, io))
            }
            _ => (from, DispatchEffect::Ignored),
        };

        self.state = to;
        let id = self
            .history
            .record(event, from, to, effect, self.dispatch_faults);
        if from == to {
            debug!("#{} {} in {}", id, event, from);
        } else {
            info!("#{} {}: {} -> {}", id, event, from, to);
        }
        to
    }

    fn sample<IO>(&mut self, event: Event, events: &EventChannel, io: &mut IO) -> DispatchEffect
    where
        IO: SorterIo + ?Sized,
    {
        let Some(clear) = self.attempt(event, FaultSource::Sensor, io.read_clear()) else {
            return DispatchEffect::None;
        };
        if self.calibration.detects(clear) {
            events.post(Event::ObjectDetected);
            DispatchEffect::ObjectPosted
        } else {
            DispatchEffect::None
        }
    }

    fn sort<IO>(&mut self, event: Event, io: &mut IO) -> DispatchEffect
    where
        IO: SorterIo + ?Sized,
    {
        io.set_sorting(true);
        let Some((red, green, blue)) = self.attempt(event, FaultSource::Sensor, io.read_rgb())
        else {
            io.set_sorting(false);
            return DispatchEffect::None;
        };

        let bin = classify(red, green, blue);
        self.show(event, io, Screen::Detected(bin));
        let settle = self.config.servo_settle;
        self.attempt(
            event,
            FaultSource::Platform,
            platform::route_to_bin(io, bin, settle),
        );
        self.counters.record(bin);
        self.show(event, io, Screen::Counts(self.counters));
        io.set_sorting(false);
        DispatchEffect::Sorted(bin)
    }

    fn calibrate<IO>(&mut self, event: Event, io: &mut IO)
    where
        IO: SorterIo + ?Sized,
    {
        if let Some(reference) = self.attempt(event, FaultSource::Sensor, io.read_clear()) {
            self.calibration = Calibration::from_reference(reference, &self.config);
        }
    }

    fn announce<IO>(&mut self, event: Event, io: &mut IO, screen: Screen)
    where
        IO: SorterIo + ?Sized,
    {
        self.attempt(event, FaultSource::Display, io.set_backlight(true));
        self.attempt(event, FaultSource::Display, io.clear());
        self.show(event, io, screen);
    }

    fn shut_down<IO>(&mut self, event: Event, io: &mut IO)
    where
        IO: SorterIo + ?Sized,
    {
        self.attempt(
            event,
            FaultSource::Platform,
            platform::apply_pose(io, Pose::PARKED),
        );
        io.set_ready(false);
        self.blank(event, io);
    }

    fn blank<IO>(&mut self, event: Event, io: &mut IO)
    where
        IO: SorterIo + ?Sized,
    {
        self.attempt(event, FaultSource::Display, io.clear());
        self.attempt(event, FaultSource::Display, io.set_backlight(false));
    }

    fn show<IO>(&mut self, event: Event, io: &mut IO, screen: Screen)
    where
        IO: SorterIo + ?Sized,
    {
        let [first, second] = screen.render();
        self.attempt(event, FaultSource::Display, io.write_line(1, &first));
        self.attempt(event, FaultSource::Display, io.write_line(2, &second));
    }

    fn attempt<T>(
        &mut self,
        event: Event,
        source: FaultSource,
        result: Result<T, DeviceError>,
    ) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                let fault = Fault {
                    source,
                    event,
                    error,
                };
                warn!("{} fault during {}: {}", source, event, error);
                self.last_fault = Some(fault);
                self.dispatch_faults = self.dispatch_faults.saturating_add(1);
                None
            }
        }
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new(SorterConfig::DEFAULT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_wrap_instead_of_saturating() {
        let mut counters = SortCounters {
            total: u8::MAX,
            red: u8::MAX,
            green: 0,
            blue: 0,
        };
        counters.record(Bin::Red);
        assert_eq!(counters.total, 0);
        assert_eq!(counters.red, 0);
        counters.record(Bin::Blue);
        assert_eq!(counters.for_bin(Bin::Blue), 1);
        assert_eq!(counters.total, 1);
    }

    #[test]
    fn detection_requires_a_drop_beyond_delta() {
        let calibration = Calibration::from_reference(1_000, &SorterConfig::DEFAULT);
        assert_eq!(calibration.delta, 200);
        assert!(!calibration.detects(1_000));
        assert!(!calibration.detects(800));
        assert!(calibration.detects(799));
        assert!(!Calibration::UNCALIBRATED.detects(0));
    }
}
