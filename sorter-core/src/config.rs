//! Tunable parameters for the sorter.
//!
//! The debounce window and the detection threshold drifted between revisions
//! of the machine, so both live here instead of being baked into the state
//! machine. Everything is `const`-constructible so firmware can keep the
//! configuration in flash.

use core::time::Duration;

use crate::bus::BusConfig;

/// Suppression window applied after an accepted button edge.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);
/// Period of the system tick used for object polling in automatic mode.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(200);
/// Share of the ambient clear reading an object has to block, in percent.
pub const DEFAULT_DETECTION_THRESHOLD_PERCENT: u8 = 20;
/// Time the servos get to reach a pose before the next move.
pub const DEFAULT_SERVO_SETTLE: Duration = Duration::from_millis(500);

/// Runtime configuration shared by the scheduler, debounce gate, and bus.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SorterConfig {
    pub debounce_window: Duration,
    pub tick_period: Duration,
    pub detection_threshold_percent: u8,
    pub servo_settle: Duration,
    pub bus: BusConfig,
}

impl SorterConfig {
    /// Configuration matching the shipped machine.
    pub const DEFAULT: Self = Self {
        debounce_window: DEFAULT_DEBOUNCE_WINDOW,
        tick_period: DEFAULT_TICK_PERIOD,
        detection_threshold_percent: DEFAULT_DETECTION_THRESHOLD_PERCENT,
        servo_settle: DEFAULT_SERVO_SETTLE,
        bus: BusConfig::DEFAULT,
    };

    /// Returns a copy with a different detection threshold, clamped to 100 %.
    #[must_use]
    pub const fn with_detection_threshold_percent(mut self, percent: u8) -> Self {
        self.detection_threshold_percent = if percent > 100 { 100 } else { percent };
        self
    }

    /// Returns a copy with a different debounce window.
    #[must_use]
    pub const fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window = window;
        self
    }

    /// Returns a copy with a different servo settle time.
    #[must_use]
    pub const fn with_servo_settle(mut self, settle: Duration) -> Self {
        self.servo_settle = settle;
        self
    }

    /// Returns a copy with a different bus configuration.
    #[must_use]
    pub const fn with_bus(mut self, bus: BusConfig) -> Self {
        self.bus = bus;
        self
    }

    /// Detection delta for a given ambient reference.
    #[must_use]
    pub fn detection_delta(&self, reference: u16) -> u16 {
        let delta = u32::from(reference) * u32::from(self.detection_threshold_percent) / 100;
        u16::try_from(delta).unwrap_or(u16::MAX)
    }
}

impl Default for SorterConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
