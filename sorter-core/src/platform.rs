//! Tilting tray that routes sorted objects into their bins.
//!
//! Channel 0 of the PWM controller rotates the tray towards a bin, channel 4
//! tilts it to dump the object. Pulse counts are calibrated for the servos
//! fitted to the machine at a 50 Hz frame.

use core::time::Duration;

use embedded_hal::delay::DelayNs;

use crate::devices::DeviceError;
use crate::scheduler::{Bin, ServoDriver};

/// PWM channel of the bin selector servo.
pub const SELECTOR_CHANNEL: u8 = 0;
/// PWM channel of the tilt servo.
pub const TILT_CHANNEL: u8 = 4;

/// Servo positions used by the machine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ServoAngle {
    Deg45,
    Deg90,
    Deg135,
}

impl ServoAngle {
    /// PCA9685 off-count for this angle.
    #[must_use]
    pub const fn pulse(self) -> u16 {
        match self {
            ServoAngle::Deg45 => 272,
            ServoAngle::Deg90 => 385,
            ServoAngle::Deg135 => 497,
        }
    }

    #[must_use]
    pub const fn degrees(self) -> u16 {
        match self {
            ServoAngle::Deg45 => 45,
            ServoAngle::Deg90 => 90,
            ServoAngle::Deg135 => 135,
        }
    }
}

/// Tilt angle holding the object on the tray.
pub const TILT_LEVEL: ServoAngle = ServoAngle::Deg90;
/// Tilt angle dropping the object into the selected bin.
pub const TILT_DUMP: ServoAngle = ServoAngle::Deg45;

/// Selector angle facing `bin`.
#[must_use]
pub const fn bin_angle(bin: Bin) -> ServoAngle {
    match bin {
        Bin::Red => ServoAngle::Deg45,
        Bin::Green => ServoAngle::Deg90,
        Bin::Blue => ServoAngle::Deg135,
    }
}

/// Combined position of both servos.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pose {
    pub selector: ServoAngle,
    pub tilt: ServoAngle,
}

impl Pose {
    /// Centered and level, ready to receive an object.
    pub const DEFAULT: Self = Self {
        selector: ServoAngle::Deg90,
        tilt: TILT_LEVEL,
    };

    /// Centered and tipped, so nothing rests on the tray while idle.
    pub const PARKED: Self = Self {
        selector: ServoAngle::Deg90,
        tilt: TILT_DUMP,
    };
}

/// Drives both servos to `pose`.
///
/// # Errors
///
/// The first servo write that fails.
pub fn apply_pose<S>(servos: &mut S, pose: Pose) -> Result<(), DeviceError>
where
    S: ServoDriver + ?Sized,
{
    servos.set_channel_pulse(SELECTOR_CHANNEL, pose.selector.pulse())?;
    servos.set_channel_pulse(TILT_CHANNEL, pose.tilt.pulse())
}

/// Turns towards `bin`, dumps the object, and levels the tray again.
///
/// # Errors
///
/// The first servo write that fails; later moves are skipped.
pub fn route_to_bin<S>(servos: &mut S, bin: Bin, settle: Duration) -> Result<(), DeviceError>
where
    S: ServoDriver + DelayNs + ?Sized,
{
    let settle_ms = u32::try_from(settle.as_millis()).unwrap_or(u32::MAX);

    servos.set_channel_pulse(SELECTOR_CHANNEL, bin_angle(bin).pulse())?;
    servos.delay_ms(settle_ms);
    servos.set_channel_pulse(TILT_CHANNEL, TILT_DUMP.pulse())?;
    servos.delay_ms(settle_ms);
    servos.set_channel_pulse(TILT_CHANNEL, TILT_LEVEL.pulse())
}
