use embassy_stm32::gpio::Output;
use portable_atomic::Ordering;
use sorter_core::scheduler::{Indicators, SystemTick};

use crate::shared::TICK_ENABLED;

/// Status LEDs, the sensor's illumination LED, and control of the periodic tick.
pub struct Panel<'d> {
    ready: Output<'d>,
    sorting: Output<'d>,
    illumination: Output<'d>,
}

impl<'d> Panel<'d> {
    pub fn new(ready: Output<'d>, sorting: Output<'d>, illumination: Output<'d>) -> Self {
        Self {
            ready,
            sorting,
            illumination,
        }
    }
}

impl Indicators for Panel<'_> {
    fn set_ready(&mut self, on: bool) {
        if on {
            self.ready.set_high();
        } else {
            self.ready.set_low();
        }
    }

    fn set_sorting(&mut self, on: bool) {
        if on {
            self.sorting.set_high();
        } else {
            self.sorting.set_low();
        }
    }

    fn set_illumination(&mut self, on: bool) {
        if on {
            self.illumination.set_high();
        } else {
            self.illumination.set_low();
        }
    }
}

impl SystemTick for Panel<'_> {
    fn start_tick(&mut self) {
        TICK_ENABLED.store(true, Ordering::Release);
    }

    fn stop_tick(&mut self) {
        TICK_ENABLED.store(false, Ordering::Release);
    }
}
