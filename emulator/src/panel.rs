//! Front panel and timekeeping of the simulated machine.
//!
//! Everything shares one [`SimClock`]. Blocking delays issued by the drivers
//! advance it, so a sort visibly consumes servo settle time and can run out a
//! debounce window on the way.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use sorter_core::debounce::{BUTTON_COUNT, ButtonId, DebounceGate, DebounceHardware, EdgeVerdict};
use sorter_core::events::EventChannel;
use sorter_core::scheduler::{Indicators, SystemTick};

#[derive(Clone, Debug, Default)]
pub struct SimClock {
    now_ns: Rc<Cell<u64>>,
}

impl SimClock {
    pub fn now(&self) -> Duration {
        Duration::from_nanos(self.now_ns.get())
    }

    pub fn advance(&self, by: Duration) {
        let by = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.now_ns.set(self.now_ns.get().saturating_add(by));
    }
}

/// Busy-wait stand-in that just moves the clock.
pub struct SimDelay {
    clock: SimClock,
}

impl SimDelay {
    pub fn new(clock: SimClock) -> Self {
        Self { clock }
    }
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.clock.advance(Duration::from_nanos(u64::from(ns)));
    }
}

/// Ready, sorting, and illumination LEDs plus the tick enable.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SimPanel {
    pub ready: bool,
    pub sorting: bool,
    pub illumination: bool,
    pub tick_running: bool,
    /// Times the sorting LED was switched on.
    pub sort_flashes: u32,
    /// Times the illumination LED was switched on.
    pub lamp_flashes: u32,
}

impl Indicators for SimPanel {
    fn set_ready(&mut self, on: bool) {
        self.ready = on;
    }

    fn set_sorting(&mut self, on: bool) {
        if on && !self.sorting {
            self.sort_flashes += 1;
        }
        self.sorting = on;
    }

    fn set_illumination(&mut self, on: bool) {
        if on && !self.illumination {
            self.lamp_flashes += 1;
        }
        self.illumination = on;
    }
}

impl SystemTick for SimPanel {
    fn start_tick(&mut self) {
        self.tick_running = true;
    }

    fn stop_tick(&mut self) {
        self.tick_running = false;
    }
}

/// What became of one raw edge.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EdgeOutcome {
    Accepted,
    Suppressed,
    /// The line was masked; the edge only latched its pending flag.
    Masked,
}

/// Edge lines and one-shot window timers of both buttons.
pub struct SimButtons {
    clock: SimClock,
    edge_enabled: [bool; BUTTON_COUNT],
    latched: [bool; BUTTON_COUNT],
    deadline: [Option<Duration>; BUTTON_COUNT],
}

impl SimButtons {
    pub fn new(clock: SimClock) -> Self {
        Self {
            clock,
            edge_enabled: [true; BUTTON_COUNT],
            latched: [false; BUTTON_COUNT],
            deadline: [None; BUTTON_COUNT],
        }
    }

    /// Raw edge on `button`, seen by the gate only while the line is unmasked.
    pub fn edge(
        &mut self,
        gate: &DebounceGate,
        events: &EventChannel,
        button: ButtonId,
    ) -> EdgeOutcome {
        let index = button.as_index();
        if !self.edge_enabled[index] {
            self.latched[index] = true;
            return EdgeOutcome::Masked;
        }
        match gate.on_raw_edge(button, self, events) {
            EdgeVerdict::Accepted => EdgeOutcome::Accepted,
            EdgeVerdict::Suppressed => EdgeOutcome::Suppressed,
        }
    }

    /// Fires every window timer whose deadline has passed.
    pub fn service(&mut self, gate: &DebounceGate) {
        let now = self.clock.now();
        for button in ButtonId::ALL {
            if self.deadline[button.as_index()].is_some_and(|deadline| deadline <= now) {
                gate.on_window_expiry(button, self);
            }
        }
    }

    /// Time left in the suppression window of `button`.
    pub fn remaining(&self, button: ButtonId) -> Option<Duration> {
        self.deadline[button.as_index()].map(|deadline| deadline.saturating_sub(self.clock.now()))
    }
}

impl DebounceHardware for SimButtons {
    fn set_edge_enabled(&mut self, button: ButtonId, enabled: bool) {
        self.edge_enabled[button.as_index()] = enabled;
    }

    fn clear_latched_edge(&mut self, button: ButtonId) {
        self.latched[button.as_index()] = false;
    }

    fn arm_window(&mut self, button: ButtonId, window: Duration) {
        self.deadline[button.as_index()] = Some(self.clock.now() + window);
    }

    fn disarm_window(&mut self, button: ButtonId) {
        self.deadline[button.as_index()] = None;
    }
}
