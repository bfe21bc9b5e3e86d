//! One-shot debounce gate for the two front-panel buttons.
//!
//! The first accepted edge posts the button's press event, disables that
//! button's edge interrupt at the source, and arms a one-shot window timer.
//! Bounces during the window never reach the CPU. When the window timer fires
//! the gate clears any latched edge flag and re-enables the interrupt.

use core::time::Duration;

use portable_atomic::{AtomicBool, Ordering};

use crate::events::{Event, EventChannel};

/// Number of buttons handled by the gate.
pub const BUTTON_COUNT: usize = 2;

/// Logical front-panel buttons.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ButtonId {
    Btn1,
    Btn2,
}

impl ButtonId {
    /// Both buttons in index order.
    pub const ALL: [ButtonId; BUTTON_COUNT] = [ButtonId::Btn1, ButtonId::Btn2];

    /// Deterministic index into per-button tables.
    #[must_use]
    pub const fn as_index(self) -> usize {
        match self {
            ButtonId::Btn1 => 0,
            ButtonId::Btn2 => 1,
        }
    }

    /// Event posted for an accepted press.
    #[must_use]
    pub const fn event(self) -> Event {
        match self {
            ButtonId::Btn1 => Event::Btn1,
            ButtonId::Btn2 => Event::Btn2,
        }
    }
}

/// Per-button debounce state.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DebounceState {
    Idle,
    Suppressing,
}

/// Result of feeding a raw edge into the gate.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EdgeVerdict {
    /// The edge started a new window and posted a press.
    Accepted,
    /// The button was already inside its window; the edge is discarded.
    Suppressed,
}

/// Edge-interrupt and window-timer control for the buttons.
pub trait DebounceHardware {
    /// Enables or masks the raw edge interrupt of `button`.
    fn set_edge_enabled(&mut self, button: ButtonId, enabled: bool);

    /// Clears an edge flag that latched while the interrupt was masked.
    fn clear_latched_edge(&mut self, button: ButtonId);

    /// Starts the one-shot window timer of `button`.
    fn arm_window(&mut self, button: ButtonId, window: Duration);

    /// Stops the window timer of `button`.
    fn disarm_window(&mut self, button: ButtonId);
}

/// Debounce gate shared by the edge and timer interrupts.
pub struct DebounceGate {
    suppressing: [AtomicBool; BUTTON_COUNT],
    window: Duration,
}

impl DebounceGate {
    /// Creates a gate with both buttons idle.
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self {
            suppressing: [AtomicBool::new(false), AtomicBool::new(false)],
            window,
        }
    }

    /// Suppression window applied after each accepted edge.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Current state of `button`.
    #[must_use]
    pub fn state(&self, button: ButtonId) -> DebounceState {
        if self.suppressing[button.as_index()].load(Ordering::Acquire) {
            DebounceState::Suppressing
        } else {
            DebounceState::Idle
        }
    }

    /// Edge interrupt body.
    pub fn on_raw_edge<H>(
        &self,
        button: ButtonId,
        hardware: &mut H,
        events: &EventChannel,
    ) -> EdgeVerdict
    where
        H: DebounceHardware + ?Sized,
    {
        let slot = &self.suppressing[button.as_index()];
        if slot
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return EdgeVerdict::Suppressed;
        }

        events.post(button.event());
        hardware.arm_window(button, self.window);
        hardware.set_edge_enabled(button, false);
        debug!("{} accepted, suppressing", button);
        EdgeVerdict::Accepted
    }

    /// Window timer interrupt body.
    pub fn on_window_expiry<H>(&self, button: ButtonId, hardware: &mut H)
    where
        H: DebounceHardware + ?Sized,
    {
        hardware.disarm_window(button);
        hardware.clear_latched_edge(button);
        self.suppressing[button.as_index()].store(false, Ordering::Release);
        hardware.set_edge_enabled(button, true);
    }
}
