//! Front-panel buttons on PA0 (button 1) and PA1 (button 2), active low.
//!
//! Falling edges arrive through EXTI lines 0 and 1, which share one vector.
//! The debounce window itself runs on the Embassy time driver, one task per
//! button.

use embassy_stm32::gpio::{Input, Pull};
use embassy_stm32::interrupt;
use embassy_stm32::interrupt::InterruptExt;
use embassy_stm32::pac;
use embassy_stm32::peripherals::{PA0, PA1};
use embassy_stm32::Peri;
use embassy_time::{Duration, Timer};
use sorter_core::debounce::{ButtonId, DebounceHardware, EdgeVerdict};

use crate::shared::{self, EVENTS, GATE, WINDOWS};

const PORT_A: u8 = 0;

const fn exti_line(button: ButtonId) -> usize {
    match button {
        ButtonId::Btn1 => 0,
        ButtonId::Btn2 => 1,
    }
}

/// Keeps the input pins configured for as long as the firmware runs.
pub struct Buttons<'d> {
    _pins: [Input<'d>; 2],
}

impl<'d> Buttons<'d> {
    pub fn new(btn1: Peri<'d, PA0>, btn2: Peri<'d, PA1>) -> Self {
        let pins = [Input::new(btn1, Pull::Up), Input::new(btn2, Pull::Up)];

        let exti = pac::EXTI;
        for button in ButtonId::ALL {
            let line = exti_line(button);
            exti.exticr(line / 4).modify(|w| w.set_exti(line % 4, PORT_A));
            exti.ftsr(0).modify(|w| w.set_line(line, true));
            exti.fpr(0).write(|w| w.set_line(line, true));
            exti.imr(0).modify(|w| w.set_line(line, true));
        }

        interrupt::EXTI0_1.unpend();
        // SAFETY: the handler only touches EXTI and lock-free shared state.
        unsafe { interrupt::EXTI0_1.enable() };

        Self { _pins: pins }
    }
}

/// Register-level view of the EXTI lines and the window timers.
pub struct ExtiLines;

impl DebounceHardware for ExtiLines {
    fn set_edge_enabled(&mut self, button: ButtonId, enabled: bool) {
        let line = exti_line(button);
        pac::EXTI.imr(0).modify(|w| w.set_line(line, enabled));
    }

    fn clear_latched_edge(&mut self, button: ButtonId) {
        pac::EXTI
            .fpr(0)
            .write(|w| w.set_line(exti_line(button), true));
    }

    fn arm_window(&mut self, button: ButtonId, window: core::time::Duration) {
        WINDOWS[button.as_index()].signal(window);
    }

    fn disarm_window(&mut self, button: ButtonId) {
        WINDOWS[button.as_index()].reset();
    }
}

#[interrupt]
fn EXTI0_1() {
    let pending = pac::EXTI.fpr(0).read();
    for button in ButtonId::ALL {
        let line = exti_line(button);
        if !pending.line(line) {
            continue;
        }
        pac::EXTI.fpr(0).write(|w| w.set_line(line, true));
        if GATE.on_raw_edge(button, &mut ExtiLines, &EVENTS) == EdgeVerdict::Accepted {
            shared::WAKE.signal(());
        }
    }
}

/// Closes the debounce window of `button` once its timer runs out.
#[embassy_executor::task(pool_size = 2)]
pub async fn window_task(button: ButtonId) -> ! {
    let signal = &WINDOWS[button.as_index()];
    loop {
        let window = signal.wait().await;
        let millis = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        Timer::after(Duration::from_millis(millis)).await;
        GATE.on_window_expiry(button, &mut ExtiLines);
        defmt::debug!("{} window closed", button);
    }
}
