use sorter_core::scheduler::Controller;

use super::SorterBoard;
use crate::hw::Buttons;
use crate::shared::{EVENTS, WAKE};

/// Drains the event channel, then sleeps until an interrupt posts again.
#[embassy_executor::task]
pub async fn run(
    board: &'static mut SorterBoard,
    mut controller: Controller,
    _buttons: Buttons<'static>,
) -> ! {
    defmt::info!("sorter ready in {}", controller.state());
    loop {
        let report = controller.drain(&EVENTS, board);
        if report.handled > 0 {
            defmt::debug!(
                "handled {} event(s), {} fault(s), now {}",
                report.handled,
                report.faults,
                controller.state()
            );
        }
        if report.faults > 0
            && let Some(fault) = controller.last_fault()
        {
            defmt::warn!("last fault: {}", fault);
        }
        WAKE.wait().await;
    }
}
