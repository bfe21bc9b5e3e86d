use embassy_time::{Duration, Ticker};
use portable_atomic::Ordering;
use sorter_core::events::Event;

use crate::shared::{self, TICK_ENABLED};

/// Posts a tick every `period` while the scheduler has the tick enabled.
#[embassy_executor::task]
pub async fn run(period: core::time::Duration) -> ! {
    let millis = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);
    let mut ticker = Ticker::every(Duration::from_millis(millis));
    loop {
        ticker.next().await;
        if TICK_ENABLED.load(Ordering::Acquire) {
            shared::post(Event::Tick);
        }
    }
}
