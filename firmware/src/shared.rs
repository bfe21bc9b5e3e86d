//! State shared between interrupt handlers and executor tasks.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use portable_atomic::AtomicBool;
use sorter_core::bus::TransactionCell;
use sorter_core::config::SorterConfig;
use sorter_core::debounce::{BUTTON_COUNT, DebounceGate};
use sorter_core::events::EventChannel;

pub const CONFIG: SorterConfig = SorterConfig::DEFAULT;

/// Pending scheduler events.
pub static EVENTS: EventChannel = EventChannel::new();

/// Raised after every post so the sorter task leaves its sleep.
pub static WAKE: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// The single outstanding I2C1 transaction.
pub static TRANSACTION: TransactionCell = TransactionCell::new();

pub static GATE: DebounceGate = DebounceGate::new(CONFIG.debounce_window);

/// Window length handed from the edge interrupt to each button's timer task.
pub static WINDOWS: [Signal<CriticalSectionRawMutex, core::time::Duration>; BUTTON_COUNT] =
    [Signal::new(), Signal::new()];

/// Gates the periodic tick; toggled by the scheduler.
pub static TICK_ENABLED: AtomicBool = AtomicBool::new(false);

/// Posts `event` and wakes the sorter task.
pub fn post(event: sorter_core::events::Event) {
    EVENTS.post(event);
    WAKE.signal(());
}
