use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_time::Delay;
use sorter_core::board::Board;
use sorter_core::bus::BusEngine;
use sorter_core::debounce::ButtonId;
use sorter_core::scheduler::Controller;
use static_cell::StaticCell;

use crate::hw::{self, Buttons, I2cPeripheral, Panel};
use crate::shared::{CONFIG, TRANSACTION};

mod sorter_task;
mod tick_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

pub type SorterBoard = Board<BusEngine<'static, I2cPeripheral<'static>>, Delay, Panel<'static>>;

static BOARD: StaticCell<SorterBoard> = StaticCell::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA0,
        PA1,
        PA5,
        PA6,
        PA7,
        PB8,
        PB9,
        I2C1,
        ..
    } = hal::init(config);

    let mut engine = BusEngine::new(I2cPeripheral::new(I2C1, PB8, PB9), &TRANSACTION, CONFIG.bus);
    engine.init();

    let panel = Panel::new(
        Output::new(PA5, Level::Low, Speed::Low),
        Output::new(PA6, Level::Low, Speed::Low),
        Output::new(PA7, Level::Low, Speed::Low),
    );
    let board = BOARD.init(Board::new(engine, Delay, panel));
    if let Err(error) = board.init() {
        defmt::warn!("board init incomplete: {}", error);
    }

    let buttons = Buttons::new(PA0, PA1);

    for button in ButtonId::ALL {
        spawner
            .spawn(hw::window_task(button))
            .expect("failed to spawn debounce window task");
    }

    spawner
        .spawn(tick_task::run(CONFIG.tick_period))
        .expect("failed to spawn tick task");

    spawner
        .spawn(sorter_task::run(board, Controller::new(CONFIG), buttons))
        .expect("failed to spawn sorter task");

    core::future::pending::<()>().await;
}
