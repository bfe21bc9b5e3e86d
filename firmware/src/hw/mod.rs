//! STM32G0B1 bindings for the sorter core.
//!
//! | Function       | Resource            |
//! |----------------|---------------------|
//! | I2C bus        | I2C1, PB8 SCL / PB9 SDA |
//! | Button 1 / 2   | PA0 / PA1, EXTI0_1  |
//! | Ready LED      | PA5                 |
//! | Sorting LED    | PA6                 |
//! | Tick, windows  | Embassy time driver (TIM1) |

pub mod buttons;
pub mod i2c;
pub mod panel;

pub use buttons::{Buttons, window_task};
pub use i2c::I2cPeripheral;
pub use panel::Panel;
