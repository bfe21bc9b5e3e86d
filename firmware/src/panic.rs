use core::panic::PanicInfo;

use portable_atomic::{AtomicBool, Ordering};

static PANICKING: AtomicBool = AtomicBool::new(false);

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    // A panic while formatting the first one must not recurse.
    if !PANICKING.swap(true, Ordering::AcqRel) {
        match info.location() {
            Some(location) => defmt::error!(
                "sorter panicked at {}:{}: {}",
                location.file(),
                location.line(),
                defmt::Display2Format(&info.message())
            ),
            None => defmt::error!("sorter panicked: {}", defmt::Display2Format(&info.message())),
        }
    }
    cortex_m::asm::udf();
}
