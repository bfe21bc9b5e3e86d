//! I2C1 master driven at register level for the interrupt-driven bus engine.
//!
//! SCL on PB8, SDA on PB9 (AF6, open drain, external pull-ups). The peripheral
//! runs from the 16 MHz PCLK with auto-end enabled, so STOP always comes from
//! the NBYTES counter. The handler tags every event with the generation of the
//! transfer it last started; `abort` resets the peripheral through PE.

use embassy_stm32::interrupt;
use embassy_stm32::interrupt::InterruptExt;
use embassy_stm32::pac;
use embassy_stm32::pac::gpio::vals::{Moder, Ot};
use embassy_stm32::pac::i2c::vals::{Addmode, Autoend, Dir};
use embassy_stm32::peripherals::{I2C1, PB8, PB9};
use embassy_stm32::Peri;
use portable_atomic::{AtomicBool, AtomicU32, Ordering};
use sorter_core::bus::{BusConfig, BusHardware, BusInterrupt, Direction, Generation, StartRequest};

use crate::shared::TRANSACTION;

const SCL_PIN: usize = 8;
const SDA_PIN: usize = 9;
const I2C1_AF: u8 = 6;

/// Set when NACKF fired; the following STOPF then completes with NACK.
static NACK_SEEN: AtomicBool = AtomicBool::new(false);

/// Generation of the transfer last handed to the peripheral.
static ACTIVE: AtomicU32 = AtomicU32::new(0);

/// TIMINGR fields for a 16 MHz kernel clock.
#[derive(Copy, Clone, Debug, defmt::Format)]
struct Timing {
    presc: u8,
    scll: u8,
    sclh: u8,
    sdadel: u8,
    scldel: u8,
}

const fn timing_for(scl_hz: u32) -> Timing {
    if scl_hz > 100_000 {
        Timing {
            presc: 1,
            scll: 0x09,
            sclh: 0x03,
            sdadel: 0x2,
            scldel: 0x3,
        }
    } else {
        Timing {
            presc: 3,
            scll: 0x13,
            sclh: 0x0F,
            sdadel: 0x2,
            scldel: 0x4,
        }
    }
}

/// Owns I2C1 and its pins for the lifetime of the firmware.
pub struct I2cPeripheral<'d> {
    _i2c: Peri<'d, I2C1>,
    _scl: Peri<'d, PB8>,
    _sda: Peri<'d, PB9>,
}

impl<'d> I2cPeripheral<'d> {
    pub fn new(i2c: Peri<'d, I2C1>, scl: Peri<'d, PB8>, sda: Peri<'d, PB9>) -> Self {
        Self {
            _i2c: i2c,
            _scl: scl,
            _sda: sda,
        }
    }

    fn configure_pins() {
        pac::RCC.gpioenr().modify(|w| w.set_gpioben(true));
        let port = pac::GPIOB;
        for pin in [SCL_PIN, SDA_PIN] {
            port.otyper().modify(|w| w.set_ot(pin, Ot::OPEN_DRAIN));
            port.afr(pin / 8).modify(|w| w.set_afr(pin % 8, I2C1_AF));
            port.moder().modify(|w| w.set_moder(pin, Moder::ALTERNATE));
        }
    }
}

impl BusHardware for I2cPeripheral<'_> {
    fn configure(&mut self, config: &BusConfig) {
        Self::configure_pins();
        pac::RCC.apbenr1().modify(|w| w.set_i2c1en(true));

        let regs = pac::I2C1;
        regs.cr1().modify(|w| w.set_pe(false));
        let timing = timing_for(config.scl_hz);
        regs.timingr().write(|w| {
            w.set_presc(timing.presc);
            w.set_scll(timing.scll);
            w.set_sclh(timing.sclh);
            w.set_sdadel(timing.sdadel);
            w.set_scldel(timing.scldel);
        });
        regs.cr1().modify(|w| {
            w.set_rxie(true);
            w.set_txie(true);
            w.set_stopie(true);
            w.set_nackie(true);
            w.set_pe(true);
        });

        interrupt::I2C1.unpend();
        // SAFETY: the handler below only touches the transaction cell and I2C1.
        unsafe { interrupt::I2C1.enable() };
        defmt::info!("i2c1 up at {} Hz ({})", config.scl_hz, timing);
    }

    fn start(&mut self, request: StartRequest) {
        let regs = pac::I2C1;
        if regs.isr().read().busy() {
            defmt::warn!(
                "i2c1 still busy before start to {}; a slave may be holding SDA",
                request.address
            );
        }
        NACK_SEEN.store(false, Ordering::Release);
        ACTIVE.store(request.generation.raw(), Ordering::Release);
        regs.cr2().write(|w| {
            w.set_sadd(u16::from(request.address.raw()) << 1);
            w.set_add10(Addmode::BIT7);
            w.set_dir(match request.direction {
                Direction::Write => Dir::WRITE,
                Direction::Read => Dir::READ,
            });
            w.set_nbytes(request.byte_count);
            w.set_autoend(Autoend::AUTOMATIC);
            w.set_start(true);
        });
    }

    fn wait_for_interrupt(&mut self) {
        // The handler raises SEV on completion, so a wake-up between the
        // caller's completion check and this WFE is not lost.
        cortex_m::asm::wfe();
    }

    fn abort(&mut self) {
        let regs = pac::I2C1;
        // PE low resets the state machine and flags; it must read back low
        // before the peripheral is enabled again.
        regs.cr1().modify(|w| w.set_pe(false));
        while regs.cr1().read().pe() {}
        NACK_SEEN.store(false, Ordering::Release);
        regs.cr1().modify(|w| w.set_pe(true));
        defmt::warn!(
            "i2c1 reset after abandoning transfer {}",
            ACTIVE.load(Ordering::Acquire)
        );
    }
}

#[interrupt]
fn I2C1() {
    let regs = pac::I2C1;
    let isr = regs.isr().read();
    let generation = Generation::from_raw(ACTIVE.load(Ordering::Acquire));

    if isr.rxne() {
        let byte = regs.rxdr().read().rxdata();
        TRANSACTION.on_interrupt_for(generation, BusInterrupt::RxReady(byte));
    }

    if isr.txis()
        && let Some(byte) = TRANSACTION.on_interrupt_for(generation, BusInterrupt::TxReady).transmit
    {
        regs.txdr().write(|w| w.set_txdata(byte));
    }

    if isr.nackf() {
        regs.icr().write(|w| w.set_nackcf(true));
        NACK_SEEN.store(true, Ordering::Release);
    }

    if isr.stopf() {
        regs.icr().write(|w| w.set_stopcf(true));
        let cause = if NACK_SEEN.swap(false, Ordering::AcqRel) {
            BusInterrupt::Nack
        } else {
            BusInterrupt::Stop
        };
        if TRANSACTION.on_interrupt_for(generation, cause).wake {
            cortex_m::asm::sev();
        }
    }
}
