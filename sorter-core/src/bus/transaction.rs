//! The single in-flight bus transaction shared with interrupt context.
//!
//! [`TransactionCell`] is the only storage the I2C interrupt handler touches.
//! The main loop opens a transaction, the interrupt handler feeds and drains
//! bytes through [`TransactionCell::on_interrupt`], and the main loop observes
//! completion once the hardware reports STOP or NACK. All access goes through
//! a `critical_section::Mutex`, so the cell can live in a `static`.
//!
//! Every opened transaction gets a fresh [`Generation`]. Interrupt glue that
//! tags its events with the generation it started ([`TransactionCell::on_interrupt_for`])
//! cannot complete a later transaction with the tail of an abandoned one.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Vec;

use super::{Address, BusError};

/// Largest write payload a single transaction can carry.
pub const MAX_PAYLOAD: usize = 16;

/// Transfer direction programmed before START.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Write,
    Read,
}

/// Why the hardware ended a transaction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Completion {
    /// Byte counter expired and the hardware generated STOP.
    Stop,
    /// The addressed device did not acknowledge.
    Nack,
}

/// Interrupt causes the engine reacts to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusInterrupt {
    /// Transmit register is ready for the next byte.
    TxReady,
    /// A byte arrived in the receive register.
    RxReady(u8),
    /// STOP condition detected.
    Stop,
    /// NACK received from the addressed device.
    Nack,
}

/// What the interrupt glue has to do after [`TransactionCell::on_interrupt`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterruptOutcome {
    /// Byte to place in the transmit register, if any.
    pub transmit: Option<u8>,
    /// Whether the suspended caller must be woken.
    pub wake: bool,
}

impl InterruptOutcome {
    /// Nothing to transmit, nobody to wake.
    pub const IDLE: Self = Self {
        transmit: None,
        wake: false,
    };

    const fn transmit(byte: u8) -> Self {
        Self {
            transmit: Some(byte),
            wake: false,
        }
    }

    const fn wake() -> Self {
        Self {
            transmit: None,
            wake: true,
        }
    }
}

/// Identity of one opened transaction.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Generation(u32);

impl Generation {
    /// Rebuilds a generation stored by interrupt glue.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Phase {
    Idle,
    InFlight,
    Complete(Completion),
}

#[derive(Debug)]
struct Transaction {
    address: Address,
    direction: Direction,
    payload: Vec<u8, MAX_PAYLOAD>,
    cursor: usize,
    phase: Phase,
    holding: u8,
    generation: Generation,
}

impl Transaction {
    const fn new() -> Self {
        Self {
            address: Address::new(0),
            direction: Direction::Write,
            payload: Vec::new(),
            cursor: 0,
            phase: Phase::Idle,
            holding: 0,
            generation: Generation(0),
        }
    }

    fn ensure_free(&self) -> Result<(), BusError> {
        match self.phase {
            Phase::Idle => Ok(()),
            Phase::InFlight | Phase::Complete(_) => Err(BusError::Busy),
        }
    }

    fn open(&mut self, address: Address, direction: Direction) -> Generation {
        self.address = address;
        self.direction = direction;
        self.cursor = 0;
        self.phase = Phase::InFlight;
        self.generation = self.generation.next();
        self.generation
    }

    fn finish(&mut self, cause: Completion) {
        self.payload.clear();
        self.cursor = 0;
        self.phase = Phase::Complete(cause);
    }

    fn handle(&mut self, irq: BusInterrupt) -> InterruptOutcome {
        if self.phase != Phase::InFlight {
            return InterruptOutcome::IDLE;
        }
        match irq {
            BusInterrupt::TxReady => {
                if self.direction != Direction::Write {
                    return InterruptOutcome::IDLE;
                }
                match self.payload.get(self.cursor).copied() {
                    Some(byte) => {
                        self.cursor += 1;
                        InterruptOutcome::transmit(byte)
                    }
                    // The byte counter owns STOP; nothing left to feed.
                    None => InterruptOutcome::IDLE,
                }
            }
            BusInterrupt::RxReady(byte) => {
                self.holding = byte;
                InterruptOutcome::IDLE
            }
            BusInterrupt::Stop => {
                self.finish(Completion::Stop);
                InterruptOutcome::wake()
            }
            BusInterrupt::Nack => {
                self.finish(Completion::Nack);
                InterruptOutcome::wake()
            }
        }
    }
}

/// Cross-context home of the one outstanding transaction.
pub struct TransactionCell {
    inner: Mutex<RefCell<Transaction>>,
}

impl TransactionCell {
    /// Creates an idle cell.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Transaction::new())),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Transaction) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }

    /// Opens a write transaction carrying a copy of `bytes`.
    ///
    /// Returns the generation to hand to the hardware with the START request.
    ///
    /// # Errors
    ///
    /// [`BusError::Busy`] while another transaction is outstanding,
    /// [`BusError::EmptyPayload`] for zero bytes, and
    /// [`BusError::PayloadTooLong`] beyond [`MAX_PAYLOAD`].
    pub fn begin_write(&self, address: Address, bytes: &[u8]) -> Result<Generation, BusError> {
        if bytes.is_empty() {
            return Err(BusError::EmptyPayload);
        }
        self.with(|txn| {
            txn.ensure_free()?;
            txn.payload.clear();
            txn.payload
                .extend_from_slice(bytes)
                .map_err(|_| BusError::PayloadTooLong { len: bytes.len() })?;
            Ok(txn.open(address, Direction::Write))
        })
    }

    /// Opens a single-byte read transaction.
    ///
    /// # Errors
    ///
    /// [`BusError::Busy`] while another transaction is outstanding.
    pub fn begin_read(&self, address: Address) -> Result<Generation, BusError> {
        self.with(|txn| {
            txn.ensure_free()?;
            txn.payload.clear();
            Ok(txn.open(address, Direction::Read))
        })
    }

    /// Interrupt handler body for the transaction currently in flight.
    pub fn on_interrupt(&self, irq: BusInterrupt) -> InterruptOutcome {
        self.with(|txn| txn.handle(irq))
    }

    /// Interrupt handler body for the transfer started as `generation`.
    ///
    /// Events belonging to any other generation are dropped.
    pub fn on_interrupt_for(&self, generation: Generation, irq: BusInterrupt) -> InterruptOutcome {
        self.with(|txn| {
            if txn.generation == generation {
                txn.handle(irq)
            } else {
                InterruptOutcome::IDLE
            }
        })
    }

    /// Consumes the completion cause, freeing the cell for the next call.
    pub fn take_completion(&self) -> Option<Completion> {
        self.with(|txn| match txn.phase {
            Phase::Complete(cause) => {
                txn.phase = Phase::Idle;
                Some(cause)
            }
            Phase::Idle | Phase::InFlight => None,
        })
    }

    /// Drops an outstanding transaction after the caller gave up waiting.
    ///
    /// The generation moves on, so late events tagged for the abandoned
    /// transfer are ignored.
    pub fn abandon(&self) {
        self.with(|txn| {
            txn.payload.clear();
            txn.cursor = 0;
            txn.phase = Phase::Idle;
            txn.generation = txn.generation.next();
        });
    }

    /// Last byte captured by the receive interrupt.
    #[must_use]
    pub fn received(&self) -> u8 {
        self.with(|txn| txn.holding)
    }

    /// Returns `true` while a transaction is in flight.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.with(|txn| txn.phase == Phase::InFlight)
    }

    /// Address and direction of the in-flight transaction, if any.
    #[must_use]
    pub fn active(&self) -> Option<(Address, Direction)> {
        self.with(|txn| (txn.phase == Phase::InFlight).then_some((txn.address, txn.direction)))
    }
}

impl Default for TransactionCell {
    fn default() -> Self {
        Self::new()
    }
}
