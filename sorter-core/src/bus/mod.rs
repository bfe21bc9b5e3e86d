//! Interrupt-driven I2C master engine with a blocking call contract.
//!
//! The engine supports exactly one outstanding transaction, 7-bit addressing,
//! writes of up to [`MAX_PAYLOAD`] bytes, and single-byte register reads. STOP
//! is always generated by the peripheral's byte counter (auto-end); the engine
//! never commands it. Byte-level work happens in interrupt context through
//! [`TransactionCell::on_interrupt`]; [`BusEngine::write`] and
//! [`BusEngine::read_register`] program the peripheral, suspend the caller via
//! [`BusHardware::wait_for_interrupt`], and inspect the completion cause once
//! they are woken.
//!
//! By default a NACK wakes the caller exactly like STOP and the call reports
//! success, and a device that never completes a transfer stalls the caller
//! forever. [`NackPolicy::Report`] and [`BusConfig::wake_budget`] turn both
//! into distinct [`BusError`] values. A timed-out transfer is aborted at the
//! peripheral and its generation retired, so nothing it does afterwards can
//! complete the next call.

use core::fmt;

pub mod transaction;

pub use transaction::{
    BusInterrupt, Completion, Direction, Generation, InterruptOutcome, MAX_PAYLOAD,
    TransactionCell,
};

/// Standard-mode SCL frequency used by the machine.
pub const DEFAULT_SCL_HZ: u32 = 100_000;

/// 7-bit slave address.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Address(u8);

impl Address {
    /// Builds an address from the low seven bits of `raw`.
    #[must_use]
    pub const fn new(raw: u8) -> Self {
        Self(raw & 0x7F)
    }

    /// Builds an address, rejecting values that do not fit in seven bits.
    #[must_use]
    pub const fn try_new(raw: u8) -> Option<Self> {
        if raw > 0x7F { None } else { Some(Self(raw)) }
    }

    /// Raw 7-bit value.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// How a NACK is reported to the blocked caller.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NackPolicy {
    /// Treat NACK like STOP: the call returns success.
    #[default]
    Ignore,
    /// Surface NACK as [`BusError::Nack`].
    Report,
}

/// Bus-level configuration applied by [`BusEngine::init`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BusConfig {
    pub scl_hz: u32,
    pub nack_policy: NackPolicy,
    /// Wake-ups tolerated without completion before [`BusError::Timeout`].
    /// `None` waits forever.
    pub wake_budget: Option<u32>,
}

impl BusConfig {
    /// Configuration matching the shipped machine.
    pub const DEFAULT: Self = Self {
        scl_hz: DEFAULT_SCL_HZ,
        nack_policy: NackPolicy::Ignore,
        wake_budget: None,
    };

    /// Returns a copy with a different NACK policy.
    #[must_use]
    pub const fn with_nack_policy(mut self, policy: NackPolicy) -> Self {
        self.nack_policy = policy;
        self
    }

    /// Returns a copy that gives up after `wakeups` wake-ups without completion.
    #[must_use]
    pub const fn with_wake_budget(mut self, wakeups: u32) -> Self {
        self.wake_budget = Some(wakeups);
        self
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Errors surfaced by the bus engine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError {
    /// Another transaction is still outstanding.
    Busy,
    /// A write was requested with no bytes.
    EmptyPayload,
    /// A write exceeded [`MAX_PAYLOAD`].
    PayloadTooLong { len: usize },
    /// The device did not acknowledge (only with [`NackPolicy::Report`]).
    Nack(Address),
    /// The wake budget ran out before the transaction completed.
    Timeout(Address),
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::Busy => f.write_str("bus busy"),
            BusError::EmptyPayload => f.write_str("empty write payload"),
            BusError::PayloadTooLong { len } => {
                write!(f, "payload of {len} bytes exceeds {MAX_PAYLOAD}")
            }
            BusError::Nack(address) => write!(f, "nack from {address}"),
            BusError::Timeout(address) => write!(f, "timeout waiting on {address}"),
        }
    }
}

/// Parameters programmed into the peripheral before START.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StartRequest {
    pub address: Address,
    pub direction: Direction,
    /// Value for the hardware byte counter that triggers auto-STOP.
    pub byte_count: u8,
    /// `true` for the receive phase of a register read.
    pub repeated: bool,
    /// Tag for every interrupt event this transfer produces.
    pub generation: Generation,
}

/// Register-level access to the I2C peripheral from the main context.
pub trait BusHardware {
    /// Clock divider, master mode, 7-bit addressing, auto-STOP, and the four
    /// transaction interrupts (RX, TX, STOP, NACK).
    fn configure(&mut self, config: &BusConfig);

    /// Programs address, direction, and byte counter, then issues START.
    fn start(&mut self, request: StartRequest);

    /// Suspends the caller until the next interrupt wakes it.
    fn wait_for_interrupt(&mut self);

    /// Kills whatever transfer the peripheral is running and returns it to an
    /// idle, configured state.
    fn abort(&mut self);
}

/// Minimal register-oriented bus used by the device drivers.
pub trait RegisterBus {
    /// Writes `bytes` to the device in one transaction.
    ///
    /// # Errors
    ///
    /// Any [`BusError`] raised by the engine.
    fn write(&mut self, address: Address, bytes: &[u8]) -> Result<(), BusError>;

    /// Reads one byte from `register`.
    ///
    /// # Errors
    ///
    /// Any [`BusError`] raised by the engine.
    fn read_register(&mut self, address: Address, register: u8) -> Result<u8, BusError>;
}

/// Blocking front end of the interrupt-driven engine.
pub struct BusEngine<'a, H> {
    hardware: H,
    cell: &'a TransactionCell,
    config: BusConfig,
}

impl<'a, H> BusEngine<'a, H>
where
    H: BusHardware,
{
    /// Binds the engine to its hardware and the cell shared with the interrupt.
    pub const fn new(hardware: H, cell: &'a TransactionCell, config: BusConfig) -> Self {
        Self {
            hardware,
            cell,
            config,
        }
    }

    /// Applies the bus configuration to the peripheral. Call once at boot.
    pub fn init(&mut self) {
        self.hardware.configure(&self.config);
    }

    /// Returns the active configuration.
    pub const fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Returns the hardware handle.
    pub const fn hardware(&self) -> &H {
        &self.hardware
    }

    /// Returns the hardware handle mutably.
    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hardware
    }

    /// Writes `bytes` to `address` and returns once the hardware generated STOP.
    ///
    /// # Errors
    ///
    /// [`BusError::Busy`], [`BusError::EmptyPayload`], and
    /// [`BusError::PayloadTooLong`] before touching the bus;
    /// [`BusError::Nack`] and [`BusError::Timeout`] depending on configuration.
    pub fn write(&mut self, address: Address, bytes: &[u8]) -> Result<(), BusError> {
        let generation = self.cell.begin_write(address, bytes)?;
        let byte_count = u8::try_from(bytes.len()).unwrap_or(u8::MAX);
        self.hardware.start(StartRequest {
            address,
            direction: Direction::Write,
            byte_count,
            repeated: false,
            generation,
        });
        self.wait_for_completion(address)
    }

    /// Writes the register pointer, then reads a single byte after a repeated START.
    ///
    /// # Errors
    ///
    /// Same as [`BusEngine::write`] for either phase.
    pub fn read_register(&mut self, address: Address, register: u8) -> Result<u8, BusError> {
        self.write(address, &[register])?;

        let generation = self.cell.begin_read(address)?;
        self.hardware.start(StartRequest {
            address,
            direction: Direction::Read,
            byte_count: 1,
            repeated: true,
            generation,
        });
        self.wait_for_completion(address)?;
        Ok(self.cell.received())
    }

    fn wait_for_completion(&mut self, address: Address) -> Result<(), BusError> {
        let mut wakeups: u32 = 0;
        loop {
            if let Some(cause) = self.cell.take_completion() {
                return match (cause, self.config.nack_policy) {
                    (Completion::Stop, _) => Ok(()),
                    (Completion::Nack, NackPolicy::Ignore) => {
                        debug!("i2c nack from {} ignored", address);
                        Ok(())
                    }
                    (Completion::Nack, NackPolicy::Report) => Err(BusError::Nack(address)),
                };
            }

            if let Some(budget) = self.config.wake_budget
                && wakeups >= budget
            {
                self.cell.abandon();
                self.hardware.abort();
                warn!("i2c transaction to {} timed out", address);
                return Err(BusError::Timeout(address));
            }

            self.hardware.wait_for_interrupt();
            wakeups = wakeups.saturating_add(1);
        }
    }
}

impl<H> RegisterBus for BusEngine<'_, H>
where
    H: BusHardware,
{
    fn write(&mut self, address: Address, bytes: &[u8]) -> Result<(), BusError> {
        BusEngine::write(self, address, bytes)
    }

    fn read_register(&mut self, address: Address, register: u8) -> Result<u8, BusError> {
        BusEngine::read_register(self, address, register)
    }
}

impl<B> RegisterBus for &mut B
where
    B: RegisterBus + ?Sized,
{
    fn write(&mut self, address: Address, bytes: &[u8]) -> Result<(), BusError> {
        (**self).write(address, bytes)
    }

    fn read_register(&mut self, address: Address, register: u8) -> Result<u8, BusError> {
        (**self).read_register(address, register)
    }
}
