//! Priority-ordered event mailbox shared between interrupts and the main loop.
//!
//! Producers OR their bit into a single atomic byte; the scheduler extracts the
//! most significant pending bit first. Bit position is priority, so an object
//! detection posted after a tick is still handled before that tick when both
//! are pending at drain time.

use core::fmt;

use portable_atomic::{AtomicU8, Ordering};

/// Events the scheduler reacts to, lowest priority first.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// Periodic system tick.
    Tick,
    /// Debounced press of button 1.
    Btn1,
    /// Debounced press of button 2.
    Btn2,
    /// The clear channel dropped below the calibrated threshold.
    ObjectDetected,
}

/// Every event, highest priority first.
pub const PRIORITY_ORDER: [Event; 4] = [
    Event::ObjectDetected,
    Event::Btn2,
    Event::Btn1,
    Event::Tick,
];

impl Event {
    /// Bit assigned to the event inside [`EventChannel`].
    #[must_use]
    pub const fn bit(self) -> u8 {
        match self {
            Event::Tick => 1 << 0,
            Event::Btn1 => 1 << 1,
            Event::Btn2 => 1 << 2,
            Event::ObjectDetected => 1 << 3,
        }
    }

    /// Maps a single bit back to its event.
    #[must_use]
    pub const fn from_bit(bit: u8) -> Option<Self> {
        match bit {
            0b0001 => Some(Event::Tick),
            0b0010 => Some(Event::Btn1),
            0b0100 => Some(Event::Btn2),
            0b1000 => Some(Event::ObjectDetected),
            _ => None,
        }
    }

    /// Short lowercase label used by logs and the console.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Event::Tick => "tick",
            Event::Btn1 => "btn1",
            Event::Btn2 => "btn2",
            Event::ObjectDetected => "object-detected",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

const ASSIGNED_BITS: u8 = Event::Tick.bit()
    | Event::Btn1.bit()
    | Event::Btn2.bit()
    | Event::ObjectDetected.bit();

/// Atomic event bitset. Safe to post from any interrupt.
pub struct EventChannel {
    bits: AtomicU8,
}

impl EventChannel {
    /// Creates an empty channel.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bits: AtomicU8::new(0),
        }
    }

    /// Marks `event` pending. Posting an already pending event coalesces.
    pub fn post(&self, event: Event) {
        self.bits.fetch_or(event.bit(), Ordering::AcqRel);
    }

    /// Returns and clears the highest-priority pending event.
    pub fn take_next(&self) -> Option<Event> {
        let pending = self.bits.load(Ordering::Acquire) & ASSIGNED_BITS;
        if pending == 0 {
            return None;
        }
        let mask = 0x80_u8 >> pending.leading_zeros();
        // Producers only ever set bits, so clearing the one we observed is race-free.
        self.bits.fetch_and(!mask, Ordering::AcqRel);
        Event::from_bit(mask)
    }

    /// Snapshot of the pending bits.
    #[must_use]
    pub fn pending(&self) -> u8 {
        self.bits.load(Ordering::Acquire)
    }

    /// Returns `true` when `event` is pending.
    #[must_use]
    pub fn is_pending(&self, event: Event) -> bool {
        self.pending() & event.bit() != 0
    }

    /// Returns `true` when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending() & ASSIGNED_BITS == 0
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_channel_yields_nothing() {
        let channel = EventChannel::new();
        assert!(channel.is_empty());
        assert_eq!(channel.take_next(), None);
    }

    #[test]
    fn extraction_follows_priority_not_arrival() {
        let channel = EventChannel::new();
        channel.post(Event::Tick);
        channel.post(Event::Btn1);
        channel.post(Event::ObjectDetected);
        channel.post(Event::Btn2);

        assert_eq!(channel.take_next(), Some(Event::ObjectDetected));
        assert_eq!(channel.take_next(), Some(Event::Btn2));
        assert_eq!(channel.take_next(), Some(Event::Btn1));
        assert_eq!(channel.take_next(), Some(Event::Tick));
        assert_eq!(channel.take_next(), None);
    }

    #[test]
    fn repeated_posts_coalesce() {
        let channel = EventChannel::new();
        channel.post(Event::Tick);
        channel.post(Event::Tick);
        assert_eq!(channel.take_next(), Some(Event::Tick));
        assert!(channel.is_empty());
    }

    #[test]
    fn posting_during_drain_is_seen_by_the_next_take() {
        let channel = EventChannel::new();
        channel.post(Event::Tick);
        assert_eq!(channel.take_next(), Some(Event::Tick));
        channel.post(Event::ObjectDetected);
        assert!(channel.is_pending(Event::ObjectDetected));
        assert_eq!(channel.take_next(), Some(Event::ObjectDetected));
    }

    #[test]
    fn bits_round_trip_through_events() {
        for event in PRIORITY_ORDER {
            assert_eq!(Event::from_bit(event.bit()), Some(event));
        }
        assert_eq!(Event::from_bit(0b0011), None);
    }

    #[test]
    fn priority_order_matches_bit_significance() {
        let bits: [u8; 4] = PRIORITY_ORDER.map(Event::bit);
        assert!(bits.windows(2).all(|pair| pair[0] > pair[1]));
    }
}
