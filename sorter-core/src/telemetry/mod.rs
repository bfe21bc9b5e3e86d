//! Bounded history of scheduler dispatches.
//!
//! Every event handled by the controller leaves one [`TransitionRecord`] in a
//! fixed-size ring so the console and the firmware logs can show what the
//! machine did recently without any allocation.

use core::fmt;

use heapless::{HistoryBuf, OldestOrdered};

use crate::events::Event;
use crate::scheduler::{Bin, SorterState};

/// Number of dispatch records retained.
pub const TRANSITION_LOG_CAPACITY: usize = 32;

/// Sequence number assigned to each dispatch.
pub type DispatchId = u32;

/// What a dispatch did besides a possible state change.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DispatchEffect {
    None,
    /// A sample fell below the threshold and `ObjectDetected` was posted.
    ObjectPosted,
    /// An object was routed into a bin.
    Sorted(Bin),
    /// The event did not apply to the current state.
    Ignored,
}

impl fmt::Display for DispatchEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchEffect::None => Ok(()),
            DispatchEffect::ObjectPosted => f.write_str("object posted"),
            DispatchEffect::Sorted(bin) => write!(f, "sorted {bin}"),
            DispatchEffect::Ignored => f.write_str("ignored"),
        }
    }
}

/// One handled event.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransitionRecord {
    pub id: DispatchId,
    pub event: Event,
    pub from: SorterState,
    pub to: SorterState,
    pub effect: DispatchEffect,
    /// Number of collaborator faults swallowed while handling the event.
    pub faults: u8,
}

impl fmt::Display for TransitionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}: {} -> {}", self.id, self.event, self.from, self.to)?;
        if self.effect != DispatchEffect::None {
            write!(f, " ({})", self.effect)?;
        }
        if self.faults > 0 {
            write!(f, " [{} fault(s)]", self.faults)?;
        }
        Ok(())
    }
}

/// Ring of the most recent dispatches.
pub struct TransitionLog<const CAPACITY: usize = TRANSITION_LOG_CAPACITY> {
    ring: HistoryBuf<TransitionRecord, CAPACITY>,
    next_id: DispatchId,
}

impl<const CAPACITY: usize> TransitionLog<CAPACITY> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_id: 0,
        }
    }

    /// Appends a record and returns its id. The oldest record is evicted once full.
    pub fn record(
        &mut self,
        event: Event,
        from: SorterState,
        to: SorterState,
        effect: DispatchEffect,
        faults: u8,
    ) -> DispatchId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.ring.write(TransitionRecord {
            id,
            event,
            from,
            to,
            effect,
            faults,
        });
        id
    }

    /// Records in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TransitionRecord> {
        self.ring.oldest_ordered()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&TransitionRecord> {
        self.ring.recent()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Total dispatches recorded since boot, including evicted ones.
    #[must_use]
    pub const fn total(&self) -> DispatchId {
        self.next_id
    }
}

impl<const CAPACITY: usize> Default for TransitionLog<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_keeps_latest_records_in_order() {
        let mut log: TransitionLog<2> = TransitionLog::new();
        log.record(
            Event::Btn2,
            SorterState::Off,
            SorterState::ModeSelection,
            DispatchEffect::None,
            0,
        );
        log.record(
            Event::Btn1,
            SorterState::ModeSelection,
            SorterState::AutoSort,
            DispatchEffect::None,
            0,
        );
        log.record(
            Event::Tick,
            SorterState::AutoSort,
            SorterState::AutoSort,
            DispatchEffect::ObjectPosted,
            1,
        );

        let ids: [DispatchId; 2] = {
            let mut iter = log.oldest_first().map(|record| record.id);
            [iter.next().unwrap(), iter.next().unwrap()]
        };
        assert_eq!(ids, [1, 2]);
        assert_eq!(log.len(), 2);
        assert_eq!(log.total(), 3);
        assert_eq!(log.latest().map(|record| record.faults), Some(1));
    }
}
