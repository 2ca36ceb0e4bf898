//! Simulation clock and the queue of pending events.
//!
//! Time only moves by jumping to the next pending event. Pending events are ordered by:
//!
//! 1. Time (earlier first)
//! 2. Kind priority (departures before arrivals before scheduler checks)
//! 3. Sequence number (insertion order)
//!
//! so a run is reproducible for a given seed.

use std::{cmp::Ordering, collections::BTreeMap, time::Duration};

use crate::error::InvalidEventError;

/// Ordering of events that share a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventPriority {
    /// A vehicle clearing the junction.
    Departure,
    /// A vehicle joining a lane.
    Arrival,
    /// A scheduler wake-up with no payload of its own.
    Check,
}

/// Anything that can sit in the event queue.
pub trait Prioritised {
    /// Tie-break rank among events at the same time.
    fn priority(&self) -> EventPriority;
}

/// Key for ordering pending events.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct EventKey {
    /// When this event should be dispatched.
    pub time: Duration,
    /// Rank among events at the same time.
    pub priority: EventPriority,
    /// Insertion order, for FIFO among otherwise equal events.
    pub sequence: u64,
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then(self.priority.cmp(&other.priority))
            .then(self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The authoritative simulation time, plus everything scheduled to happen.
#[derive(Debug)]
pub struct Clock<E> {
    now: Duration,
    sequence: u64,
    pending: BTreeMap<EventKey, E>,
}

impl<E: Prioritised> Clock<E> {
    #[allow(missing_docs)]
    pub fn new(start: Duration) -> Self {
        Self {
            now: start,
            sequence: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Current simulation time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Schedule an event at an absolute time. Rejects times before `now`.
    pub fn schedule_at(&mut self, at: Duration, event: E) -> Result<EventKey, InvalidEventError> {
        if at < self.now {
            return Err(InvalidEventError::InPast { at, now: self.now });
        }
        Ok(self.insert(at, event))
    }

    /// Schedule an event `delay` after now. Cannot be in the past.
    ///
    /// Returns `None`, dropping the event, if that time cannot be represented. Such an event would
    /// never be reached.
    pub fn schedule_after(&mut self, delay: Duration, event: E) -> Option<EventKey> {
        let at = self.now.checked_add(delay)?;
        Some(self.insert(at, event))
    }

    fn insert(&mut self, time: Duration, event: E) -> EventKey {
        let key = EventKey {
            time,
            priority: event.priority(),
            sequence: self.sequence,
        };
        self.sequence += 1;
        self.pending.insert(key, event);
        key
    }

    /// The next event to be dispatched, without removing it.
    pub fn peek(&self) -> Option<(&EventKey, &E)> {
        self.pending.first_key_value()
    }

    /// Remove the next event and move the clock to its time.
    pub fn pop(&mut self) -> Option<(EventKey, E)> {
        let (key, event) = self.pending.pop_first()?;
        debug_assert!(key.time >= self.now, "time must never move backwards");
        self.now = key.time;
        Some((key, event))
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pending events in dispatch order.
    pub fn pending(&self) -> impl Iterator<Item = (&EventKey, &E)> {
        self.pending.iter()
    }
}
