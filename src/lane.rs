//! Lanes and their FIFO queues of waiting vehicles.

use std::{
    collections::VecDeque,
    fmt::{self, Display},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    config::{Direction, LaneConfig},
    vehicle::Vehicle,
};

/// Identifies a lane. Lower ids win score ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LaneId(pub u32);

/// A FIFO queue of vehicles waiting to cross the junction from one approach.
///
/// The head is the next vehicle to discharge. `head_wait_start` is set the instant a vehicle
/// becomes the head, and cleared when the queue empties.
#[derive(Debug)]
pub struct Lane {
    id: LaneId,
    direction: Direction,
    queue: VecDeque<Vehicle>,
    head_wait_start: Option<Duration>,

    /// Whether a threshold advisory has been emitted for the current excursion above the
    /// threshold.
    threshold_reported: bool,
}

impl Lane {
    pub(crate) fn new(config: &LaneConfig) -> Self {
        Self {
            id: config.id,
            direction: config.direction,
            queue: VecDeque::new(),
            head_wait_start: None,
            threshold_reported: false,
        }
    }

    #[allow(missing_docs)]
    pub fn id(&self) -> LaneId {
        self.id
    }

    #[allow(missing_docs)]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[allow(missing_docs)]
    pub fn queue_length(&self) -> usize {
        self.queue.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// The next vehicle to discharge.
    pub fn head(&self) -> Option<&Vehicle> {
        self.queue.front()
    }

    /// Waiting vehicles, head first.
    pub fn vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.queue.iter()
    }

    /// When the current head became the head.
    pub fn head_wait_start(&self) -> Option<Duration> {
        self.head_wait_start
    }

    /// How long the current head has been waiting. Zero when the lane is empty.
    pub fn wait_time(&self, now: Duration) -> Duration {
        self.head_wait_start
            .map(|start| now.saturating_sub(start))
            .unwrap_or_default()
    }

    /// Append a vehicle. Returns `true` if it became the head.
    pub(crate) fn push(&mut self, vehicle: Vehicle, now: Duration) -> bool {
        let was_empty = self.queue.is_empty();
        self.queue.push_back(vehicle);
        if was_empty {
            self.head_wait_start = Some(now);
        }
        was_empty
    }

    /// Remove the head. The next vehicle, if any, starts waiting as the new head from `now`.
    pub(crate) fn pop_head(&mut self, now: Duration) -> Option<Vehicle> {
        let vehicle = self.queue.pop_front()?;
        self.head_wait_start = if self.queue.is_empty() {
            None
        } else {
            Some(now)
        };
        Some(vehicle)
    }

    /// Restart the head's wait from `now`, e.g. when the lane is reactivated.
    pub(crate) fn restart_head_wait(&mut self, now: Duration) {
        if !self.queue.is_empty() {
            self.head_wait_start = Some(now);
        }
    }

    /// Latch the threshold advisory. Returns `true` only on the first call of an excursion.
    pub(crate) fn report_threshold(&mut self) -> bool {
        !std::mem::replace(&mut self.threshold_reported, true)
    }

    pub(crate) fn rearm_threshold(&mut self) {
        self.threshold_reported = false;
    }
}

impl Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for LaneId {
    fn from(id: u32) -> Self {
        LaneId(id)
    }
}
