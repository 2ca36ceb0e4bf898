use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{config::secs, config::Direction, lane::LaneId};

/// A read-only view of the junction between dispatches, for dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[allow(missing_docs)]
    #[serde(with = "secs")]
    pub now: Duration,
    #[allow(missing_docs)]
    pub active_lane: LaneId,
    /// When the active lane was given right-of-way.
    #[serde(with = "secs")]
    pub phase_since: Duration,
    /// Every lane, in id order.
    pub lanes: Vec<LaneSnapshot>,
}

/// One lane's state within a [`Snapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct LaneSnapshot {
    pub id: LaneId,
    pub direction: Direction,
    pub queue_length: usize,
    #[serde(with = "secs")]
    pub wait_time: Duration,
    pub score: f64,
    pub arrivals_per_minute: f64,
}

impl Snapshot {
    /// The lane with the given id.
    pub fn lane(&self, id: LaneId) -> Option<&LaneSnapshot> {
        self.lanes.iter().find(|lane| lane.id == id)
    }

    /// Vehicles waiting across all lanes.
    pub fn total_queued(&self) -> usize {
        self.lanes.iter().map(|lane| lane.queue_length).sum()
    }
}
