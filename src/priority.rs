//! Lane priority scores.
//!
//! `score = queue_length + α × wait_time`, where `wait_time` is how long the lane's head has been
//! waiting. Pure functions of the current state: nothing here mutates anything, and nothing here
//! runs on a timer. The scheduler consults it at decision points only.

use std::{cmp::Ordering, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{config::secs, config::TieBreak, lane::Lane, lane::LaneId};

/// A lane's priority at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LaneScore {
    #[allow(missing_docs)]
    pub lane: LaneId,
    #[allow(missing_docs)]
    pub queue_length: usize,
    /// How long the lane's head has been waiting.
    #[serde(with = "secs")]
    pub wait_time: Duration,
    #[allow(missing_docs)]
    pub score: f64,
}

/// The weighted priority score.
///
/// Never decreases as either `queue_length` or `wait_time` grows.
pub fn score(queue_length: usize, wait_time: Duration, alpha: f64) -> f64 {
    queue_length as f64 + alpha * wait_time.as_secs_f64()
}

impl LaneScore {
    /// Score `lane` at `now`.
    pub fn of(lane: &Lane, now: Duration, alpha: f64) -> Self {
        let queue_length = lane.queue_length();
        let wait_time = lane.wait_time(now);
        Self {
            lane: lane.id(),
            queue_length,
            wait_time,
            score: score(queue_length, wait_time, alpha),
        }
    }
}

/// Score every lane at `now`.
pub fn evaluate<'a>(
    lanes: impl IntoIterator<Item = &'a Lane>,
    now: Duration,
    alpha: f64,
) -> Vec<LaneScore> {
    lanes
        .into_iter()
        .map(|lane| LaneScore::of(lane, now, alpha))
        .collect()
}

/// Compare two scores. `Greater` means `a` should be served first.
pub fn rank(a: &LaneScore, b: &LaneScore, tie_break: TieBreak) -> Ordering {
    let by_score = a.score.total_cmp(&b.score);
    let by_wait = match tie_break {
        TieBreak::LowestLaneId => Ordering::Equal,
        TieBreak::LongestWait => a.wait_time.cmp(&b.wait_time),
    };
    // Lower ids rank higher.
    by_score.then(by_wait).then(b.lane.cmp(&a.lane))
}

/// The highest-ranked score.
pub fn best(
    scores: impl IntoIterator<Item = LaneScore>,
    tie_break: TieBreak,
) -> Option<LaneScore> {
    scores.into_iter().max_by(|a, b| rank(a, b, tie_break))
}

/// The waiting lane that has waited longest beyond `max_wait_time`, if any.
///
/// Ties go to the lowest lane id.
pub fn most_starved<'a>(
    lanes: impl IntoIterator<Item = &'a Lane>,
    active: LaneId,
    now: Duration,
    max_wait_time: Duration,
) -> Option<(LaneId, Duration)> {
    lanes
        .into_iter()
        .filter(|lane| lane.id() != active)
        .map(|lane| (lane.id(), lane.wait_time(now)))
        .filter(|(_, wait)| *wait > max_wait_time)
        .max_by(|(a_id, a_wait), (b_id, b_wait)| a_wait.cmp(b_wait).then(b_id.cmp(a_id)))
}
