//! Statistics derived from the outbound event stream.

use std::{collections::BTreeMap, time::Duration};

use crate::{
    event::{Event, EventKind, SwitchReason},
    lane::LaneId,
};

/// Counters and waits for one lane.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaneMetrics {
    /// Every arrival, generated or observed.
    pub arrivals: usize,
    #[allow(missing_docs)]
    pub observed_arrivals: usize,
    #[allow(missing_docs)]
    pub departures: usize,
    /// Times the lane was given right-of-way.
    pub activations: usize,
    /// Activations forced by starvation.
    pub forced_switches: usize,
    #[allow(missing_docs)]
    pub threshold_exceedances: usize,
    /// Sum of departure minus arrival time over departed vehicles.
    pub total_wait: Duration,
    /// The longest any departed vehicle spent in the lane.
    pub max_wait: Duration,
    /// The longest the lane went between losing and regaining right-of-way.
    pub max_gap: Duration,

    last_deactivated: Option<Duration>,
}

impl LaneMetrics {
    /// Mean time departed vehicles spent in the lane.
    pub fn mean_wait(&self) -> Option<Duration> {
        mean(self.total_wait, self.departures)
    }

    fn deactivated(&mut self, at: Duration) {
        self.last_deactivated = Some(at);
    }

    fn activated(&mut self, at: Duration) {
        self.activations += 1;
        if let Some(since) = self.last_deactivated.take() {
            self.max_gap = self.max_gap.max(at.saturating_sub(since));
        }
    }
}

fn mean(total: Duration, count: usize) -> Option<Duration> {
    match u32::try_from(count) {
        Ok(0) => None,
        Ok(count) => Some(total / count),
        Err(_) => Some(total.div_f64(count as f64)),
    }
}

/// Per-lane and junction-wide statistics for a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JunctionMetrics {
    lanes: BTreeMap<LaneId, LaneMetrics>,
    switches: BTreeMap<SwitchReason, usize>,
    stale_departures: usize,
    first_event: Option<Duration>,
    last_event: Option<Duration>,
}

impl JunctionMetrics {
    /// Compute statistics for an event stream, in timestamp order.
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a Event>) -> Self {
        let mut metrics = Self::default();
        for event in events {
            metrics.record(event);
        }
        metrics
    }

    /// Add one event to the statistics.
    pub fn record(&mut self, event: &Event) {
        let at = event.timestamp;
        self.first_event.get_or_insert(at);
        self.last_event = Some(at);

        match &event.kind {
            EventKind::Arrival { observed, .. } => {
                let lane = self.lane_mut(event.lane);
                lane.arrivals += 1;
                if *observed {
                    lane.observed_arrivals += 1;
                }
            }
            EventKind::Departure { arrival_time, .. } => {
                let wait = at.saturating_sub(*arrival_time);
                let lane = self.lane_mut(event.lane);
                lane.departures += 1;
                lane.total_wait += wait;
                lane.max_wait = lane.max_wait.max(wait);
            }
            EventKind::QueueThresholdExceeded { .. } => {
                self.lane_mut(event.lane).threshold_exceedances += 1;
            }
            EventKind::StarvationForced { .. } => {
                self.lane_mut(event.lane).forced_switches += 1;
            }
            EventKind::PhaseChange { from, to, reason } => {
                self.lane_mut(*from).deactivated(at);
                self.lane_mut(*to).activated(at);
                *self.switches.entry(*reason).or_default() += 1;
            }
            EventKind::StaleDeparture { .. } => self.stale_departures += 1,
            EventKind::LaneEmpty => {}
        }
    }

    fn lane_mut(&mut self, lane: LaneId) -> &mut LaneMetrics {
        self.lanes.entry(lane).or_default()
    }

    /// Statistics for lanes that appear in the stream, in id order.
    pub fn lanes(&self) -> impl Iterator<Item = (LaneId, &LaneMetrics)> {
        self.lanes.iter().map(|(id, metrics)| (*id, metrics))
    }

    #[allow(missing_docs)]
    pub fn lane(&self, lane: LaneId) -> Option<&LaneMetrics> {
        self.lanes.get(&lane)
    }

    /// Phase changes, by reason.
    pub fn switches(&self) -> impl Iterator<Item = (SwitchReason, usize)> + '_ {
        self.switches.iter().map(|(reason, count)| (*reason, *count))
    }

    #[allow(missing_docs)]
    pub fn phase_changes(&self) -> usize {
        self.switches.values().sum()
    }

    #[allow(missing_docs)]
    pub fn stale_departures(&self) -> usize {
        self.stale_departures
    }

    #[allow(missing_docs)]
    pub fn total_arrivals(&self) -> usize {
        self.lanes.values().map(|lane| lane.arrivals).sum()
    }

    #[allow(missing_docs)]
    pub fn total_departures(&self) -> usize {
        self.lanes.values().map(|lane| lane.departures).sum()
    }

    /// Time between the first and last event.
    pub fn observed_duration(&self) -> Option<Duration> {
        Some(self.last_event?.saturating_sub(self.first_event?))
    }

    /// Mean wait across every departed vehicle.
    pub fn mean_wait(&self) -> Option<Duration> {
        let total: Duration = self.lanes.values().map(|lane| lane.total_wait).sum();
        mean(total, self.total_departures())
    }

    /// Departures per minute of observed time.
    pub fn throughput_per_minute(&self) -> Option<f64> {
        let minutes = self.observed_duration()?.as_secs_f64() / 60.0;
        if minutes <= 0.0 {
            return None;
        }
        Some(self.total_departures() as f64 / minutes)
    }
}
