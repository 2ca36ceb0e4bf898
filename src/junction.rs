//! The junction scheduler: owns the signal, dispatches events and decides when right-of-way moves.
//!
//! After every dispatched event the switching rules are evaluated in a fixed order:
//!
//! 1. **Starvation**: a waiting lane whose head has waited longer than `max_wait_time` is switched
//!    to immediately, preempting the active lane.
//! 2. **Lane empty**: if the active lane has nothing left, switch to the best-scoring waiting lane
//!    (if any lane has a positive score).
//! 3. **Queue threshold**: a waiting lane over `queue_threshold` is reported, and may take over
//!    depending on the [`ThresholdPolicy`].
//! 4. **Max green**: optionally, a phase that has lasted `max_green_time` yields to the best
//!    waiting lane.
//!
//! Starvation protection is never overridden by throughput rules.

use std::{
    collections::{BTreeMap, VecDeque},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, span, trace, Level};

use crate::{
    arrival::ArrivalProcess,
    clock::{Clock, EventPriority, Prioritised},
    config::{secs, JunctionConfig, ThresholdPolicy},
    discharge::{self, Departure},
    error::{InvalidConfigurationError, InvalidEventError},
    event::{Event, EventKind, EventLog, SwitchReason},
    lane::{Lane, LaneId},
    priority::{self, LaneScore},
    snapshot::{LaneSnapshot, Snapshot},
    vehicle::{VehicleId, VehicleType},
};

/// Starvation checks fire this long after the deadline, so the wait strictly exceeds it.
const CHECK_RESOLUTION: Duration = Duration::from_nanos(1);

/// Counts activations. Departures are tagged with the phase they were scheduled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Phase(pub(crate) u64);

/// An event waiting in the clock's queue.
#[derive(Debug)]
pub(crate) enum Scheduled {
    Arrival { lane: LaneId, origin: Origin },
    Departure {
        lane: LaneId,
        vehicle: VehicleId,
        phase: Phase,
    },
    /// Wake the scheduler to re-evaluate its rules, e.g. at a starvation deadline.
    Check,
}

#[derive(Debug)]
pub(crate) enum Origin {
    /// Drawn by the arrival process at the rate identified by `generation`.
    Generated { generation: u64 },
    /// Injected from an observed stream.
    Observed(VehicleType),
}

impl Prioritised for Scheduled {
    fn priority(&self) -> EventPriority {
        match self {
            Scheduled::Departure { .. } => EventPriority::Departure,
            Scheduled::Arrival { .. } => EventPriority::Arrival,
            Scheduled::Check => EventPriority::Check,
        }
    }
}

/// Input from outside the core, applied at the next event boundary.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Injection {
    /// A real vehicle seen joining a lane, e.g. by a camera. Treated exactly like a generated
    /// arrival.
    ObservedArrival {
        #[allow(missing_docs)]
        lane: LaneId,
        #[allow(missing_docs)]
        vehicle_type: VehicleType,
        /// When the vehicle arrived. Must not precede the junction's clock.
        at: Duration,
    },
    /// Change a lane's arrival rate, in vehicles per minute.
    SetArrivalRate {
        #[allow(missing_docs)]
        lane: LaneId,
        #[allow(missing_docs)]
        arrivals_per_minute: f64,
    },
    #[allow(missing_docs)]
    SetMaxWaitTime(Duration),
    #[allow(missing_docs)]
    SetQueueThreshold(usize),
}

/// Which lane has right-of-way, and since when.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalState {
    #[allow(missing_docs)]
    pub active_lane: LaneId,
    #[allow(missing_docs)]
    #[serde(with = "secs")]
    pub phase_since: Duration,
}

/// The result of a call to [`Junction::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// One event was dispatched at this time.
    Dispatched(Duration),
    /// The next event lies beyond the configured horizon. It stays queued.
    HorizonReached,
    /// Nothing is scheduled.
    Drained,
}

/// A single junction and everything it needs to run: clock, lanes, signal and arrival process.
///
/// All mutation happens one event at a time through [`advance`](Junction::advance), so there is
/// nothing to lock. Independent junctions are independent values.
#[derive(Debug)]
pub struct Junction {
    config: JunctionConfig,
    clock: Clock<Scheduled>,
    lanes: BTreeMap<LaneId, Lane>,
    signal: SignalState,
    phase: Phase,
    /// LANE_EMPTY has been emitted for the active lane since it last had a vehicle.
    empty_reported: bool,
    arrivals: ArrivalProcess,
    inbox: VecDeque<Injection>,
    log: EventLog,
}

impl Junction {
    /// Validate the configuration and schedule the first arrival for every lane.
    pub fn new(config: JunctionConfig) -> Result<Self, InvalidConfigurationError> {
        config.validate()?;

        let arrivals = ArrivalProcess::new(&config)?;
        let lanes: BTreeMap<_, _> = config
            .lanes
            .iter()
            .map(|lane| (lane.id, Lane::new(lane)))
            .collect();
        let active_lane = config
            .initial_lane
            .or_else(|| lanes.keys().next().copied())
            .ok_or(InvalidConfigurationError::NoLanes)?;

        let mut junction = Self {
            clock: Clock::new(config.start_time),
            signal: SignalState {
                active_lane,
                phase_since: config.start_time,
            },
            phase: Phase(0),
            empty_reported: false,
            arrivals,
            lanes,
            inbox: VecDeque::new(),
            log: EventLog::default(),
            config,
        };

        let ids: Vec<_> = junction.lanes.keys().copied().collect();
        for lane in ids {
            junction.schedule_next_arrival(lane);
        }
        junction.schedule_max_green_check();

        info!(
            lanes = junction.lanes.len() as u64,
            active_lane = active_lane.0,
            seed = junction.config.random_seed,
            "Junction ready"
        );

        Ok(junction)
    }

    /// Current simulation time.
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    #[allow(missing_docs)]
    pub fn signal(&self) -> SignalState {
        self.signal
    }

    #[allow(missing_docs)]
    pub fn config(&self) -> &JunctionConfig {
        &self.config
    }

    #[allow(missing_docs)]
    pub fn lane(&self, id: LaneId) -> Option<&Lane> {
        self.lanes.get(&id)
    }

    /// Every lane, in id order.
    pub fn lanes(&self) -> impl Iterator<Item = &Lane> {
        self.lanes.values()
    }

    /// Current arrival rate for a lane, in vehicles per minute.
    pub fn arrival_rate(&self, lane: LaneId) -> Option<f64> {
        self.arrivals.rate(lane)
    }

    /// When the next pending event will be dispatched.
    pub fn next_event_time(&self) -> Option<Duration> {
        self.clock.peek().map(|(key, _)| key.time)
    }

    /// Number of events waiting in the clock's queue, including stale ones.
    pub fn pending_events(&self) -> usize {
        self.clock.len()
    }

    /// The outbound event stream so far.
    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    /// Every outbound event still held, oldest first.
    pub fn events(&self) -> &[Event] {
        self.log.events()
    }

    /// Remove and return the outbound events recorded so far.
    pub fn drain_events(&mut self) -> Vec<Event> {
        self.log.take()
    }

    /// Every lane's priority score right now.
    pub fn scores(&self) -> Vec<LaneScore> {
        priority::evaluate(self.lanes.values(), self.now(), self.config.alpha)
    }

    /// A read-only view for dashboards. Safe to call at any time between dispatches.
    pub fn snapshot(&self) -> Snapshot {
        let now = self.now();
        Snapshot {
            now,
            active_lane: self.signal.active_lane,
            phase_since: self.signal.phase_since,
            lanes: self
                .lanes
                .values()
                .map(|lane| {
                    let score = LaneScore::of(lane, now, self.config.alpha);
                    LaneSnapshot {
                        id: lane.id(),
                        direction: lane.direction(),
                        queue_length: score.queue_length,
                        wait_time: score.wait_time,
                        score: score.score,
                        arrivals_per_minute: self.arrivals.rate(lane.id()).unwrap_or_default(),
                    }
                })
                .collect(),
        }
    }

    /// Queue an injection. It is applied at the start of the next [`advance`](Junction::advance).
    pub fn inject(&mut self, injection: Injection) {
        self.inbox.push_back(injection);
    }

    /// Injections not yet applied, oldest first. After a failed `advance`, the first one is the
    /// one that was rejected.
    pub fn pending_injections(&self) -> impl Iterator<Item = &Injection> {
        self.inbox.iter()
    }

    /// Drop the oldest unapplied injection, e.g. after it was rejected.
    pub fn discard_injection(&mut self) -> Option<Injection> {
        self.inbox.pop_front()
    }

    /// Apply every queued injection, oldest first.
    ///
    /// Stops at the first invalid one, which is left at the front of the inbox.
    pub fn apply_pending(&mut self) -> Result<(), InvalidEventError> {
        while let Some(injection) = self.inbox.front().cloned() {
            self.apply(injection)?;
            self.inbox.pop_front();
        }
        Ok(())
    }

    /// Dispatch the next event and react to it.
    pub fn advance(&mut self) -> Result<Step, InvalidEventError> {
        self.apply_pending()?;

        let Some((key, _)) = self.clock.peek() else {
            return Ok(Step::Drained);
        };
        if self.config.horizon.is_some_and(|horizon| key.time > horizon) {
            return Ok(Step::HorizonReached);
        }
        let Some((key, event)) = self.clock.pop() else {
            return Ok(Step::Drained);
        };

        let span = span!(Level::DEBUG, "dispatch", sequence = key.sequence);
        let _enter = span.enter();

        match event {
            Scheduled::Arrival { lane, origin } => self.on_arrival(lane, origin)?,
            Scheduled::Departure {
                lane,
                vehicle,
                phase,
            } => self.on_departure(lane, vehicle, phase)?,
            Scheduled::Check => trace!("Re-evaluating after a scheduled check"),
        }

        self.evaluate();

        Ok(Step::Dispatched(key.time))
    }

    /// Dispatch every event up to and including `until`. Returns how many were dispatched.
    pub fn run_until(&mut self, until: Duration) -> Result<usize, InvalidEventError> {
        let mut dispatched = 0;
        loop {
            self.apply_pending()?;
            if !self.next_event_time().is_some_and(|next| next <= until) {
                return Ok(dispatched);
            }
            match self.advance()? {
                Step::Dispatched(_) => dispatched += 1,
                Step::HorizonReached | Step::Drained => return Ok(dispatched),
            }
        }
    }

    /// Dispatch until the horizon is reached or nothing is left.
    ///
    /// Without a horizon, and with any positive arrival rate, this never returns.
    pub fn run(&mut self) -> Result<Step, InvalidEventError> {
        loop {
            match self.advance()? {
                Step::Dispatched(_) => {}
                finished => return Ok(finished),
            }
        }
    }

    fn apply(&mut self, injection: Injection) -> Result<(), InvalidEventError> {
        match injection {
            Injection::ObservedArrival {
                lane,
                vehicle_type,
                at,
            } => {
                if !self.lanes.contains_key(&lane) {
                    return Err(InvalidEventError::UnknownLane(lane));
                }
                if self.arrivals.discharge_duration(vehicle_type).is_none() {
                    return Err(InvalidEventError::UnconfiguredVehicleType(vehicle_type));
                }
                self.clock.schedule_at(
                    at,
                    Scheduled::Arrival {
                        lane,
                        origin: Origin::Observed(vehicle_type),
                    },
                )?;
                debug!(lane = lane.0, %vehicle_type, ?at, "Observed arrival scheduled");
            }

            Injection::SetArrivalRate {
                lane,
                arrivals_per_minute,
            } => {
                self.arrivals.set_rate(lane, arrivals_per_minute)?;
                // Arrivals drawn at the old rate are now stale. Redraw from now.
                self.schedule_next_arrival(lane);
                info!(lane = lane.0, arrivals_per_minute, "Arrival rate updated");
            }

            Injection::SetMaxWaitTime(max_wait_time) => {
                crate::config::validate_max_wait_time(max_wait_time)?;
                self.config.max_wait_time = max_wait_time;
                let waiting: Vec<_> = self
                    .lanes
                    .values()
                    .filter(|lane| lane.id() != self.signal.active_lane)
                    .filter_map(|lane| lane.head_wait_start())
                    .collect();
                for start in waiting {
                    self.schedule_starvation_check(start);
                }
                info!(?max_wait_time, "Max wait time updated");
            }

            Injection::SetQueueThreshold(queue_threshold) => {
                self.config.queue_threshold = queue_threshold;
                info!(queue_threshold, "Queue threshold updated");
            }
        }
        Ok(())
    }

    fn on_arrival(&mut self, lane_id: LaneId, origin: Origin) -> Result<(), InvalidEventError> {
        let now = self.now();

        let (vehicle_type, observed) = match origin {
            Origin::Generated { generation } => {
                if self.arrivals.generation(lane_id) != Some(generation) {
                    debug!(lane = lane_id.0, "Ignoring arrival drawn at a superseded rate");
                    return Ok(());
                }
                self.schedule_next_arrival(lane_id);
                (self.arrivals.sample_vehicle_type(), false)
            }
            Origin::Observed(vehicle_type) => (vehicle_type, true),
        };

        let vehicle = self.arrivals.create_vehicle(vehicle_type, now)?;
        let vehicle_id = vehicle.id;
        let is_active = lane_id == self.signal.active_lane;

        let lane = self
            .lanes
            .get_mut(&lane_id)
            .ok_or(InvalidEventError::UnknownLane(lane_id))?;
        let became_head = lane.push(vehicle, now);
        let queue_length = lane.queue_length();

        if is_active {
            self.empty_reported = false;
        }
        if became_head {
            if is_active {
                discharge::begin(lane, &mut self.clock, self.phase);
            } else {
                self.schedule_starvation_check(now);
            }
        }

        debug!(
            lane = lane_id.0,
            vehicle = vehicle_id.0,
            queue_length = queue_length as u64,
            "Vehicle arrived"
        );
        self.emit(
            lane_id,
            EventKind::Arrival {
                vehicle: vehicle_id,
                vehicle_type,
                observed,
                queue_length,
            },
        );

        Ok(())
    }

    fn on_departure(
        &mut self,
        lane_id: LaneId,
        vehicle: VehicleId,
        scheduled_in: Phase,
    ) -> Result<(), InvalidEventError> {
        let lane = self
            .lanes
            .get_mut(&lane_id)
            .ok_or(InvalidEventError::UnknownLane(lane_id))?;

        match discharge::complete(lane, &mut self.clock, vehicle, scheduled_in, self.phase) {
            Departure::Departed { vehicle, drained } => {
                let queue_length = lane.queue_length();
                debug!(
                    lane = lane_id.0,
                    vehicle = vehicle.id.0,
                    queue_length = queue_length as u64,
                    "Vehicle departed"
                );
                self.emit(
                    lane_id,
                    EventKind::Departure {
                        vehicle: vehicle.id,
                        vehicle_type: vehicle.vehicle_type,
                        arrival_time: vehicle.arrival_time,
                        queue_length,
                    },
                );
                if drained {
                    self.report_lane_empty();
                }
            }
            Departure::Stale => self.emit(lane_id, EventKind::StaleDeparture { vehicle }),
        }

        Ok(())
    }

    /// Apply the switching rules, in priority order.
    fn evaluate(&mut self) {
        let now = self.now();
        let active = self.signal.active_lane;

        // 1. Starvation.
        if let Some((lane, wait_time)) = priority::most_starved(
            self.lanes.values(),
            active,
            now,
            self.config.max_wait_time,
        ) {
            self.emit(lane, EventKind::StarvationForced { wait_time });
            self.switch_to(lane, SwitchReason::Starvation);
            return;
        }

        // 2. Lane empty.
        if self.lanes.get(&active).map_or(true, Lane::is_empty) {
            if !self.empty_reported {
                self.report_lane_empty();
            }
            if let Some(best) = self.best_waiting_lane(now) {
                self.switch_to(best.lane, SwitchReason::LaneEmpty);
            }
            return;
        }

        let held = now.saturating_sub(self.signal.phase_since) < self.config.min_green_time;

        // 3. Queue threshold.
        if let Some(candidate) = self.over_threshold(now) {
            let switch = match self.config.threshold_policy {
                ThresholdPolicy::AdvisoryOnly => false,
                ThresholdPolicy::ForceSwitch => true,
                ThresholdPolicy::ScoreOverride => self
                    .lanes
                    .get(&active)
                    .map(|lane| LaneScore::of(lane, now, self.config.alpha))
                    .map_or(true, |current| candidate.score > current.score),
            };
            if switch && !held {
                self.switch_to(candidate.lane, SwitchReason::QueueThreshold);
                return;
            }
        }

        // 4. Max green.
        if let Some(max_green) = self.config.max_green_time {
            let expired = now.saturating_sub(self.signal.phase_since) >= max_green;
            if expired && !held {
                if let Some(best) = self.best_waiting_lane(now) {
                    self.switch_to(best.lane, SwitchReason::MaxGreenExpired);
                }
            }
        }
    }

    /// Report waiting lanes over the threshold, and return the best-ranked of them.
    fn over_threshold(&mut self, now: Duration) -> Option<LaneScore> {
        let active = self.signal.active_lane;
        let threshold = self.config.queue_threshold;

        let mut over = Vec::new();
        let mut advisories = Vec::new();
        for lane in self.lanes.values_mut().filter(|lane| lane.id() != active) {
            if lane.queue_length() > threshold {
                if lane.report_threshold() {
                    advisories.push((lane.id(), lane.queue_length()));
                }
                over.push(LaneScore::of(lane, now, self.config.alpha));
            } else {
                lane.rearm_threshold();
            }
        }

        for (lane, queue_length) in advisories {
            self.emit(
                lane,
                EventKind::QueueThresholdExceeded {
                    queue_length,
                    threshold,
                },
            );
        }

        priority::best(over, self.config.tie_break)
    }

    /// The best-ranked waiting lane with a positive score.
    fn best_waiting_lane(&self, now: Duration) -> Option<LaneScore> {
        let active = self.signal.active_lane;
        let waiting = self
            .lanes
            .values()
            .filter(|lane| lane.id() != active)
            .map(|lane| LaneScore::of(lane, now, self.config.alpha));

        priority::best(waiting, self.config.tie_break).filter(|best| best.score > 0.0)
    }

    /// Move right-of-way to `to`. The previous lane stops discharging; its queue is kept.
    fn switch_to(&mut self, to: LaneId, reason: SwitchReason) {
        let now = self.now();
        let from = self.signal.active_lane;

        let span = span!(
            Level::INFO,
            "phase change",
            from = from.0 as u64,
            to = to.0 as u64
        );
        let _enter = span.enter();

        self.phase = Phase(self.phase.0 + 1);
        self.empty_reported = false;
        self.signal = SignalState {
            active_lane: to,
            phase_since: now,
        };

        // The preempted lane's head keeps waiting from when it became the head.
        if let Some(start) = self.lanes.get(&from).and_then(Lane::head_wait_start) {
            self.schedule_starvation_check(start);
        }

        info!(%reason, "Right-of-way changed");
        self.emit(to, EventKind::PhaseChange { from, to, reason });

        if let Some(lane) = self.lanes.get_mut(&to) {
            lane.restart_head_wait(now);
            lane.rearm_threshold();
            discharge::begin(lane, &mut self.clock, self.phase);
        }

        self.schedule_max_green_check();
    }

    fn schedule_next_arrival(&mut self, lane: LaneId) {
        let Some(generation) = self.arrivals.generation(lane) else {
            return;
        };
        if let Some(interval) = self.arrivals.next_inter_arrival(lane) {
            self.clock.schedule_after(
                interval,
                Scheduled::Arrival {
                    lane,
                    origin: Origin::Generated { generation },
                },
            );
        }
    }

    /// Wake up just after a head that started waiting at `head_wait_start` becomes starved.
    fn schedule_starvation_check(&mut self, head_wait_start: Duration) {
        // A deadline past the end of representable time is never reached.
        let Some(deadline) = head_wait_start
            .checked_add(self.config.max_wait_time)
            .and_then(|deadline| deadline.checked_add(CHECK_RESOLUTION))
        else {
            return;
        };
        let delay = deadline.saturating_sub(self.now());
        self.clock.schedule_after(delay, Scheduled::Check);
    }

    fn schedule_max_green_check(&mut self) {
        if let Some(max_green) = self.config.max_green_time {
            self.clock.schedule_after(max_green, Scheduled::Check);
        }
    }

    fn report_lane_empty(&mut self) {
        self.empty_reported = true;
        self.emit(self.signal.active_lane, EventKind::LaneEmpty);
    }

    fn emit(&mut self, lane: LaneId, kind: EventKind) {
        self.log.push(Event {
            timestamp: self.now(),
            lane,
            kind,
        });
    }
}
