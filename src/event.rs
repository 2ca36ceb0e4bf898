//! The outbound event stream: the only externally visible record of what the junction did.

use std::{
    fmt::{self, Display},
    io::{self, Write},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    config::secs,
    lane::LaneId,
    vehicle::{VehicleId, VehicleType},
};

/// Something that happened at the junction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// When it happened, on the logical timeline.
    #[serde(with = "secs")]
    pub timestamp: Duration,
    /// The lane it concerns. For phase changes, the newly active lane.
    pub lane: LaneId,
    #[allow(missing_docs)]
    #[serde(flatten)]
    pub kind: EventKind,
}

/// What happened, with its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// A vehicle joined the back of a lane.
    Arrival {
        #[allow(missing_docs)]
        vehicle: VehicleId,
        #[allow(missing_docs)]
        vehicle_type: VehicleType,
        /// Injected from an observed stream rather than generated.
        observed: bool,
        /// Queue length after the arrival.
        queue_length: usize,
    },

    /// A vehicle cleared the junction from the head of the active lane.
    Departure {
        #[allow(missing_docs)]
        vehicle: VehicleId,
        #[allow(missing_docs)]
        vehicle_type: VehicleType,
        /// When the vehicle joined the lane.
        #[serde(with = "secs")]
        arrival_time: Duration,
        /// Queue length after the departure.
        queue_length: usize,
    },

    /// A waiting lane's queue grew past the configured threshold.
    QueueThresholdExceeded {
        #[allow(missing_docs)]
        queue_length: usize,
        #[allow(missing_docs)]
        threshold: usize,
    },

    /// The active lane has no vehicles left.
    LaneEmpty,

    /// A lane waited longer than `max_wait_time` and is being switched to.
    StarvationForced {
        /// How long the lane's head had waited.
        #[serde(with = "secs")]
        wait_time: Duration,
    },

    /// Right-of-way moved to another lane.
    PhaseChange {
        #[allow(missing_docs)]
        from: LaneId,
        #[allow(missing_docs)]
        to: LaneId,
        #[allow(missing_docs)]
        reason: SwitchReason,
    },

    /// Diagnostic: a departure scheduled before its lane was preempted was dispatched and ignored.
    StaleDeparture {
        #[allow(missing_docs)]
        vehicle: VehicleId,
    },
}

/// Why the active lane changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwitchReason {
    /// A waiting lane exceeded `max_wait_time`.
    Starvation,
    /// The active lane ran out of vehicles.
    LaneEmpty,
    /// A lane over the queue threshold took over.
    QueueThreshold,
    /// The active phase reached `max_green_time`.
    MaxGreenExpired,
}

impl EventKind {
    /// The event's kind name, as it appears in the JSON stream.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Arrival { .. } => "ARRIVAL",
            EventKind::Departure { .. } => "DEPARTURE",
            EventKind::QueueThresholdExceeded { .. } => "QUEUE_THRESHOLD_EXCEEDED",
            EventKind::LaneEmpty => "LANE_EMPTY",
            EventKind::StarvationForced { .. } => "STARVATION_FORCED",
            EventKind::PhaseChange { .. } => "PHASE_CHANGE",
            EventKind::StaleDeparture { .. } => "STALE_DEPARTURE",
        }
    }
}

impl Display for SwitchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SwitchReason::Starvation => "starvation",
            SwitchReason::LaneEmpty => "lane empty",
            SwitchReason::QueueThreshold => "queue threshold",
            SwitchReason::MaxGreenExpired => "max green expired",
        })
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>10.3}s lane {} {}",
            self.timestamp.as_secs_f64(),
            self.lane,
            self.kind.name()
        )?;
        match &self.kind {
            EventKind::Arrival {
                vehicle,
                vehicle_type,
                queue_length,
                ..
            } => write!(f, " {vehicle} ({vehicle_type}), queue {queue_length}"),
            EventKind::Departure {
                vehicle,
                vehicle_type,
                queue_length,
                ..
            } => write!(f, " {vehicle} ({vehicle_type}), queue {queue_length}"),
            EventKind::QueueThresholdExceeded {
                queue_length,
                threshold,
            } => write!(f, " {queue_length} > {threshold}"),
            EventKind::LaneEmpty => Ok(()),
            EventKind::StarvationForced { wait_time } => {
                write!(f, " after {:.3}s", wait_time.as_secs_f64())
            }
            EventKind::PhaseChange { from, to, reason } => {
                write!(f, " {from} -> {to} ({reason})")
            }
            EventKind::StaleDeparture { vehicle } => write!(f, " {vehicle}"),
        }
    }
}

/// Append-only, timestamp-ordered record of events.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub(crate) fn push(&mut self, event: Event) {
        debug_assert!(
            self.events
                .last()
                .map_or(true, |last| last.timestamp <= event.timestamp),
            "events must be appended in timestamp order"
        );
        self.events.push(event);
    }

    /// Every event still held, oldest first.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Events appended after the first `cursor` events. Lets a consumer read incrementally.
    pub fn since(&self, cursor: usize) -> &[Event] {
        self.events.get(cursor..).unwrap_or_default()
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Remove and return everything held so far.
    pub fn take(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Write every event as one JSON object per line.
    pub fn write_json_lines<W: Write>(&self, writer: W) -> io::Result<()> {
        write_json_lines(&self.events, writer)
    }
}

/// Write events as one JSON object per line.
pub fn write_json_lines<'a, W: Write>(
    events: impl IntoIterator<Item = &'a Event>,
    mut writer: W,
) -> io::Result<()> {
    for event in events {
        serde_json::to_writer(&mut writer, event)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}
