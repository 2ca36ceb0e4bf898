//! Junction configuration, consumed once at construction.

use std::{collections::BTreeSet, fmt, time::Duration};

use bon::bon;
use serde::{Deserialize, Serialize};

use crate::{error::InvalidConfigurationError, lane::LaneId, vehicle::VehicleClass};

/// The approach a lane serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

/// One lane of the junction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneConfig {
    /// Unique lane id. Lower ids win score ties.
    pub id: LaneId,
    /// The approach this lane serves.
    pub direction: Direction,
    /// Mean arrival rate λ, in vehicles per minute. Zero disables synthetic arrivals.
    pub arrivals_per_minute: f64,
}

/// What happens when a waiting lane's queue grows past `queue_threshold`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdPolicy {
    /// Emit the advisory, and switch only if the lane also outscores the active lane.
    #[default]
    ScoreOverride,
    /// Emit the advisory and never switch because of it.
    AdvisoryOnly,
    /// Emit the advisory and switch to the highest-scoring lane over the threshold.
    ForceSwitch,
}

/// How equal scores are ranked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// The lowest lane id wins.
    #[default]
    LowestLaneId,
    /// The lane whose head has waited longest wins, then the lowest lane id.
    LongestWait,
}

/// Configuration for a [`Junction`](crate::Junction).
///
/// Durations are offsets on the logical timeline. In JSON they are written as seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct JunctionConfig {
    #[allow(missing_docs)]
    pub lanes: Vec<LaneConfig>,
    /// Categorical distribution of vehicle types and their discharge durations.
    pub vehicle_mix: Vec<VehicleClass>,
    /// Fairness weight α applied to wait time in the priority score.
    pub alpha: f64,
    /// A waiting lane whose head has waited longer than this is switched to unconditionally.
    #[serde(with = "secs")]
    pub max_wait_time: Duration,
    #[allow(missing_docs)]
    pub queue_threshold: usize,
    #[allow(missing_docs)]
    pub threshold_policy: ThresholdPolicy,
    #[allow(missing_docs)]
    pub tie_break: TieBreak,
    /// Minimum time a phase is held before a threshold or max-green switch.
    #[serde(with = "secs")]
    pub min_green_time: Duration,
    /// When set, a phase lasting this long yields to the best waiting lane.
    #[serde(with = "secs::option")]
    pub max_green_time: Option<Duration>,
    /// The lane that is active at start. Defaults to the lowest lane id.
    pub initial_lane: Option<LaneId>,
    #[allow(missing_docs)]
    pub random_seed: u64,
    #[allow(missing_docs)]
    #[serde(with = "secs")]
    pub start_time: Duration,
    /// No event later than this is dispatched.
    #[serde(with = "secs::option")]
    pub horizon: Option<Duration>,
}

impl LaneConfig {
    #[allow(missing_docs)]
    pub fn new(id: u32, direction: Direction, arrivals_per_minute: f64) -> Self {
        Self {
            id: LaneId(id),
            direction,
            arrivals_per_minute,
        }
    }
}

#[bon]
impl JunctionConfig {
    #[allow(missing_docs)]
    #[builder]
    pub fn new(
        lanes: Vec<LaneConfig>,
        #[builder(default = VehicleClass::default_mix())] vehicle_mix: Vec<VehicleClass>,
        #[builder(default = 0.5)] alpha: f64,
        #[builder(default = Duration::from_secs(45))] max_wait_time: Duration,
        #[builder(default = 15)] queue_threshold: usize,
        #[builder(default)] threshold_policy: ThresholdPolicy,
        #[builder(default)] tie_break: TieBreak,
        #[builder(default)] min_green_time: Duration,
        max_green_time: Option<Duration>,
        initial_lane: Option<LaneId>,
        #[builder(default)] random_seed: u64,
        #[builder(default)] start_time: Duration,
        horizon: Option<Duration>,
    ) -> Self {
        Self {
            lanes,
            vehicle_mix,
            alpha,
            max_wait_time,
            queue_threshold,
            threshold_policy,
            tie_break,
            min_green_time,
            max_green_time,
            initial_lane,
            random_seed,
            start_time,
            horizon,
        }
    }

    /// Check every value the core depends on. The core refuses to start otherwise.
    pub fn validate(&self) -> Result<(), InvalidConfigurationError> {
        if self.lanes.is_empty() {
            return Err(InvalidConfigurationError::NoLanes);
        }

        let mut seen = BTreeSet::new();
        for lane in &self.lanes {
            if !seen.insert(lane.id) {
                return Err(InvalidConfigurationError::DuplicateLane(lane.id));
            }
            validate_arrival_rate(lane.id, lane.arrivals_per_minute)?;
        }

        if !self.alpha.is_finite() || self.alpha < 0.0 {
            return Err(InvalidConfigurationError::InvalidAlpha(self.alpha));
        }

        validate_max_wait_time(self.max_wait_time)?;

        let mut types = BTreeSet::new();
        for class in &self.vehicle_mix {
            if !types.insert(class.vehicle_type) {
                return Err(InvalidConfigurationError::DuplicateVehicleType(
                    class.vehicle_type,
                ));
            }
            if !class.weight.is_finite() || class.weight < 0.0 {
                return Err(InvalidConfigurationError::InvalidVehicleWeight {
                    vehicle_type: class.vehicle_type,
                    weight: class.weight,
                });
            }
            if class.discharge_duration.is_zero() {
                return Err(InvalidConfigurationError::ZeroDischargeDuration(
                    class.vehicle_type,
                ));
            }
        }
        if !self.vehicle_mix.iter().any(|class| class.weight > 0.0) {
            return Err(InvalidConfigurationError::EmptyVehicleMix);
        }

        if let Some(initial) = self.initial_lane {
            if !seen.contains(&initial) {
                return Err(InvalidConfigurationError::UnknownInitialLane(initial));
            }
        }

        if let Some(max) = self.max_green_time {
            if self.min_green_time > max {
                return Err(InvalidConfigurationError::GreenTimeBounds {
                    min: self.min_green_time,
                    max,
                });
            }
        }

        Ok(())
    }
}

/// The four-way junction the controller was originally tuned for.
impl Default for JunctionConfig {
    fn default() -> Self {
        JunctionConfig::builder()
            .lanes(vec![
                LaneConfig::new(0, Direction::North, 12.0),
                LaneConfig::new(1, Direction::South, 10.0),
                LaneConfig::new(2, Direction::East, 8.0),
                LaneConfig::new(3, Direction::West, 15.0),
            ])
            .build()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for ThresholdPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ThresholdPolicy::ScoreOverride => "score override",
            ThresholdPolicy::AdvisoryOnly => "advisory only",
            ThresholdPolicy::ForceSwitch => "force switch",
        })
    }
}

pub(crate) fn validate_arrival_rate(
    lane: LaneId,
    arrivals_per_minute: f64,
) -> Result<(), InvalidConfigurationError> {
    if !arrivals_per_minute.is_finite() || arrivals_per_minute < 0.0 {
        return Err(InvalidConfigurationError::InvalidArrivalRate {
            lane,
            rate: arrivals_per_minute,
        });
    }
    Ok(())
}

pub(crate) fn validate_max_wait_time(
    max_wait_time: Duration,
) -> Result<(), InvalidConfigurationError> {
    if max_wait_time.is_zero() {
        return Err(InvalidConfigurationError::NonPositiveMaxWaitTime);
    }
    Ok(())
}

/// (De)serialise a [`Duration`] as floating-point seconds.
pub(crate) mod secs {
    use std::time::Duration;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }

    pub mod option {
        use std::time::Duration;

        use serde::{de::Error, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => serializer.serialize_some(&d.as_secs_f64()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Option::<f64>::deserialize(deserializer)?
                .map(|secs| Duration::try_from_secs_f64(secs).map_err(D::Error::custom))
                .transpose()
        }
    }
}
