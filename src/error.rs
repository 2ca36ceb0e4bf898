//! Errors surfaced by the junction core.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc::error::SendError, oneshot::error::RecvError};

use crate::{lane::LaneId, vehicle::VehicleType};

/// A configuration the junction refuses to run with.
///
/// Raised by [`Junction::new`](crate::Junction::new), and wrapped by [`InvalidEventError`] when a
/// live control update carries an invalid value.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum InvalidConfigurationError {
    /// A junction needs at least one lane.
    #[error("no lanes configured")]
    NoLanes,

    /// Two lanes share an id.
    #[error("lane {0} is configured more than once")]
    DuplicateLane(LaneId),

    /// Arrival rates must be finite and non-negative. Zero disables arrivals.
    #[error("lane {lane} has an invalid arrival rate: {rate} vehicles/min")]
    InvalidArrivalRate {
        /// The offending lane.
        lane: LaneId,
        /// The rejected rate.
        rate: f64,
    },

    /// The fairness weight must be finite and non-negative.
    #[error("fairness weight alpha must be finite and non-negative, got {0}")]
    InvalidAlpha(f64),

    #[error("max_wait_time must be greater than zero")]
    #[allow(missing_docs)]
    NonPositiveMaxWaitTime,

    /// A vehicle type name that does not match any known type.
    #[error("unknown vehicle type: {0}")]
    UnknownVehicleType(String),

    /// Two entries in the vehicle mix describe the same type.
    #[error("vehicle type {0} is configured more than once")]
    DuplicateVehicleType(VehicleType),

    /// Weights must be finite and non-negative.
    #[error("vehicle type {vehicle_type} has an invalid weight: {weight}")]
    InvalidVehicleWeight {
        /// The offending type.
        vehicle_type: VehicleType,
        /// The rejected weight.
        weight: f64,
    },

    /// At least one vehicle type must have a positive weight.
    #[error("the vehicle mix has no type with a positive weight")]
    EmptyVehicleMix,

    #[error("vehicle type {0} has a zero discharge duration")]
    #[allow(missing_docs)]
    ZeroDischargeDuration(VehicleType),

    /// The configured initial lane is not one of the junction's lanes.
    #[error("initial lane {0} is not configured")]
    UnknownInitialLane(LaneId),

    #[error("min_green_time ({min:?}) exceeds max_green_time ({max:?})")]
    #[allow(missing_docs)]
    GreenTimeBounds { min: Duration, max: Duration },
}

/// An event or injection the junction could not accept.
///
/// Fatal to the [`advance`](crate::Junction::advance) call that encountered it. The offending
/// injection is left at the front of the inbox so the caller can inspect and discard it.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum InvalidEventError {
    /// Time never moves backwards.
    #[error("event at {at:?} precedes the current time {now:?}")]
    InPast {
        /// When the event was meant to happen.
        at: Duration,
        /// The junction's clock when it was rejected.
        now: Duration,
    },

    /// The event names a lane the junction does not have.
    #[error("event references unknown lane {0}")]
    UnknownLane(LaneId),

    /// An observed vehicle of a type with no configured discharge duration.
    #[error("vehicle type {0} has no configured discharge duration")]
    UnconfiguredVehicleType(VehicleType),

    /// A live control update carried an invalid value.
    #[error("rejected control update: {0}")]
    InvalidControl(#[from] InvalidConfigurationError),
}

/// An error talking to a [`LiveDriver`](crate::LiveDriver).
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum DriverError {
    /// The driver task is no longer running.
    #[error("the live driver has stopped")]
    Stopped,

    /// The junction rejected an injection. Nothing was changed.
    #[error(transparent)]
    Rejected(#[from] InvalidEventError),
}

impl<T> From<SendError<T>> for DriverError {
    fn from(_tx_err: SendError<T>) -> Self {
        DriverError::Stopped
    }
}

impl From<RecvError> for DriverError {
    fn from(_rx_err: RecvError) -> Self {
        DriverError::Stopped
    }
}
