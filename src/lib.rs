//! Decide which lane of a road junction has right-of-way.
//!
//! Vehicles arrive at each lane as a Poisson process and queue up. Only the active lane
//! discharges, one vehicle at a time, each taking a duration fixed by its type. A scheduler decides
//! when right-of-way moves, balancing throughput (serve long queues) against fairness (never let a
//! lane wait longer than `max_wait_time`).
//!
//! Everything runs on a single logical timeline driven by a discrete-event queue. Nothing here
//! reads the wall clock: the same configuration and seed always produce the same event stream.
//! [`LiveDriver`] runs a junction against real time for interactive use.
//!
//! See the README for an example.

#![deny(missing_docs)]

#[cfg(doctest)]
use doc_comment::doctest;
#[cfg(doctest)]
doctest!("../README.md");

pub mod arrival;
pub mod clock;
pub mod config;
mod discharge;
mod driver;
pub mod error;
pub mod event;
mod junction;
pub mod lane;
pub mod metrics;
pub mod priority;
mod report;
mod snapshot;
pub mod vehicle;

pub use config::{Direction, JunctionConfig, LaneConfig, ThresholdPolicy, TieBreak};
pub use driver::LiveDriver;
pub use error::{DriverError, InvalidConfigurationError, InvalidEventError};
pub use event::{Event, EventKind, EventLog, SwitchReason};
pub use junction::{Injection, Junction, SignalState, Step};
pub use lane::{Lane, LaneId};
pub use metrics::JunctionMetrics;
pub use report::Reporter;
pub use snapshot::{LaneSnapshot, Snapshot};
pub use vehicle::{Vehicle, VehicleClass, VehicleId, VehicleType};
