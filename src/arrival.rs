//! Stochastic vehicle arrivals.
//!
//! Each lane receives a Poisson arrival stream: inter-arrival times are drawn from an exponential
//! distribution with the lane's rate. Vehicle types are drawn from the configured categorical
//! distribution. All randomness comes from one seeded generator owned by the process, so a run is
//! reproducible from its seed.

use std::{collections::BTreeMap, time::Duration};

use rand::{distr::weighted::WeightedIndex, rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Exp};

use crate::{
    config::{validate_arrival_rate, JunctionConfig},
    error::{InvalidConfigurationError, InvalidEventError},
    lane::LaneId,
    vehicle::{Vehicle, VehicleClass, VehicleId, VehicleType},
};

/// Generates arrivals for every lane of a junction.
#[derive(Debug)]
pub struct ArrivalProcess {
    lanes: BTreeMap<LaneId, LaneArrivals>,
    classes: Vec<VehicleClass>,
    type_distribution: WeightedIndex<f64>,
    next_vehicle: u64,
    /// RNG for reproducibility
    rng: StdRng,
}

#[derive(Debug)]
struct LaneArrivals {
    arrivals_per_minute: f64,
    /// `None` when arrivals are disabled.
    inter_arrival: Option<Exp<f64>>,
    /// Bumped whenever the rate changes, so arrivals drawn at the old rate can be recognised.
    generation: u64,
}

impl LaneArrivals {
    fn new(lane: LaneId, arrivals_per_minute: f64) -> Result<Self, InvalidConfigurationError> {
        validate_arrival_rate(lane, arrivals_per_minute)?;
        let inter_arrival = if arrivals_per_minute > 0.0 {
            let per_second = arrivals_per_minute / 60.0;
            Some(
                Exp::new(per_second).map_err(|_| InvalidConfigurationError::InvalidArrivalRate {
                    lane,
                    rate: arrivals_per_minute,
                })?,
            )
        } else {
            None
        };

        Ok(Self {
            arrivals_per_minute,
            inter_arrival,
            generation: 0,
        })
    }
}

impl ArrivalProcess {
    /// Create the arrival process for a validated configuration.
    pub fn new(config: &JunctionConfig) -> Result<Self, InvalidConfigurationError> {
        let lanes = config
            .lanes
            .iter()
            .map(|lane| Ok((lane.id, LaneArrivals::new(lane.id, lane.arrivals_per_minute)?)))
            .collect::<Result<BTreeMap<_, _>, InvalidConfigurationError>>()?;

        let type_distribution =
            WeightedIndex::new(config.vehicle_mix.iter().map(|class| class.weight))
                .map_err(|_| InvalidConfigurationError::EmptyVehicleMix)?;

        Ok(Self {
            lanes,
            classes: config.vehicle_mix.clone(),
            type_distribution,
            next_vehicle: 0,
            rng: StdRng::seed_from_u64(config.random_seed),
        })
    }

    /// The lane's current arrival rate, in vehicles per minute.
    pub fn rate(&self, lane: LaneId) -> Option<f64> {
        self.lanes.get(&lane).map(|l| l.arrivals_per_minute)
    }

    /// Identifies the lane's current rate. Arrivals scheduled under an older generation are stale.
    pub fn generation(&self, lane: LaneId) -> Option<u64> {
        self.lanes.get(&lane).map(|l| l.generation)
    }

    /// Sample the time until the lane's next arrival. `None` if arrivals are disabled.
    pub fn next_inter_arrival(&mut self, lane: LaneId) -> Option<Duration> {
        let exp = self.lanes.get(&lane)?.inter_arrival.as_ref()?;
        let seconds = exp.sample(&mut self.rng);
        // A vanishingly small rate can produce an interval too large to represent: treat it as
        // never.
        Duration::try_from_secs_f64(seconds).ok()
    }

    /// Change a lane's rate. Returns the new generation.
    pub(crate) fn set_rate(
        &mut self,
        lane: LaneId,
        arrivals_per_minute: f64,
    ) -> Result<u64, InvalidEventError> {
        let current = self
            .lanes
            .get_mut(&lane)
            .ok_or(InvalidEventError::UnknownLane(lane))?;

        let mut replacement = LaneArrivals::new(lane, arrivals_per_minute)?;
        replacement.generation = current.generation + 1;
        *current = replacement;

        Ok(current.generation)
    }

    /// Draw a vehicle type from the configured mix.
    pub fn sample_vehicle_type(&mut self) -> VehicleType {
        let index = self.type_distribution.sample(&mut self.rng);
        self.classes[index].vehicle_type
    }

    /// The configured discharge duration for a vehicle type.
    pub fn discharge_duration(&self, vehicle_type: VehicleType) -> Option<Duration> {
        self.classes
            .iter()
            .find(|class| class.vehicle_type == vehicle_type)
            .map(|class| class.discharge_duration)
    }

    /// Construct a vehicle of the given type arriving now.
    pub(crate) fn create_vehicle(
        &mut self,
        vehicle_type: VehicleType,
        now: Duration,
    ) -> Result<Vehicle, InvalidEventError> {
        let discharge_duration = self
            .discharge_duration(vehicle_type)
            .ok_or(InvalidEventError::UnconfiguredVehicleType(vehicle_type))?;

        let id = VehicleId(self.next_vehicle);
        self.next_vehicle += 1;

        Ok(Vehicle {
            id,
            vehicle_type,
            arrival_time: now,
            discharge_duration,
        })
    }
}
