//! Vehicle types, identities and the configured mix of arrivals.

use std::{
    fmt::{self, Display},
    str::FromStr,
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{config::secs, error::InvalidConfigurationError};

/// The kind of vehicle. Given by the arrival source, never inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum VehicleType {
    /// Bicycles and motorbikes.
    Bike,
    /// Cars and vans.
    Car,
    /// Buses and coaches.
    Bus,
    /// Heavy goods vehicles.
    Truck,
}

/// Identifies a single vehicle for its whole life in the junction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(pub u64);

/// A vehicle waiting in, or discharging from, a lane.
///
/// `discharge_duration` is fixed by the vehicle's type when it is created.
#[derive(Debug, Clone, PartialEq)]
pub struct Vehicle {
    /// Assigned at creation, unique within a junction.
    pub id: VehicleId,
    /// What kind of vehicle this is.
    pub vehicle_type: VehicleType,
    /// When the vehicle joined its lane.
    pub arrival_time: Duration,
    /// How long the vehicle takes to clear the junction once it is at the head of an active lane.
    pub discharge_duration: Duration,
}

/// One entry in the categorical distribution of arriving vehicle types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleClass {
    /// The vehicle type this entry describes.
    pub vehicle_type: VehicleType,
    /// Relative weight used when drawing synthetic arrivals. Zero is allowed: the class then only
    /// supplies a discharge duration for observed arrivals.
    pub weight: f64,
    /// Discharge duration given to every vehicle of this type.
    #[serde(with = "secs")]
    pub discharge_duration: Duration,
}

impl VehicleType {
    /// Every vehicle type, in declaration order.
    pub const ALL: [VehicleType; 4] = [
        VehicleType::Bike,
        VehicleType::Car,
        VehicleType::Bus,
        VehicleType::Truck,
    ];

    /// Time for one vehicle of this type to clear the junction.
    pub fn default_discharge_duration(self) -> Duration {
        match self {
            VehicleType::Bike => Duration::from_secs(1),
            VehicleType::Car => Duration::from_secs(2),
            VehicleType::Bus => Duration::from_secs(3),
            VehicleType::Truck => Duration::from_secs(4),
        }
    }

    /// The canonical name, as used in configuration files.
    pub fn as_str(self) -> &'static str {
        match self {
            VehicleType::Bike => "Bike",
            VehicleType::Car => "Car",
            VehicleType::Bus => "Bus",
            VehicleType::Truck => "Truck",
        }
    }
}

impl Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleType {
    type Err = InvalidConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VehicleType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| InvalidConfigurationError::UnknownVehicleType(s.to_string()))
    }
}

impl TryFrom<String> for VehicleType {
    type Error = InvalidConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VehicleType> for String {
    fn from(value: VehicleType) -> Self {
        value.as_str().to_string()
    }
}

impl Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl VehicleClass {
    /// A class using the type's default discharge duration.
    pub fn new(vehicle_type: VehicleType, weight: f64) -> Self {
        Self {
            vehicle_type,
            weight,
            discharge_duration: vehicle_type.default_discharge_duration(),
        }
    }

    /// Overrides the discharge duration.
    pub fn with_discharge_duration(self, discharge_duration: Duration) -> Self {
        Self {
            discharge_duration,
            ..self
        }
    }

    /// Car 50%, Bike 30%, Bus 10%, Truck 10%.
    pub fn default_mix() -> Vec<VehicleClass> {
        vec![
            VehicleClass::new(VehicleType::Car, 0.5),
            VehicleClass::new(VehicleType::Bike, 0.3),
            VehicleClass::new(VehicleType::Bus, 0.1),
            VehicleClass::new(VehicleType::Truck, 0.1),
        ]
    }

    /// A mix containing a single vehicle type.
    pub fn only(vehicle_type: VehicleType) -> Vec<VehicleClass> {
        vec![VehicleClass::new(vehicle_type, 1.0)]
    }
}
