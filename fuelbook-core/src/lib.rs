//! Core domain types shared by every fuelbook crate.

mod event;
mod ids;
mod vehicle;

pub mod stats;
pub mod units;

pub use event::{Carry, FuelEvent, FuelEventInput};
pub use ids::{EventId, VehicleId};
pub use units::{ConsumptionUnit, DistanceUnit, VolumeUnit};
pub use vehicle::{NewVehicle, Vehicle, VehicleChanges};
