use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ConsumptionUnit, DistanceUnit, VehicleId, VolumeUnit};

/// A tracked vehicle together with its running totals.
///
/// `odometer`, `distance_total_sum` and `fuel_volume_total_sum` are stored in
/// kilometres and litres regardless of the display units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub name: String,
    pub plate: String,
    pub odometer_unit: DistanceUnit,
    pub fuel_unit: VolumeUnit,
    pub consumption_unit: ConsumptionUnit,
    pub odometer: Decimal,
    pub distance_total_sum: Decimal,
    pub fuel_volume_total_sum: Decimal,
    pub order: u32,
    pub created_at: DateTime<Utc>,
}

impl Vehicle {
    /// Build a vehicle with empty history from user input.
    pub fn new(details: NewVehicle) -> Self {
        let odometer = details
            .odometer_unit
            .to_kilometers(details.odometer)
            .max(Decimal::ZERO);
        Self {
            id: VehicleId::new(),
            name: details.name,
            plate: details.plate,
            odometer_unit: details.odometer_unit,
            fuel_unit: details.fuel_unit,
            consumption_unit: details.consumption_unit,
            odometer,
            distance_total_sum: Decimal::ZERO,
            fuel_volume_total_sum: Decimal::ZERO,
            order: 0,
            created_at: Utc::now(),
        }
    }

    pub fn display_odometer(&self) -> Decimal {
        self.odometer_unit.from_kilometers(self.odometer)
    }

    /// Apply user edits. A re-entered odometer never drops below the recorded distance.
    pub fn apply(&mut self, changes: VehicleChanges) {
        if let Some(name) = changes.name {
            self.name = name;
        }
        if let Some(plate) = changes.plate {
            self.plate = plate;
        }
        if let Some(unit) = changes.odometer_unit {
            self.odometer_unit = unit;
        }
        if let Some(unit) = changes.fuel_unit {
            self.fuel_unit = unit;
        }
        if let Some(unit) = changes.consumption_unit {
            self.consumption_unit = unit;
        }
        if let Some(odometer) = changes.odometer {
            let kilometers = self.odometer_unit.to_kilometers(odometer);
            self.odometer = kilometers.max(self.distance_total_sum);
        }
    }
}

/// Fields needed to register a vehicle. `odometer` is in `odometer_unit`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVehicle {
    pub name: String,
    pub plate: String,
    pub odometer_unit: DistanceUnit,
    pub fuel_unit: VolumeUnit,
    pub consumption_unit: ConsumptionUnit,
    pub odometer: Decimal,
}

impl NewVehicle {
    pub fn new(name: impl Into<String>, plate: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            plate: plate.into(),
            ..Self::default()
        }
    }

    pub fn with_units(
        mut self,
        odometer_unit: DistanceUnit,
        fuel_unit: VolumeUnit,
        consumption_unit: ConsumptionUnit,
    ) -> Self {
        self.odometer_unit = odometer_unit;
        self.fuel_unit = fuel_unit;
        self.consumption_unit = consumption_unit;
        self
    }

    pub fn with_odometer(mut self, odometer: Decimal) -> Self {
        self.odometer = odometer;
        self
    }
}

/// Partial update applied through [`Vehicle::apply`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleChanges {
    pub name: Option<String>,
    pub plate: Option<String>,
    pub odometer_unit: Option<DistanceUnit>,
    pub fuel_unit: Option<VolumeUnit>,
    pub consumption_unit: Option<ConsumptionUnit>,
    pub odometer: Option<Decimal>,
}

impl VehicleChanges {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
