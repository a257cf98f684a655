use std::ops::Neg;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{EventId, Vehicle, VehicleId};

/// Cost, distance and fuel volume carried forward from a run of partial fill-ups.
///
/// The same shape doubles as a signed delta while inherited values are
/// propagated through younger events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Carry {
    pub cost: Decimal,
    pub distance: Decimal,
    pub fuel_volume: Decimal,
}

impl Carry {
    pub const ZERO: Carry = Carry {
        cost: Decimal::ZERO,
        distance: Decimal::ZERO,
        fuel_volume: Decimal::ZERO,
    };

    pub fn new(cost: Decimal, distance: Decimal, fuel_volume: Decimal) -> Self {
        Self {
            cost,
            distance,
            fuel_volume,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.cost.is_zero() && self.distance.is_zero() && self.fuel_volume.is_zero()
    }

    /// True when at least one component is strictly positive.
    pub fn has_positive(&self) -> bool {
        self.cost > Decimal::ZERO
            || self.distance > Decimal::ZERO
            || self.fuel_volume > Decimal::ZERO
    }

    /// Component-wise sum, or `None` when a component overflows.
    pub fn checked_add(self, rhs: Carry) -> Option<Carry> {
        Some(Carry {
            cost: self.cost.checked_add(rhs.cost)?,
            distance: self.distance.checked_add(rhs.distance)?,
            fuel_volume: self.fuel_volume.checked_add(rhs.fuel_volume)?,
        })
    }

    /// Component-wise sum, each component floored at zero.
    pub fn checked_add_clamped(self, delta: Carry) -> Option<Carry> {
        let sum = self.checked_add(delta)?;
        Some(Carry {
            cost: sum.cost.max(Decimal::ZERO),
            distance: sum.distance.max(Decimal::ZERO),
            fuel_volume: sum.fuel_volume.max(Decimal::ZERO),
        })
    }
}

impl Neg for Carry {
    type Output = Carry;

    fn neg(self) -> Carry {
        Carry {
            cost: -self.cost,
            distance: -self.distance,
            fuel_volume: -self.fuel_volume,
        }
    }
}

/// A persisted fill-up. Quantities are kilometres, litres and price per litre.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuelEvent {
    pub id: EventId,
    pub vehicle_id: VehicleId,
    pub timestamp: DateTime<Utc>,
    pub distance: Decimal,
    pub price: Decimal,
    pub fuel_volume: Decimal,
    pub filled_up: bool,
    pub comment: Option<String>,
    pub inherited_cost: Decimal,
    pub inherited_distance: Decimal,
    pub inherited_fuel_volume: Decimal,
}

impl FuelEvent {
    /// Amount paid at this fill-up; `None` if price times volume does not fit.
    pub fn cost(&self) -> Option<Decimal> {
        self.price.checked_mul(self.fuel_volume)
    }

    /// This event's own contribution to the carry-over chain.
    pub fn contribution(&self) -> Option<Carry> {
        Some(Carry::new(self.cost()?, self.distance, self.fuel_volume))
    }

    pub fn inherited(&self) -> Carry {
        Carry::new(
            self.inherited_cost,
            self.inherited_distance,
            self.inherited_fuel_volume,
        )
    }

    pub fn set_inherited(&mut self, carry: Carry) {
        self.inherited_cost = carry.cost;
        self.inherited_distance = carry.distance;
        self.inherited_fuel_volume = carry.fuel_volume;
    }

    pub fn total_cost(&self) -> Option<Decimal> {
        self.cost()?.checked_add(self.inherited_cost)
    }

    pub fn total_distance(&self) -> Decimal {
        self.distance.saturating_add(self.inherited_distance)
    }

    pub fn total_fuel_volume(&self) -> Decimal {
        self.fuel_volume.saturating_add(self.inherited_fuel_volume)
    }
}

/// Caller-supplied values for a new or edited fill-up, in the vehicle's display units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuelEventInput {
    pub timestamp: DateTime<Utc>,
    pub distance: Decimal,
    pub price: Decimal,
    pub fuel_volume: Decimal,
    pub filled_up: bool,
    pub comment: Option<String>,
}

impl FuelEventInput {
    /// Creates a full fill-up without a comment.
    pub fn new(
        timestamp: DateTime<Utc>,
        distance: Decimal,
        price: Decimal,
        fuel_volume: Decimal,
    ) -> Self {
        Self {
            timestamp,
            distance,
            price,
            fuel_volume,
            filled_up: true,
            comment: None,
        }
    }

    pub fn with_filled_up(mut self, filled_up: bool) -> Self {
        self.filled_up = filled_up;
        self
    }

    pub fn partial(self) -> Self {
        self.with_filled_up(false)
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Reconstruct the editable form of a stored event, converted back into
    /// the vehicle's display units.
    pub fn from_event(event: &FuelEvent, vehicle: &Vehicle) -> Self {
        Self {
            timestamp: event.timestamp,
            distance: vehicle.odometer_unit.from_kilometers(event.distance),
            price: vehicle.fuel_unit.price_per_unit(event.price),
            fuel_volume: vehicle.fuel_unit.from_liters(event.fuel_volume),
            filled_up: event.filled_up,
            comment: event.comment.clone(),
        }
    }
}
