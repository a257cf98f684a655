//! Vehicle running totals and the conditional odometer policy.

use fuelbook_core::Vehicle;
use rust_decimal::Decimal;

use crate::error::{ArchiveError, ArchiveResult};

/// Whether the absolute odometer follows this change.
///
/// It does when the change touches the newest event, when the odometer has
/// fallen to or below the recorded distance, or when the caller forces it.
/// Must be evaluated before the totals are updated.
pub fn odometer_follows(vehicle: &Vehicle, is_newest: bool, forced: bool) -> bool {
    is_newest || forced || vehicle.odometer <= vehicle.distance_total_sum
}

/// Account for an inserted event of `distance` km and `fuel_volume` litres.
///
/// Fails without modifying `vehicle` when a total would overflow.
pub fn record_insertion(
    vehicle: &mut Vehicle,
    distance: Decimal,
    fuel_volume: Decimal,
    update_odometer: bool,
) -> ArchiveResult<()> {
    let overflow = || {
        ArchiveError::InvalidInput(format!(
            "totals of vehicle {} would overflow",
            vehicle.id
        ))
    };
    let distance_total_sum = vehicle
        .distance_total_sum
        .checked_add(distance)
        .ok_or_else(overflow)?;
    let fuel_volume_total_sum = vehicle
        .fuel_volume_total_sum
        .checked_add(fuel_volume)
        .ok_or_else(overflow)?;
    let odometer = if update_odometer {
        vehicle
            .odometer
            .checked_add(distance)
            .ok_or_else(overflow)?
            .max(distance_total_sum)
    } else {
        vehicle.odometer
    };
    vehicle.distance_total_sum = distance_total_sum;
    vehicle.fuel_volume_total_sum = fuel_volume_total_sum;
    vehicle.odometer = odometer;
    enforce_odometer_floor(vehicle);
    Ok(())
}

/// Account for a removed event of `distance` km and `fuel_volume` litres.
pub fn record_removal(
    vehicle: &mut Vehicle,
    distance: Decimal,
    fuel_volume: Decimal,
    update_odometer: bool,
) {
    vehicle.distance_total_sum = (vehicle.distance_total_sum - distance).max(Decimal::ZERO);
    vehicle.fuel_volume_total_sum = (vehicle.fuel_volume_total_sum - fuel_volume).max(Decimal::ZERO);
    if update_odometer {
        vehicle.odometer = (vehicle.odometer - distance).max(Decimal::ZERO);
    }
    enforce_odometer_floor(vehicle);
}

// An older event inserted into a vehicle whose odometer runs ahead of its
// totals can still push the totals past the odometer. The raised value is not
// remembered, so removing that event again can leave the odometer below where
// it started.
fn enforce_odometer_floor(vehicle: &mut Vehicle) {
    if vehicle.odometer < vehicle.distance_total_sum {
        vehicle.odometer = vehicle.distance_total_sum;
    }
}
