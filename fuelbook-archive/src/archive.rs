use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use fuelbook_core::stats::FuelStatistics;
use fuelbook_core::{
    EventId, FuelEvent, FuelEventInput, NewVehicle, Vehicle, VehicleChanges, VehicleId,
};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::ledger::{inherited_from, insertion_delta, propagate, removal_delta};
use crate::totals::{odometer_follows, record_insertion, record_removal};
use crate::{ArchiveError, ArchiveRepository, ArchiveResult, ArchiveTransaction, VehicleLocks};

/// Outcome of a bulk import.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped_duplicates: usize,
}

/// Entry point for every change to vehicles and their fill-up history.
///
/// Each operation runs under the affected vehicle's lock inside one storage
/// transaction: neighbours are read, inherited values and totals recomputed,
/// and all rows written before a single commit. Any error drops the
/// transaction and leaves the store as it was.
pub struct FuelArchive {
    repository: Arc<dyn ArchiveRepository>,
    locks: VehicleLocks,
}

impl FuelArchive {
    pub fn new(repository: Arc<dyn ArchiveRepository>) -> Self {
        Self {
            repository,
            locks: VehicleLocks::new(),
        }
    }

    /// Record a new fill-up. `input` is in the vehicle's display units.
    pub fn insert_event(
        &self,
        vehicle_id: VehicleId,
        input: FuelEventInput,
    ) -> ArchiveResult<FuelEvent> {
        self.insert_event_with(vehicle_id, input, false)
    }

    /// Record a new fill-up, optionally forcing the odometer to follow it.
    pub fn insert_event_with(
        &self,
        vehicle_id: VehicleId,
        input: FuelEventInput,
        force_odometer_update: bool,
    ) -> ArchiveResult<FuelEvent> {
        let _fleet = self.locks.fleet_shared();
        let lock = self.locks.vehicle(vehicle_id);
        let _guard = lock.lock();

        let mut tx = self.repository.begin()?;
        let event = insert_in(tx.as_mut(), vehicle_id, input, force_odometer_update)?;
        tx.commit()?;
        info!(vehicle = %vehicle_id, event = %event.id, at = %event.timestamp, "fill-up recorded");
        Ok(event)
    }

    /// Delete a fill-up and repair everything derived from it.
    pub fn remove_event(&self, event_id: EventId, force_odometer_update: bool) -> ArchiveResult<()> {
        let vehicle_id = self.owner_of(event_id)?;
        let _fleet = self.locks.fleet_shared();
        let lock = self.locks.vehicle(vehicle_id);
        let _guard = lock.lock();

        let mut tx = self.repository.begin()?;
        let event = tx.load_event(event_id)?;
        remove_in(tx.as_mut(), &event, force_odometer_update)?;
        tx.commit()?;
        info!(vehicle = %vehicle_id, event = %event_id, "fill-up removed");
        Ok(())
    }

    /// Replace a fill-up with new values.
    ///
    /// Runs as a forced removal followed by a forced insertion in one
    /// transaction. The returned event carries a new identity.
    pub fn edit_event(&self, event_id: EventId, input: FuelEventInput) -> ArchiveResult<FuelEvent> {
        let vehicle_id = self.owner_of(event_id)?;
        let _fleet = self.locks.fleet_shared();
        let lock = self.locks.vehicle(vehicle_id);
        let _guard = lock.lock();

        let mut tx = self.repository.begin()?;
        let original = tx.load_event(event_id)?;
        let timestamp = normalize_timestamp(input.timestamp);
        if timestamp != original.timestamp {
            reject_duplicate(tx.as_ref(), vehicle_id, timestamp)?;
        }
        validate(&input)?;

        remove_in(tx.as_mut(), &original, true)?;
        let replacement = insert_in(tx.as_mut(), vehicle_id, input, true)?;
        tx.commit()?;
        info!(
            vehicle = %vehicle_id,
            previous = %event_id,
            event = %replacement.id,
            "fill-up edited"
        );
        Ok(replacement)
    }

    /// Insert many fill-ups one by one through the regular insert path.
    ///
    /// Inputs colliding with an existing timestamp are skipped. Other errors
    /// abort the import; fill-ups imported before the failure stay recorded.
    pub fn import_events<I>(&self, vehicle_id: VehicleId, inputs: I) -> ArchiveResult<ImportReport>
    where
        I: IntoIterator<Item = FuelEventInput>,
    {
        let mut report = ImportReport::default();
        for input in inputs {
            match self.insert_event(vehicle_id, input) {
                Ok(_) => report.imported += 1,
                Err(ArchiveError::DuplicateTimestamp { timestamp, .. }) => {
                    debug!(vehicle = %vehicle_id, at = %timestamp, "skipping duplicate fill-up");
                    report.skipped_duplicates += 1;
                }
                Err(err) => return Err(err),
            }
        }
        info!(
            vehicle = %vehicle_id,
            imported = report.imported,
            skipped = report.skipped_duplicates,
            "import finished"
        );
        Ok(report)
    }

    /// Register a vehicle at the top of the display order.
    pub fn create_vehicle(&self, details: NewVehicle) -> ArchiveResult<Vehicle> {
        if details.name.trim().is_empty() {
            return Err(ArchiveError::InvalidInput("vehicle name must not be empty".into()));
        }
        check_quantity("odometer", details.odometer)?;
        let _fleet = self.locks.fleet_exclusive();
        let mut tx = self.repository.begin()?;
        for mut existing in tx.vehicles()? {
            existing.order += 1;
            tx.save_vehicle(&existing)?;
        }
        let vehicle = Vehicle::new(details);
        tx.save_vehicle(&vehicle)?;
        tx.commit()?;
        info!(vehicle = %vehicle.id, name = %vehicle.name, "vehicle created");
        Ok(vehicle)
    }

    pub fn update_vehicle(
        &self,
        vehicle_id: VehicleId,
        changes: VehicleChanges,
    ) -> ArchiveResult<Vehicle> {
        if let Some(odometer) = changes.odometer {
            check_quantity("odometer", odometer)?;
        }
        let _fleet = self.locks.fleet_shared();
        let lock = self.locks.vehicle(vehicle_id);
        let _guard = lock.lock();

        let mut tx = self.repository.begin()?;
        let mut vehicle = tx.load_vehicle(vehicle_id)?;
        vehicle.apply(changes);
        tx.save_vehicle(&vehicle)?;
        tx.commit()?;
        info!(vehicle = %vehicle_id, "vehicle updated");
        Ok(vehicle)
    }

    /// Delete a vehicle with its whole history.
    pub fn delete_vehicle(&self, vehicle_id: VehicleId) -> ArchiveResult<()> {
        let _fleet = self.locks.fleet_exclusive();
        let mut tx = self.repository.begin()?;
        let removed = tx.load_vehicle(vehicle_id)?;
        tx.delete_vehicle(vehicle_id)?;
        for mut vehicle in tx.vehicles()? {
            if vehicle.order > removed.order {
                vehicle.order -= 1;
                tx.save_vehicle(&vehicle)?;
            }
        }
        tx.commit()?;
        self.locks.forget(vehicle_id);
        info!(vehicle = %vehicle_id, "vehicle deleted");
        Ok(())
    }

    /// Move a vehicle to `index` in the display order.
    pub fn move_vehicle(&self, vehicle_id: VehicleId, index: usize) -> ArchiveResult<Vec<Vehicle>> {
        let _fleet = self.locks.fleet_exclusive();
        let mut tx = self.repository.begin()?;
        let mut vehicles = tx.vehicles()?;
        if index >= vehicles.len() {
            return Err(ArchiveError::InvalidInput(format!(
                "position {index} is out of range for {} vehicles",
                vehicles.len()
            )));
        }
        let from = vehicles
            .iter()
            .position(|vehicle| vehicle.id == vehicle_id)
            .ok_or(ArchiveError::VehicleNotFound(vehicle_id))?;
        let moved = vehicles.remove(from);
        vehicles.insert(index, moved);
        for (position, vehicle) in vehicles.iter_mut().enumerate() {
            let order = position as u32;
            if vehicle.order != order {
                vehicle.order = order;
                tx.save_vehicle(vehicle)?;
            }
        }
        tx.commit()?;
        debug!(vehicle = %vehicle_id, from, to = index, "vehicle moved");
        Ok(vehicles)
    }

    pub fn vehicles(&self) -> ArchiveResult<Vec<Vehicle>> {
        self.repository.begin()?.vehicles()
    }

    pub fn vehicle(&self, vehicle_id: VehicleId) -> ArchiveResult<Vehicle> {
        self.repository.begin()?.load_vehicle(vehicle_id)
    }

    /// Fill-ups of a vehicle, newest first.
    pub fn events(&self, vehicle_id: VehicleId) -> ArchiveResult<Vec<FuelEvent>> {
        let tx = self.repository.begin()?;
        tx.load_vehicle(vehicle_id)?;
        tx.events(vehicle_id)
    }

    pub fn event(&self, event_id: EventId) -> ArchiveResult<FuelEvent> {
        self.repository.begin()?.load_event(event_id)
    }

    /// Statistics over the fill-ups at or after `since` (all when `None`).
    pub fn statistics(
        &self,
        vehicle_id: VehicleId,
        since: Option<DateTime<Utc>>,
    ) -> ArchiveResult<FuelStatistics> {
        let tx = self.repository.begin()?;
        let vehicle = tx.load_vehicle(vehicle_id)?;
        let mut events = tx.events(vehicle_id)?;
        if let Some(since) = since {
            events.retain(|event| event.timestamp >= since);
        }
        events.reverse();
        Ok(FuelStatistics::from_events(&events, vehicle.consumption_unit))
    }

    fn owner_of(&self, event_id: EventId) -> ArchiveResult<VehicleId> {
        Ok(self.repository.begin()?.load_event(event_id)?.vehicle_id)
    }
}

/// Upper bound for entered quantities and odometer readings, in display units.
pub const MAX_QUANTITY: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Timestamps are kept at microsecond precision, the resolution of every backend.
fn normalize_timestamp(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp.trunc_subsecs(6)
}

fn validate(input: &FuelEventInput) -> ArchiveResult<()> {
    for (field, value) in [
        ("distance", input.distance),
        ("price", input.price),
        ("fuel volume", input.fuel_volume),
    ] {
        check_quantity(field, value)?;
    }
    Ok(())
}

fn check_quantity(field: &str, value: Decimal) -> ArchiveResult<()> {
    if value < Decimal::ZERO {
        return Err(ArchiveError::InvalidInput(format!("{field} must not be negative")));
    }
    if value > MAX_QUANTITY {
        return Err(ArchiveError::InvalidInput(format!(
            "{field} must not exceed {MAX_QUANTITY}"
        )));
    }
    Ok(())
}

fn reject_duplicate(
    tx: &dyn ArchiveTransaction,
    vehicle_id: VehicleId,
    timestamp: DateTime<Utc>,
) -> ArchiveResult<()> {
    if tx.contains_event_at(vehicle_id, timestamp)? {
        warn!(vehicle = %vehicle_id, at = %timestamp, "rejecting fill-up with duplicate timestamp");
        return Err(ArchiveError::DuplicateTimestamp {
            vehicle: vehicle_id,
            timestamp,
        });
    }
    Ok(())
}

fn insert_in(
    tx: &mut dyn ArchiveTransaction,
    vehicle_id: VehicleId,
    input: FuelEventInput,
    force_odometer_update: bool,
) -> ArchiveResult<FuelEvent> {
    let timestamp = normalize_timestamp(input.timestamp);
    let mut vehicle = tx.load_vehicle(vehicle_id)?;
    reject_duplicate(tx, vehicle_id, timestamp)?;
    validate(&input)?;

    let kilometers = vehicle.odometer_unit.to_kilometers(input.distance);
    let liters = vehicle.fuel_unit.to_liters(input.fuel_volume);
    let price_per_liter = vehicle.fuel_unit.price_per_liter(input.price);

    let older = tx.find_older_events(vehicle_id, timestamp, Some(1))?;
    let mut event = FuelEvent {
        id: EventId::new(),
        vehicle_id,
        timestamp,
        distance: kilometers,
        price: price_per_liter,
        fuel_volume: liters,
        filled_up: input.filled_up,
        comment: input.comment,
        inherited_cost: Decimal::ZERO,
        inherited_distance: Decimal::ZERO,
        inherited_fuel_volume: Decimal::ZERO,
    };
    event.set_inherited(inherited_from(older.first())?);

    let mut younger = tx.find_younger_events(vehicle_id, timestamp, None)?;
    let is_newest = younger.is_empty();
    let delta = insertion_delta(&event)?;
    let touched = if delta.is_zero() {
        0
    } else {
        propagate(&mut younger, delta)?.len()
    };
    let follow = odometer_follows(&vehicle, is_newest, force_odometer_update);
    record_insertion(&mut vehicle, kilometers, liters, follow)?;

    if touched > 0 {
        debug!(event = %event.id, touched, "propagating inserted carry");
    }
    for neighbour in &younger[..touched] {
        tx.save_event(neighbour)?;
    }
    tx.save_vehicle(&vehicle)?;
    tx.save_event(&event)?;
    Ok(event)
}

fn remove_in(
    tx: &mut dyn ArchiveTransaction,
    event: &FuelEvent,
    force_odometer_update: bool,
) -> ArchiveResult<()> {
    let mut vehicle = tx.load_vehicle(event.vehicle_id)?;
    let mut younger = tx.find_younger_events(event.vehicle_id, event.timestamp, None)?;
    let is_newest = younger.is_empty();
    let touched = match removal_delta(event)? {
        Some(delta) => propagate(&mut younger, delta)?.len(),
        None => 0,
    };
    let follow = odometer_follows(&vehicle, is_newest, force_odometer_update);
    record_removal(&mut vehicle, event.distance, event.fuel_volume, follow);

    if touched > 0 {
        debug!(event = %event.id, touched, "propagating removed carry");
    }
    for neighbour in &younger[..touched] {
        tx.save_event(neighbour)?;
    }
    tx.save_vehicle(&vehicle)?;
    tx.delete_event(event.id)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryArchiveRepository;
    use chrono::TimeZone;
    use fuelbook_core::{ConsumptionUnit, DistanceUnit, VolumeUnit};
    use rust_decimal_macros::dec;

    fn archive() -> FuelArchive {
        FuelArchive::new(Arc::new(InMemoryArchiveRepository::new()))
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn insert_converts_display_units() {
        let archive = archive();
        let vehicle = archive
            .create_vehicle(NewVehicle::new("Pickup", "TX-1").with_units(
                DistanceUnit::StatuteMiles,
                VolumeUnit::GallonsUs,
                ConsumptionUnit::MilesPerGallonUs,
            ))
            .unwrap();
        let event = archive
            .insert_event(
                vehicle.id,
                FuelEventInput::new(at(1), dec!(100), dec!(3.785411784), dec!(4)),
            )
            .unwrap();
        assert_eq!(event.distance, dec!(160.9344));
        assert_eq!(event.price, dec!(1));
        assert_eq!(event.fuel_volume, dec!(15.141647136));
        let stats = archive.statistics(vehicle.id, None).unwrap();
        assert_eq!(stats.average_consumption, Some(dec!(25)));
    }

    #[test]
    fn negative_quantities_are_rejected() {
        let archive = archive();
        let vehicle = archive.create_vehicle(NewVehicle::new("Van", "V-2")).unwrap();
        let err = archive
            .insert_event(
                vehicle.id,
                FuelEventInput::new(at(1), dec!(-5), dec!(1.5), dec!(10)),
            )
            .unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidInput(_)));
        assert!(archive.events(vehicle.id).unwrap().is_empty());
    }

    #[test]
    fn quantities_beyond_the_bound_are_rejected() {
        let archive = archive();
        let vehicle = archive.create_vehicle(NewVehicle::new("Van", "V-2")).unwrap();
        let too_large = MAX_QUANTITY + dec!(1);
        for input in [
            FuelEventInput::new(at(1), too_large, dec!(1.5), dec!(10)),
            FuelEventInput::new(at(1), dec!(100), too_large, dec!(10)),
            FuelEventInput::new(at(1), dec!(100), dec!(1.5), too_large),
        ] {
            let err = archive.insert_event(vehicle.id, input).unwrap_err();
            assert!(matches!(err, ArchiveError::InvalidInput(_)));
        }
        assert!(archive
            .insert_event(vehicle.id, FuelEventInput::new(at(1), MAX_QUANTITY, dec!(1.5), dec!(10)))
            .is_ok());

        let err = archive
            .create_vehicle(NewVehicle::new("Truck", "T-1").with_odometer(too_large))
            .unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidInput(_)));
        let changes = VehicleChanges {
            odometer: Some(too_large),
            ..VehicleChanges::default()
        };
        assert!(archive.update_vehicle(vehicle.id, changes).is_err());
    }

    #[test]
    fn unknown_vehicle_is_reported() {
        let archive = archive();
        let missing = VehicleId::new();
        let err = archive
            .insert_event(missing, FuelEventInput::new(at(1), dec!(1), dec!(1), dec!(1)))
            .unwrap_err();
        assert!(matches!(err, ArchiveError::VehicleNotFound(id) if id == missing));
    }

    #[test]
    fn new_vehicles_go_to_the_top() {
        let archive = archive();
        let first = archive.create_vehicle(NewVehicle::new("First", "F-1")).unwrap();
        let second = archive.create_vehicle(NewVehicle::new("Second", "S-2")).unwrap();
        let ids: Vec<_> = archive.vehicles().unwrap().iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);

        let reordered = archive.move_vehicle(second.id, 1).unwrap();
        assert_eq!(reordered[0].id, first.id);
        assert_eq!(reordered[0].order, 0);
        assert_eq!(reordered[1].order, 1);
        assert!(matches!(
            archive.move_vehicle(first.id, 5),
            Err(ArchiveError::InvalidInput(_))
        ));
    }

    #[test]
    fn deleting_vehicle_compacts_order_and_drops_history() {
        let archive = archive();
        let a = archive.create_vehicle(NewVehicle::new("A", "A")).unwrap();
        let b = archive.create_vehicle(NewVehicle::new("B", "B")).unwrap();
        let c = archive.create_vehicle(NewVehicle::new("C", "C")).unwrap();
        let event = archive
            .insert_event(b.id, FuelEventInput::new(at(2), dec!(10), dec!(1), dec!(1)))
            .unwrap();

        archive.delete_vehicle(b.id).unwrap();
        let remaining = archive.vehicles().unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!((remaining[0].id, remaining[0].order), (c.id, 0));
        assert_eq!((remaining[1].id, remaining[1].order), (a.id, 1));
        assert!(matches!(
            archive.event(event.id),
            Err(ArchiveError::EventNotFound(_))
        ));
    }

    #[test]
    fn update_vehicle_keeps_odometer_above_totals() {
        let archive = archive();
        let vehicle = archive.create_vehicle(NewVehicle::new("Sedan", "S-1")).unwrap();
        archive
            .insert_event(vehicle.id, FuelEventInput::new(at(3), dec!(400), dec!(1.7), dec!(30)))
            .unwrap();
        let updated = archive
            .update_vehicle(
                vehicle.id,
                VehicleChanges {
                    odometer: Some(dec!(100)),
                    ..VehicleChanges::default()
                },
            )
            .unwrap();
        assert_eq!(updated.odometer, dec!(400));
    }

    #[test]
    fn import_skips_duplicates() {
        let archive = archive();
        let vehicle = archive.create_vehicle(NewVehicle::new("Van", "V-3")).unwrap();
        let inputs = vec![
            FuelEventInput::new(at(1), dec!(300), dec!(1.5), dec!(20)),
            FuelEventInput::new(at(2), dec!(250), dec!(1.6), dec!(18)).partial(),
            FuelEventInput::new(at(2), dec!(999), dec!(9), dec!(99)),
            FuelEventInput::new(at(3), dec!(100), dec!(1.4), dec!(9)),
        ];
        let report = archive.import_events(vehicle.id, inputs).unwrap();
        assert_eq!(
            report,
            ImportReport {
                imported: 3,
                skipped_duplicates: 1
            }
        );
        let vehicle = archive.vehicle(vehicle.id).unwrap();
        assert_eq!(vehicle.distance_total_sum, dec!(650));
        assert_eq!(vehicle.fuel_volume_total_sum, dec!(47));
    }
}
