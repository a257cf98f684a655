use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use fuelbook_core::{EventId, FuelEvent, Vehicle, VehicleId};
use parking_lot::{Mutex, MutexGuard};

use crate::{
    ArchiveError, ArchiveRepository, ArchiveResult, ArchiveTransaction, Direction, NeighborQuery,
};

#[derive(Clone, Debug)]
struct VehicleRecord {
    vehicle: Vehicle,
    events: BTreeMap<DateTime<Utc>, FuelEvent>,
}

#[derive(Clone, Debug, Default)]
struct ArchiveState {
    vehicles: HashMap<VehicleId, VehicleRecord>,
    /// Where each stored event lives; kept in step with `vehicles`.
    index: HashMap<EventId, (VehicleId, DateTime<Utc>)>,
}

impl ArchiveState {
    fn locate(&self, id: EventId) -> Option<(VehicleId, DateTime<Utc>)> {
        self.index.get(&id).copied()
    }

    fn unlink(&mut self, id: EventId) {
        if let Some((vehicle, timestamp)) = self.index.remove(&id) {
            if let Some(record) = self.vehicles.get_mut(&vehicle) {
                record.events.remove(&timestamp);
            }
        }
    }
}

/// Process-local archive used by tests and throwaway sessions.
///
/// A transaction holds the state mutex for its whole lifetime and works on a
/// private copy that replaces the shared state on commit.
#[derive(Debug, Default)]
pub struct InMemoryArchiveRepository {
    state: Mutex<ArchiveState>,
}

impl InMemoryArchiveRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArchiveRepository for InMemoryArchiveRepository {
    fn begin(&self) -> ArchiveResult<Box<dyn ArchiveTransaction + '_>> {
        let guard = self.state.lock();
        let working = guard.clone();
        Ok(Box::new(InMemoryTransaction { guard, working }))
    }
}

struct InMemoryTransaction<'a> {
    guard: MutexGuard<'a, ArchiveState>,
    working: ArchiveState,
}

impl ArchiveTransaction for InMemoryTransaction<'_> {
    fn find_vehicle(&self, id: VehicleId) -> ArchiveResult<Option<Vehicle>> {
        Ok(self
            .working
            .vehicles
            .get(&id)
            .map(|record| record.vehicle.clone()))
    }

    fn vehicles(&self) -> ArchiveResult<Vec<Vehicle>> {
        let mut vehicles: Vec<Vehicle> = self
            .working
            .vehicles
            .values()
            .map(|record| record.vehicle.clone())
            .collect();
        vehicles.sort_by(|a, b| a.order.cmp(&b.order).then(a.created_at.cmp(&b.created_at)));
        Ok(vehicles)
    }

    fn save_vehicle(&mut self, vehicle: &Vehicle) -> ArchiveResult<()> {
        self.working
            .vehicles
            .entry(vehicle.id)
            .and_modify(|record| record.vehicle = vehicle.clone())
            .or_insert_with(|| VehicleRecord {
                vehicle: vehicle.clone(),
                events: BTreeMap::new(),
            });
        Ok(())
    }

    fn delete_vehicle(&mut self, id: VehicleId) -> ArchiveResult<()> {
        if let Some(record) = self.working.vehicles.remove(&id) {
            for event in record.events.values() {
                self.working.index.remove(&event.id);
            }
        }
        Ok(())
    }

    fn find_event(&self, id: EventId) -> ArchiveResult<Option<FuelEvent>> {
        Ok(self.working.locate(id).and_then(|(vehicle, timestamp)| {
            self.working
                .vehicles
                .get(&vehicle)
                .and_then(|record| record.events.get(&timestamp))
                .cloned()
        }))
    }

    fn find_event_at(
        &self,
        vehicle: VehicleId,
        timestamp: DateTime<Utc>,
    ) -> ArchiveResult<Option<FuelEvent>> {
        Ok(self
            .working
            .vehicles
            .get(&vehicle)
            .and_then(|record| record.events.get(&timestamp))
            .cloned())
    }

    fn neighbors(&self, query: &NeighborQuery) -> ArchiveResult<Vec<FuelEvent>> {
        let Some(record) = self.working.vehicles.get(&query.vehicle) else {
            return Ok(Vec::new());
        };
        let limit = query.limit.unwrap_or(usize::MAX);
        let events = match query.direction {
            Direction::Older => record
                .events
                .range(..query.pivot)
                .rev()
                .take(limit)
                .map(|(_, event)| event.clone())
                .collect(),
            Direction::Younger => record
                .events
                .range(query.pivot..)
                .filter(|(timestamp, _)| **timestamp > query.pivot)
                .take(limit)
                .map(|(_, event)| event.clone())
                .collect(),
        };
        Ok(events)
    }

    fn events(&self, vehicle: VehicleId) -> ArchiveResult<Vec<FuelEvent>> {
        Ok(self
            .working
            .vehicles
            .get(&vehicle)
            .map(|record| record.events.values().rev().cloned().collect())
            .unwrap_or_default())
    }

    fn save_event(&mut self, event: &FuelEvent) -> ArchiveResult<()> {
        let record = self
            .working
            .vehicles
            .get(&event.vehicle_id)
            .ok_or(ArchiveError::VehicleNotFound(event.vehicle_id))?;
        if let Some(existing) = record.events.get(&event.timestamp) {
            if existing.id != event.id {
                return Err(ArchiveError::DuplicateTimestamp {
                    vehicle: event.vehicle_id,
                    timestamp: event.timestamp,
                });
            }
        }
        self.working.unlink(event.id);
        if let Some(record) = self.working.vehicles.get_mut(&event.vehicle_id) {
            record.events.insert(event.timestamp, event.clone());
        }
        self.working
            .index
            .insert(event.id, (event.vehicle_id, event.timestamp));
        Ok(())
    }

    fn delete_event(&mut self, id: EventId) -> ArchiveResult<()> {
        self.working.unlink(id);
        Ok(())
    }

    fn commit(self: Box<Self>) -> ArchiveResult<()> {
        let InMemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use fuelbook_core::NewVehicle;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn sample_event(vehicle: VehicleId, hour: u32) -> FuelEvent {
        FuelEvent {
            id: EventId::new(),
            vehicle_id: vehicle,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap(),
            distance: dec!(100),
            price: dec!(1.5),
            fuel_volume: dec!(7),
            filled_up: true,
            comment: None,
            inherited_cost: Decimal::ZERO,
            inherited_distance: Decimal::ZERO,
            inherited_fuel_volume: Decimal::ZERO,
        }
    }

    #[test]
    fn uncommitted_writes_are_discarded() {
        let repo = InMemoryArchiveRepository::new();
        let vehicle = Vehicle::new(NewVehicle::new("Van", "V-1"));
        {
            let mut tx = repo.begin().unwrap();
            tx.save_vehicle(&vehicle).unwrap();
        }
        let tx = repo.begin().unwrap();
        assert!(tx.find_vehicle(vehicle.id).unwrap().is_none());
    }

    #[test]
    fn neighbors_are_strict_and_nearest_first() {
        let repo = InMemoryArchiveRepository::new();
        let vehicle = Vehicle::new(NewVehicle::new("Van", "V-1"));
        let mut tx = repo.begin().unwrap();
        tx.save_vehicle(&vehicle).unwrap();
        for hour in [1, 2, 3, 4, 5] {
            tx.save_event(&sample_event(vehicle.id, hour)).unwrap();
        }
        tx.commit().unwrap();

        let tx = repo.begin().unwrap();
        let pivot = Utc.with_ymd_and_hms(2024, 3, 1, 3, 0, 0).unwrap();
        let older = tx.find_older_events(vehicle.id, pivot, None).unwrap();
        let hours: Vec<_> = older.iter().map(|e| e.timestamp).collect();
        assert_eq!(
            hours,
            vec![
                Utc.with_ymd_and_hms(2024, 3, 1, 2, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 3, 1, 1, 0, 0).unwrap(),
            ]
        );
        let younger = tx.find_younger_events(vehicle.id, pivot, Some(1)).unwrap();
        assert_eq!(younger.len(), 1);
        assert_eq!(
            younger[0].timestamp,
            Utc.with_ymd_and_hms(2024, 3, 1, 4, 0, 0).unwrap()
        );
        assert!(tx.contains_event_at(vehicle.id, pivot).unwrap());
    }

    #[test]
    fn deleting_vehicle_drops_its_events() {
        let repo = InMemoryArchiveRepository::new();
        let vehicle = Vehicle::new(NewVehicle::new("Van", "V-1"));
        let event = sample_event(vehicle.id, 9);
        let mut tx = repo.begin().unwrap();
        tx.save_vehicle(&vehicle).unwrap();
        tx.save_event(&event).unwrap();
        tx.delete_vehicle(vehicle.id).unwrap();
        tx.commit().unwrap();

        let tx = repo.begin().unwrap();
        assert!(tx.find_event(event.id).unwrap().is_none());
        assert!(matches!(
            tx.load_vehicle(vehicle.id),
            Err(ArchiveError::VehicleNotFound(_))
        ));
    }

    #[test]
    fn moved_and_deleted_events_are_located_through_the_index() {
        let repo = InMemoryArchiveRepository::new();
        let vehicle = Vehicle::new(NewVehicle::new("Van", "V-1"));
        let mut event = sample_event(vehicle.id, 1);
        let other = sample_event(vehicle.id, 2);
        let mut tx = repo.begin().unwrap();
        tx.save_vehicle(&vehicle).unwrap();
        tx.save_event(&event).unwrap();
        tx.save_event(&other).unwrap();

        event.timestamp = Utc.with_ymd_and_hms(2024, 3, 1, 5, 0, 0).unwrap();
        tx.save_event(&event).unwrap();
        assert_eq!(tx.events(vehicle.id).unwrap().len(), 2);
        assert_eq!(tx.find_event(event.id).unwrap().unwrap().timestamp, event.timestamp);
        assert!(!tx
            .contains_event_at(vehicle.id, Utc.with_ymd_and_hms(2024, 3, 1, 1, 0, 0).unwrap())
            .unwrap());

        let mut clash = other.clone();
        clash.timestamp = event.timestamp;
        assert!(matches!(
            tx.save_event(&clash),
            Err(ArchiveError::DuplicateTimestamp { .. })
        ));
        assert!(tx.find_event(other.id).unwrap().is_some());

        tx.delete_event(other.id).unwrap();
        assert!(tx.find_event(other.id).unwrap().is_none());
        tx.delete_vehicle(vehicle.id).unwrap();
        assert!(tx.find_event(event.id).unwrap().is_none());
        tx.commit().unwrap();

        let tx = repo.begin().unwrap();
        assert!(tx.find_event(event.id).unwrap().is_none());
    }
}
