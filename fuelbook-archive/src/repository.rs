use chrono::{DateTime, Utc};
use fuelbook_core::{EventId, FuelEvent, Vehicle, VehicleId};

use crate::{ArchiveError, ArchiveResult, NeighborQuery};

/// Abstraction over durable archive storage engines.
pub trait ArchiveRepository: Send + Sync {
    /// Open a transaction. Dropping it without [`ArchiveTransaction::commit`] rolls back.
    fn begin(&self) -> ArchiveResult<Box<dyn ArchiveTransaction + '_>>;
}

/// Reads and writes performed against a single consistent snapshot.
pub trait ArchiveTransaction {
    fn find_vehicle(&self, id: VehicleId) -> ArchiveResult<Option<Vehicle>>;

    /// All vehicles ordered by their display index.
    fn vehicles(&self) -> ArchiveResult<Vec<Vehicle>>;

    /// Insert or replace a vehicle row.
    fn save_vehicle(&mut self, vehicle: &Vehicle) -> ArchiveResult<()>;

    /// Delete a vehicle together with all of its events.
    fn delete_vehicle(&mut self, id: VehicleId) -> ArchiveResult<()>;

    fn find_event(&self, id: EventId) -> ArchiveResult<Option<FuelEvent>>;

    fn find_event_at(
        &self,
        vehicle: VehicleId,
        timestamp: DateTime<Utc>,
    ) -> ArchiveResult<Option<FuelEvent>>;

    /// Events strictly before or after the pivot, nearest first.
    fn neighbors(&self, query: &NeighborQuery) -> ArchiveResult<Vec<FuelEvent>>;

    /// Every event of a vehicle, newest first.
    fn events(&self, vehicle: VehicleId) -> ArchiveResult<Vec<FuelEvent>>;

    /// Insert or replace an event row.
    fn save_event(&mut self, event: &FuelEvent) -> ArchiveResult<()>;

    fn delete_event(&mut self, id: EventId) -> ArchiveResult<()>;

    /// Make every write of this transaction durable.
    fn commit(self: Box<Self>) -> ArchiveResult<()>;

    fn load_vehicle(&self, id: VehicleId) -> ArchiveResult<Vehicle> {
        self.find_vehicle(id)?
            .ok_or(ArchiveError::VehicleNotFound(id))
    }

    fn load_event(&self, id: EventId) -> ArchiveResult<FuelEvent> {
        self.find_event(id)?.ok_or(ArchiveError::EventNotFound(id))
    }

    fn contains_event_at(
        &self,
        vehicle: VehicleId,
        timestamp: DateTime<Utc>,
    ) -> ArchiveResult<bool> {
        Ok(self.find_event_at(vehicle, timestamp)?.is_some())
    }

    fn find_older_events(
        &self,
        vehicle: VehicleId,
        before: DateTime<Utc>,
        limit: Option<usize>,
    ) -> ArchiveResult<Vec<FuelEvent>> {
        self.neighbors(&NeighborQuery::older(vehicle, before).with_optional_limit(limit))
    }

    fn find_younger_events(
        &self,
        vehicle: VehicleId,
        after: DateTime<Utc>,
        limit: Option<usize>,
    ) -> ArchiveResult<Vec<FuelEvent>> {
        self.neighbors(&NeighborQuery::younger(vehicle, after).with_optional_limit(limit))
    }
}
