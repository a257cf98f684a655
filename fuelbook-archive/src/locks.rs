use std::collections::HashMap;
use std::sync::Arc;

use fuelbook_core::VehicleId;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Write locks serializing archive mutations.
///
/// Event changes hold the fleet lock shared and their vehicle's mutex
/// exclusively. Changes to the set of vehicles hold the fleet lock exclusively.
#[derive(Debug, Default)]
pub struct VehicleLocks {
    fleet: RwLock<()>,
    vehicles: Mutex<HashMap<VehicleId, Arc<Mutex<()>>>>,
}

impl VehicleLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lazily create and return the mutex guarding `id`.
    pub fn vehicle(&self, id: VehicleId) -> Arc<Mutex<()>> {
        self.vehicles
            .lock()
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn fleet_shared(&self) -> RwLockReadGuard<'_, ()> {
        self.fleet.read()
    }

    pub fn fleet_exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.fleet.write()
    }

    /// Drop the mutex of a deleted vehicle.
    pub fn forget(&self, id: VehicleId) {
        self.vehicles.lock().remove(&id);
    }
}
