use chrono::{DateTime, Utc};
use fuelbook_core::VehicleId;

/// Which side of the pivot timestamp a [`NeighborQuery`] looks at.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Older,
    Younger,
}

/// Filter describing the chronological neighbours of a timestamp.
///
/// Results never include an event at exactly `pivot` and are always ordered
/// nearest first.
#[derive(Clone, Debug)]
pub struct NeighborQuery {
    pub vehicle: VehicleId,
    pub pivot: DateTime<Utc>,
    pub direction: Direction,
    pub limit: Option<usize>,
}

impl NeighborQuery {
    pub fn older(vehicle: VehicleId, before: DateTime<Utc>) -> Self {
        Self {
            vehicle,
            pivot: before,
            direction: Direction::Older,
            limit: None,
        }
    }

    pub fn younger(vehicle: VehicleId, after: DateTime<Utc>) -> Self {
        Self {
            vehicle,
            pivot: after,
            direction: Direction::Younger,
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_optional_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }
}
