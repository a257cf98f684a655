use chrono::{DateTime, Utc};
use fuelbook_core::{EventId, VehicleId};
use thiserror::Error;

/// Result alias for archive operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Error type surfaced by archive operations.
///
/// Every variant is raised before the enclosing transaction commits, so a
/// failed operation leaves the store untouched.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("vehicle {vehicle} already has a fill-up at {timestamp}")]
    DuplicateTimestamp {
        vehicle: VehicleId,
        timestamp: DateTime<Utc>,
    },
    #[error("vehicle {0} not found")]
    VehicleNotFound(VehicleId),
    #[error("fill-up {0} not found")]
    EventNotFound(EventId),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("storage error: {0}")]
    Persistence(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for ArchiveError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Persistence(value.to_string())
    }
}

impl From<std::io::Error> for ArchiveError {
    fn from(value: std::io::Error) -> Self {
        Self::Persistence(value.to_string())
    }
}
