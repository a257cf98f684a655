//! Fill-up archive: inherited carry-over maintenance, vehicle totals and storage backends.

mod archive;
mod error;
mod locks;
mod memory;
mod query;
mod repository;
mod sqlite;

pub mod ledger;
pub mod totals;

pub use archive::{FuelArchive, ImportReport, MAX_QUANTITY};
pub use error::{ArchiveError, ArchiveResult};
pub use locks::VehicleLocks;
pub use memory::InMemoryArchiveRepository;
pub use query::{Direction, NeighborQuery};
pub use repository::{ArchiveRepository, ArchiveTransaction};
pub use sqlite::SqliteArchiveRepository;
