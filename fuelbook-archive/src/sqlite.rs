use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fuelbook_core::{
    ConsumptionUnit, DistanceUnit, EventId, FuelEvent, Vehicle, VehicleId, VolumeUnit,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use rust_decimal::Decimal;
use tracing::warn;
use uuid::Uuid;

use crate::{
    ArchiveError, ArchiveRepository, ArchiveResult, ArchiveTransaction, Direction, NeighborQuery,
};

const ARCHIVE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS vehicles (
    vehicle_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    plate TEXT NOT NULL,
    odometer_unit INTEGER NOT NULL,
    fuel_unit INTEGER NOT NULL,
    consumption_unit INTEGER NOT NULL,
    odometer TEXT NOT NULL,
    distance_total_sum TEXT NOT NULL,
    fuel_volume_total_sum TEXT NOT NULL,
    display_order INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS fuel_events (
    event_id TEXT PRIMARY KEY,
    vehicle_id TEXT NOT NULL REFERENCES vehicles(vehicle_id) ON DELETE CASCADE,
    timestamp_us INTEGER NOT NULL,
    distance TEXT NOT NULL,
    price TEXT NOT NULL,
    fuel_volume TEXT NOT NULL,
    filled_up INTEGER NOT NULL,
    comment TEXT,
    inherited_cost TEXT NOT NULL,
    inherited_distance TEXT NOT NULL,
    inherited_fuel_volume TEXT NOT NULL,
    UNIQUE (vehicle_id, timestamp_us)
);
CREATE INDEX IF NOT EXISTS fuel_events_idx_vehicle_timestamp
    ON fuel_events(vehicle_id, timestamp_us);
"#;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const VEHICLE_COLUMNS: &str = "vehicle_id, name, plate, odometer_unit, fuel_unit, consumption_unit,
    odometer, distance_total_sum, fuel_volume_total_sum, display_order, created_at";

const EVENT_COLUMNS: &str = "event_id, vehicle_id, timestamp_us, distance, price, fuel_volume,
    filled_up, comment, inherited_cost, inherited_distance, inherited_fuel_volume";

/// SQLite-backed archive used by the command-line tool.
#[derive(Clone, Debug)]
pub struct SqliteArchiveRepository {
    path: PathBuf,
}

impl SqliteArchiveRepository {
    pub fn new(path: impl Into<PathBuf>) -> ArchiveResult<Self> {
        let repo = Self { path: path.into() };
        repo.initialize_schema()?;
        Ok(repo)
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn initialize_schema(&self) -> ArchiveResult<()> {
        let conn = self.connect()?;
        conn.execute_batch(ARCHIVE_SCHEMA)?;
        Ok(())
    }

    fn connect(&self) -> ArchiveResult<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        // Writers queue on BEGIN IMMEDIATE instead of failing with SQLITE_BUSY.
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL; PRAGMA foreign_keys = ON;",
        )?;
        Ok(conn)
    }
}

impl ArchiveRepository for SqliteArchiveRepository {
    fn begin(&self) -> ArchiveResult<Box<dyn ArchiveTransaction + '_>> {
        let conn = self.connect()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Box::new(SqliteTransaction {
            conn,
            finished: false,
        }))
    }
}

/// Transaction on a dedicated connection; rolled back on drop unless committed.
struct SqliteTransaction {
    conn: Connection,
    finished: bool,
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(err) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %err, "failed to roll back archive transaction");
            }
        }
    }
}

impl ArchiveTransaction for SqliteTransaction {
    fn find_vehicle(&self, id: VehicleId) -> ArchiveResult<Option<Vehicle>> {
        let sql = format!("SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE vehicle_id = ?1");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_vehicle(row)?)),
            None => Ok(None),
        }
    }

    fn vehicles(&self) -> ArchiveResult<Vec<Vehicle>> {
        let sql = format!(
            "SELECT {VEHICLE_COLUMNS} FROM vehicles ORDER BY display_order ASC, created_at ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut vehicles = Vec::new();
        while let Some(row) = rows.next()? {
            vehicles.push(row_to_vehicle(row)?);
        }
        Ok(vehicles)
    }

    fn save_vehicle(&mut self, vehicle: &Vehicle) -> ArchiveResult<()> {
        self.conn.execute(
            "INSERT INTO vehicles (
                vehicle_id, name, plate, odometer_unit, fuel_unit, consumption_unit,
                odometer, distance_total_sum, fuel_volume_total_sum, display_order, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(vehicle_id) DO UPDATE SET
                name = excluded.name,
                plate = excluded.plate,
                odometer_unit = excluded.odometer_unit,
                fuel_unit = excluded.fuel_unit,
                consumption_unit = excluded.consumption_unit,
                odometer = excluded.odometer,
                distance_total_sum = excluded.distance_total_sum,
                fuel_volume_total_sum = excluded.fuel_volume_total_sum,
                display_order = excluded.display_order",
            params![
                vehicle.id.to_string(),
                vehicle.name,
                vehicle.plate,
                vehicle.odometer_unit.persistent_id(),
                vehicle.fuel_unit.persistent_id(),
                vehicle.consumption_unit.persistent_id(),
                vehicle.odometer.to_string(),
                vehicle.distance_total_sum.to_string(),
                vehicle.fuel_volume_total_sum.to_string(),
                vehicle.order as i64,
                vehicle.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn delete_vehicle(&mut self, id: VehicleId) -> ArchiveResult<()> {
        let key = id.to_string();
        self.conn
            .execute("DELETE FROM fuel_events WHERE vehicle_id = ?1", params![key])?;
        self.conn
            .execute("DELETE FROM vehicles WHERE vehicle_id = ?1", params![key])?;
        Ok(())
    }

    fn find_event(&self, id: EventId) -> ArchiveResult<Option<FuelEvent>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM fuel_events WHERE event_id = ?1");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_event(row)?)),
            None => Ok(None),
        }
    }

    fn find_event_at(
        &self,
        vehicle: VehicleId,
        timestamp: DateTime<Utc>,
    ) -> ArchiveResult<Option<FuelEvent>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM fuel_events WHERE vehicle_id = ?1 AND timestamp_us = ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![vehicle.to_string(), timestamp.timestamp_micros()])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_event(row)?)),
            None => Ok(None),
        }
    }

    fn neighbors(&self, query: &NeighborQuery) -> ArchiveResult<Vec<FuelEvent>> {
        let mut sql = format!("SELECT {EVENT_COLUMNS} FROM fuel_events WHERE vehicle_id = ?1");
        sql.push_str(match query.direction {
            Direction::Older => " AND timestamp_us < ?2 ORDER BY timestamp_us DESC",
            Direction::Younger => " AND timestamp_us > ?2 ORDER BY timestamp_us ASC",
        });
        if query.limit.is_some() {
            sql.push_str(" LIMIT ?3");
        }

        let mut params: Vec<Value> = Vec::with_capacity(3);
        params.push(Value::from(query.vehicle.to_string()));
        params.push(Value::Integer(query.pivot.timestamp_micros()));
        if let Some(limit) = query.limit {
            params.push(Value::Integer(limit.min(i64::MAX as usize) as i64));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut events = Vec::new();
        while let Some(row) = rows.next()? {
            events.push(row_to_event(row)?);
        }
        Ok(events)
    }

    fn events(&self, vehicle: VehicleId) -> ArchiveResult<Vec<FuelEvent>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM fuel_events WHERE vehicle_id = ?1
             ORDER BY timestamp_us DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![vehicle.to_string()])?;
        let mut events = Vec::new();
        while let Some(row) = rows.next()? {
            events.push(row_to_event(row)?);
        }
        Ok(events)
    }

    fn save_event(&mut self, event: &FuelEvent) -> ArchiveResult<()> {
        let result = self.conn.execute(
            "INSERT INTO fuel_events (
                event_id, vehicle_id, timestamp_us, distance, price, fuel_volume,
                filled_up, comment, inherited_cost, inherited_distance, inherited_fuel_volume
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(event_id) DO UPDATE SET
                timestamp_us = excluded.timestamp_us,
                distance = excluded.distance,
                price = excluded.price,
                fuel_volume = excluded.fuel_volume,
                filled_up = excluded.filled_up,
                comment = excluded.comment,
                inherited_cost = excluded.inherited_cost,
                inherited_distance = excluded.inherited_distance,
                inherited_fuel_volume = excluded.inherited_fuel_volume",
            params![
                event.id.to_string(),
                event.vehicle_id.to_string(),
                event.timestamp.timestamp_micros(),
                event.distance.to_string(),
                event.price.to_string(),
                event.fuel_volume.to_string(),
                event.filled_up,
                event.comment,
                event.inherited_cost.to_string(),
                event.inherited_distance.to_string(),
                event.inherited_fuel_volume.to_string(),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                if self
                    .find_event_at(event.vehicle_id, event.timestamp)?
                    .is_some_and(|existing| existing.id != event.id)
                {
                    Err(ArchiveError::DuplicateTimestamp {
                        vehicle: event.vehicle_id,
                        timestamp: event.timestamp,
                    })
                } else {
                    Err(ArchiveError::VehicleNotFound(event.vehicle_id))
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    fn delete_event(&mut self, id: EventId) -> ArchiveResult<()> {
        self.conn
            .execute("DELETE FROM fuel_events WHERE event_id = ?1", params![id.to_string()])?;
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> ArchiveResult<()> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }
}

fn parse_decimal(column: &str, raw: &str) -> ArchiveResult<Decimal> {
    Decimal::from_str(raw)
        .map_err(|err| ArchiveError::Serialization(format!("invalid {column} {raw}: {err}")))
}

fn parse_uuid(column: &str, raw: &str) -> ArchiveResult<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|err| ArchiveError::Serialization(format!("invalid {column} {raw}: {err}")))
}

fn row_to_vehicle(row: &rusqlite::Row<'_>) -> ArchiveResult<Vehicle> {
    let vehicle_id: String = row.get(0)?;
    let name: String = row.get(1)?;
    let plate: String = row.get(2)?;
    let odometer_unit: i32 = row.get(3)?;
    let fuel_unit: i32 = row.get(4)?;
    let consumption_unit: i32 = row.get(5)?;
    let odometer: String = row.get(6)?;
    let distance_total_sum: String = row.get(7)?;
    let fuel_volume_total_sum: String = row.get(8)?;
    let order: i64 = row.get(9)?;
    let created_at: String = row.get(10)?;

    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|err| {
            ArchiveError::Serialization(format!("invalid created_at {created_at}: {err}"))
        })?
        .with_timezone(&Utc);

    Ok(Vehicle {
        id: VehicleId::from_uuid(parse_uuid("vehicle id", &vehicle_id)?),
        name,
        plate,
        odometer_unit: DistanceUnit::from_persistent_id(odometer_unit).ok_or_else(|| {
            ArchiveError::Serialization(format!("invalid odometer unit {odometer_unit}"))
        })?,
        fuel_unit: VolumeUnit::from_persistent_id(fuel_unit)
            .ok_or_else(|| ArchiveError::Serialization(format!("invalid fuel unit {fuel_unit}")))?,
        consumption_unit: ConsumptionUnit::from_persistent_id(consumption_unit).ok_or_else(
            || ArchiveError::Serialization(format!("invalid consumption unit {consumption_unit}")),
        )?,
        odometer: parse_decimal("odometer", &odometer)?,
        distance_total_sum: parse_decimal("distance total", &distance_total_sum)?,
        fuel_volume_total_sum: parse_decimal("fuel volume total", &fuel_volume_total_sum)?,
        order: u32::try_from(order)
            .map_err(|_| ArchiveError::Serialization(format!("invalid display order {order}")))?,
        created_at,
    })
}

fn row_to_event(row: &rusqlite::Row<'_>) -> ArchiveResult<FuelEvent> {
    let event_id: String = row.get(0)?;
    let vehicle_id: String = row.get(1)?;
    let timestamp_us: i64 = row.get(2)?;
    let distance: String = row.get(3)?;
    let price: String = row.get(4)?;
    let fuel_volume: String = row.get(5)?;
    let filled_up: bool = row.get(6)?;
    let comment: Option<String> = row.get(7)?;
    let inherited_cost: String = row.get(8)?;
    let inherited_distance: String = row.get(9)?;
    let inherited_fuel_volume: String = row.get(10)?;

    let timestamp = DateTime::<Utc>::from_timestamp_micros(timestamp_us).ok_or_else(|| {
        ArchiveError::Serialization(format!("invalid timestamp {timestamp_us}"))
    })?;

    Ok(FuelEvent {
        id: EventId::from_uuid(parse_uuid("event id", &event_id)?),
        vehicle_id: VehicleId::from_uuid(parse_uuid("vehicle id", &vehicle_id)?),
        timestamp,
        distance: parse_decimal("distance", &distance)?,
        price: parse_decimal("price", &price)?,
        fuel_volume: parse_decimal("fuel volume", &fuel_volume)?,
        filled_up,
        comment,
        inherited_cost: parse_decimal("inherited cost", &inherited_cost)?,
        inherited_distance: parse_decimal("inherited distance", &inherited_distance)?,
        inherited_fuel_volume: parse_decimal("inherited fuel volume", &inherited_fuel_volume)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fuelbook_core::NewVehicle;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn sample_event(vehicle: VehicleId, timestamp: DateTime<Utc>) -> FuelEvent {
        FuelEvent {
            id: EventId::new(),
            vehicle_id: vehicle,
            timestamp,
            distance: dec!(412.5),
            price: dec!(1.789),
            fuel_volume: dec!(31.04),
            filled_up: false,
            comment: Some("autobahn".into()),
            inherited_cost: dec!(12.5),
            inherited_distance: dec!(80),
            inherited_fuel_volume: dec!(6.25),
        }
    }

    #[test]
    fn sqlite_roundtrip() {
        let dir = tempdir().unwrap();
        let repo = SqliteArchiveRepository::new(dir.path().join("archive.db")).unwrap();
        let vehicle = Vehicle::new(NewVehicle::new("Estate", "B-FB 42").with_odometer(dec!(1200)));
        let event = sample_event(vehicle.id, Utc::now());

        let mut tx = repo.begin().unwrap();
        tx.save_vehicle(&vehicle).unwrap();
        tx.save_event(&event).unwrap();
        tx.commit().unwrap();

        let tx = repo.begin().unwrap();
        let stored = tx.load_vehicle(vehicle.id).unwrap();
        assert_eq!(stored.odometer, dec!(1200));
        assert_eq!(stored.plate, "B-FB 42");
        let loaded = tx.load_event(event.id).unwrap();
        assert_eq!(loaded.distance, dec!(412.5));
        assert_eq!(loaded.inherited_fuel_volume, dec!(6.25));
        assert_eq!(loaded.comment.as_deref(), Some("autobahn"));
        assert_eq!(
            loaded.timestamp.timestamp_micros(),
            event.timestamp.timestamp_micros()
        );
        assert_eq!(tx.events(vehicle.id).unwrap().len(), 1);
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let dir = tempdir().unwrap();
        let repo = SqliteArchiveRepository::new(dir.path().join("archive.db")).unwrap();
        let vehicle = Vehicle::new(NewVehicle::new("Estate", "B-FB 42"));
        {
            let mut tx = repo.begin().unwrap();
            tx.save_vehicle(&vehicle).unwrap();
        }
        let tx = repo.begin().unwrap();
        assert!(tx.vehicles().unwrap().is_empty());
    }

    #[test]
    fn duplicate_timestamp_is_reported() {
        let dir = tempdir().unwrap();
        let repo = SqliteArchiveRepository::new(dir.path().join("archive.db")).unwrap();
        let vehicle = Vehicle::new(NewVehicle::new("Estate", "B-FB 42"));
        let at = Utc::now();
        let mut tx = repo.begin().unwrap();
        tx.save_vehicle(&vehicle).unwrap();
        tx.save_event(&sample_event(vehicle.id, at)).unwrap();
        let err = tx.save_event(&sample_event(vehicle.id, at)).unwrap_err();
        assert!(matches!(err, ArchiveError::DuplicateTimestamp { .. }));
    }

    #[test]
    fn younger_neighbors_respect_limit() {
        let dir = tempdir().unwrap();
        let repo = SqliteArchiveRepository::new(dir.path().join("archive.db")).unwrap();
        let vehicle = Vehicle::new(NewVehicle::new("Estate", "B-FB 42"));
        let base = Utc::now();
        let mut tx = repo.begin().unwrap();
        tx.save_vehicle(&vehicle).unwrap();
        for offset in 0..4 {
            tx.save_event(&sample_event(
                vehicle.id,
                base + chrono::Duration::hours(offset),
            ))
            .unwrap();
        }
        let younger = tx.find_younger_events(vehicle.id, base, Some(2)).unwrap();
        assert_eq!(younger.len(), 2);
        assert!(younger[0].timestamp < younger[1].timestamp);
        let older = tx
            .find_older_events(vehicle.id, base + chrono::Duration::hours(3), None)
            .unwrap();
        assert_eq!(older.len(), 3);
        assert!(older[0].timestamp > older[1].timestamp);
    }
}
