use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::{ArgAction, Args, Parser, Subcommand};
use fuelbook_archive::{
    ArchiveRepository, FuelArchive, InMemoryArchiveRepository, SqliteArchiveRepository,
};
use fuelbook_config::{load_config, AppConfig, DatabaseBackend, DatabaseConfig};
use fuelbook_core::stats::{fill_up_consumption, window_start, FuelStatistics};
use fuelbook_core::{
    ConsumptionUnit, DistanceUnit, EventId, FuelEvent, FuelEventInput, NewVehicle, Vehicle,
    VehicleChanges, VehicleId, VolumeUnit,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::telemetry::init_tracing;

#[derive(Parser)]
#[command(name = "fuelbook", author, version, about = "Fuel consumption logbook")]
pub struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// SQLite database to use instead of the configured one
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    /// Increase logging verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage vehicles
    Vehicle {
        #[command(subcommand)]
        action: VehicleCommand,
    },
    /// Record and inspect fill-ups
    Event {
        #[command(subcommand)]
        action: EventCommand,
    },
    /// Consumption and cost statistics for a vehicle
    Stats(StatsArgs),
    /// Inspect the effective configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand)]
pub enum VehicleCommand {
    /// Register a vehicle at the top of the list
    Add(VehicleAddArgs),
    /// List vehicles in display order
    List,
    /// Show one vehicle with its totals
    Show { vehicle: String },
    /// Change vehicle details
    Edit(VehicleEditArgs),
    /// Delete a vehicle and all of its fill-ups
    Remove { vehicle: String },
    /// Move a vehicle to a 1-based position in the list
    Move {
        vehicle: String,
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        position: u32,
    },
}

#[derive(Args)]
pub struct VehicleAddArgs {
    name: String,
    #[arg(long, default_value = "")]
    plate: String,
    #[arg(long, value_name = "UNIT")]
    distance_unit: Option<DistanceUnit>,
    #[arg(long, value_name = "UNIT")]
    volume_unit: Option<VolumeUnit>,
    #[arg(long, value_name = "UNIT")]
    consumption_unit: Option<ConsumptionUnit>,
    /// Current odometer reading in the distance unit
    #[arg(long, default_value = "0")]
    odometer: Decimal,
}

#[derive(Args)]
pub struct VehicleEditArgs {
    vehicle: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    plate: Option<String>,
    #[arg(long, value_name = "UNIT")]
    distance_unit: Option<DistanceUnit>,
    #[arg(long, value_name = "UNIT")]
    volume_unit: Option<VolumeUnit>,
    #[arg(long, value_name = "UNIT")]
    consumption_unit: Option<ConsumptionUnit>,
    #[arg(long)]
    odometer: Option<Decimal>,
}

#[derive(Subcommand)]
pub enum EventCommand {
    /// Record a fill-up
    Add(EventAddArgs),
    /// List fill-ups, newest first
    List { vehicle: String },
    /// Delete a fill-up
    Remove {
        event: EventId,
        /// Move the odometer back even when the fill-up is not the newest
        #[arg(long)]
        force_odometer: bool,
    },
    /// Change a recorded fill-up
    Edit(EventEditArgs),
    /// Import fill-ups from a JSON array, skipping duplicate timestamps
    Import { vehicle: String, file: PathBuf },
}

#[derive(Args)]
pub struct EventAddArgs {
    vehicle: String,
    /// Fill-up time (RFC 3339 or "YYYY-MM-DD HH:MM", UTC); defaults to now
    #[arg(long, value_parser = parse_timestamp)]
    at: Option<DateTime<Utc>>,
    /// Distance driven since the previous fill-up
    #[arg(long)]
    distance: Decimal,
    /// Price per volume unit
    #[arg(long)]
    price: Decimal,
    /// Fuel volume added
    #[arg(long)]
    volume: Decimal,
    /// The tank was not filled completely
    #[arg(long)]
    partial: bool,
    #[arg(long)]
    comment: Option<String>,
    /// Advance the odometer even for a back-dated fill-up
    #[arg(long)]
    force_odometer: bool,
}

#[derive(Args)]
pub struct EventEditArgs {
    event: EventId,
    #[arg(long, value_parser = parse_timestamp)]
    at: Option<DateTime<Utc>>,
    #[arg(long)]
    distance: Option<Decimal>,
    #[arg(long)]
    price: Option<Decimal>,
    #[arg(long)]
    volume: Option<Decimal>,
    #[arg(long, conflicts_with = "full")]
    partial: bool,
    #[arg(long)]
    full: bool,
    #[arg(long, conflicts_with = "clear_comment")]
    comment: Option<String>,
    #[arg(long)]
    clear_comment: bool,
}

#[derive(Args)]
pub struct StatsArgs {
    vehicle: String,
    /// Restrict to the last N months (0 for the whole history)
    #[arg(long, conflicts_with = "all")]
    months: Option<u32>,
    /// Use the whole history
    #[arg(long)]
    all: bool,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the merged configuration as TOML
    Show,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(path) = &cli.db {
        config.database.backend = DatabaseBackend::Sqlite;
        config.database.path = path.clone();
    }
    init_tracing(&config.log, cli.verbose)?;
    let output = Output { json: cli.json };

    match cli.command {
        Commands::Vehicle { action } => {
            let archive = open_archive(&config.database)?;
            run_vehicle(&archive, &config, &output, action)
        }
        Commands::Event { action } => {
            let archive = open_archive(&config.database)?;
            run_event(&archive, &output, action)
        }
        Commands::Stats(args) => {
            let archive = open_archive(&config.database)?;
            run_stats(&archive, &config, &output, args)
        }
        Commands::Config {
            action: ConfigCommand::Show,
        } => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn open_archive(config: &DatabaseConfig) -> Result<FuelArchive> {
    let repository: Arc<dyn ArchiveRepository> = match config.backend {
        DatabaseBackend::Sqlite => {
            debug!(path = %config.path.display(), "opening sqlite archive");
            Arc::new(
                SqliteArchiveRepository::new(&config.path)
                    .with_context(|| format!("failed to open {}", config.path.display()))?,
            )
        }
        DatabaseBackend::Memory => Arc::new(InMemoryArchiveRepository::new()),
    };
    Ok(FuelArchive::new(repository))
}

fn run_vehicle(
    archive: &FuelArchive,
    config: &AppConfig,
    output: &Output,
    action: VehicleCommand,
) -> Result<()> {
    match action {
        VehicleCommand::Add(args) => {
            let details = NewVehicle::new(args.name, args.plate)
                .with_units(
                    args.distance_unit.unwrap_or(config.defaults.distance),
                    args.volume_unit.unwrap_or(config.defaults.volume),
                    args.consumption_unit.unwrap_or(config.defaults.consumption),
                )
                .with_odometer(args.odometer);
            let vehicle = archive.create_vehicle(details)?;
            output.emit(&vehicle, || println!("{}", vehicle_line(&vehicle)))
        }
        VehicleCommand::List => {
            let vehicles = archive.vehicles()?;
            output.emit(&vehicles, || {
                for vehicle in &vehicles {
                    println!("{}", vehicle_line(vehicle));
                }
            })
        }
        VehicleCommand::Show { vehicle } => {
            let vehicle = resolve_vehicle(archive, &vehicle)?;
            output.emit(&vehicle, || print_vehicle(&vehicle))
        }
        VehicleCommand::Edit(args) => {
            let vehicle = resolve_vehicle(archive, &args.vehicle)?;
            let changes = VehicleChanges {
                name: args.name,
                plate: args.plate,
                odometer_unit: args.distance_unit,
                fuel_unit: args.volume_unit,
                consumption_unit: args.consumption_unit,
                odometer: args.odometer,
            };
            if changes.is_empty() {
                bail!("nothing to change");
            }
            let vehicle = archive.update_vehicle(vehicle.id, changes)?;
            output.emit(&vehicle, || print_vehicle(&vehicle))
        }
        VehicleCommand::Remove { vehicle } => {
            let vehicle = resolve_vehicle(archive, &vehicle)?;
            archive.delete_vehicle(vehicle.id)?;
            output.emit(&vehicle.id, || println!("removed {}", vehicle.name))
        }
        VehicleCommand::Move { vehicle, position } => {
            let vehicle = resolve_vehicle(archive, &vehicle)?;
            let vehicles = archive.move_vehicle(vehicle.id, position as usize - 1)?;
            output.emit(&vehicles, || {
                for vehicle in &vehicles {
                    println!("{}", vehicle_line(vehicle));
                }
            })
        }
    }
}

fn run_event(archive: &FuelArchive, output: &Output, action: EventCommand) -> Result<()> {
    match action {
        EventCommand::Add(args) => {
            let vehicle = resolve_vehicle(archive, &args.vehicle)?;
            let mut input = FuelEventInput::new(
                args.at.unwrap_or_else(Utc::now),
                args.distance,
                args.price,
                args.volume,
            )
            .with_filled_up(!args.partial);
            if let Some(comment) = args.comment {
                input = input.with_comment(comment);
            }
            let event = archive.insert_event_with(vehicle.id, input, args.force_odometer)?;
            output.emit(&event, || println!("{}", event_line(&event, &vehicle)))
        }
        EventCommand::List { vehicle } => {
            let vehicle = resolve_vehicle(archive, &vehicle)?;
            let events = archive.events(vehicle.id)?;
            output.emit(&events, || {
                for event in &events {
                    println!("{}", event_line(event, &vehicle));
                }
            })
        }
        EventCommand::Remove {
            event,
            force_odometer,
        } => {
            archive.remove_event(event, force_odometer)?;
            output.emit(&event, || println!("removed {event}"))
        }
        EventCommand::Edit(args) => {
            let original = archive.event(args.event)?;
            let vehicle = archive.vehicle(original.vehicle_id)?;
            let mut input = FuelEventInput::from_event(&original, &vehicle);
            if let Some(at) = args.at {
                input.timestamp = at;
            }
            if let Some(distance) = args.distance {
                input.distance = distance;
            }
            if let Some(price) = args.price {
                input.price = price;
            }
            if let Some(volume) = args.volume {
                input.fuel_volume = volume;
            }
            if args.partial {
                input.filled_up = false;
            } else if args.full {
                input.filled_up = true;
            }
            if args.clear_comment {
                input.comment = None;
            } else if let Some(comment) = args.comment {
                input.comment = Some(comment);
            }
            let event = archive.edit_event(args.event, input)?;
            output.emit(&event, || println!("{}", event_line(&event, &vehicle)))
        }
        EventCommand::Import { vehicle, file } => {
            let vehicle = resolve_vehicle(archive, &vehicle)?;
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let inputs: Vec<FuelEventInput> = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse {}", file.display()))?;
            let report = archive.import_events(vehicle.id, inputs)?;
            let summary = ImportSummary {
                imported: report.imported,
                skipped_duplicates: report.skipped_duplicates,
            };
            output.emit(&summary, || {
                println!(
                    "imported {} fill-ups, skipped {} duplicates",
                    summary.imported, summary.skipped_duplicates
                )
            })
        }
    }
}

fn run_stats(
    archive: &FuelArchive,
    config: &AppConfig,
    output: &Output,
    args: StatsArgs,
) -> Result<()> {
    let vehicle = resolve_vehicle(archive, &args.vehicle)?;
    let months = if args.all {
        0
    } else {
        args.months.unwrap_or(config.stats.months)
    };
    let stats = archive.statistics(vehicle.id, window_start(months, Utc::now()))?;
    output.emit(&stats, || print_stats(&stats, &vehicle))
}

/// Resolve a vehicle by id, or by plate or name ignoring case.
fn resolve_vehicle(archive: &FuelArchive, selector: &str) -> Result<Vehicle> {
    if let Ok(id) = selector.parse::<VehicleId>() {
        return Ok(archive.vehicle(id)?);
    }
    let needle = selector.to_lowercase();
    let mut matches = archive.vehicles()?.into_iter().filter(|vehicle| {
        vehicle.plate.to_lowercase() == needle || vehicle.name.to_lowercase() == needle
    });
    match (matches.next(), matches.next()) {
        (Some(vehicle), None) => Ok(vehicle),
        (None, _) => Err(anyhow!("no vehicle matches '{selector}'")),
        (Some(_), Some(_)) => Err(anyhow!(
            "'{selector}' matches several vehicles; use the vehicle id"
        )),
    }
}

/// Accept RFC 3339 or a naive UTC date with optional time.
fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("invalid timestamp '{value}'"))
}

#[derive(Serialize)]
struct ImportSummary {
    imported: usize,
    skipped_duplicates: usize,
}

struct Output {
    json: bool,
}

impl Output {
    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce()) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text();
        }
        Ok(())
    }
}

fn show(value: Decimal) -> String {
    value.round_dp(2).normalize().to_string()
}

fn vehicle_line(vehicle: &Vehicle) -> String {
    format!(
        "#{:<3} {}  {:<20} {:<10} {} {}",
        vehicle.order + 1,
        vehicle.id,
        vehicle.name,
        vehicle.plate,
        show(vehicle.display_odometer()),
        vehicle.odometer_unit
    )
}

fn print_vehicle(vehicle: &Vehicle) {
    let distance = vehicle.odometer_unit;
    let volume = vehicle.fuel_unit;
    println!("id:           {}", vehicle.id);
    println!("name:         {}", vehicle.name);
    println!("plate:        {}", vehicle.plate);
    println!("position:     {}", vehicle.order + 1);
    println!(
        "odometer:     {} {distance}",
        show(vehicle.display_odometer())
    );
    println!(
        "distance:     {} {distance}",
        show(distance.from_kilometers(vehicle.distance_total_sum))
    );
    println!(
        "fuel:         {} {volume}",
        show(volume.from_liters(vehicle.fuel_volume_total_sum))
    );
    println!("consumption:  {}", vehicle.consumption_unit);
}

fn event_line(event: &FuelEvent, vehicle: &Vehicle) -> String {
    let consumption = fill_up_consumption(event, vehicle.consumption_unit)
        .map(|value| format!("{} {}", show(value), vehicle.consumption_unit))
        .unwrap_or_else(|| "-".to_string());
    let mut line = format!(
        "{}  {}  {} {:>8} {}  {:>7} {}  @ {}  {}",
        event.id,
        event.timestamp.format("%Y-%m-%d %H:%M"),
        if event.filled_up { "full   " } else { "partial" },
        show(vehicle.odometer_unit.from_kilometers(event.distance)),
        vehicle.odometer_unit,
        show(vehicle.fuel_unit.from_liters(event.fuel_volume)),
        vehicle.fuel_unit,
        show(vehicle.fuel_unit.price_per_unit(event.price)),
        consumption
    );
    if let Some(comment) = &event.comment {
        line.push_str("  # ");
        line.push_str(comment);
    }
    line
}

fn print_stats(stats: &FuelStatistics, vehicle: &Vehicle) {
    let distance = vehicle.odometer_unit;
    let volume = vehicle.fuel_unit;
    let consumption = |value: Option<Decimal>| {
        value
            .map(|value| format!("{} {}", show(value), stats.unit))
            .unwrap_or_else(|| "-".to_string())
    };
    println!("vehicle:      {}", vehicle.name);
    println!("fill-ups:     {}", stats.fill_ups);
    if let (Some(first), Some(last)) = (stats.first, stats.last) {
        println!(
            "period:       {} .. {}",
            first.format("%Y-%m-%d"),
            last.format("%Y-%m-%d")
        );
    }
    println!(
        "distance:     {} {distance}",
        show(distance.from_kilometers(stats.total_distance))
    );
    println!(
        "fuel:         {} {volume}",
        show(volume.from_liters(stats.total_fuel_volume))
    );
    println!("cost:         {}", show(stats.total_cost));
    println!("average:      {}", consumption(stats.average_consumption));
    println!("best:         {}", consumption(stats.best_consumption));
    println!("worst:        {}", consumption(stats.worst_consumption));
    if let Some(per_distance) = stats.cost_per_distance(distance) {
        println!("cost per {distance}:  {}", show(per_distance));
    }
}
