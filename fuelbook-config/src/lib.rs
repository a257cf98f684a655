//! Typed settings for fuelbook, layered from defaults, TOML files and the environment.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use fuelbook_core::{ConsumptionUnit, DistanceUnit, VolumeUnit};
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG: &str = r#"
[database]
backend = "sqlite"
path = "fuelbook.db"

[defaults]
distance = "km"
volume = "l"
consumption = "l/100km"

[log]
level = "info"
json = false

[stats]
months = 12
"#;

/// Environment prefix; `FUELBOOK__DATABASE__PATH` overrides `database.path`.
pub const ENV_PREFIX: &str = "FUELBOOK";

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub defaults: UnitDefaults,
    pub log: LogConfig,
    pub stats: StatsConfig,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: DatabaseBackend,
    pub path: PathBuf,
}

/// Units applied to vehicles created without explicit unit choices.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct UnitDefaults {
    pub distance: DistanceUnit,
    pub volume: VolumeUnit,
    pub consumption: ConsumptionUnit,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LogConfig {
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct StatsConfig {
    /// Window for `stats` when none is given; 0 means the whole history.
    pub months: u32,
}

impl AppConfig {
    /// Render the effective configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to render configuration as TOML")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        // Mirrors DEFAULT_CONFIG.
        Self {
            database: DatabaseConfig {
                backend: DatabaseBackend::Sqlite,
                path: PathBuf::from("fuelbook.db"),
            },
            defaults: UnitDefaults {
                distance: DistanceUnit::Kilometers,
                volume: VolumeUnit::Liters,
                consumption: ConsumptionUnit::LitersPer100Km,
            },
            log: LogConfig {
                level: "info".to_string(),
                json: false,
            },
            stats: StatsConfig { months: 12 },
        }
    }
}

/// Load configuration with precedence: built-in defaults, then
/// `config/default.toml` and `config/local.toml` when present, then the
/// explicit `path` (which must exist), then `FUELBOOK__*` variables.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let mut builder = Config::builder()
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name("config/local").required(false));
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
    }
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );
    let settings = builder.build().context("failed to load configuration")?;
    settings
        .try_deserialize()
        .context("failed to parse configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_are_metric() {
        let config = AppConfig::default();
        assert_eq!(config.database.backend, DatabaseBackend::Sqlite);
        assert_eq!(config.defaults.distance, DistanceUnit::Kilometers);
        assert_eq!(config.defaults.volume, VolumeUnit::Liters);
        assert_eq!(config.defaults.consumption, ConsumptionUnit::LitersPer100Km);
        assert_eq!(config.stats.months, 12);
    }

    #[test]
    fn embedded_defaults_match_default_impl() {
        let parsed: AppConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(
            parsed.to_toml_string().unwrap(),
            AppConfig::default().to_toml_string().unwrap()
        );
    }

    #[test]
    fn explicit_file_overrides_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[database]
path = "/tmp/garage.db"

[defaults]
distance = "mi"
volume = "gal"
consumption = "mpg"
"#
        )
        .unwrap();
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.database.path, PathBuf::from("/tmp/garage.db"));
        assert_eq!(config.defaults.distance, DistanceUnit::StatuteMiles);
        assert_eq!(config.defaults.volume, VolumeUnit::GallonsUs);
        assert_eq!(config.defaults.consumption, ConsumptionUnit::MilesPerGallonUs);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/fuelbook.toml"))).is_err());
    }

    #[test]
    fn renders_back_to_toml() {
        let rendered = AppConfig::default().to_toml_string().unwrap();
        assert!(rendered.contains("[database]"));
        assert!(rendered.contains("consumption = \"l/100km\""));
    }
}
