use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use super::ConfigError;
use crate::engine::EngineConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Instrument reduction policy. Required section: thresholds depend
    /// on the instrument and must be stated, even if only as `[instrument]`.
    pub instrument: InstrumentConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Config {
    /// Cross-field checks that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.workers == 0 {
            return Err(ConfigError::ValidationError(
                "engine.workers must be at least 1".to_string(),
            ));
        }
        if self.instrument.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "instrument.output_dir must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("vela.db")
}

/// Instrument reduction policy: per-type minimum-frame thresholds, the
/// clobber flag and the output area. Read-only to the engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstrumentConfig {
    /// Minimum bias frames before a master bias builds.
    #[serde(default = "default_bias_min")]
    pub bias_min_nframes: u32,
    /// Minimum dark frames before a master dark builds.
    #[serde(default = "default_dark_min")]
    pub dark_min_nframes: u32,
    /// Minimum lamp flats before a master flat builds.
    #[serde(default = "default_flat_min")]
    pub flat_min_nframes: u32,
    /// Minimum dome flats before a master dome flat builds.
    #[serde(default = "default_dome_min")]
    pub dome_min_nframes: u32,
    /// Minimum twilight flats before a master twilight flat builds.
    #[serde(default = "default_twiflat_min")]
    pub twiflat_min_nframes: u32,
    /// Allow reprocessing: supersede existing masters and re-route
    /// already-ingested exposures.
    #[serde(default)]
    pub clobber: bool,
    /// Destination directory for reduced products.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            bias_min_nframes: default_bias_min(),
            dark_min_nframes: default_dark_min(),
            flat_min_nframes: default_flat_min(),
            dome_min_nframes: default_dome_min(),
            twiflat_min_nframes: default_twiflat_min(),
            clobber: false,
            output_dir: default_output_dir(),
        }
    }
}

fn default_bias_min() -> u32 {
    7
}

fn default_dark_min() -> u32 {
    3
}

fn default_flat_min() -> u32 {
    6
}

fn default_dome_min() -> u32 {
    3
}

fn default_twiflat_min() -> u32 {
    1
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("redux")
}

/// Config shape returned by the API (paths as display strings).
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: SanitizedDatabaseConfig,
    pub instrument: SanitizedInstrumentConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedDatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedInstrumentConfig {
    pub bias_min_nframes: u32,
    pub dark_min_nframes: u32,
    pub flat_min_nframes: u32,
    pub dome_min_nframes: u32,
    pub twiflat_min_nframes: u32,
    pub clobber: bool,
    pub output_dir: String,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: SanitizedDatabaseConfig {
                path: config.database.path.display().to_string(),
            },
            instrument: SanitizedInstrumentConfig {
                bias_min_nframes: config.instrument.bias_min_nframes,
                dark_min_nframes: config.instrument.dark_min_nframes,
                flat_min_nframes: config.instrument.flat_min_nframes,
                dome_min_nframes: config.instrument.dome_min_nframes,
                twiflat_min_nframes: config.instrument.twiflat_min_nframes,
                clobber: config.instrument.clobber,
                output_dir: config.instrument.output_dir.display().to_string(),
            },
            engine: config.engine.clone(),
        }
    }
}
