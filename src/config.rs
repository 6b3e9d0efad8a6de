//! Meter configuration
//!
//! Configuration is a flat JSON document, by default `config.json` in the
//! working directory. A `calibration.txt` next to it is picked up when no
//! calibration file is configured explicitly.

use crate::audio::capture::DeviceSelector;
use crate::audio::constants::{DEFAULT_RANGE_HIGH_DB, DEFAULT_RANGE_LOW_DB, DEFAULT_SPECTRUM_SMOOTH};
use crate::audio::EngineSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name looked up next to the configuration document
pub const DEFAULT_CALIBRATION_FILE: &str = "calibration.txt";

/// Scale of the range bar, in dB
const RANGE_BAR_MIN_DB: f64 = 40.0;
const RANGE_BAR_MAX_DB: f64 = 110.0;

/// Errors raised while loading the configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterConfig {
    /// Capture rate in Hz (required)
    pub sample_rate: u32,
    /// Samples per capture block (required)
    pub block_size: u32,
    /// Input device index or name; host default when absent
    #[serde(default)]
    pub device: Option<DeviceSelector>,
    /// Static offset added to every level reading
    #[serde(default)]
    pub calibration_db: f64,
    /// Explicit calibration document
    #[serde(default)]
    pub calibration_file: Option<PathBuf>,
    /// Spectrum smoothing factor in [0, 1], higher is slower
    #[serde(default = "default_spectrum_smooth")]
    pub spectrum_smooth: f64,
    /// Lower bound of the acceptable level range
    #[serde(default = "default_range_low_db")]
    pub range_low_db: f64,
    /// Upper bound of the acceptable level range
    #[serde(default = "default_range_high_db")]
    pub range_high_db: f64,
}

fn default_spectrum_smooth() -> f64 {
    DEFAULT_SPECTRUM_SMOOTH
}

fn default_range_low_db() -> f64 {
    DEFAULT_RANGE_LOW_DB
}

fn default_range_high_db() -> f64 {
    DEFAULT_RANGE_HIGH_DB
}

impl MeterConfig {
    /// Parse a configuration document without validating it
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be positive".into()));
        }
        if self.block_size == 0 {
            return Err(ConfigError::Invalid("block_size must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.spectrum_smooth) {
            return Err(ConfigError::Invalid(format!(
                "spectrum_smooth must lie in [0, 1], got {}",
                self.spectrum_smooth
            )));
        }
        if self.range_low_db > self.range_high_db {
            return Err(ConfigError::Invalid(format!(
                "range_low_db ({}) is above range_high_db ({})",
                self.range_low_db, self.range_high_db
            )));
        }
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            sample_rate: self.sample_rate,
            block_size: self.block_size,
            device: self.device.clone(),
            calibration_db: self.calibration_db,
            spectrum_smooth: self.spectrum_smooth,
        }
    }

    /// Calibration document to load, if any
    ///
    /// An explicit `calibration_file` wins; otherwise `calibration.txt` in
    /// `config_dir` is used when it exists.
    pub fn resolve_calibration_path(&self, config_dir: &Path) -> Option<PathBuf> {
        if let Some(path) = &self.calibration_file {
            return Some(path.clone());
        }
        let default_path = config_dir.join(DEFAULT_CALIBRATION_FILE);
        default_path.exists().then_some(default_path)
    }

    pub fn level_range(&self) -> LevelRange {
        LevelRange::new(self.range_low_db, self.range_high_db)
    }
}

/// Load the configuration document at `path`
///
/// Missing or malformed required fields are fatal.
pub fn load_config(path: &Path) -> Result<MeterConfig, ConfigError> {
    log::info!("load_config: Loading from {:?}", path);

    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let config = MeterConfig::from_json(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;

    log::info!(
        "load_config: {} Hz, {} samples/block, device {:?}, offset {:+.1} dB, smoothing {}",
        config.sample_rate,
        config.block_size,
        config.device,
        config.calibration_db,
        config.spectrum_smooth
    );
    Ok(config)
}

/// Where a reading sits relative to the acceptable range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeVerdict {
    Below,
    Within,
    Above,
}

/// Acceptable level range shown next to the reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelRange {
    pub low_db: f64,
    pub high_db: f64,
}

impl LevelRange {
    pub fn new(low_db: f64, high_db: f64) -> Self {
        Self { low_db, high_db }
    }

    /// Bounds are inclusive
    pub fn classify(&self, db: f64) -> RangeVerdict {
        if db < self.low_db {
            RangeVerdict::Below
        } else if db > self.high_db {
            RangeVerdict::Above
        } else {
            RangeVerdict::Within
        }
    }

    /// Position of `db` on the 40-110 dB range bar, clamped to [0, 1]
    pub fn bar_position(db: f64) -> f64 {
        ((db - RANGE_BAR_MIN_DB) / (RANGE_BAR_MAX_DB - RANGE_BAR_MIN_DB)).clamp(0.0, 1.0)
    }
}
