//! A-weighted sound level meter with a 31-band third-octave spectrum
//!
//! The [`audio::AudioEngine`] consumes mono blocks from a capture source,
//! keeps the latest A-weighted level and the last second of audio, and
//! computes a smoothed graphic-EQ spectrum on demand. [`config`] loads the
//! JSON document the engine is configured from.

pub mod audio;
pub mod config;

pub use audio::{
    AudioCapture, AudioEngine, AudioError, AudioResult, BandLevels, BlockStatus,
    CalibrationMode, CalibrationProfile, CpalCapture, DeviceSelector, EngineSettings,
    ManualCapture,
};
pub use config::{ConfigError, LevelRange, MeterConfig, RangeVerdict};
