//! Audio engine error types

use thiserror::Error;

/// Errors raised while building or running the measurement engine
#[derive(Error, Debug)]
pub enum AudioError {
    /// Sample rate must be a positive number of Hz
    #[error("Invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    /// Block size must be at least one sample
    #[error("Invalid block size: {0} samples")]
    InvalidBlockSize(u32),

    /// Smoothing factor outside [0, 1]
    #[error("Invalid spectrum smoothing factor: {0} (expected 0.0..=1.0)")]
    InvalidSmoothing(f64),

    /// No default input device available
    #[error("No default audio input device found")]
    NoDefaultDevice,

    /// Configured device could not be found
    #[error("Audio input device not found: {0}")]
    DeviceNotFound(String),

    /// Failed to enumerate devices or query their configuration
    #[error("Failed to query audio device: {0}")]
    DeviceQuery(String),

    /// Failed to build the capture stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    /// Failed to start the capture stream
    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    /// Device delivers a sample format we cannot convert
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// FFT planner rejected the buffers
    #[error("FFT processing failed: {0}")]
    Fft(String),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
