pub mod a_weighting;
pub mod audio_engine;
pub mod calibration;
pub mod capture;
pub mod constants;
pub mod error;
pub mod fft_engine;
pub mod meter_engine;
pub mod sample_buffer_engine;
pub mod spectrum_analyzer;
pub mod window_functions;

pub use audio_engine::{AudioEngine, EngineSettings};
pub use calibration::{CalibrationMode, CalibrationProfile};
pub use capture::{AudioCapture, BlockStatus, CpalCapture, DeviceSelector, ManualCapture};
pub use error::{AudioError, AudioResult};
pub use spectrum_analyzer::BandLevels;
