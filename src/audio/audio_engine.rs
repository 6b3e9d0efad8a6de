use crate::audio::a_weighting::design_a_weighting;
use crate::audio::calibration::{CalibrationMode, CalibrationProfile};
use crate::audio::capture::{
    AudioCapture, BlockHandler, BlockStatus, CaptureSettings, CpalCapture, DeviceSelector,
};
use crate::audio::constants::{BAND_COUNT, DEFAULT_SPECTRUM_SMOOTH};
use crate::audio::error::{AudioError, AudioResult};
use crate::audio::meter_engine::LevelComputer;
use crate::audio::sample_buffer_engine::SampleRingBuffer;
use crate::audio::spectrum_analyzer::{self, BandLevels, SpectrumAnalyzer};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Already-resolved engine parameters
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub sample_rate: u32,
    pub block_size: u32,
    pub device: Option<DeviceSelector>,
    /// Static offset added to every level reading
    pub calibration_db: f64,
    /// Spectrum smoothing factor in [0, 1], higher is slower
    pub spectrum_smooth: f64,
}

impl EngineSettings {
    pub fn new(sample_rate: u32, block_size: u32) -> Self {
        Self {
            sample_rate,
            block_size,
            device: None,
            calibration_db: 0.0,
            spectrum_smooth: DEFAULT_SPECTRUM_SMOOTH,
        }
    }

    pub fn validate(&self) -> AudioResult<()> {
        if self.sample_rate == 0 {
            return Err(AudioError::InvalidSampleRate(self.sample_rate));
        }
        if self.block_size == 0 {
            return Err(AudioError::InvalidBlockSize(self.block_size));
        }
        if !(0.0..=1.0).contains(&self.spectrum_smooth) {
            return Err(AudioError::InvalidSmoothing(self.spectrum_smooth));
        }
        Ok(())
    }

    fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            sample_rate: self.sample_rate,
            block_size: self.block_size,
            device: self.device.clone(),
        }
    }
}

/// State read by pollers, all behind the one engine lock
struct MeterState {
    last_db: f64,
    spectrum: BandLevels,
    ring: SampleRingBuffer,
}

/// The part of the engine shared with the capture callback
struct EngineCore {
    // Only the capture context locks this, one block at a time
    level: Mutex<LevelComputer>,
    state: Mutex<MeterState>,
    dropped_blocks: AtomicU64,
}

impl EngineCore {
    fn process_block(&self, block: &[f32], status: BlockStatus) {
        if !status.is_ok() {
            let dropped = self.dropped_blocks.fetch_add(1, Ordering::Relaxed) + 1;
            log::debug!("Dropped {:?} block ({} dropped so far)", status, dropped);
            return;
        }

        let Some(db) = lock(&self.level).process(block) else {
            return;
        };

        let mut state = lock(&self.state);
        state.last_db = db;
        state.ring.append(block);
    }
}

/// Spectrum analyser plus its snapshot scratch, used by the polling context
struct SpectrumTrigger {
    analyzer: SpectrumAnalyzer,
    snapshot: Vec<f32>,
}

/// Sound level meter: A-weighted level per block, third-octave spectrum on demand
///
/// `Stopped -> Running -> Stopped`. The capture source pushes blocks into the
/// engine while running; pollers read the latest level and spectrum at their
/// own pace and trigger spectrum recomputation.
pub struct AudioEngine<C: AudioCapture = CpalCapture> {
    settings: EngineSettings,
    calibration_mode: CalibrationMode,
    core: Arc<EngineCore>,
    spectrum: Mutex<SpectrumTrigger>,
    capture: C,
    running: bool,
}

impl AudioEngine<CpalCapture> {
    /// Live engine reading the calibration document at `calibration_path`
    pub fn new(settings: EngineSettings, calibration_path: Option<&Path>) -> AudioResult<Self> {
        Self::with_capture(settings, CalibrationProfile::load(calibration_path), CpalCapture::new())
    }

    /// Live engine with an already-parsed calibration
    pub fn with_calibration(
        settings: EngineSettings,
        calibration: CalibrationProfile,
    ) -> AudioResult<Self> {
        Self::with_capture(settings, calibration, CpalCapture::new())
    }
}

impl<C: AudioCapture> AudioEngine<C> {
    /// Engine fed by an arbitrary capture source
    pub fn with_capture(
        settings: EngineSettings,
        calibration: CalibrationProfile,
        capture: C,
    ) -> AudioResult<Self> {
        settings.validate()?;

        let coefficients = design_a_weighting(settings.sample_rate)?;
        let level = LevelComputer::new(
            &coefficients,
            calibration.sensitivity_db,
            settings.calibration_db,
        );

        // One second of audio
        let capacity = settings.sample_rate as usize;
        let analyzer = SpectrumAnalyzer::new(settings.sample_rate, capacity, &calibration);

        let calibration_mode = calibration.mode();
        log::info!(
            "Audio engine ready: {} Hz, {} samples/block, calibration {:?}, offset {:+.1} dB",
            settings.sample_rate,
            settings.block_size,
            calibration_mode,
            settings.calibration_db
        );

        Ok(Self {
            settings,
            calibration_mode,
            core: Arc::new(EngineCore {
                level: Mutex::new(level),
                state: Mutex::new(MeterState {
                    last_db: 0.0,
                    spectrum: [0.0; BAND_COUNT],
                    ring: SampleRingBuffer::new(capacity),
                }),
                dropped_blocks: AtomicU64::new(0),
            }),
            spectrum: Mutex::new(SpectrumTrigger {
                analyzer,
                snapshot: Vec::with_capacity(capacity),
            }),
            capture,
            running: false,
        })
    }

    /// Open the capture stream; no-op when already running
    pub fn start(&mut self) -> AudioResult<()> {
        if self.running {
            return Ok(());
        }

        let core = Arc::clone(&self.core);
        let handler: BlockHandler = Box::new(move |block: &[f32], status: BlockStatus| {
            core.process_block(block, status)
        });
        self.capture.open(&self.settings.capture_settings(), handler)?;

        self.running = true;
        log::info!("Audio engine started");
        Ok(())
    }

    /// Halt the capture stream; no-op when already stopped
    ///
    /// Returns only after the capture source guarantees no further callbacks.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.capture.close();
        self.running = false;
        log::info!("Audio engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Most recent level reading in dB (0.0 before the first block)
    pub fn get_last_db(&self) -> f64 {
        lock(&self.core.state).last_db
    }

    /// Smoothed third-octave spectrum, lowest band first
    pub fn get_spectrum(&self) -> BandLevels {
        lock(&self.core.state).spectrum
    }

    /// Recompute the spectrum from the last second of audio
    ///
    /// Leaves the spectrum untouched while the buffer holds only silence.
    pub fn compute_spectrum(&self) {
        let mut trigger = lock(&self.spectrum);
        let SpectrumTrigger { analyzer, snapshot } = &mut *trigger;

        lock(&self.core.state).ring.snapshot_into(snapshot);

        // FFT runs outside the engine lock
        let levels = match analyzer.band_levels(snapshot.as_slice()) {
            Ok(Some(levels)) => levels,
            Ok(None) => return,
            Err(e) => {
                log::warn!("Spectrum computation failed: {}", e);
                return;
            }
        };

        let mut state = lock(&self.core.state);
        state.spectrum = spectrum_analyzer::smooth(
            &state.spectrum,
            &levels,
            self.settings.spectrum_smooth,
        );
    }

    /// Blocks discarded because the capture source flagged them
    pub fn dropped_blocks(&self) -> u64 {
        self.core.dropped_blocks.load(Ordering::Relaxed)
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn calibration_mode(&self) -> CalibrationMode {
        self.calibration_mode
    }
}

impl<C: AudioCapture> Drop for AudioEngine<C> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Lock a mutex whose data stays consistent even if a holder panicked
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
