use crate::audio::constants::MIN_WINDOW_SCALE;
use crate::audio::error::{AudioError, AudioResult};
use crate::audio::window_functions::{apply_window, WindowData};
use realfft::{num_complex::Complex64, RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// Windowed real FFT producing magnitudes scaled to approximate dBFS
pub struct FftEngine {
    fft: Arc<dyn RealToComplex<f64>>,

    // One second of audio in, N/2 + 1 bins out; allocated once per engine
    input_buffer: Vec<f64>,
    output_buffer: Vec<Complex64>,
    scratch: Vec<Complex64>,
    magnitudes: Vec<f64>,

    window: WindowData,
    size: usize,
    sample_rate: f64,
}

impl FftEngine {
    pub fn new(size: usize, sample_rate: u32) -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(size);

        let window = WindowData::hann(size);

        let output_buffer = fft.make_output_vec();
        let scratch = fft.make_scratch_vec();
        let magnitudes = vec![0.0; output_buffer.len()];

        Self {
            fft,
            input_buffer: vec![0.0; size],
            output_buffer,
            scratch,
            magnitudes,
            window,
            size,
            sample_rate: sample_rate as f64,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn bin_count(&self) -> usize {
        self.output_buffer.len()
    }

    /// Centre frequency of FFT bin `index` in Hz
    pub fn bin_frequency(&self, index: usize) -> f64 {
        index as f64 * self.sample_rate / self.size as f64
    }

    /// Window `audio_samples`, transform, and return per-bin magnitudes
    ///
    /// Magnitudes are divided by sum(window)/2 and by √2, so a full-scale
    /// sinusoid centred on a bin reads 1/√2 (its RMS) there.
    pub fn process(&mut self, audio_samples: &[f32]) -> AudioResult<&[f64]> {
        // Short snapshots are zero-padded to the window length
        self.input_buffer.fill(0.0);
        apply_window(audio_samples, &self.window, &mut self.input_buffer);

        self.fft
            .process_with_scratch(
                &mut self.input_buffer,
                &mut self.output_buffer,
                &mut self.scratch,
            )
            .map_err(|e| AudioError::Fft(e.to_string()))?;

        let scale = self.window.amplitude_scale().max(MIN_WINDOW_SCALE);
        for (magnitude, bin) in self.magnitudes.iter_mut().zip(self.output_buffer.iter()) {
            *magnitude = bin.norm() / scale / std::f64::consts::SQRT_2;
        }

        Ok(&self.magnitudes)
    }
}
