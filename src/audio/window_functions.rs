//! Hann window for the spectrum analyser
//!
//! One second of audio is windowed before the FFT, and the window's amplitude
//! loss is divided back out of the bin magnitudes.

use apodize::hanning_iter;

/// Hann coefficients for one spectrum window, with their mean
///
/// The window spans the whole ring buffer, so it is built once per analyser.
pub struct WindowData {
    /// w[n] in [0, 1], zero at both ends when N > 1
    pub coefficients: Vec<f64>,

    /// Mean of the coefficients (about 0.5 for Hann)
    pub coherent_gain: f64,
}

impl WindowData {
    /// Symmetric Hann window: w[n] = 0.5 - 0.5 cos(2πn / (N - 1))
    pub fn hann(window_size: usize) -> Self {
        let coefficients: Vec<f64> = match window_size {
            0 => Vec::new(),
            1 => vec![1.0],
            size => hanning_iter(size).collect(),
        };
        let coherent_gain = if coefficients.is_empty() {
            0.0
        } else {
            coefficients.iter().sum::<f64>() / coefficients.len() as f64
        };

        Self {
            coefficients,
            coherent_gain,
        }
    }

    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }

    /// Sum of all coefficients (N times the coherent gain)
    pub fn sum(&self) -> f64 {
        self.coherent_gain * self.coefficients.len() as f64
    }

    /// Divisor that maps a windowed FFT bin of a full-scale sinusoid back to
    /// its peak amplitude: sum(w) / 2
    pub fn amplitude_scale(&self) -> f64 {
        self.sum() / 2.0
    }
}

/// `out[n] = samples[n] * w[n]`; slots past the shorter input are left alone
pub fn apply_window(samples: &[f32], window: &WindowData, out: &mut [f64]) {
    for ((slot, &sample), &coeff) in out
        .iter_mut()
        .zip(samples.iter())
        .zip(window.coefficients.iter())
    {
        *slot = sample as f64 * coeff;
    }
}
