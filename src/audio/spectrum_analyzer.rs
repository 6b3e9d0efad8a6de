use crate::audio::calibration::CalibrationProfile;
use crate::audio::constants::{band_edges, BAND_COUNT, EMPTY_BAND_DB, GRAPHIC_EQ_BANDS, POWER_FLOOR};
use crate::audio::error::AudioResult;
use crate::audio::fft_engine::FftEngine;

/// One level in dB per graphic-EQ band, lowest band first
pub type BandLevels = [f64; BAND_COUNT];

/// Third-octave spectrum of a ring-buffer snapshot
///
/// Runs on the polling context, never inside the capture callback. Band bin
/// ranges and calibration corrections depend only on the sample rate, the
/// snapshot length and the profile, so they are resolved once up front.
pub struct SpectrumAnalyzer {
    /// Windowed real FFT over the whole snapshot
    fft_engine: FftEngine,

    /// Inclusive FFT bin range of each band, `None` when no bin falls inside
    band_bins: [Option<(usize, usize)>; BAND_COUNT],

    /// Correction curve sampled at each band centre (all 0 dB without a curve)
    corrections: BandLevels,
}

impl SpectrumAnalyzer {
    /// Create an analyser for snapshots of `window_size` samples at `sample_rate`
    pub fn new(sample_rate: u32, window_size: usize, calibration: &CalibrationProfile) -> Self {
        let fft_engine = FftEngine::new(window_size, sample_rate);

        let mut band_bins = [None; BAND_COUNT];
        for (slot, &center) in band_bins.iter_mut().zip(GRAPHIC_EQ_BANDS.iter()) {
            let (low, high) = band_edges(center);
            let mut bins = (0..fft_engine.bin_count()).filter(|&bin| {
                let frequency = fft_engine.bin_frequency(bin);
                frequency >= low && frequency <= high
            });
            let first = bins.next();
            let last = bins.last();
            *slot = first.map(|first| (first, last.unwrap_or(first)));
        }

        let mut corrections = [0.0; BAND_COUNT];
        for (correction, &center) in corrections.iter_mut().zip(GRAPHIC_EQ_BANDS.iter()) {
            *correction = calibration.correction_at(center);
        }

        Self {
            fft_engine,
            band_bins,
            corrections,
        }
    }

    /// Number of FFT bins feeding each band (0 for an empty band)
    pub fn bins_per_band(&self) -> [usize; BAND_COUNT] {
        self.band_bins
            .map(|range| range.map_or(0, |(first, last)| last - first + 1))
    }

    /// Calibrated, unsmoothed band levels of `snapshot`
    ///
    /// Returns `Ok(None)` when every sample is exactly zero: a buffer that was
    /// never written to has no spectrum worth reporting.
    pub fn band_levels(&mut self, snapshot: &[f32]) -> AudioResult<Option<BandLevels>> {
        if snapshot.iter().all(|&sample| sample == 0.0) {
            return Ok(None);
        }

        let magnitudes = self.fft_engine.process(snapshot)?;

        let mut levels = [EMPTY_BAND_DB; BAND_COUNT];
        for ((level, range), correction) in levels
            .iter_mut()
            .zip(self.band_bins.iter())
            .zip(self.corrections.iter())
        {
            if let Some((first, last)) = *range {
                let bins = &magnitudes[first..=last];
                let power = bins.iter().map(|m| m * m).sum::<f64>() / bins.len() as f64;
                *level = 10.0 * (power + POWER_FLOOR).log10();
            }
            *level += correction;
        }

        Ok(Some(levels))
    }
}

/// Exponential smoothing: `alpha * previous + (1 - alpha) * levels`
///
/// Higher `alpha` responds more slowly.
pub fn smooth(previous: &BandLevels, levels: &BandLevels, alpha: f64) -> BandLevels {
    let mut smoothed = [0.0; BAND_COUNT];
    for ((out, &old), &new) in smoothed.iter_mut().zip(previous).zip(levels) {
        *out = alpha * old + (1.0 - alpha) * new;
    }
    smoothed
}
