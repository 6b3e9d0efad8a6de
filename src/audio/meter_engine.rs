use crate::audio::a_weighting::FilterCoefficients;
use crate::audio::constants::{REF_PASCAL, RMS_FLOOR, SENSITIVITY_REFERENCE_SPL};

/// Turns captured blocks into A-weighted decibel readings
///
/// Owned by the capture context: the filter memory carries the weighting
/// filter's trailing state from one block to the next and is only ever
/// touched sequentially, once per accepted block.
pub struct LevelComputer {
    // Coefficients padded to the same length, denominator[0] == 1
    numerator: Vec<f64>,
    denominator: Vec<f64>,

    // Direct form II transposed state, len = order
    memory: Vec<f64>,

    sensitivity_db: Option<f64>,
    calibration_db: f64,
}

impl LevelComputer {
    pub fn new(
        coefficients: &FilterCoefficients,
        sensitivity_db: Option<f64>,
        calibration_db: f64,
    ) -> Self {
        let len = coefficients
            .numerator
            .len()
            .max(coefficients.denominator.len())
            .max(1);
        let leading = match coefficients.denominator.first() {
            Some(&a0) if a0 != 0.0 => a0,
            _ => 1.0,
        };

        let pad = |coeffs: &[f64]| -> Vec<f64> {
            let mut padded: Vec<f64> = coeffs.iter().map(|c| c / leading).collect();
            padded.resize(len, 0.0);
            padded
        };

        Self {
            numerator: pad(&coefficients.numerator),
            denominator: pad(&coefficients.denominator),
            memory: vec![0.0; len - 1],
            sensitivity_db,
            calibration_db,
        }
    }

    /// Filter `block` and return its calibrated dB level
    ///
    /// Returns `None` for an empty block, which carries no measurement and
    /// leaves the filter memory untouched.
    pub fn process(&mut self, block: &[f32]) -> Option<f64> {
        if block.is_empty() {
            return None;
        }

        let mut sum_squares = 0.0;
        for &sample in block {
            let weighted = self.filter_sample(sample as f64);
            sum_squares += weighted * weighted;
        }

        let rms = (sum_squares / block.len() as f64).sqrt();
        Some(self.level_db(rms))
    }

    /// Convert an RMS value to a calibrated level in dB
    pub fn level_db(&self, rms: f64) -> f64 {
        let rms = rms.max(RMS_FLOOR);
        let db = match self.sensitivity_db {
            // Sensitivity is relative to a 94 dB SPL calibrator tone
            Some(sensitivity) => 20.0 * rms.log10() - sensitivity + SENSITIVITY_REFERENCE_SPL,
            // Samples taken as Pascal
            None => 20.0 * (rms / REF_PASCAL).log10(),
        };
        db + self.calibration_db
    }

    /// Trailing filter state carried into the next block
    pub fn memory(&self) -> &[f64] {
        &self.memory
    }

    #[inline]
    fn filter_sample(&mut self, x: f64) -> f64 {
        let order = self.memory.len();
        let b = &self.numerator;
        let a = &self.denominator;
        let z = &mut self.memory;

        if order == 0 {
            return b[0] * x;
        }

        let y = b[0] * x + z[0];
        for k in 0..order - 1 {
            z[k] = b[k + 1] * x - a[k + 1] * y + z[k + 1];
        }
        z[order - 1] = b[order] * x - a[order] * y;
        y
    }
}
