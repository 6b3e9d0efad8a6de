//! Digital A-weighting filter design
//!
//! Builds the IEC 61672 analog A-weighting prototype and maps it onto the
//! z-plane with the bilinear (Tustin) transform. The resulting IIR filter is
//! run by the [`LevelComputer`](super::meter_engine::LevelComputer) on every
//! captured block.

use super::error::{AudioError, AudioResult};
use realfft::num_complex::Complex64;
use std::f64::consts::PI;

/// Pole frequencies of the A-weighting curve (Hz)
const F1: f64 = 20.598997;
const F2: f64 = 107.65265;
const F3: f64 = 737.86223;
const F4: f64 = 12194.217;

/// Gain that normalises the curve to 0 dB at 1 kHz
const A1000_DB: f64 = 1.9997;

/// Numerator/denominator of a digital IIR filter in powers of z^-1
///
/// The denominator is normalised so that `denominator[0] == 1.0`. `poles`
/// holds the z-plane roots of the denominator as known at design time.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCoefficients {
    pub numerator: Vec<f64>,
    pub denominator: Vec<f64>,
    pub poles: Vec<Complex64>,
}

impl FilterCoefficients {
    /// Build a filter whose denominator is `(1 - p z^-1)` over every pole
    ///
    /// Complex poles must come in conjugate pairs for the denominator to be
    /// real.
    pub fn from_poles(numerator: Vec<f64>, poles: Vec<Complex64>) -> Self {
        let denominator = poles
            .iter()
            .fold(vec![Complex64::new(1.0, 0.0)], |acc, &pole| {
                let mut next = acc.clone();
                next.push(Complex64::new(0.0, 0.0));
                for (k, &c) in acc.iter().enumerate() {
                    next[k + 1] -= c * pole;
                }
                next
            })
            .into_iter()
            .map(|c| c.re)
            .collect();

        Self {
            numerator,
            denominator,
            poles,
        }
    }

    /// Length of the filter memory carried between blocks
    pub fn state_len(&self) -> usize {
        self.numerator.len().max(self.denominator.len()).saturating_sub(1)
    }

    /// True when every pole lies strictly inside the unit circle
    pub fn is_stable(&self) -> bool {
        match self.denominator.first() {
            Some(&leading) if leading != 0.0 && leading.is_finite() => {
                self.poles.len() == self.denominator.len() - 1
                    && self
                        .poles
                        .iter()
                        .all(|pole| pole.is_finite() && pole.norm() < 1.0)
            }
            _ => false,
        }
    }

    /// Magnitude response in dB at `frequency_hz` for the given sample rate
    pub fn magnitude_db(&self, frequency_hz: f64, sample_rate: f64) -> f64 {
        let omega = 2.0 * PI * frequency_hz / sample_rate;
        let evaluate = |coeffs: &[f64]| -> Complex64 {
            coeffs
                .iter()
                .enumerate()
                .map(|(k, &c)| Complex64::from_polar(c, -omega * k as f64))
                .sum()
        };
        let response = evaluate(&self.numerator) / evaluate(&self.denominator);
        20.0 * response.norm().log10()
    }
}

/// Design the digital A-weighting filter for `sample_rate`
///
/// The analog prototype is
/// `H(s) = k s^4 / ((s + w4)^2 (s + w1)^2 (s + w3)(s + w2))` with `w = 2πf`,
/// written as polynomials in descending powers of `s`.
pub fn design_a_weighting(sample_rate: u32) -> AudioResult<FilterCoefficients> {
    if sample_rate == 0 {
        return Err(AudioError::InvalidSampleRate(sample_rate));
    }

    let w1 = 2.0 * PI * F1;
    let w2 = 2.0 * PI * F2;
    let w3 = 2.0 * PI * F3;
    let w4 = 2.0 * PI * F4;

    let gain = w4 * w4 * 10f64.powf(A1000_DB / 20.0);
    let numerator = [gain, 0.0, 0.0, 0.0, 0.0];

    let denominator = polymul(&[1.0, 2.0 * w4, w4 * w4], &[1.0, 2.0 * w1, w1 * w1]);
    let denominator = polymul(&polymul(&denominator, &[1.0, w3]), &[1.0, w2]);

    let fs = sample_rate as f64;
    let (numerator, denominator) = bilinear(&numerator, &denominator, fs);
    let poles = [w1, w1, w4, w4, w2, w3]
        .iter()
        .map(|&w| bilinear_pole(-w, fs))
        .collect();

    let coefficients = FilterCoefficients {
        numerator,
        denominator,
        poles,
    };
    log::debug!(
        "A-weighting filter for {} Hz: order {}",
        sample_rate,
        coefficients.state_len()
    );
    Ok(coefficients)
}

/// Closed-form analog A-weighting gain in dB (IEC 61672-1)
pub fn analog_a_weighting_db(frequency_hz: f64) -> f64 {
    if frequency_hz <= 0.0 {
        return f64::NEG_INFINITY;
    }

    let f2 = frequency_hz * frequency_hz;
    let numerator = F4 * F4 * f2 * f2;
    let denominator = (f2 + F1 * F1)
        * libm::sqrt((f2 + F2 * F2) * (f2 + F3 * F3))
        * (f2 + F4 * F4);

    20.0 * libm::log10(numerator / denominator) + A1000_DB
}

/// Multiply two polynomials given in descending powers
fn polymul(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut product = vec![0.0; a.len() + b.len() - 1];
    for (i, &x) in a.iter().enumerate() {
        for (j, &y) in b.iter().enumerate() {
            product[i + j] += x * y;
        }
    }
    product
}

/// Coefficients of (1 + sign * z^-1)^n in ascending powers of z^-1
fn binomial_expansion(n: usize, sign: f64) -> Vec<f64> {
    let mut coeffs = vec![1.0];
    for _ in 0..n {
        coeffs = polymul(&coeffs, &[1.0, sign]);
    }
    coeffs
}

/// Bilinear transform of an analog filter b(s)/a(s) (descending powers of s)
///
/// Substitutes `s = 2 fs (1 - z^-1) / (1 + z^-1)` and clears the common
/// `(1 + z^-1)^M` factor, M being the higher of the two degrees.
fn bilinear(b: &[f64], a: &[f64], fs: f64) -> (Vec<f64>, Vec<f64>) {
    let order = (b.len() - 1).max(a.len() - 1);
    let numerator = substitute_tustin(b, order, fs);
    let denominator = substitute_tustin(a, order, fs);

    let leading = denominator[0];
    (
        numerator.iter().map(|c| c / leading).collect(),
        denominator.iter().map(|c| c / leading).collect(),
    )
}

/// Image of the analog pole `s` under the bilinear transform
fn bilinear_pole(s: f64, fs: f64) -> Complex64 {
    let c = 2.0 * fs;
    Complex64::new((c + s) / (c - s), 0.0)
}

fn substitute_tustin(poly: &[f64], order: usize, fs: f64) -> Vec<f64> {
    let degree = poly.len() - 1;
    let c = 2.0 * fs;
    let mut result = vec![0.0; order + 1];

    for power in 0..=degree {
        // poly is descending, so the coefficient of s^power sits at degree - power
        let coeff = poly[degree - power] * c.powi(power as i32);
        if coeff == 0.0 {
            continue;
        }
        let expanded = polymul(
            &binomial_expansion(power, -1.0),
            &binomial_expansion(order - power, 1.0),
        );
        for (slot, value) in result.iter_mut().zip(expanded) {
            *slot += coeff * value;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Dense sweep up to 400 kHz plus the rates where the 20.6 Hz double
    /// pole sits closest to z = 1
    fn sweep_rates() -> impl Iterator<Item = u32> {
        (1000..=400_000)
            .step_by(137)
            .chain([281_028, 295_687, 295_961, 317_333, 357_885, 384_000, 768_000])
    }

    /// Evaluate a polynomial (descending powers) at `z`
    fn horner(coeffs: &[f64], z: Complex64) -> Complex64 {
        coeffs
            .iter()
            .fold(Complex64::new(0.0, 0.0), |acc, &c| acc * z + c)
    }

    #[test]
    fn rejects_zero_sample_rate() {
        assert!(matches!(
            design_a_weighting(0),
            Err(AudioError::InvalidSampleRate(0))
        ));
    }

    #[test]
    fn filter_is_sixth_order() {
        let filter = design_a_weighting(48000).unwrap();
        assert_eq!(filter.numerator.len(), 7);
        assert_eq!(filter.denominator.len(), 7);
        assert_eq!(filter.poles.len(), 6);
        assert_eq!(filter.state_len(), 6);
        assert_eq!(filter.denominator[0], 1.0);
    }

    #[test]
    fn filter_is_stable_across_sample_rates() {
        let unstable: Vec<u32> = sweep_rates()
            .filter(|&rate| !design_a_weighting(rate).unwrap().is_stable())
            .collect();
        assert!(unstable.is_empty(), "unstable A-weighting at {:?}", unstable);
    }

    #[test]
    fn design_poles_are_roots_of_the_denominator() {
        for rate in sweep_rates().step_by(97) {
            let filter = design_a_weighting(rate).unwrap();
            let scale: f64 = filter.denominator.iter().map(|c| c.abs()).sum();
            for pole in &filter.poles {
                let residual = horner(&filter.denominator, *pole).norm() / scale;
                assert!(residual < 1e-12, "{} Hz: residual {:e} at {}", rate, residual, pole);
            }
        }
    }

    #[test]
    fn from_poles_expands_second_order_section() {
        // (1 - 0.5 z^-1)(1 - 0.25 z^-1)
        let filter = FilterCoefficients::from_poles(
            vec![1.0],
            vec![Complex64::new(0.5, 0.0), Complex64::new(0.25, 0.0)],
        );
        assert_eq!(filter.denominator, vec![1.0, -0.75, 0.125]);
        assert_eq!(filter.state_len(), 2);

        // Conjugate pair at radius 0.9
        let pole = Complex64::from_polar(0.9, 0.3);
        let resonator = FilterCoefficients::from_poles(vec![1.0], vec![pole, pole.conj()]);
        assert!((resonator.denominator[1] + 2.0 * pole.re).abs() < 1e-12);
        assert!((resonator.denominator[2] - 0.81).abs() < 1e-12);
        assert!(resonator.is_stable());
    }

    #[test]
    fn a_weighting_poles_sit_near_the_analog_corners() {
        let rate = 48000;
        let filter = design_a_weighting(rate).unwrap();
        let mut radii: Vec<f64> = filter.poles.iter().map(|p| p.norm()).collect();
        radii.sort_by(|a, b| b.partial_cmp(a).unwrap());
        // 20.6 Hz double pole maps to roughly exp(-2π·20.6/48000)
        let expected = (-2.0 * PI * F1 / rate as f64).exp();
        assert!((radii[0] - expected).abs() < 1e-6);
        assert!((radii[1] - expected).abs() < 1e-6);
    }

    #[test]
    fn stability_test_flags_pole_outside_unit_circle() {
        let unstable = FilterCoefficients::from_poles(vec![1.0], vec![Complex64::new(1.5, 0.0)]);
        assert_eq!(unstable.denominator, vec![1.0, -1.5]);
        assert!(!unstable.is_stable());

        let on_circle = FilterCoefficients::from_poles(vec![1.0], vec![Complex64::new(-1.0, 0.0)]);
        assert!(!on_circle.is_stable());

        let stable = FilterCoefficients::from_poles(vec![1.0], vec![Complex64::new(0.5, 0.0)]);
        assert!(stable.is_stable());

        // Poles that do not account for the whole denominator
        let mut partial = stable.clone();
        partial.poles.clear();
        assert!(!partial.is_stable());
    }

    #[test]
    fn unity_gain_at_one_kilohertz() {
        for rate in [44100, 48000, 96000] {
            let filter = design_a_weighting(rate).unwrap();
            let gain = filter.magnitude_db(1000.0, rate as f64);
            assert!(gain.abs() < 0.1, "gain at 1 kHz was {:.3} dB @ {} Hz", gain, rate);
        }
    }

    #[test]
    fn digital_response_tracks_analog_curve_below_nyquist() {
        let rate = 48000;
        let filter = design_a_weighting(rate).unwrap();
        for freq in [31.5, 100.0, 250.0, 500.0, 2000.0, 4000.0] {
            let digital = filter.magnitude_db(freq, rate as f64);
            let analog = analog_a_weighting_db(freq);
            assert!(
                (digital - analog).abs() < 0.5,
                "{} Hz: digital {:.2} dB vs analog {:.2} dB",
                freq,
                digital,
                analog
            );
        }
    }

    #[test]
    fn analog_curve_matches_reference_values() {
        // IEC 61672 table values
        assert!((analog_a_weighting_db(1000.0)).abs() < 0.01);
        assert!((analog_a_weighting_db(100.0) + 19.1).abs() < 0.1);
        assert!((analog_a_weighting_db(10000.0) + 2.5).abs() < 0.1);
        assert_eq!(analog_a_weighting_db(0.0), f64::NEG_INFINITY);
    }
}
