//! Microphone calibration profiles
//!
//! A calibration document is plain text. The first line may carry the
//! microphone sensitivity (`Sens Factor =-1.23dB`), every other non-comment
//! line is a `<frequency> <gain>` pair of the frequency-response correction
//! curve, separated by whitespace or commas.

use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

const SENSITIVITY_MARKER: &str = "Sens Factor";

static SENSITIVITY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Sens Factor\s*=\s*([+-]?\d+(?:\.\d+)?)\s*dB")
        .expect("sensitivity pattern is a valid regex")
});

/// Which parts of a calibration are in effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationMode {
    Uncalibrated,
    SensitivityOnly,
    CurveOnly,
    SensitivityAndCurve,
}

/// Frequency-response correction curve, at least two (Hz, dB) points
///
/// Points keep the order of the source document. Interpolation assumes they
/// ascend in frequency; that is the document author's responsibility.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationCurve {
    points: Vec<(f64, f64)>,
}

impl CalibrationCurve {
    /// Build a curve, or `None` when fewer than two points are given
    pub fn new(points: Vec<(f64, f64)>) -> Option<Self> {
        (points.len() >= 2).then_some(Self { points })
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Piecewise-linear gain at `frequency_hz`, clamped to the end points
    /// outside the curve's range
    pub fn gain_at(&self, frequency_hz: f64) -> f64 {
        let (first_freq, first_gain) = self.points[0];
        let (last_freq, last_gain) = self.points[self.points.len() - 1];

        if frequency_hz <= first_freq {
            return first_gain;
        }
        if frequency_hz >= last_freq {
            return last_gain;
        }

        for pair in self.points.windows(2) {
            let (f0, g0) = pair[0];
            let (f1, g1) = pair[1];
            if frequency_hz >= f0 && frequency_hz <= f1 {
                if f1 == f0 {
                    return g1;
                }
                return g0 + (g1 - g0) * (frequency_hz - f0) / (f1 - f0);
            }
        }
        last_gain
    }
}

/// Parsed calibration document, immutable once built
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationProfile {
    /// Microphone sensitivity relative to a 94 dB SPL calibrator tone
    pub sensitivity_db: Option<f64>,
    /// Frequency-response correction applied to the spectrum bands
    pub curve: Option<CalibrationCurve>,
}

impl CalibrationProfile {
    /// Profile with neither a sensitivity nor a curve
    pub fn none() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> CalibrationMode {
        match (self.sensitivity_db.is_some(), self.curve.is_some()) {
            (false, false) => CalibrationMode::Uncalibrated,
            (true, false) => CalibrationMode::SensitivityOnly,
            (false, true) => CalibrationMode::CurveOnly,
            (true, true) => CalibrationMode::SensitivityAndCurve,
        }
    }

    /// Spectrum correction at `frequency_hz` (0 dB without a curve)
    pub fn correction_at(&self, frequency_hz: f64) -> f64 {
        self.curve
            .as_ref()
            .map_or(0.0, |curve| curve.gain_at(frequency_hz))
    }

    /// Parse the text of a calibration document
    ///
    /// Malformed data lines are skipped; parsing never fails.
    pub fn parse(text: &str) -> Self {
        let lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        let Some(header) = lines.first() else {
            return Self::none();
        };

        let mut sensitivity_db = None;
        let mut data_lines = &lines[..];
        if header.contains(SENSITIVITY_MARKER) {
            sensitivity_db = SENSITIVITY_PATTERN
                .captures(header)
                .and_then(|caps| caps.get(1))
                .and_then(|value| value.as_str().parse::<f64>().ok());
            data_lines = &lines[1..];
        }

        let points: Vec<(f64, f64)> = data_lines
            .iter()
            .filter(|line| !line.starts_with('#') && !line.starts_with(';'))
            .filter_map(|line| parse_point(line))
            .collect();

        Self {
            sensitivity_db,
            curve: CalibrationCurve::new(points),
        }
    }

    /// Load a calibration document, degrading to no calibration when the
    /// path is absent or unreadable
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            log::info!("No calibration file configured");
            return Self::none();
        };

        match fs::read_to_string(path) {
            Ok(text) => {
                let profile = Self::parse(&text);
                log::info!(
                    "Loaded calibration from {}: {:?} (sensitivity {:?} dB, {} curve points)",
                    path.display(),
                    profile.mode(),
                    profile.sensitivity_db,
                    profile.curve.as_ref().map_or(0, |c| c.points().len())
                );
                profile
            }
            Err(e) => {
                log::warn!(
                    "Could not read calibration file {}: {} - running uncalibrated",
                    path.display(),
                    e
                );
                Self::none()
            }
        }
    }
}

/// First two comma/whitespace separated tokens as (frequency, gain)
fn parse_point(line: &str) -> Option<(f64, f64)> {
    let mut tokens = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty());
    let frequency = tokens.next()?.parse::<f64>().ok()?;
    let gain = tokens.next()?.parse::<f64>().ok()?;
    Some((frequency, gain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const UMIK_STYLE: &str = "\"Sens Factor =-1.378dB, SERNO: 7023270\"\n\
                              10.054\t-1.3117\n\
                              20.0\t-0.5\n\
                              1000.0\t0.0\n\
                              20000.0\t1.25\n";

    #[test]
    fn parses_sensitivity_and_curve() {
        let profile = CalibrationProfile::parse(UMIK_STYLE);
        assert_eq!(profile.sensitivity_db, Some(-1.378));
        let curve = profile.curve.as_ref().unwrap();
        assert_eq!(curve.points().len(), 4);
        assert_eq!(curve.points()[0], (10.054, -1.3117));
        assert_eq!(profile.mode(), CalibrationMode::SensitivityAndCurve);
    }

    #[test]
    fn header_without_number_is_still_excluded_from_data() {
        let profile = CalibrationProfile::parse("Sens Factor = unknown\n100 1\n200 2\n");
        assert_eq!(profile.sensitivity_db, None);
        assert_eq!(profile.curve.unwrap().points(), &[(100.0, 1.0), (200.0, 2.0)]);
    }

    #[test]
    fn header_is_data_when_it_has_no_marker() {
        let profile = CalibrationProfile::parse("100, 1.5\n200, 2.5\n");
        assert_eq!(profile.sensitivity_db, None);
        assert_eq!(profile.curve.unwrap().points(), &[(100.0, 1.5), (200.0, 2.5)]);
    }

    #[test]
    fn skips_comments_blank_and_malformed_lines() {
        let text = "# measured 2024\n\n; comment\n50 -2\nfreq gain\n60\n100 , 1 , extra\n";
        let profile = CalibrationProfile::parse(text);
        assert_eq!(profile.curve.unwrap().points(), &[(50.0, -2.0), (100.0, 1.0)]);
    }

    #[test]
    fn single_point_drops_curve_but_keeps_sensitivity() {
        let profile = CalibrationProfile::parse("Sens Factor = +2.5 dB\n1000 3\n");
        assert_eq!(profile.sensitivity_db, Some(2.5));
        assert!(profile.curve.is_none());
        assert_eq!(profile.mode(), CalibrationMode::SensitivityOnly);
    }

    #[test]
    fn empty_document_is_uncalibrated() {
        assert_eq!(CalibrationProfile::parse(""), CalibrationProfile::none());
        assert_eq!(CalibrationProfile::parse("\n  \n"), CalibrationProfile::none());
        assert_eq!(CalibrationProfile::none().mode(), CalibrationMode::Uncalibrated);
    }

    #[test]
    fn curve_only_mode() {
        let profile = CalibrationProfile::parse("100 1\n200 2\n");
        assert_eq!(profile.mode(), CalibrationMode::CurveOnly);
    }

    #[test]
    fn interpolation_clamps_outside_range() {
        let curve = CalibrationCurve::new(vec![(100.0, -3.0), (1000.0, 0.0), (10000.0, 6.0)]).unwrap();
        assert_eq!(curve.gain_at(20.0), -3.0);
        assert_eq!(curve.gain_at(100.0), -3.0);
        assert_eq!(curve.gain_at(20000.0), 6.0);
        assert_eq!(curve.gain_at(10000.0), 6.0);
    }

    #[test]
    fn interpolation_is_linear_between_points() {
        let curve = CalibrationCurve::new(vec![(100.0, -3.0), (1000.0, 0.0), (10000.0, 6.0)]).unwrap();
        assert!((curve.gain_at(550.0) - -1.5).abs() < 1e-12);
        assert!((curve.gain_at(1000.0) - 0.0).abs() < 1e-12);
        assert!((curve.gain_at(5500.0) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn correction_without_curve_is_zero() {
        let profile = CalibrationProfile {
            sensitivity_db: Some(-1.0),
            curve: None,
        };
        assert_eq!(profile.correction_at(1000.0), 0.0);
    }

    #[test]
    fn load_missing_file_degrades_to_uncalibrated() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("calibration.txt");
        assert_eq!(CalibrationProfile::load(Some(&missing)), CalibrationProfile::none());
        assert_eq!(CalibrationProfile::load(None), CalibrationProfile::none());
    }

    #[test]
    fn load_reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(UMIK_STYLE.as_bytes()).unwrap();
        let profile = CalibrationProfile::load(Some(file.path()));
        assert_eq!(profile.sensitivity_db, Some(-1.378));
        assert!(profile.curve.is_some());
    }
}
