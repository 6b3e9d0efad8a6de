//! End-to-end metering through a manually driven capture source

use decibel_meter::audio::constants::{BAND_COUNT, GRAPHIC_EQ_BANDS};
use decibel_meter::config::load_config;
use decibel_meter::{
    AudioEngine, BlockStatus, CalibrationMode, CalibrationProfile, EngineSettings, ManualCapture,
};
use std::f64::consts::{FRAC_1_SQRT_2, PI};
use std::path::Path;

const RATE: u32 = 48000;
const BLOCK: usize = 480;

fn sine(freq: f64, amplitude: f64, len: usize) -> Vec<f32> {
    (0..len)
        .map(|n| (amplitude * (2.0 * PI * freq * n as f64 / RATE as f64).sin()) as f32)
        .collect()
}

fn band_index(center: f64) -> usize {
    GRAPHIC_EQ_BANDS.iter().position(|&c| c == center).unwrap()
}

fn running_engine(
    settings: EngineSettings,
    calibration: CalibrationProfile,
) -> (AudioEngine<ManualCapture>, ManualCapture) {
    let capture = ManualCapture::new();
    let mut engine = AudioEngine::with_capture(settings, calibration, capture.clone()).unwrap();
    engine.start().unwrap();
    (engine, capture)
}

fn feed(capture: &ManualCapture, signal: &[f32]) {
    for block in signal.chunks(BLOCK) {
        assert!(capture.push(block, BlockStatus::Ok));
    }
}

fn settle_spectrum(engine: &AudioEngine<ManualCapture>) {
    for _ in 0..30 {
        engine.compute_spectrum();
    }
}

#[test]
fn full_scale_tone_level_and_spectrum() {
    let (engine, capture) =
        running_engine(EngineSettings::new(RATE, BLOCK as u32), CalibrationProfile::none());
    feed(&capture, &sine(1000.0, 1.0, RATE as usize));

    let expected_db = 20.0 * (FRAC_1_SQRT_2 / 20e-6).log10();
    let db = engine.get_last_db();
    assert!((db - expected_db).abs() < 0.2, "level {:.2} dB", db);

    settle_spectrum(&engine);
    let spectrum = engine.get_spectrum();
    assert_eq!(spectrum.len(), BAND_COUNT);

    let k1000 = band_index(1000.0);
    // Main-lobe power averaged over the 232 bins of the 1 kHz band
    let expected_band = 10.0 * (0.75_f64 / 232.0).log10();
    assert!((spectrum[k1000] - expected_band).abs() < 0.5, "1 kHz band {:.2}", spectrum[k1000]);
    assert!(spectrum.iter().all(|&level| level <= spectrum[k1000]));
    assert!(spectrum[band_index(20.0)] < -100.0);
    assert!(spectrum[band_index(20000.0)] < -100.0);
}

#[test]
fn sensitivity_and_curve_calibration() {
    let calibration = CalibrationProfile::parse("Sens Factor =-2.0dB\n20 3.0\n20000 3.0\n");
    assert_eq!(calibration.mode(), CalibrationMode::SensitivityAndCurve);

    let mut settings = EngineSettings::new(RATE, BLOCK as u32);
    settings.calibration_db = 0.5;

    let signal = sine(1000.0, 1.0, RATE as usize);
    let (calibrated, calibrated_capture) = running_engine(settings, calibration);
    let (plain, plain_capture) =
        running_engine(EngineSettings::new(RATE, BLOCK as u32), CalibrationProfile::none());
    feed(&calibrated_capture, &signal);
    feed(&plain_capture, &signal);

    // 0 dBFS sine: -3.01 dBFS RMS, +2 sensitivity, +94 reference, +0.5 offset
    let expected_db = 20.0 * FRAC_1_SQRT_2.log10() + 2.0 + 94.0 + 0.5;
    assert!((calibrated.get_last_db() - expected_db).abs() < 0.2);

    settle_spectrum(&calibrated);
    settle_spectrum(&plain);
    let calibrated = calibrated.get_spectrum();
    let plain = plain.get_spectrum();
    for band in 0..BAND_COUNT {
        assert!((calibrated[band] - plain[band] - 3.0).abs() < 1e-3, "band {}", band);
    }
}

#[test]
fn dropped_blocks_are_counted_not_measured() {
    let (engine, capture) =
        running_engine(EngineSettings::new(RATE, BLOCK as u32), CalibrationProfile::none());
    let quiet = sine(1000.0, 0.01, BLOCK * 20);
    feed(&capture, &quiet);
    let before = engine.get_last_db();

    assert!(capture.push(&vec![1.0; BLOCK], BlockStatus::Overrun));
    assert!(capture.push(&vec![1.0; BLOCK], BlockStatus::Error));

    assert_eq!(engine.dropped_blocks(), 2);
    assert_eq!(engine.get_last_db(), before);
}

#[test]
fn stopped_engine_ignores_capture() {
    let (mut engine, capture) =
        running_engine(EngineSettings::new(RATE, BLOCK as u32), CalibrationProfile::none());
    engine.stop();
    assert!(!capture.push(&sine(1000.0, 1.0, BLOCK), BlockStatus::Ok));
    assert_eq!(engine.get_last_db(), 0.0);

    // Restart picks the same engine state back up
    engine.start().unwrap();
    assert!(capture.push(&sine(1000.0, 1.0, BLOCK), BlockStatus::Ok));
    assert!(engine.get_last_db() > 50.0);
}

#[test]
fn configuration_document_drives_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    std::fs::write(
        &config_path,
        r#"{"sample_rate": 48000, "block_size": 480, "calibration_db": 1.0, "spectrum_smooth": 0.5}"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("calibration.txt"),
        "\"Sens Factor =-1.5dB, SERNO: 1234\"\n100 -1.0\n1000 0.0\n10000 2.0\n",
    )
    .unwrap();

    let config = load_config(&config_path).unwrap();
    let calibration_path = config.resolve_calibration_path(dir.path());
    assert_eq!(calibration_path.as_deref(), Some(dir.path().join("calibration.txt").as_path()));

    let calibration = CalibrationProfile::load(calibration_path.as_deref());
    let (engine, capture) = running_engine(config.engine_settings(), calibration);
    assert_eq!(engine.calibration_mode(), CalibrationMode::SensitivityAndCurve);
    assert_eq!(engine.settings().spectrum_smooth, 0.5);

    capture.push(&vec![0.0; BLOCK], BlockStatus::Ok);
    // Silent block: RMS floor, sensitivity branch, static offset
    let expected = 20.0 * 1e-12_f64.log10() + 1.5 + 94.0 + 1.0;
    assert!((engine.get_last_db() - expected).abs() < 1e-9);
}

#[test]
fn missing_calibration_file_degrades_to_uncalibrated() {
    let calibration = CalibrationProfile::load(Some(Path::new("/definitely/not/here.txt")));
    let (engine, _capture) = running_engine(EngineSettings::new(RATE, BLOCK as u32), calibration);
    assert_eq!(engine.calibration_mode(), CalibrationMode::Uncalibrated);
}
