/// Measurement constants shared by the level meter and the spectrum analyser

/// Number of third-octave bands on the graphic-EQ display
pub const BAND_COUNT: usize = 31;

/// Centre frequencies of the 31-band graphic EQ, 20 Hz to 20 kHz
pub const GRAPHIC_EQ_BANDS: [f64; BAND_COUNT] = [
    20.0, 25.0, 31.5, 40.0, 50.0, 63.0, 80.0, 100.0, //
    125.0, 160.0, 200.0, 250.0, 315.0, 400.0, 500.0, 630.0, //
    800.0, 1000.0, 1250.0, 1600.0, 2000.0, 2500.0, 3150.0, 4000.0, //
    5000.0, 6300.0, 8000.0, 10000.0, 12500.0, 16000.0, 20000.0,
];

/// 0 dB SPL reference pressure (20 µPa)
pub const REF_PASCAL: f64 = 20e-6;

/// SPL of the calibrator tone a microphone sensitivity factor refers to
pub const SENSITIVITY_REFERENCE_SPL: f64 = 94.0;

/// RMS floor keeps log10 finite on silent blocks
pub const RMS_FLOOR: f64 = 1e-12;

/// Power floor added before converting band power to dB
pub const POWER_FLOOR: f64 = 1e-20;

/// Level assigned to a band that contains no FFT bin
pub const EMPTY_BAND_DB: f64 = -120.0;

/// Lower guard on the window amplitude normalisation
pub const MIN_WINDOW_SCALE: f64 = 1e-12;

/// Default exponential smoothing factor for the spectrum (higher = slower)
pub const DEFAULT_SPECTRUM_SMOOTH: f64 = 0.6;

/// Default bounds of the "acceptable" range shown next to the reading
pub const DEFAULT_RANGE_LOW_DB: f64 = 70.0;
pub const DEFAULT_RANGE_HIGH_DB: f64 = 85.0;

// === HELPER FUNCTIONS ===

/// Half-width ratio of a third-octave band: 2^(1/6)
pub fn third_octave_ratio() -> f64 {
    2.0_f64.powf(1.0 / 6.0)
}

/// Lower and upper edge of the third-octave band around `center_hz`
pub fn band_edges(center_hz: f64) -> (f64, f64) {
    let ratio = third_octave_ratio();
    (center_hz / ratio, center_hz * ratio)
}

/// Short axis label for a band centre ("31.5", "1.0k", "12.5k")
pub fn band_label(center_hz: f64) -> String {
    if center_hz >= 1000.0 {
        format!("{:.1}k", center_hz / 1000.0)
    } else {
        format!("{}", center_hz)
    }
}
