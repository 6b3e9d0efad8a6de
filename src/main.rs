use anyhow::{Context, Result};
use clap::Parser;
use decibel_meter::audio::capture::list_input_devices;
use decibel_meter::audio::constants::{band_label, GRAPHIC_EQ_BANDS};
use decibel_meter::config::load_config;
use decibel_meter::{
    AudioEngine, BandLevels, BlockStatus, CalibrationProfile, LevelRange,
    ManualCapture, MeterConfig, RangeVerdict,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How often the level reading is refreshed
const LEVEL_INTERVAL: Duration = Duration::from_millis(500);

/// How often the spectrum is recomputed
const SPECTRUM_INTERVAL: Duration = Duration::from_millis(250);

/// Display range of the spectrum bars (dBFS)
const SPECTRUM_DISPLAY_FLOOR_DB: f64 = -80.0;
const SPECTRUM_DISPLAY_CEILING_DB: f64 = 0.0;

/// Width of the text range bar
const RANGE_BAR_WIDTH: usize = 40;

#[derive(Parser)]
#[command(name = "decibel-meter")]
#[command(about = "A-weighted sound level meter with a 31-band third-octave spectrum")]
#[command(version)]
struct Cli {
    /// Path to the JSON configuration
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// List audio input devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Feed a WAV file through the meter instead of the microphone
    #[arg(long, value_name = "WAV")]
    replay: Option<PathBuf>,

    /// Stop live metering after this many seconds
    #[arg(long, value_name = "SECS")]
    duration: Option<f64>,
}

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug to see spectrum traces
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    if cli.list_devices {
        return print_devices();
    }

    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load configuration {:?}", cli.config))?;

    let config_dir = match cli.config.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let calibration_path = config.resolve_calibration_path(&config_dir);

    match &cli.replay {
        Some(wav) => run_replay(&config, calibration_path.as_deref(), wav),
        None => run_live(&config, calibration_path.as_deref(), cli.duration),
    }
}

fn print_devices() -> Result<()> {
    let devices = list_input_devices().context("Failed to enumerate input devices")?;
    if devices.is_empty() {
        println!("No audio input devices found");
        return Ok(());
    }

    println!("Audio input devices:");
    for device in devices {
        let marker = if device.is_default { " (default)" } else { "" };
        println!("  [{}] {}{}", device.index, device.name, marker);
    }
    Ok(())
}

/// When live metering should end: after an optional duration or on Ctrl-C
struct RunLimit {
    deadline: Option<Duration>,
    interrupted: Arc<AtomicBool>,
}

impl RunLimit {
    fn new(duration: Option<f64>) -> Self {
        Self {
            deadline: duration.map(Duration::from_secs_f64),
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    fn expired(&self, elapsed: Duration) -> bool {
        self.interrupted.load(Ordering::Relaxed)
            || self.deadline.is_some_and(|limit| elapsed >= limit)
    }
}

/// Meter the configured microphone until `duration` elapses or Ctrl-C
fn run_live(config: &MeterConfig, calibration: Option<&Path>, duration: Option<f64>) -> Result<()> {
    let limit = RunLimit::new(duration);
    let interrupted = limit.interrupted.clone();
    ctrlc::set_handler(move || {
        log::info!("Received exit signal, stopping capture");
        interrupted.store(true, Ordering::Relaxed);
    })
    .context("Failed to install Ctrl-C handler")?;

    let mut engine = AudioEngine::new(config.engine_settings(), calibration)
        .context("Failed to create audio engine")?;
    engine.start().context("Failed to start audio capture")?;

    let range = config.level_range();
    let started = Instant::now();
    let mut next_level = started + LEVEL_INTERVAL;
    let mut next_spectrum = started + SPECTRUM_INTERVAL;

    loop {
        let now = Instant::now();
        if limit.expired(now.duration_since(started)) {
            break;
        }

        if now >= next_spectrum {
            engine.compute_spectrum();
            log::debug!("Spectrum: {}", format_spectrum(&engine.get_spectrum()));
            next_spectrum += SPECTRUM_INTERVAL;
        }
        if now >= next_level {
            println!("{}", format_level(engine.get_last_db(), &range));
            next_level += LEVEL_INTERVAL;
        }

        let wake = next_level.min(next_spectrum);
        std::thread::sleep(wake.saturating_duration_since(Instant::now()));
    }

    engine.stop();
    Ok(())
}

/// Push a WAV file through the engine in capture-sized blocks
fn run_replay(config: &MeterConfig, calibration: Option<&Path>, wav: &Path) -> Result<()> {
    let (samples, sample_rate) =
        read_wav_mono(wav).with_context(|| format!("Failed to read {:?}", wav))?;

    let mut settings = config.engine_settings();
    if sample_rate != settings.sample_rate {
        log::info!(
            "Replaying at the file's {} Hz instead of the configured {} Hz",
            sample_rate,
            settings.sample_rate
        );
        settings.sample_rate = sample_rate;
    }
    let block_size = settings.block_size as usize;

    let capture = ManualCapture::new();
    let mut engine = AudioEngine::with_capture(
        settings,
        CalibrationProfile::load(calibration),
        capture.clone(),
    )
    .context("Failed to create audio engine")?;
    engine.start()?;

    // Spectrum trigger every quarter second of audio
    let spectrum_every = (sample_rate as usize / 4).max(1);
    let mut since_spectrum = 0;
    for block in samples.chunks(block_size) {
        capture.push(block, BlockStatus::Ok);
        since_spectrum += block.len();
        if since_spectrum >= spectrum_every {
            engine.compute_spectrum();
            since_spectrum = 0;
        }
    }
    engine.compute_spectrum();
    engine.stop();

    log::info!(
        "Replayed {:.2} s from {:?}",
        samples.len() as f64 / sample_rate as f64,
        wav
    );
    println!("{}", format_level(engine.get_last_db(), &config.level_range()));
    println!("{}", format_spectrum(&engine.get_spectrum()));
    Ok(())
}

/// First channel of a WAV file as f32, plus its sample rate
fn read_wav_mono(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let full_scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|s| s as f32 / full_scale))
                .collect::<Result<_, _>>()?
        }
    };

    let mono = interleaved.into_iter().step_by(channels).collect();
    Ok((mono, spec.sample_rate))
}

/// "72.4 dBA  [.......|......]  OK"
fn format_level(db: f64, range: &LevelRange) -> String {
    let marker = (LevelRange::bar_position(db) * (RANGE_BAR_WIDTH - 1) as f64).round() as usize;
    let bar: String = (0..RANGE_BAR_WIDTH)
        .map(|i| if i == marker { '|' } else { '.' })
        .collect();

    let verdict = match range.classify(db) {
        RangeVerdict::Below => "LOW",
        RangeVerdict::Within => "OK",
        RangeVerdict::Above => "HIGH",
    };
    format!("{:6.1} dBA  [{}]  {}", db, bar, verdict)
}

/// "20:-80.0 25:-74.3 ... 20.0k:-80.0", bars clamped to the display range
fn format_spectrum(levels: &BandLevels) -> String {
    GRAPHIC_EQ_BANDS
        .iter()
        .zip(levels.iter())
        .map(|(&center, &level)| {
            let shown = level.clamp(SPECTRUM_DISPLAY_FLOOR_DB, SPECTRUM_DISPLAY_CEILING_DB);
            format!("{}:{:.1}", band_label(center), shown)
        })
        .collect::<Vec<_>>()
        .join(" ")
}
