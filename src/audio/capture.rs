//! Capture sources feeding the engine
//!
//! A capture source owns the platform stream and invokes a registered
//! [`BlockHandler`] once per block of mono samples. The engine never polls
//! the device; it only reacts to pushed blocks.

use super::error::{AudioError, AudioResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SizedSample, Stream, StreamConfig};
use dasp::sample::ToSample;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Driver-reported condition of a delivered block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    Ok,
    /// Samples were lost before this block
    Overrun,
    /// The stream reported an error since the previous block
    Error,
}

impl BlockStatus {
    pub fn is_ok(self) -> bool {
        self == BlockStatus::Ok
    }
}

/// Per-block callback registered with a capture source
pub type BlockHandler = Box<dyn FnMut(&[f32], BlockStatus) + Send + 'static>;

/// Which input device to open: position in the device list or a name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeviceSelector {
    Index(usize),
    Name(String),
}

/// Stream parameters handed to a capture source
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    pub sample_rate: u32,
    pub block_size: u32,
    pub device: Option<DeviceSelector>,
}

/// A source of mono sample blocks
pub trait AudioCapture {
    /// Create and start the stream, invoking `handler` for every block
    fn open(&mut self, settings: &CaptureSettings, handler: BlockHandler) -> AudioResult<()>;

    /// Halt the stream. Once this returns the handler is never invoked
    /// again and has been dropped.
    fn close(&mut self);
}

// === cpal backend ===

/// Live microphone capture through cpal
#[derive(Default)]
pub struct CpalCapture {
    stream: Option<Stream>,
}

impl CpalCapture {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioCapture for CpalCapture {
    fn open(&mut self, settings: &CaptureSettings, handler: BlockHandler) -> AudioResult<()> {
        let device = select_device(settings.device.as_ref())?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown Device".to_string());

        let sample_format = device
            .default_input_config()
            .map_err(|e| AudioError::DeviceQuery(e.to_string()))?
            .sample_format();

        let config = StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(settings.sample_rate),
            buffer_size: BufferSize::Fixed(settings.block_size),
        };

        let stream = match sample_format {
            SampleFormat::F32 => build_input_stream::<f32>(&device, &config, handler)?,
            SampleFormat::I16 => build_input_stream::<i16>(&device, &config, handler)?,
            SampleFormat::U16 => build_input_stream::<u16>(&device, &config, handler)?,
            other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
        };

        stream
            .play()
            .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

        log::info!(
            "Capture started on '{}' ({} Hz, {} samples/block, {:?})",
            device_name,
            settings.sample_rate,
            settings.block_size,
            sample_format
        );

        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::warn!("Failed to pause capture stream: {}", e);
            }
            // Dropping the stream joins the callback thread
            drop(stream);
            log::info!("Capture stopped");
        }
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.close();
    }
}

fn build_input_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut handler: BlockHandler,
) -> AudioResult<Stream>
where
    T: SizedSample + ToSample<f32> + Send + 'static,
{
    let stream_error = Arc::new(AtomicBool::new(false));
    let stream_error_flag = Arc::clone(&stream_error);
    let mut converted: Vec<f32> = Vec::new();

    device
        .build_input_stream(
            config,
            move |data: &[T], _info: &cpal::InputCallbackInfo| {
                converted.clear();
                converted.extend(data.iter().map(|&sample| sample.to_sample_()));

                let status = if stream_error.swap(false, Ordering::AcqRel) {
                    BlockStatus::Error
                } else {
                    BlockStatus::Ok
                };
                handler(&converted, status);
            },
            move |err| {
                log::warn!("Capture stream error: {}", err);
                stream_error_flag.store(true, Ordering::Release);
            },
            None, // No timeout (blocking)
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}

/// Resolve the configured device, falling back to the host default
fn select_device(selector: Option<&DeviceSelector>) -> AudioResult<cpal::Device> {
    let host = cpal::default_host();

    let Some(selector) = selector else {
        return host.default_input_device().ok_or(AudioError::NoDefaultDevice);
    };

    let devices: Vec<cpal::Device> = host
        .input_devices()
        .map_err(|e| AudioError::DeviceQuery(e.to_string()))?
        .collect();

    match selector {
        DeviceSelector::Index(index) => devices
            .into_iter()
            .nth(*index)
            .ok_or_else(|| AudioError::DeviceNotFound(format!("#{}", index))),
        DeviceSelector::Name(wanted) => {
            let names: Vec<String> = devices
                .iter()
                .map(|d| d.name().unwrap_or_default())
                .collect();

            // Exact name first, then the first name containing it
            let position = names
                .iter()
                .position(|name| name == wanted)
                .or_else(|| names.iter().position(|name| name.contains(wanted.as_str())))
                .ok_or_else(|| AudioError::DeviceNotFound(wanted.clone()))?;

            devices
                .into_iter()
                .nth(position)
                .ok_or_else(|| AudioError::DeviceNotFound(wanted.clone()))
        }
    }
}

/// An available capture device
#[derive(Debug, Clone)]
pub struct InputDeviceInfo {
    pub index: usize,
    pub name: String,
    pub is_default: bool,
}

/// List the host's input devices in selection-index order
pub fn list_input_devices() -> AudioResult<Vec<InputDeviceInfo>> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = host
        .input_devices()
        .map_err(|e| AudioError::DeviceQuery(e.to_string()))?;

    let infos: Vec<InputDeviceInfo> = devices
        .enumerate()
        .map(|(index, device)| {
            let name = device.name().unwrap_or_else(|_| "Unknown Device".to_string());
            let is_default = default_name.as_deref() == Some(name.as_str());
            InputDeviceInfo {
                index,
                name,
                is_default,
            }
        })
        .collect();

    log::debug!("Enumerated {} input devices", infos.len());
    Ok(infos)
}

// === Manual source ===

/// Capture source driven by its owner instead of a device
///
/// Clones share the registration, so one handle can be given to the engine
/// while another pushes blocks (WAV replay, tests).
#[derive(Clone, Default)]
pub struct ManualCapture {
    handler: Arc<Mutex<Option<BlockHandler>>>,
}

impl ManualCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one block synchronously; false when no handler is registered
    pub fn push(&self, block: &[f32], status: BlockStatus) -> bool {
        let mut handler = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
        match handler.as_mut() {
            Some(handler) => {
                handler(block, status);
                true
            }
            None => false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl AudioCapture for ManualCapture {
    fn open(&mut self, settings: &CaptureSettings, handler: BlockHandler) -> AudioResult<()> {
        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);
        log::debug!(
            "Manual capture opened ({} Hz, {} samples/block)",
            settings.sample_rate,
            settings.block_size
        );
        Ok(())
    }

    fn close(&mut self) {
        // Waits for an in-flight push before dropping the handler
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
