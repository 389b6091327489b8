//! Audio capture via cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It **must not**:
//! - Allocate heap memory (the down-mix scratch buffer reaches its final
//!   capacity on the first callback and is reused afterwards)
//! - Block on a mutex or condvar
//! - Perform I/O
//!
//! The callback therefore only down-mixes to mono and writes into an SPSC
//! ring buffer producer whose `push_slice` is lock-free. Stream-side
//! warnings arrive through cpal's error callback and are logged, never
//! raised — a glitch must not abort capture.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `AudioCapture` must be created and dropped on the same thread;
//! the engine does both inside `spawn_blocking`.

pub mod device;
pub mod resample;
pub mod wav;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    FromSample, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig,
};

use crate::{
    buffering::{AudioProducer, Producer},
    error::{CadenceError, Result},
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{error, info, warn};

/// Handle to an active input stream.
///
/// **Not `Send`** — create and drop this type on the same OS thread.
pub struct AudioCapture {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Shared flag — the callback no-ops once this goes false.
    #[allow(dead_code)]
    running: Arc<AtomicBool>,
    /// Actual capture sample rate reported by the device (Hz).
    pub sample_rate: u32,
}

#[cfg(feature = "audio-cpal")]
fn build_mono_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut producer: AudioProducer,
    running: Arc<AtomicBool>,
) -> std::result::Result<Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let ch = config.channels.max(1) as usize;
    let mut mix_buf: Vec<f32> = Vec::new();

    device.build_input_stream(
        config,
        move |data: &[T], _info| {
            if !running.load(Ordering::Relaxed) {
                return;
            }
            let frames = data.len() / ch;
            mix_buf.resize(frames, 0.0);
            for (f, slot) in mix_buf.iter_mut().enumerate() {
                let base = f * ch;
                let mut sum = 0f32;
                for c in 0..ch {
                    sum += f32::from_sample(data[base + c]);
                }
                *slot = sum / ch as f32;
            }
            let written = producer.push_slice(&mix_buf[..frames]);
            if written < frames {
                warn!("ring buffer full: dropped {} frames", frames - written);
            }
        },
        |err| error!("audio stream error: {err}"),
        None,
    )
}

impl AudioCapture {
    /// Open an input device by preferred name, falling back to the system
    /// default and then the first available input.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference(
        producer: AudioProducer,
        running: Arc<AtomicBool>,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        use cpal::traits::HostTrait;

        let host = cpal::default_host();
        let mut selected = None;

        if let Some(preferred) = preferred_device_name {
            match host.input_devices() {
                Ok(mut devices) => {
                    selected = devices
                        .find(|d| d.name().map(|n| n == preferred).unwrap_or(false));
                    if selected.is_none() {
                        warn!("preferred input device '{preferred}' not found, falling back");
                    }
                }
                Err(e) => {
                    warn!("failed to list input devices while resolving preference: {e}");
                }
            }
        }

        let device = if let Some(device) = selected {
            device
        } else if let Some(default) = host.default_input_device() {
            default
        } else {
            let mut devices = host
                .input_devices()
                .map_err(|e| CadenceError::AudioDevice(e.to_string()))?;
            let fallback = devices.next().ok_or(CadenceError::NoDefaultInputDevice)?;
            warn!("no default input device, falling back to first available input");
            fallback
        };

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| CadenceError::AudioDevice(e.to_string()))?;

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();

        info!(sample_rate, channels, "audio config selected");

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                build_mono_stream::<f32>(&device, &config, producer, Arc::clone(&running))
            }
            SampleFormat::I16 => {
                build_mono_stream::<i16>(&device, &config, producer, Arc::clone(&running))
            }
            SampleFormat::U16 => {
                build_mono_stream::<u16>(&device, &config, producer, Arc::clone(&running))
            }
            SampleFormat::U8 => {
                build_mono_stream::<u8>(&device, &config, producer, Arc::clone(&running))
            }
            fmt => {
                return Err(CadenceError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| CadenceError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| CadenceError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
        })
    }

    /// Open the system default microphone and push mono f32 frames into
    /// `producer`.
    ///
    /// Must be called from the thread that will also drop this value.
    ///
    /// # Errors
    /// `CadenceError::NoDefaultInputDevice` when no microphone is available,
    /// or `CadenceError::AudioStream` if cpal fails to build the stream.
    #[cfg(feature = "audio-cpal")]
    pub fn open_default(producer: AudioProducer, running: Arc<AtomicBool>) -> Result<Self> {
        Self::open_with_preference(producer, running, None)
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open_with_preference(
        _producer: AudioProducer,
        _running: Arc<AtomicBool>,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(CadenceError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }

    pub fn open_default(producer: AudioProducer, running: Arc<AtomicBool>) -> Result<Self> {
        Self::open_with_preference(producer, running, None)
    }
}
