//! PCM WAV persistence for finalized clips.

use std::path::Path;

use tracing::info;

use crate::buffering::frame::AudioClip;
use crate::error::{CadenceError, Result};

/// Write a clip as a standard 16-bit PCM WAV file.
///
/// Samples are clamped to [-1.0, 1.0] before quantization.
pub fn write_clip(clip: &AudioClip, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let spec = hound::WavSpec {
        channels: clip.channels.max(1),
        sample_rate: clip.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| CadenceError::WavEncode(e.to_string()))?;
    for &sample in &clip.samples {
        let quantized = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(quantized)
            .map_err(|e| CadenceError::WavEncode(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| CadenceError::WavEncode(e.to_string()))?;

    info!(
        path = %path.display(),
        samples = clip.samples.len(),
        sample_rate = clip.sample_rate,
        "clip written"
    );
    Ok(())
}
