//! Typed audio units: fixed-cadence frames in, finalized clips out.

/// One fixed-cadence block of normalized PCM samples delivered by the
/// capture source.
///
/// Samples are interleaved when `channels > 1`; the live capture path
/// down-mixes in the audio callback, so frames reaching the engine are mono.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Channel count the sample layout represents.
    pub channels: u16,
}

impl AudioFrame {
    pub fn mono(samples: Vec<f32>) -> Self {
        Self {
            samples,
            channels: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A finalized capture: the concatenated session samples at a known rate.
///
/// Handed to the caller by `stop_recording`; ownership transfers with it
/// (the session buffer is cleared at the same time).
#[derive(Debug, Clone)]
pub struct AudioClip {
    /// PCM samples in [-1.0, 1.0], interleaved when `channels > 1`.
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g. 16000).
    pub sample_rate: u32,
    /// Channel count of the interleaved layout.
    pub channels: u16,
}

impl AudioClip {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    /// Duration in seconds. Zero-rate clips report 0.0 rather than dividing
    /// by zero.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        let frames = self.samples.len() / self.channels as usize;
        frames as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Arithmetic per-frame mean across channels. Returns the samples
    /// unchanged for mono clips.
    pub fn to_mono(&self) -> Vec<f32> {
        let ch = self.channels as usize;
        if ch <= 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks(ch)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_guards_zero_sample_rate() {
        let clip = AudioClip::mono(vec![0.0; 160], 0);
        assert_eq!(clip.duration_secs(), 0.0);
    }

    #[test]
    fn duration_counts_interleaved_frames_once() {
        let clip = AudioClip {
            samples: vec![0.0; 32_000],
            sample_rate: 16_000,
            channels: 2,
        };
        assert!((clip.duration_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn to_mono_averages_channels() {
        let clip = AudioClip {
            samples: vec![0.2, 0.4, -0.2, 0.6],
            sample_rate: 16_000,
            channels: 2,
        };
        let mono = clip.to_mono();
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.3).abs() < 1e-6);
        assert!((mono[1] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn to_mono_is_identity_for_mono_clips() {
        let clip = AudioClip::mono(vec![0.1, -0.1, 0.5], 16_000);
        assert_eq!(clip.to_mono(), clip.samples);
    }
}
