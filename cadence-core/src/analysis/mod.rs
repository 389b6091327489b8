//! Post-hoc segmentation of a finished clip into pause/voiced statistics.
//!
//! Reuses the live capture's [`SilenceDetector`] classification over the
//! in-memory clip, sliced into the same fixed frame geometry. The outputs
//! feed the external acoustic-feature extractor, which divides recognized
//! word count by `voiced_seconds` to get speech rate.

use serde::Serialize;
use tracing::debug;

use crate::buffering::frame::AudioClip;
use crate::error::Result;
use crate::vad::SilenceDetector;

/// Timing statistics for one clip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentStats {
    /// Arithmetic mean of pause durations in seconds; 0.0 when no pause
    /// occurred.
    pub pause_mean: f64,
    /// Total duration of voiced frames in seconds.
    pub voiced_seconds: f64,
}

impl SegmentStats {
    pub const ZERO: Self = Self {
        pause_mean: 0.0,
        voiced_seconds: 0.0,
    };
}

/// Re-derives pause and voiced-duration statistics from a completed clip.
///
/// A pause is a run of consecutive silent frames preceded by at least one
/// voiced frame. Leading silence is not "between speech" and is never
/// counted; a silence run at the end of the clip is counted as one pause
/// when the clip ends.
pub struct SegmentAnalyzer {
    detector: SilenceDetector,
    sample_rate: u32,
}

impl SegmentAnalyzer {
    /// Build an analyzer with its own detector at the given geometry.
    ///
    /// # Errors
    /// Same configuration validation as [`SilenceDetector::new`].
    pub fn new(sample_rate: u32, rms_threshold: f32, frame_duration_ms: u32) -> Result<Self> {
        let detector = SilenceDetector::new(sample_rate, rms_threshold, frame_duration_ms)?;
        Ok(Self {
            detector,
            sample_rate,
        })
    }

    /// Compute `(pause_mean, voiced_seconds)` for a clip.
    ///
    /// Multi-channel clips are down-mixed to mono first. The final partial
    /// frame is classified like any other, and pause/voiced durations are
    /// accounted in whole-frame units. An empty clip yields zeroed stats.
    pub fn analyze(&mut self, clip: &AudioClip) -> SegmentStats {
        if clip.is_empty() {
            return SegmentStats::ZERO;
        }

        let mono = clip.to_mono();
        let frame_len = self.detector.frame_samples();
        let frame_secs = frame_len as f64 / self.sample_rate as f64;

        let mut pause_durations: Vec<f64> = Vec::new();
        let mut current_pause_frames = 0usize;
        let mut seen_voice = false;
        let mut voiced_frames = 0usize;

        for frame in mono.chunks(frame_len) {
            let verdict = self.detector.process_frame(frame);
            if verdict.is_silent {
                // Leading silence (before any voice) is not a pause.
                if seen_voice {
                    current_pause_frames += 1;
                }
            } else {
                voiced_frames += 1;
                if current_pause_frames > 0 {
                    pause_durations.push(current_pause_frames as f64 * frame_secs);
                    current_pause_frames = 0;
                }
                seen_voice = true;
            }
        }

        // A trailing silence run still counts as one pause once the clip ends.
        if current_pause_frames > 0 {
            pause_durations.push(current_pause_frames as f64 * frame_secs);
        }

        // Sessions are independent: never let a silence run carry over.
        self.detector.reset();

        let pause_mean = if pause_durations.is_empty() {
            0.0
        } else {
            pause_durations.iter().sum::<f64>() / pause_durations.len() as f64
        };
        let voiced_seconds = voiced_frames as f64 * frame_secs;

        debug!(
            pauses = pause_durations.len(),
            pause_mean,
            voiced_seconds,
            clip_secs = clip.duration_secs(),
            "clip segmented"
        );

        SegmentStats {
            pause_mean,
            voiced_seconds,
        }
    }
}

/// One-shot segmentation of a finished clip.
///
/// Builds an analyzer at the given geometry and returns its stats. Callers
/// that segment many clips should hold a [`SegmentAnalyzer`] instead.
pub fn process_audio(
    clip: &AudioClip,
    sample_rate: u32,
    rms_threshold: f32,
    frame_duration_ms: u32,
) -> Result<SegmentStats> {
    let mut analyzer = SegmentAnalyzer::new(sample_rate, rms_threshold, frame_duration_ms)?;
    Ok(analyzer.analyze(clip))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SAMPLE_RATE: u32 = 16_000;

    fn analyzer() -> SegmentAnalyzer {
        SegmentAnalyzer::new(SAMPLE_RATE, 0.02, 20).expect("valid config")
    }

    fn voiced(secs: f64) -> Vec<f32> {
        vec![0.1; (secs * SAMPLE_RATE as f64) as usize]
    }

    fn silent(secs: f64) -> Vec<f32> {
        vec![0.0; (secs * SAMPLE_RATE as f64) as usize]
    }

    fn clip(parts: &[Vec<f32>]) -> AudioClip {
        let samples: Vec<f32> = parts.iter().flatten().copied().collect();
        AudioClip::mono(samples, SAMPLE_RATE)
    }

    #[test]
    fn empty_clip_yields_zero_stats() {
        let mut an = analyzer();
        let stats = an.analyze(&AudioClip::mono(vec![], SAMPLE_RATE));
        assert_eq!(stats, SegmentStats::ZERO);
    }

    #[test]
    fn all_silence_yields_zero_stats() {
        // No voiced frame ever: the silence is leading, not a pause.
        let mut an = analyzer();
        let stats = an.analyze(&clip(&[silent(2.0)]));
        assert_eq!(stats.pause_mean, 0.0);
        assert_eq!(stats.voiced_seconds, 0.0);
    }

    #[test]
    fn voice_pause_voice_trailing_silence() {
        // [voiced 1s][silent 0.5s][voiced 1s][silent 2s]
        // → pauses of 0.5 s and 2.0 s, mean 1.25, voiced 2.0 s
        let mut an = analyzer();
        let stats = an.analyze(&clip(&[voiced(1.0), silent(0.5), voiced(1.0), silent(2.0)]));
        assert_relative_eq!(stats.pause_mean, 1.25, epsilon = 1e-9);
        assert_relative_eq!(stats.voiced_seconds, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn leading_silence_is_not_a_pause() {
        let mut an = analyzer();
        let stats = an.analyze(&clip(&[silent(1.0), voiced(1.0), silent(0.5), voiced(0.5)]));
        assert_relative_eq!(stats.pause_mean, 0.5, epsilon = 1e-9);
        assert_relative_eq!(stats.voiced_seconds, 1.5, epsilon = 1e-9);
    }

    #[test]
    fn continuous_voice_has_no_pauses() {
        let mut an = analyzer();
        let stats = an.analyze(&clip(&[voiced(2.0)]));
        assert_eq!(stats.pause_mean, 0.0);
        assert_relative_eq!(stats.voiced_seconds, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn final_partial_frame_is_classified() {
        // 1 s voiced plus a 100-sample voiced tail: the tail is its own frame
        // and is counted at full frame duration.
        let mut an = analyzer();
        let mut samples = voiced(1.0);
        samples.extend_from_slice(&vec![0.1f32; 100]);
        let stats = an.analyze(&AudioClip::mono(samples, SAMPLE_RATE));
        let frame_secs = 320.0 / SAMPLE_RATE as f64;
        assert_relative_eq!(stats.voiced_seconds, 1.0 + frame_secs, epsilon = 1e-9);
    }

    #[test]
    fn consecutive_analyses_are_independent() {
        // A trailing silence run in one clip must not leak into the next:
        // the second clip's leading silence still isn't a pause.
        let mut an = analyzer();
        let _ = an.analyze(&clip(&[voiced(0.5), silent(1.5)]));
        let stats = an.analyze(&clip(&[silent(1.0), voiced(0.5)]));
        assert_eq!(stats.pause_mean, 0.0);
        assert_relative_eq!(stats.voiced_seconds, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn stereo_clip_is_downmixed_before_segmentation() {
        // Left channel loud, right channel inverted: the mono mix cancels to
        // silence, so no voiced frames survive the down-mix.
        let frames = SAMPLE_RATE as usize; // 1 s
        let mut samples = Vec::with_capacity(frames * 2);
        for _ in 0..frames {
            samples.push(0.4);
            samples.push(-0.4);
        }
        let clip = AudioClip {
            samples,
            sample_rate: SAMPLE_RATE,
            channels: 2,
        };
        let mut an = analyzer();
        let stats = an.analyze(&clip);
        assert_eq!(stats.voiced_seconds, 0.0);
    }

    #[test]
    fn stats_serialize_with_camel_case_fields() {
        let stats = SegmentStats {
            pause_mean: 1.25,
            voiced_seconds: 2.0,
        };
        let json = serde_json::to_value(stats).expect("serialize stats");
        assert_eq!(json["pauseMean"], 1.25);
        assert_eq!(json["voicedSeconds"], 2.0);
    }
}
