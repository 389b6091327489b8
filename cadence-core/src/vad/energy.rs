//! RMS-energy silence detector with a consecutive-silence counter.
//!
//! ## Algorithm
//!
//! 1. Compute RMS of the incoming frame.
//! 2. `is_silent = rms < threshold`; silent frames increment the counter,
//!    any voiced frame resets it to zero.
//! 3. `should_stop` becomes true once the counter reaches one second's worth
//!    of frames, and stays true until the counter resets.
//!
//! RMS over a fixed window is constant-time and allocation-free, so the test
//! is safe to run once per frame on the pipeline thread without ever falling
//! behind the capture cadence. No FFT, no adaptive model.

use tracing::warn;

use super::FrameVerdict;
use crate::error::{CadenceError, Result};

/// Length of the auto-stop silence window in seconds.
const SILENCE_WINDOW_SECS: f64 = 1.0;

/// Classifies frames as silent/voiced and tracks how long silence has run.
#[derive(Debug, Clone)]
pub struct SilenceDetector {
    sample_rate: u32,
    /// RMS level below which a frame counts as silent. Mutable at runtime.
    rms_threshold: f32,
    /// Samples per frame, derived from the frame duration.
    frame_samples: usize,
    /// Consecutive silent frames seen since the last voiced frame.
    consecutive_silent_frames: usize,
    /// Frame count equivalent to [`SILENCE_WINDOW_SECS`], rounded up.
    max_silent_frames: usize,
}

impl SilenceDetector {
    /// Create a detector for the given frame geometry.
    ///
    /// # Errors
    /// Returns `CadenceError::InvalidConfig` when the sample rate or frame
    /// duration is zero, or the threshold is not a finite positive value.
    pub fn new(sample_rate: u32, rms_threshold: f32, frame_duration_ms: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(CadenceError::InvalidConfig("sample_rate must be > 0".into()));
        }
        if frame_duration_ms == 0 {
            return Err(CadenceError::InvalidConfig(
                "frame_duration_ms must be > 0".into(),
            ));
        }
        if !rms_threshold.is_finite() || rms_threshold <= 0.0 {
            return Err(CadenceError::InvalidConfig(format!(
                "rms_threshold must be finite and positive, got {rms_threshold}"
            )));
        }

        let frame_samples = (sample_rate as u64 * frame_duration_ms as u64 / 1000) as usize;
        if frame_samples == 0 {
            return Err(CadenceError::InvalidConfig(format!(
                "frame of {frame_duration_ms} ms holds zero samples at {sample_rate} Hz"
            )));
        }
        let window_samples = (SILENCE_WINDOW_SECS * sample_rate as f64).round() as usize;
        let max_silent_frames = window_samples.div_ceil(frame_samples);

        Ok(Self {
            sample_rate,
            rms_threshold,
            frame_samples,
            consecutive_silent_frames: 0,
            max_silent_frames,
        })
    }

    /// Root-mean-square of a sample slice. Empty frames report 0.0.
    pub fn rms(frame: &[f32]) -> f32 {
        if frame.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = frame.iter().map(|s| s * s).sum();
        (sum_sq / frame.len() as f32).sqrt()
    }

    /// Classify one frame and advance the silence counter.
    ///
    /// This is the sole auto-stop decision point; the pipeline calls it for
    /// every delivered frame with none skipped, otherwise the one-second
    /// window guarantee breaks.
    pub fn process_frame(&mut self, frame: &[f32]) -> FrameVerdict {
        let mut rms = Self::rms(frame);
        if !rms.is_finite() {
            // Corrupt input (NaN/Inf samples). Treat as silence so a broken
            // stream stops the recording instead of holding it open forever.
            warn!(rms, "non-finite frame RMS — treating frame as silent");
            rms = 0.0;
        }
        let is_silent = rms < self.rms_threshold;

        if is_silent {
            self.consecutive_silent_frames += 1;
        } else {
            self.consecutive_silent_frames = 0;
        }

        FrameVerdict {
            rms,
            is_silent,
            should_stop: self.consecutive_silent_frames >= self.max_silent_frames,
        }
    }

    /// Zero the silence counter. Threshold and frame geometry persist.
    pub fn reset(&mut self) {
        self.consecutive_silent_frames = 0;
    }

    /// Replace the RMS threshold; applies from the next processed frame and
    /// does not retroactively reclassify already-counted silence.
    pub fn set_threshold(&mut self, threshold: f32) {
        self.rms_threshold = threshold;
    }

    pub fn threshold(&self) -> f32 {
        self.rms_threshold
    }

    /// Samples per frame at this detector's geometry.
    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    /// Frame count at which `should_stop` fires.
    pub fn max_silent_frames(&self) -> usize {
        self.max_silent_frames
    }

    /// Length of the current silence run in seconds.
    pub fn silence_duration_secs(&self) -> f64 {
        (self.consecutive_silent_frames * self.frame_samples) as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn detector() -> SilenceDetector {
        // 16 kHz, 20 ms frames → 320 samples/frame, 50 frames per second
        SilenceDetector::new(16_000, 0.02, 20).expect("valid config")
    }

    #[test]
    fn geometry_derivation() {
        let det = detector();
        assert_eq!(det.frame_samples(), 320);
        assert_eq!(det.max_silent_frames(), 50);
    }

    #[test]
    fn zero_sample_rate_is_rejected() {
        assert!(SilenceDetector::new(0, 0.02, 20).is_err());
    }

    #[test]
    fn zero_frame_duration_is_rejected() {
        assert!(SilenceDetector::new(16_000, 0.02, 0).is_err());
    }

    #[test]
    fn non_positive_threshold_is_rejected() {
        assert!(SilenceDetector::new(16_000, 0.0, 20).is_err());
        assert!(SilenceDetector::new(16_000, f32::NAN, 20).is_err());
    }

    #[test]
    fn rms_of_empty_frame_is_zero() {
        assert_eq!(SilenceDetector::rms(&[]), 0.0);
    }

    #[test]
    fn rms_of_square_wave() {
        let samples: Vec<f32> = (0..320)
            .map(|i| if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        assert_relative_eq!(SilenceDetector::rms(&samples), 0.5, epsilon = 1e-5);
    }

    #[test]
    fn should_stop_fires_exactly_at_the_window_boundary() {
        // Scenario: 50 all-zero frames → stop exactly at frame 50, not before.
        let mut det = detector();
        let silent = vec![0.0f32; 320];
        for i in 1..50 {
            let verdict = det.process_frame(&silent);
            assert!(verdict.is_silent);
            assert!(!verdict.should_stop, "stopped early at frame {i}");
        }
        let verdict = det.process_frame(&silent);
        assert!(verdict.should_stop, "expected stop at frame 50");
    }

    #[test]
    fn voiced_frame_resets_the_counter() {
        // Scenario: one loud frame then 49 silent frames must not stop.
        let mut det = detector();
        let silent = vec![0.0f32; 320];
        for _ in 0..30 {
            det.process_frame(&silent);
        }
        let loud = vec![0.1f32; 320];
        let verdict = det.process_frame(&loud);
        assert!(!verdict.is_silent);
        for i in 1..50 {
            let verdict = det.process_frame(&silent);
            assert!(!verdict.should_stop, "stopped early at frame {i} after reset");
        }
        assert!(det.process_frame(&silent).should_stop);
    }

    #[test]
    fn reset_is_idempotent() {
        let mut det = detector();
        det.process_frame(&vec![0.0f32; 320]);
        det.reset();
        let after_once = det.silence_duration_secs();
        det.reset();
        assert_eq!(det.silence_duration_secs(), after_once);
        assert_eq!(after_once, 0.0);
    }

    #[test]
    fn threshold_change_applies_to_next_frame_only() {
        let mut det = detector();
        // 0.05 RMS frame is voiced at threshold 0.02
        let frame = vec![0.05f32; 320];
        assert!(!det.process_frame(&frame).is_silent);
        det.set_threshold(0.1);
        assert!(det.process_frame(&frame).is_silent);
    }

    #[test]
    fn silence_duration_tracks_counter() {
        let mut det = detector();
        let silent = vec![0.0f32; 320];
        for _ in 0..25 {
            det.process_frame(&silent);
        }
        assert_relative_eq!(det.silence_duration_secs(), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn nan_frame_is_treated_as_silent() {
        let mut det = detector();
        let verdict = det.process_frame(&[f32::NAN; 320]);
        assert!(verdict.is_silent);
        assert_eq!(verdict.rms, 0.0);
    }

    #[test]
    fn odd_geometry_rounds_the_window_up() {
        // 16 kHz with 30 ms frames → 480 samples, ceil(16000/480) = 34 frames
        let mut det = SilenceDetector::new(16_000, 0.02, 30).expect("valid config");
        assert_eq!(det.frame_samples(), 480);
        assert_eq!(det.max_silent_frames(), 34);
        let silent = vec![0.0f32; 480];
        for _ in 0..33 {
            assert!(!det.process_frame(&silent).should_stop);
        }
        assert!(det.process_frame(&silent).should_stop);
    }
}
