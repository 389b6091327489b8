//! Silence detection.
//!
//! One detector, one frame geometry: the same [`SilenceDetector`] instance
//! classifies live frames inside the capture pipeline and, via
//! [`crate::analysis::SegmentAnalyzer`], re-classifies completed clips for
//! pause statistics.

pub mod energy;

pub use energy::SilenceDetector;

/// Per-frame classification result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameVerdict {
    /// Root-mean-square level of the frame.
    pub rms: f32,
    /// Whether the frame fell below the configured threshold.
    pub is_silent: bool,
    /// Whether consecutive silence has now reached the auto-stop window.
    pub should_stop: bool,
}
