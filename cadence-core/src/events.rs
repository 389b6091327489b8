//! Event types broadcast to live consumers (UI meters, telemetry).
//!
//! Both event kinds are emitted on `tokio::sync::broadcast` channels owned by
//! [`crate::capture::CaptureEngine`]; subscribing is optional and a slow or
//! absent subscriber never blocks frame processing.

use serde::{Deserialize, Serialize};

/// Emitted once per processed frame while the engine is listening.
///
/// This is an observation stream only — consumers must not use it to drive
/// state transitions (the engine is the sole authority over its own state).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameActivityEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Root-mean-square level of the frame in [0.0, 1.0].
    pub rms: f32,
    /// Whether the frame fell below the silence threshold.
    pub is_silent: bool,
    /// Whether accumulated silence has crossed the auto-stop window.
    pub should_stop: bool,
}

/// Emitted when the engine changes state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStatusEvent {
    pub status: CaptureStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Externally visible state of the capture engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStatus {
    /// No audio source open.
    Idle,
    /// Audio source open, frames classified but not buffered.
    Listening,
    /// Frames appended to the session buffer until silence or manual stop.
    Recording,
    /// Device open failed or the pipeline died — restart required.
    Error,
}
