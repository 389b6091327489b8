//! # cadence-core
//!
//! Triggered speech capture and segmentation engine.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → SPSC RingBuffer → Pipeline(spawn_blocking)
//!                                                    │
//!                                          fixed 20 ms frames
//!                                                    │
//!                                         CaptureEngine::on_frame
//!                                          │                │
//!                                    FrameBuffer     SilenceDetector
//!                                                    │
//!                                       auto-stop after 1 s of silence
//!                                                    │
//!                                  AudioClip → SegmentAnalyzer → SegmentStats
//! ```
//!
//! The audio callback is zero-alloc. All heap work happens on the pipeline
//! thread, and every control operation (`trigger`, `stop_recording`, …) runs
//! on the caller's thread against lock-free flags plus one short mutex.
//!
//! The finished clip and its `SegmentStats` (mean pause duration, total
//! voiced seconds) feed downstream speech-to-text and speech-rate
//! computation, which live outside this crate.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod analysis;
pub mod audio;
pub mod buffering;
pub mod capture;
pub mod error;
pub mod events;
pub mod vad;

// Convenience re-exports for downstream crates
pub use analysis::{process_audio, SegmentAnalyzer, SegmentStats};
pub use buffering::frame::{AudioClip, AudioFrame};
pub use buffering::frame_buffer::FrameBuffer;
pub use capture::{
    CaptureConfig, CaptureEngine, CaptureSnapshot, CaptureState, CounterSnapshot, FrameMonitor,
    WaitOutcome,
};
pub use error::CadenceError;
pub use events::{CaptureStatus, CaptureStatusEvent, FrameActivityEvent};
pub use vad::{FrameVerdict, SilenceDetector};
