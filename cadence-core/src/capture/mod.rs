//! `CaptureEngine` — triggered recording lifecycle.
//!
//! ## Lifecycle
//!
//! ```text
//! CaptureEngine::new()
//!     └─► start_listening()   → audio open, pipeline spawned   Idle → Listening
//!         └─► trigger()       → session reset, frames buffered Listening → Recording
//!             └─► auto-stop / stop_recording()                 Recording → Listening
//!                 └─► stop_listening()                         Listening → Idle
//! ```
//!
//! Recording returns to Listening rather than Idle so repeated triggers work
//! without reopening the audio source.
//!
//! ## Threading
//!
//! Two contexts touch the engine: the pipeline thread delivers frames through
//! `on_frame`, and the control context issues the explicit start/trigger/stop
//! operations. The listening/recording flags are lock-free atomics; the
//! session (frame buffer + silence detector) sits behind one
//! `parking_lot::Mutex` whose critical section is a single frame's classify,
//! append, and auto-stop decision. `trigger` asserts the recording flag under
//! the same lock, so a verdict computed for one session can never cancel the
//! session started after it. No lock is held across the monitor hook or a
//! broadcast send.
//!
//! `cpal::Stream` is `!Send` on Windows/macOS (COM / CoreAudio thread
//! affinity), so the device is opened *inside* `spawn_blocking` and a sync
//! oneshot channel reports open success/failure back to `start_listening`.

pub(crate) mod pipeline;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::audio::AudioCapture;
use crate::buffering::create_audio_ring;
use crate::buffering::frame::AudioClip;
use crate::buffering::frame_buffer::FrameBuffer;
use crate::error::{CadenceError, Result};
use crate::events::{CaptureStatus, CaptureStatusEvent, FrameActivityEvent};
use crate::vad::SilenceDetector;

/// Broadcast channel capacity for status/activity subscribers.
const BROADCAST_CAP: usize = 256;

/// Configuration for [`CaptureEngine`].
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Engine sample rate (Hz). Audio captured at another device rate is
    /// resampled on the pipeline thread. Default: 16000.
    pub sample_rate: u32,
    /// Frame duration in milliseconds. Default: 20 (320 samples at 16 kHz).
    pub frame_duration_ms: u32,
    /// RMS level below which a frame counts as silent. Default: 0.02.
    pub rms_threshold: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_duration_ms: 20,
            rms_threshold: 0.02,
        }
    }
}

/// Where the engine currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Listening,
    Recording,
}

/// Observation hook invoked once per processed frame.
///
/// Runs on the pipeline thread, outside the session lock. It observes only:
/// nothing a monitor does can alter engine state, and a panicking monitor is
/// caught and logged rather than poisoning frame delivery.
pub trait FrameMonitor: Send + Sync + 'static {
    fn on_frame(&self, rms: f32, is_silent: bool, should_stop: bool);
}

/// Point-in-time view of the engine for diagnostics/UI.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSnapshot {
    pub is_listening: bool,
    pub is_recording: bool,
    pub buffered_samples: usize,
    pub buffered_secs: f64,
    pub silence_secs: f64,
    pub rms_threshold: f32,
}

/// Result of a control-context wait on the recording flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The silence window elapsed and recording stopped on its own. Also
    /// returned when no recording was in flight when the wait began.
    AutoStopped,
    /// The caller's cancel flag was raised; the engine is back in Listening.
    Cancelled,
    /// Listening ended while waiting (device closed or `stop_listening`).
    ListeningEnded,
}

/// Frame-path counters, readable while the pipeline runs.
#[derive(Debug, Default)]
pub(crate) struct CaptureCounters {
    pub frames_in: AtomicUsize,
    pub frames_silent: AtomicUsize,
    pub frames_buffered: AtomicUsize,
    pub auto_stops: AtomicUsize,
}

/// Snapshot of [`CaptureCounters`].
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterSnapshot {
    pub frames_in: usize,
    pub frames_silent: usize,
    pub frames_buffered: usize,
    pub auto_stops: usize,
}

impl CaptureCounters {
    pub(crate) fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            frames_silent: self.frames_silent.load(Ordering::Relaxed),
            frames_buffered: self.frames_buffered.load(Ordering::Relaxed),
            auto_stops: self.auto_stops.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.frames_in.store(0, Ordering::Relaxed);
        self.frames_silent.store(0, Ordering::Relaxed);
        self.frames_buffered.store(0, Ordering::Relaxed);
        self.auto_stops.store(0, Ordering::Relaxed);
    }
}

/// One start-to-stop recording's mutable state: buffer plus detector.
/// Reset together on every trigger so nothing carries between sessions.
struct CaptureSession {
    buffer: FrameBuffer,
    detector: SilenceDetector,
}

/// State shared between the pipeline thread and the control context.
///
/// `listening` is an `Arc` of its own so the audio callback can hold it as
/// its run/no-op switch without seeing the rest of the engine.
pub(crate) struct Shared {
    listening: Arc<AtomicBool>,
    recording: AtomicBool,
    session: Mutex<CaptureSession>,
    monitor: Option<Box<dyn FrameMonitor>>,
    activity_tx: broadcast::Sender<FrameActivityEvent>,
    status_tx: broadcast::Sender<CaptureStatusEvent>,
    activity_seq: AtomicU64,
    pub(crate) counters: CaptureCounters,
}

impl Shared {
    pub(crate) fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Relaxed)
    }

    /// Frame delivery path. Runs on the pipeline thread once per frame, in
    /// strict arrival order; must never block for long or propagate a panic.
    pub(crate) fn on_frame(&self, frame: &[f32]) {
        if !self.listening.load(Ordering::Relaxed) {
            return;
        }
        self.counters.frames_in.fetch_add(1, Ordering::Relaxed);

        // Classify, append, and decide the auto-stop inside one critical
        // section. "Should I still append" must not tear against
        // stop_recording, and the Recording→Listening swap must happen while
        // the verdict is still current: trigger() takes the same lock before
        // asserting the flag, so a stale verdict cannot cancel a session
        // started after it was computed.
        let (verdict, auto_stopped) = {
            let mut session = self.session.lock();
            let verdict = session.detector.process_frame(frame);
            if self.recording.load(Ordering::Relaxed) {
                session.buffer.add_frame(frame);
                self.counters.frames_buffered.fetch_add(1, Ordering::Relaxed);
            }
            // Auto-stop: Recording → Listening. The clip stays in the buffer
            // until the control context retrieves it.
            let auto_stopped =
                verdict.should_stop && self.recording.swap(false, Ordering::SeqCst);
            (verdict, auto_stopped)
        };

        if verdict.is_silent {
            self.counters.frames_silent.fetch_add(1, Ordering::Relaxed);
        }

        // Observation hooks run outside the lock. A panicking monitor is a
        // caller bug, not a reason to corrupt the pipeline thread.
        if let Some(monitor) = &self.monitor {
            let hook = catch_unwind(AssertUnwindSafe(|| {
                monitor.on_frame(verdict.rms, verdict.is_silent, verdict.should_stop)
            }));
            if hook.is_err() {
                error!("frame monitor panicked — continuing without its output");
            }
        }

        let seq = self.activity_seq.fetch_add(1, Ordering::Relaxed);
        let _ = self.activity_tx.send(FrameActivityEvent {
            seq,
            rms: verdict.rms,
            is_silent: verdict.is_silent,
            should_stop: verdict.should_stop,
        });

        if auto_stopped {
            self.counters.auto_stops.fetch_add(1, Ordering::Relaxed);
            debug!(seq, "silence window reached — auto-stopping recording");
            self.set_status(CaptureStatus::Listening, Some("silence auto-stop".into()));
        }
    }

    fn set_status(&self, status: CaptureStatus, detail: Option<String>) {
        let _ = self.status_tx.send(CaptureStatusEvent { status, detail });
    }
}

/// The capture state machine.
///
/// `CaptureEngine` is `Send + Sync` — all fields use interior mutability.
/// Wrap in `Arc<CaptureEngine>` to share between the control context and any
/// event-forwarding tasks.
pub struct CaptureEngine {
    config: CaptureConfig,
    shared: Arc<Shared>,
    frame_samples: usize,
}

impl CaptureEngine {
    /// Create an engine with no monitor hook.
    ///
    /// # Errors
    /// `CadenceError::InvalidConfig` on zero sample rate, zero frame
    /// duration, or a non-positive threshold.
    pub fn new(config: CaptureConfig) -> Result<Self> {
        Self::with_monitor(config, None)
    }

    /// Create an engine with an injectable per-frame observation sink.
    pub fn with_monitor(
        config: CaptureConfig,
        monitor: Option<Box<dyn FrameMonitor>>,
    ) -> Result<Self> {
        let detector = SilenceDetector::new(
            config.sample_rate,
            config.rms_threshold,
            config.frame_duration_ms,
        )?;
        let frame_samples = detector.frame_samples();

        let (activity_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);

        let shared = Arc::new(Shared {
            listening: Arc::new(AtomicBool::new(false)),
            recording: AtomicBool::new(false),
            session: Mutex::new(CaptureSession {
                buffer: FrameBuffer::new(config.sample_rate),
                detector,
            }),
            monitor,
            activity_tx,
            status_tx,
            activity_seq: AtomicU64::new(0),
            counters: CaptureCounters::default(),
        });

        Ok(Self {
            config,
            shared,
            frame_samples,
        })
    }

    /// Current state, derived from the two flags.
    pub fn state(&self) -> CaptureState {
        if !self.shared.listening.load(Ordering::SeqCst) {
            CaptureState::Idle
        } else if self.shared.recording.load(Ordering::SeqCst) {
            CaptureState::Recording
        } else {
            CaptureState::Listening
        }
    }

    /// Open the default input device and start the capture pipeline.
    ///
    /// Blocks until the device is confirmed open (or fails), then returns;
    /// the pipeline keeps running on a background blocking thread.
    ///
    /// # Errors
    /// - `CadenceError::AlreadyListening` on a double start.
    /// - `CadenceError::NoDefaultInputDevice` / `AudioStream` on device error.
    pub fn start_listening(&self) -> Result<()> {
        self.start_listening_with_device(None)
    }

    /// Like [`start_listening`](Self::start_listening), preferring a device
    /// by name (falls back to the default input when not found).
    pub fn start_listening_with_device(&self, preferred_device: Option<String>) -> Result<()> {
        self.begin_listening()?;

        let (producer, consumer) = create_audio_ring();
        let shared = Arc::clone(&self.shared);
        let running = Arc::clone(&self.shared.listening);
        let engine_sample_rate = self.config.sample_rate;
        let frame_samples = self.frame_samples;

        // Sync oneshot: the blocking task reports device-open outcome, with
        // the actual capture sample rate on success.
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<u32>>();

        tokio::task::spawn_blocking(move || {
            // The device must be opened on the thread that will drop it
            // (cpal::Stream is !Send).
            let capture = match AudioCapture::open_with_preference(
                producer,
                Arc::clone(&running),
                preferred_device.as_deref(),
            ) {
                Ok(c) => {
                    let _ = open_tx.send(Ok(c.sample_rate));
                    c
                }
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                    running.store(false, Ordering::SeqCst);
                    return;
                }
            };

            let capture_sample_rate = capture.sample_rate;
            pipeline::run(pipeline::PipelineContext {
                shared,
                consumer,
                capture_sample_rate,
                engine_sample_rate,
                frame_samples,
            });

            // Stream drops here, releasing the audio device on this thread.
            drop(capture);
        });

        match open_rx.recv() {
            Ok(Ok(rate)) => {
                info!(capture_sample_rate = rate, "listening started");
                Ok(())
            }
            Ok(Err(e)) => {
                self.shared.listening.store(false, Ordering::SeqCst);
                self.shared
                    .set_status(CaptureStatus::Error, Some(e.to_string()));
                Err(e)
            }
            Err(_) => {
                self.shared.listening.store(false, Ordering::SeqCst);
                self.shared
                    .set_status(CaptureStatus::Error, Some("pipeline failed to start".into()));
                Err(CadenceError::Other(anyhow::anyhow!(
                    "capture task died before confirming device open"
                )))
            }
        }
    }

    /// Enter Listening without opening an audio device.
    ///
    /// For callers that own their audio source and deliver frames through
    /// [`on_frame`](Self::on_frame) themselves. Same sequencing rules as
    /// [`start_listening`](Self::start_listening).
    pub fn start_listening_unmanaged(&self) -> Result<()> {
        self.begin_listening()
    }

    fn begin_listening(&self) -> Result<()> {
        if self.shared.listening.swap(true, Ordering::SeqCst) {
            warn!("start_listening called while already listening — ignoring");
            return Err(CadenceError::AlreadyListening);
        }
        self.shared.counters.reset();
        self.shared.set_status(CaptureStatus::Listening, None);
        Ok(())
    }

    /// Listening → Recording. Clears the frame buffer and resets the silence
    /// counter first, so no stale audio or counted silence carries into the
    /// new session. Re-triggering while Recording restarts the session.
    ///
    /// # Errors
    /// `CadenceError::NotListening` while Idle; the state is unchanged.
    pub fn trigger(&self) -> Result<()> {
        if !self.shared.listening.load(Ordering::SeqCst) {
            warn!("trigger called while idle — ignoring");
            return Err(CadenceError::NotListening);
        }
        {
            let mut session = self.shared.session.lock();
            session.buffer.clear();
            session.detector.reset();
            // Asserted under the session lock: an in-flight frame either
            // finishes (with its auto-stop decision) before this, or sees the
            // fresh session. Its stale verdict can never land here.
            self.shared.recording.store(true, Ordering::SeqCst);
        }
        self.shared.set_status(CaptureStatus::Recording, None);
        info!("recording triggered");
        Ok(())
    }

    /// Deliver one frame from the audio source. Ignored unless listening.
    ///
    /// The cpal pipeline calls this internally; external sources may call it
    /// directly after [`start_listening_unmanaged`](Self::start_listening_unmanaged).
    pub fn on_frame(&self, frame: &[f32]) {
        self.shared.on_frame(frame);
    }

    /// Force Recording → Listening and hand the buffered clip to the caller.
    ///
    /// Works both for a manual stop mid-recording and for retrieval after an
    /// auto-stop already fired. Returns `None` when nothing was recorded —
    /// an empty session is "no speech", not an error. The session buffer is
    /// cleared as ownership transfers.
    pub fn stop_recording(&self) -> Option<AudioClip> {
        let was_recording = self.shared.recording.swap(false, Ordering::SeqCst);
        let clip = {
            let mut session = self.shared.session.lock();
            let clip = session.buffer.get_audio();
            session.buffer.clear();
            clip
        };
        if was_recording && self.shared.listening.load(Ordering::SeqCst) {
            self.shared
                .set_status(CaptureStatus::Listening, Some("manual stop".into()));
        }
        match &clip {
            Some(c) => info!(
                samples = c.samples.len(),
                secs = format_args!("{:.2}", c.duration_secs()),
                "recording retrieved"
            ),
            None => info!("recording stopped with no frames captured"),
        }
        clip
    }

    /// Listening → Idle. The pipeline exits and the device closes on its own
    /// thread shortly after.
    pub fn stop_listening(&self) {
        self.shared.recording.store(false, Ordering::SeqCst);
        if self.shared.listening.swap(false, Ordering::SeqCst) {
            self.shared.set_status(CaptureStatus::Idle, None);
            info!("listening stopped");
        }
    }

    /// Poll the recording flag until auto-stop, cancellation, or the end of
    /// listening. Stop latency is bounded by `poll_interval`.
    ///
    /// The wait observes only the recording flag: called while Listening with
    /// no recording in flight — never triggered, or the auto-stop already
    /// fired before the wait began — it returns
    /// [`WaitOutcome::AutoStopped`] immediately. Those two cases are
    /// indistinguishable here, which is why the intended sequence is
    /// [`trigger`](Self::trigger) first, then wait.
    ///
    /// On cancellation the engine transitions cleanly back to Listening; any
    /// partial clip stays retrievable via [`stop_recording`](Self::stop_recording).
    pub fn wait_for_auto_stop(&self, poll_interval: Duration, cancel: &AtomicBool) -> WaitOutcome {
        loop {
            if cancel.load(Ordering::SeqCst) {
                if self.shared.recording.swap(false, Ordering::SeqCst) {
                    self.shared
                        .set_status(CaptureStatus::Listening, Some("cancelled".into()));
                }
                info!("wait cancelled — back to listening");
                return WaitOutcome::Cancelled;
            }
            if !self.shared.listening.load(Ordering::SeqCst) {
                return WaitOutcome::ListeningEnded;
            }
            if !self.shared.recording.load(Ordering::SeqCst) {
                return WaitOutcome::AutoStopped;
            }
            std::thread::sleep(poll_interval);
        }
    }

    /// Replace the silence threshold; applies from the next processed frame.
    pub fn set_threshold(&self, threshold: f32) {
        self.shared.session.lock().detector.set_threshold(threshold);
    }

    /// Point-in-time engine view for diagnostics/UI.
    pub fn snapshot(&self) -> CaptureSnapshot {
        let session = self.shared.session.lock();
        CaptureSnapshot {
            is_listening: self.shared.listening.load(Ordering::SeqCst),
            is_recording: self.shared.recording.load(Ordering::SeqCst),
            buffered_samples: session.buffer.total_samples(),
            buffered_secs: session.buffer.duration_secs(),
            silence_secs: session.detector.silence_duration_secs(),
            rms_threshold: session.detector.threshold(),
        }
    }

    /// Frame-path counters since the last `start_listening`.
    pub fn counters(&self) -> CounterSnapshot {
        self.shared.counters.snapshot()
    }

    /// Subscribe to per-frame activity events.
    pub fn subscribe_activity(&self) -> broadcast::Receiver<FrameActivityEvent> {
        self.shared.activity_tx.subscribe()
    }

    /// Subscribe to state-change events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<CaptureStatusEvent> {
        self.shared.status_tx.subscribe()
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Samples per frame at this engine's geometry.
    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> Arc<Shared> {
        Arc::clone(&self.shared)
    }
}
