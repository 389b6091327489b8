//! Blocking drain loop between the audio ring and the state machine.
//!
//! ## Per iteration
//!
//! ```text
//! 1. Drain ring buffer → raw samples at the capture rate
//! 2. Resample to the engine rate (passthrough when rates match)
//! 3. Slice into exact frame_samples frames, in arrival order
//! 4. Shared::on_frame per frame (classify, buffer, monitor, auto-stop)
//! ```
//!
//! The whole loop runs inside `spawn_blocking`, so the async executor stays
//! free and the real-time cpal callback only ever touches the ring producer.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::audio::resample::RateConverter;
use crate::buffering::{AudioConsumer, Consumer};
use crate::capture::Shared;

/// Samples drained from the ring per iteration: 20 ms at 48 kHz. A frame at
/// the engine rate is never larger than this, so frame delivery lags the
/// callback by at most one drain.
const DRAIN_CHUNK: usize = 960;

/// Sleep when the ring is empty (avoids busy-wait burning a core).
const SLEEP_EMPTY_MS: u64 = 5;

/// Everything the loop needs, passed as one struct so the closure stays tidy.
pub(crate) struct PipelineContext {
    pub shared: Arc<Shared>,
    pub consumer: AudioConsumer,
    pub capture_sample_rate: u32,
    pub engine_sample_rate: u32,
    pub frame_samples: usize,
}

/// Run the drain loop until the engine stops listening.
pub(crate) fn run(mut ctx: PipelineContext) {
    info!(
        capture_rate = ctx.capture_sample_rate,
        engine_rate = ctx.engine_sample_rate,
        frame_samples = ctx.frame_samples,
        "capture pipeline started"
    );

    let mut converter = match RateConverter::new(
        ctx.capture_sample_rate,
        ctx.engine_sample_rate,
        DRAIN_CHUNK,
    ) {
        Ok(c) => c,
        Err(e) => {
            error!("failed to create rate converter: {e}");
            return;
        }
    };

    // Scratch buffer, reused every iteration.
    let mut raw = vec![0f32; DRAIN_CHUNK];
    // Resampled samples waiting to fill the next whole frame.
    let mut pending: Vec<f32> = Vec::with_capacity(ctx.frame_samples * 4);

    loop {
        if !ctx.shared.is_listening() {
            break;
        }

        let n = ctx.consumer.pop_slice(&mut raw);
        if n == 0 {
            // Nothing captured yet — yield briefly.
            std::thread::sleep(std::time::Duration::from_millis(SLEEP_EMPTY_MS));
            continue;
        }

        let resampled = converter.process(&raw[..n]);
        if resampled.is_empty() {
            // Partial chunk — the converter is waiting for more input.
            continue;
        }
        pending.extend_from_slice(&resampled);

        // Deliver whole frames in arrival order; the remainder waits for the
        // next drain. Frames are never skipped or reordered here — that is
        // what keeps the one-second silence window exact.
        while pending.len() >= ctx.frame_samples {
            ctx.shared.on_frame(&pending[..ctx.frame_samples]);
            pending.drain(..ctx.frame_samples);
        }
    }

    if !pending.is_empty() {
        debug!(
            leftover = pending.len(),
            "discarding sub-frame tail at shutdown"
        );
    }

    let snap = ctx.shared.counters.snapshot();
    info!(
        frames_in = snap.frames_in,
        frames_silent = snap.frames_silent,
        frames_buffered = snap.frames_buffered,
        auto_stops = snap.auto_stops,
        "capture pipeline stopped"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    use crate::buffering::{create_audio_ring, Producer};
    use crate::capture::{CaptureConfig, CaptureEngine, CaptureState, WaitOutcome};

    fn spawn_pipeline(engine: &CaptureEngine, consumer: AudioConsumer, capture_rate: u32) -> thread::JoinHandle<()> {
        let ctx = PipelineContext {
            shared: engine.shared(),
            consumer,
            capture_sample_rate: capture_rate,
            engine_sample_rate: engine.config().sample_rate,
            frame_samples: engine.frame_samples(),
        };
        thread::spawn(move || run(ctx))
    }

    fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn passthrough_frames_reach_the_engine_in_order_and_auto_stop_fires() {
        let engine = CaptureEngine::new(CaptureConfig::default()).expect("valid config");
        engine.start_listening_unmanaged().expect("idle engine");
        engine.trigger().expect("listening engine");

        let (mut producer, consumer) = create_audio_ring();
        // 10 voiced frames then exactly one second of silence.
        producer.push_slice(&vec![0.1f32; 10 * 320]);
        producer.push_slice(&vec![0.0f32; 50 * 320]);

        let handle = spawn_pipeline(&engine, consumer, 16_000);

        let cancel = AtomicBool::new(false);
        let outcome = engine.wait_for_auto_stop(Duration::from_millis(5), &cancel);
        assert_eq!(outcome, WaitOutcome::AutoStopped);
        assert_eq!(engine.state(), CaptureState::Listening);

        let clip = engine.stop_recording().expect("frames were buffered");
        assert_eq!(clip.samples.len(), 60 * 320);
        // Arrival order: the voiced head precedes the silent tail.
        assert!(clip.samples[..10 * 320].iter().all(|&s| s == 0.1));
        assert!(clip.samples[10 * 320..].iter().all(|&s| s == 0.0));

        engine.stop_listening();
        handle.join().expect("pipeline thread panicked");

        let counters = engine.counters();
        assert_eq!(counters.frames_in, 60);
        assert_eq!(counters.auto_stops, 1);
    }

    #[test]
    fn resampled_capture_still_produces_engine_rate_frames() {
        let engine = CaptureEngine::new(CaptureConfig::default()).expect("valid config");
        engine.start_listening_unmanaged().expect("idle engine");
        engine.trigger().expect("listening engine");

        let (mut producer, consumer) = create_audio_ring();
        // Half a second of voiced audio at the device rate (48 kHz).
        producer.push_slice(&vec![0.1f32; 24_000]);

        let handle = spawn_pipeline(&engine, consumer, 48_000);

        assert!(
            wait_until(Duration::from_secs(2), || engine.counters().frames_in >= 20),
            "expected resampled frames to arrive"
        );

        engine.stop_listening();
        handle.join().expect("pipeline thread panicked");

        let clip = engine.stop_recording().expect("frames were buffered");
        // ~0.5 s at 16 kHz, delivered in whole 320-sample frames.
        assert_eq!(clip.samples.len() % 320, 0);
        assert!(clip.samples.len() >= 6_400, "len={}", clip.samples.len());
    }

    #[test]
    fn pipeline_exits_when_listening_ends() {
        let engine = CaptureEngine::new(CaptureConfig::default()).expect("valid config");
        engine.start_listening_unmanaged().expect("idle engine");

        let (_producer, consumer) = create_audio_ring();
        let handle = spawn_pipeline(&engine, consumer, 16_000);

        thread::sleep(Duration::from_millis(20));
        engine.stop_listening();
        handle.join().expect("pipeline thread panicked");
        assert_eq!(engine.state(), CaptureState::Idle);
    }
}
