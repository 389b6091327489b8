//! End-to-end capture demo.
//!
//! Opens the default microphone, triggers a recording immediately, stops
//! after one second of silence (or Ctrl-C), prints segmentation stats, and
//! writes the clip to `capture.wav`.
//!
//! ```text
//! RUST_LOG=info cargo run --bin capture_demo
//! ```

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cadence_core::audio::{device::list_input_devices, wav};
use cadence_core::{CaptureConfig, CaptureEngine, SegmentAnalyzer, WaitOutcome};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    for device in list_input_devices() {
        info!(
            name = device.name.as_str(),
            is_default = device.is_default,
            "input device"
        );
    }

    let config = CaptureConfig::default();
    let engine = Arc::new(CaptureEngine::new(config.clone())?);

    // Live level meter: one line every half second of frames.
    let mut activity_rx = engine.subscribe_activity();
    tokio::spawn(async move {
        while let Ok(event) = activity_rx.recv().await {
            if event.seq % 25 == 0 {
                info!(
                    rms = format_args!("{:.4}", event.rms),
                    is_silent = event.is_silent,
                    "level"
                );
            }
        }
    });

    engine.start_listening()?;
    engine.trigger()?;
    info!("recording — speak now; stops after 1 s of silence (Ctrl-C to cancel)");

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    let outcome = {
        let engine = Arc::clone(&engine);
        let cancel = Arc::clone(&cancel);
        tokio::task::spawn_blocking(move || {
            engine.wait_for_auto_stop(Duration::from_millis(10), &cancel)
        })
        .await?
    };
    info!(?outcome, "wait finished");

    match engine.stop_recording() {
        Some(clip) => {
            let mut analyzer = SegmentAnalyzer::new(
                config.sample_rate,
                config.rms_threshold,
                config.frame_duration_ms,
            )?;
            let stats = analyzer.analyze(&clip);
            info!(
                secs = format_args!("{:.2}", clip.duration_secs()),
                pause_mean = format_args!("{:.3}", stats.pause_mean),
                voiced_seconds = format_args!("{:.3}", stats.voiced_seconds),
                "clip finalized"
            );
            wav::write_clip(&clip, "capture.wav")?;
        }
        None => warn!("no speech captured"),
    }

    if outcome != WaitOutcome::ListeningEnded {
        engine.stop_listening();
    }
    Ok(())
}
