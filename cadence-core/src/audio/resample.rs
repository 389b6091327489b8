//! Device-rate to engine-rate conversion.
//!
//! Capture hardware usually runs at 44.1 or 48 kHz while the frame pipeline
//! wants 16 kHz. The conversion runs on the pipeline thread, where allocation
//! is allowed, through a rubato `FastFixedIn` session. Matching rates skip
//! rubato entirely and input is copied through unchanged.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{error, info};

use crate::error::{CadenceError, Result};

/// Fixed-ratio mono f32 rate converter.
///
/// Input arrives in whatever slice lengths the ring drain produces; rubato
/// consumes whole blocks of `block` samples, so any sub-block remainder is
/// carried in `backlog` until the next call.
pub struct RateConverter {
    /// `None` when input and output rates match.
    inner: Option<FastFixedIn<f32>>,
    /// Samples waiting for the next full block.
    backlog: Vec<f32>,
    /// Rubato input block size in samples.
    block: usize,
    /// Reusable rubato output buffer, one channel wide.
    scratch: Vec<Vec<f32>>,
}

impl RateConverter {
    /// # Errors
    /// `CadenceError::AudioStream` when rubato rejects the rate pair.
    pub fn new(capture_rate: u32, engine_rate: u32, block: usize) -> Result<Self> {
        if capture_rate == engine_rate {
            return Ok(Self {
                inner: None,
                backlog: Vec::new(),
                block,
                scratch: Vec::new(),
            });
        }

        let inner = FastFixedIn::<f32>::new(
            engine_rate as f64 / capture_rate as f64,
            1.0, // ratio never adjusted at runtime
            PolynomialDegree::Cubic,
            block,
            1, // mono
        )
        .map_err(|e| {
            CadenceError::AudioStream(format!(
                "cannot resample {capture_rate} Hz to {engine_rate} Hz: {e}"
            ))
        })?;

        let scratch = vec![vec![0f32; inner.output_frames_max()]];
        info!(capture_rate, engine_rate, block, "rate conversion active");

        Ok(Self {
            inner: Some(inner),
            backlog: Vec::new(),
            block,
            scratch,
        })
    }

    /// Convert a slice of captured samples.
    ///
    /// Returns everything that can be produced from whole blocks of the
    /// accumulated input; empty while the backlog is still short of one
    /// block. A per-block rubato failure is logged and that block dropped,
    /// never surfaced — the pipeline must keep draining the ring.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let Some(inner) = self.inner.as_mut() else {
            return input.to_vec();
        };

        self.backlog.extend_from_slice(input);
        let ready = (self.backlog.len() / self.block) * self.block;
        if ready == 0 {
            return Vec::new();
        }

        let mut out = Vec::with_capacity((ready / self.block) * self.scratch[0].len());
        for chunk in self.backlog[..ready].chunks_exact(self.block) {
            match inner.process_into_buffer(&[chunk], &mut self.scratch, None) {
                Ok((_, produced)) => out.extend_from_slice(&self.scratch[0][..produced]),
                Err(e) => error!("rate conversion failed for one block: {e}"),
            }
        }
        self.backlog.drain(..ready);
        out
    }

    /// `true` when the converter copies input through unchanged.
    pub fn is_passthrough(&self) -> bool {
        self.inner.is_none()
    }
}
