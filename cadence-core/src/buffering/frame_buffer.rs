//! Growable store for the frames of one recording session.

use super::frame::{AudioClip, AudioFrame};

/// Accumulates fixed-size frames into one sample sequence.
///
/// Invariant: `total_samples` always equals the sum of the stored frame
/// lengths; `clear` resets both together.
#[derive(Debug)]
pub struct FrameBuffer {
    sample_rate: u32,
    frames: Vec<AudioFrame>,
    total_samples: usize,
}

impl FrameBuffer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            frames: Vec::new(),
            total_samples: 0,
        }
    }

    /// Append a mono frame. Empty frames are ignored.
    pub fn add_frame(&mut self, frame: &[f32]) {
        if frame.is_empty() {
            return;
        }
        self.total_samples += frame.len();
        self.frames.push(AudioFrame::mono(frame.to_vec()));
    }

    /// Concatenate all buffered frames in arrival order.
    ///
    /// Returns `None` when no frame was ever added — callers treat that as
    /// "no speech captured", not an error. Does not mutate the buffer.
    pub fn get_audio(&self) -> Option<AudioClip> {
        if self.frames.is_empty() {
            return None;
        }
        let mut samples = Vec::with_capacity(self.total_samples);
        for frame in &self.frames {
            samples.extend_from_slice(&frame.samples);
        }
        Some(AudioClip::mono(samples, self.sample_rate))
    }

    /// Drop all frames and reset the sample count.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.total_samples = 0;
    }

    /// Buffered duration in seconds; 0.0 when the sample rate is zero.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.total_samples as f64 / self.sample_rate as f64
    }

    pub fn total_samples(&self) -> usize {
        self.total_samples
    }

    /// Number of buffered frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_samples_tracks_sum_of_frame_lengths() {
        let mut buf = FrameBuffer::new(16_000);
        buf.add_frame(&[0.1; 320]);
        buf.add_frame(&[0.2; 320]);
        buf.add_frame(&[0.3; 100]);
        assert_eq!(buf.total_samples(), 740);
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn empty_frames_are_ignored() {
        let mut buf = FrameBuffer::new(16_000);
        buf.add_frame(&[]);
        assert!(buf.is_empty());
        assert_eq!(buf.total_samples(), 0);
        assert!(buf.get_audio().is_none());
    }

    #[test]
    fn get_audio_concatenates_in_arrival_order() {
        let mut buf = FrameBuffer::new(16_000);
        buf.add_frame(&[0.1, 0.2]);
        buf.add_frame(&[0.3]);
        let clip = buf.get_audio().expect("buffer has frames");
        assert_eq!(clip.samples, vec![0.1, 0.2, 0.3]);
        assert_eq!(clip.sample_rate, 16_000);
        // Read-only: a second call sees the same contents.
        assert_eq!(buf.get_audio().expect("still buffered").samples.len(), 3);
    }

    #[test]
    fn round_trip_length_matches_frames_added() {
        let mut buf = FrameBuffer::new(16_000);
        for _ in 0..50 {
            buf.add_frame(&[0.05; 320]);
        }
        let clip = buf.get_audio().expect("buffer has frames");
        assert_eq!(clip.samples.len(), 50 * 320);
        assert!((buf.duration_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn clear_resets_frames_and_count_together() {
        let mut buf = FrameBuffer::new(16_000);
        buf.add_frame(&[0.1; 320]);
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.total_samples(), 0);
        assert!(buf.get_audio().is_none());
        assert_eq!(buf.duration_secs(), 0.0);
    }

    #[test]
    fn zero_sample_rate_reports_zero_duration() {
        let mut buf = FrameBuffer::new(0);
        buf.add_frame(&[0.1; 320]);
        assert_eq!(buf.duration_secs(), 0.0);
    }
}
