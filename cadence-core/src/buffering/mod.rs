//! Lock-free SPSC ring buffer between the audio callback and the pipeline.
//!
//! Uses `ringbuf::HeapRb<f32>` whose wait-free `push_slice` is safe to call
//! from the real-time audio callback.

pub mod frame;
pub mod frame_buffer;

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Producer};

/// Type alias for the producer half — held by the audio callback thread.
pub type AudioProducer = ringbuf::HeapProd<f32>;

/// Type alias for the consumer half — held by the pipeline thread.
pub type AudioConsumer = ringbuf::HeapCons<f32>;

/// Buffer capacity: 2^21 = 2 097 152 f32 samples ≈ 43.7 s at 48 kHz.
/// Far more headroom than one polling interval needs; frames are never
/// dropped because the consumer briefly lagged.
pub const RING_CAPACITY: usize = 1 << 21;

/// Create a matched producer/consumer pair backed by a heap-allocated ring buffer.
///
/// # Panics
/// Never panics — `HeapRb` construction cannot fail for reasonable capacities.
pub fn create_audio_ring() -> (AudioProducer, AudioConsumer) {
    HeapRb::<f32>::new(RING_CAPACITY).split()
}
