mod ringbuffer;
pub mod history;

use ringbuffer::SliceableRingBuffer;

pub use history::{BeatHistory, BeatRecord};

/// One amplitude reading as delivered by the transport.
#[derive(Debug, Clone, Copy, PartialEq, uniffi::Record)]
pub struct Sample {
    pub amplitude: f64,
    pub timestamp_ms: i64,
}

impl Sample {
    pub fn new(amplitude: f64, timestamp_ms: i64) -> Self {
        Self {
            amplitude,
            timestamp_ms,
        }
    }
}

/// Rolling window of the most recent samples. Amplitudes and timestamps are
/// kept in lockstep so an index into one is valid for the other.
pub struct SampleBuffer {
    amplitudes: SliceableRingBuffer<f64>,
    timestamps: SliceableRingBuffer<i64>,
    received: u64,
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            amplitudes: SliceableRingBuffer::new(capacity, 0.0),
            timestamps: SliceableRingBuffer::new(capacity, 0),
            received: 0,
        }
    }

    pub fn push(&mut self, sample: Sample) {
        self.amplitudes.write(sample.amplitude);
        self.timestamps.write(sample.timestamp_ms);
        self.received += 1;
    }

    pub fn len(&self) -> usize {
        self.amplitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.amplitudes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.amplitudes.capacity()
    }

    /// Total number of samples pushed since construction or the last clear.
    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn amplitudes(&self) -> &[f64] {
        self.amplitudes.get_slice()
    }

    pub fn timestamps(&self) -> &[i64] {
        self.timestamps.get_slice()
    }

    pub fn recent_amplitudes(&self, len: usize) -> &[f64] {
        self.amplitudes.get_slice_with_len(len)
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.timestamps.last().copied()
    }

    pub fn clear(&mut self) {
        self.amplitudes.clear();
        self.timestamps.clear();
        self.received = 0;
    }
}
