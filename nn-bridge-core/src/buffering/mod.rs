//! Per-channel circular sample storage.
//!
//! Each `ChannelRing` wraps an unsplit `ringbuf::HeapRb<f32>`. The scheduler
//! serializes every access (callback thread only, with the background pass
//! working on separate flat buffers), so the producer and consumer halves are
//! never needed on different threads.
//!
//! The rings are sized to one model window and allocated once at setup.
//! `put`/`get` are allocation-free and safe to call from the audio callback.

pub mod bank;

pub use bank::ChannelBank;

use ringbuf::{
    traits::{Consumer, Observer, Producer},
    HeapRb,
};

use crate::error::{BridgeError, Result};

/// Fixed-capacity FIFO of f32 samples for a single channel.
pub struct ChannelRing {
    inner: HeapRb<f32>,
    capacity: usize,
}

impl ChannelRing {
    /// Allocate a ring holding exactly `capacity` samples.
    ///
    /// # Errors
    /// Returns `BridgeError::Allocation` when `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(BridgeError::Allocation { capacity });
        }
        Ok(Self {
            inner: HeapRb::<f32>::new(capacity),
            capacity,
        })
    }

    /// Append `source` at the write cursor.
    ///
    /// The fill level saturates at `capacity`: when there is not enough room
    /// the oldest unread samples are discarded. The negotiated sizes make
    /// this unreachable in normal operation.
    pub fn put(&mut self, source: &[f32]) {
        let source = if source.len() > self.capacity {
            &source[source.len() - self.capacity..]
        } else {
            source
        };

        let vacant = self.capacity - self.inner.occupied_len();
        if source.len() > vacant {
            self.inner.skip(source.len() - vacant);
        }
        self.inner.push_slice(source);
    }

    /// Append `n` zero samples, with the same saturation rule as `put`.
    pub fn put_silence(&mut self, n: usize) {
        let n = n.min(self.capacity);
        let vacant = self.capacity - self.inner.occupied_len();
        if n > vacant {
            self.inner.skip(n - vacant);
        }
        self.inner.push_iter(std::iter::repeat(0.0).take(n));
    }

    /// Copy `dest.len()` samples out from the read cursor.
    ///
    /// Never reads past the fill level; on underrun the tail of `dest` is
    /// zero-filled.
    pub fn get(&mut self, dest: &mut [f32]) {
        let read = self.inner.pop_slice(dest);
        dest[read..].fill(0.0);
    }

    /// Drop up to `n` unread samples from the read cursor.
    pub fn discard(&mut self, n: usize) {
        let n = n.min(self.inner.occupied_len());
        self.inner.skip(n);
    }

    /// `true` when the number of unread samples equals the capacity.
    pub fn full(&self) -> bool {
        self.inner.occupied_len() == self.capacity
    }

    /// Number of unread samples.
    pub fn fill(&self) -> usize {
        self.inner.occupied_len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Discard all unread samples.
    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

impl std::fmt::Debug for ChannelRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRing")
            .field("capacity", &self.capacity)
            .field("fill", &self.fill())
            .finish()
    }
}
