//! One `ChannelRing` per channel, all sharing the negotiated window size.

use super::ChannelRing;
use crate::error::Result;

/// Ordered set of equally sized rings. Input and output banks are
/// independent instances and may differ in channel count.
#[derive(Debug)]
pub struct ChannelBank {
    rings: Vec<ChannelRing>,
    capacity: usize,
}

impl ChannelBank {
    /// Allocate `channels` rings of `capacity` samples each.
    pub fn new(channels: usize, capacity: usize) -> Result<Self> {
        let rings = (0..channels)
            .map(|_| ChannelRing::new(capacity))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rings, capacity })
    }

    pub fn channels(&self) -> usize {
        self.rings.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fill level of channel 0 (all channels move in lockstep).
    pub fn fill(&self) -> usize {
        self.rings.first().map(ChannelRing::fill).unwrap_or(0)
    }

    /// Push one host block per channel. Channels the host did not supply
    /// receive `block_len` samples of silence so the bank stays in lockstep.
    pub fn put_all(&mut self, blocks: &[&[f32]], block_len: usize) {
        for (c, ring) in self.rings.iter_mut().enumerate() {
            match blocks.get(c) {
                Some(block) => ring.put(block),
                None => ring.put_silence(block_len),
            }
        }
    }

    /// Pop one host block per channel. Output slices without a matching
    /// ring are zero-filled.
    pub fn get_all(&mut self, blocks: &mut [&mut [f32]]) {
        for (c, block) in blocks.iter_mut().enumerate() {
            match self.rings.get_mut(c) {
                Some(ring) => ring.get(block),
                None => block.fill(0.0),
            }
        }
    }

    /// A full window is buffered. Every `put_all` writes the same number of
    /// samples to every ring, so checking the first one suffices.
    pub fn is_window_ready(&self) -> bool {
        self.rings.first().map(ChannelRing::full).unwrap_or(false)
    }

    /// Move one window per channel into the flat model buffers.
    ///
    /// Every ring gives up a full window, including rings with no flat
    /// buffer to receive it (the clock ring of a method without inputs).
    pub fn drain_into(&mut self, flat: &mut [Vec<f32>]) {
        for (c, ring) in self.rings.iter_mut().enumerate() {
            match flat.get_mut(c) {
                Some(buf) => ring.get(buf),
                None => ring.discard(self.capacity),
            }
        }
    }

    /// Append the flat model buffers, one per channel.
    pub fn fill_from(&mut self, flat: &[Vec<f32>]) {
        for (ring, buf) in self.rings.iter_mut().zip(flat.iter()) {
            ring.put(buf);
        }
    }

    pub fn clear(&mut self) {
        for ring in &mut self.rings {
            ring.clear();
        }
    }
}
