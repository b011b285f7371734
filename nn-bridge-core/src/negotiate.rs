//! One-time buffer-size negotiation.
//!
//! ## Policy
//!
//! 1. A requested size of 0 selects synchronous mode with the smallest window
//!    the backend accepts (`higher_ratio`).
//! 2. A request below `higher_ratio` is clamped up to it, with a warning.
//! 3. Anything else is rounded up to the next power of two.
//! 4. The window is then grown to a whole multiple of the host block, so every
//!    `put` of one block lands on a window boundary.
//!
//! The backend only processes whole windows at its native rate ratio, so a
//! window smaller than `higher_ratio` cannot hold one sample of its
//! slowest-changing channel.

use serde::Serialize;
use tracing::warn;

use crate::inference::MethodParams;

/// Smallest power of two `>= x`. Any `x <= 1` maps to 1.
pub fn power_ceil(x: usize) -> usize {
    if x <= 1 {
        return 1;
    }
    x.next_power_of_two()
}

/// Smallest multiple of `buffer_size` that is also a multiple of
/// `block_size`. A `block_size` of 0 leaves the window unchanged.
pub fn fit_to_block(buffer_size: usize, block_size: usize) -> usize {
    if block_size == 0 || buffer_size == 0 || buffer_size % block_size == 0 {
        return buffer_size;
    }
    buffer_size / gcd(buffer_size, block_size) * block_size
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Outcome of reconciling the requested size against the backend minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedBuffer {
    /// Window length in samples; also the capacity of every ring.
    pub buffer_size: usize,
    /// Run computation passes on a background thread.
    pub use_background: bool,
    /// Set when the request was below the backend minimum.
    pub clamped_from: Option<usize>,
}

/// Apply the negotiation policy.
///
/// `higher_ratio` of 0 is treated as 1.
pub fn negotiate(requested: usize, higher_ratio: usize) -> NegotiatedBuffer {
    let higher_ratio = higher_ratio.max(1);

    if requested == 0 {
        return NegotiatedBuffer {
            buffer_size: higher_ratio,
            use_background: false,
            clamped_from: None,
        };
    }

    if requested < higher_ratio {
        warn!(
            requested,
            minimum = higher_ratio,
            "buffer size too small, switching to {higher_ratio}"
        );
        return NegotiatedBuffer {
            buffer_size: higher_ratio,
            use_background: true,
            clamped_from: Some(requested),
        };
    }

    NegotiatedBuffer {
        buffer_size: power_ceil(requested),
        use_background: true,
        clamped_from: None,
    }
}

/// Full setup-time configuration of a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiatedConfig {
    pub input_channels: usize,
    pub input_ratio: usize,
    pub output_channels: usize,
    pub output_ratio: usize,
    pub buffer_size: usize,
    pub higher_ratio: usize,
    pub use_background: bool,
}

impl NegotiatedConfig {
    pub fn new(params: MethodParams, higher_ratio: usize, buffer: NegotiatedBuffer) -> Self {
        Self {
            input_channels: params.in_channels,
            input_ratio: params.in_ratio,
            output_channels: params.out_channels,
            output_ratio: params.out_ratio,
            buffer_size: buffer.buffer_size,
            higher_ratio,
            use_background: buffer.use_background,
        }
    }

    /// Grow the window to a whole multiple of the host block.
    ///
    /// Returns `true` when `buffer_size` changed and the rings must be
    /// reallocated.
    pub fn fit_block_size(&mut self, block_size: usize) -> bool {
        if block_size == 0 {
            warn!("host block size is zero");
            return false;
        }
        let fitted = fit_to_block(self.buffer_size, block_size);
        if fitted == self.buffer_size {
            return false;
        }
        warn!(
            block_size,
            requested = self.buffer_size,
            buffer_size = fitted,
            "model window is not a multiple of the host block, switching to {fitted}"
        );
        self.buffer_size = fitted;
        true
    }
}
