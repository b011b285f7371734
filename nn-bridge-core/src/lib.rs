//! # nn-bridge-core
//!
//! Runs block-based neural inference inside a fixed-size real-time audio
//! callback.
//!
//! ## Architecture
//!
//! ```text
//! host callback (block N samples)
//!     │
//!     ├─► input ChannelBank   (one ChannelRing per channel, window capacity)
//!     │        │ full window
//!     │        ▼
//!     │   ModelBuffers ──► Backend::perform  (inline, or on a PendingPass thread)
//!     │        │
//!     │        ▼
//!     └─◄ output ChannelBank
//! ```
//!
//! Window length is negotiated once at setup (`negotiate`). The callback is
//! allocation-free in steady state; in background mode the only blocking
//! point is the join of the previous pass.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod buffering;
pub mod engine;
pub mod error;
pub mod host;
pub mod inference;
pub mod ipc;
pub mod negotiate;

// Convenience re-exports for downstream crates
pub use engine::{NnProcessor, ProcessorConfig};
pub use error::BridgeError;
pub use inference::{Backend, BackendHandle, MethodParams, StubBackend, DEFAULT_METHOD};
pub use ipc::events::{ControlMessage, OutletEvent, ProcessorStatus};
pub use negotiate::{fit_to_block, negotiate, power_ceil, NegotiatedBuffer, NegotiatedConfig};
