//! Computation pass: one backend call over one window.
//!
//! ## Ownership handoff
//!
//! ```text
//! callback thread                      background thread
//! ───────────────                      ─────────────────
//! drain rings → ModelBuffers ──move──► run_pass(ModelBuffers)
//!                                          │
//! PendingPass::join() ◄──────move──── PassOutcome { buffers, result }
//! ```
//!
//! The flat buffers are the only data the two threads share, and they are
//! moved, not borrowed: the callback thread cannot touch them again until it
//! joins. There is no cancellation; a launched pass always runs to completion.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::{BridgeError, Result};
use crate::inference::BackendHandle;

/// Batch size passed to the backend. Always one window at a time.
const BATCH_SIZE: usize = 1;

const PASS_THREAD_NAME: &str = "nn-bridge-pass";

/// Contiguous per-channel arrays exchanged with the backend.
#[derive(Debug, Clone)]
pub struct ModelBuffers {
    pub inputs: Vec<Vec<f32>>,
    pub outputs: Vec<Vec<f32>>,
}

impl ModelBuffers {
    /// Allocate zeroed buffers of `buffer_size` samples per channel.
    pub fn new(input_channels: usize, output_channels: usize, buffer_size: usize) -> Self {
        Self {
            inputs: vec![vec![0.0; buffer_size]; input_channels],
            outputs: vec![vec![0.0; buffer_size]; output_channels],
        }
    }

    pub fn silence_outputs(&mut self) {
        for out in &mut self.outputs {
            out.fill(0.0);
        }
    }
}

/// Invoke the backend over the current input window.
///
/// Errors and panics raised by the backend are caught here. On failure the
/// output arrays are zero-filled so the window plays back as silence, and
/// the error is returned for the caller to report.
pub fn run_pass(
    backend: &BackendHandle,
    buffers: &mut ModelBuffers,
    buffer_size: usize,
    method: &str,
) -> Result<()> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut model = backend.0.lock();
        model.perform(
            &buffers.inputs,
            &mut buffers.outputs,
            buffer_size,
            method,
            BATCH_SIZE,
        )
    }));

    let result = match outcome {
        Ok(result) => result,
        Err(payload) => Err(BridgeError::PassPanicked(panic_message(payload.as_ref()))),
    };

    if result.is_err() {
        buffers.silence_outputs();
    }
    result
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Buffers returned by a finished background pass, with its result.
#[derive(Debug)]
pub struct PassOutcome {
    pub buffers: ModelBuffers,
    pub result: Result<()>,
}

/// Handle to the single in-flight background pass.
///
/// Must be joined before another pass is launched and before the backend is
/// released. Dropping a `PendingPass` without joining detaches the thread;
/// `NnProcessor` never does that.
#[derive(Debug)]
pub struct PendingPass {
    handle: JoinHandle<PassOutcome>,
}

impl PendingPass {
    /// Launch a pass on a fresh thread that owns `buffers` until joined.
    ///
    /// # Errors
    /// Returns `BridgeError::Io` if the OS refuses to create the thread. The
    /// buffers are lost in that case and must be reallocated.
    pub fn spawn(
        backend: BackendHandle,
        mut buffers: ModelBuffers,
        buffer_size: usize,
        method: Arc<str>,
    ) -> Result<Self> {
        let handle = thread::Builder::new()
            .name(PASS_THREAD_NAME.into())
            .spawn(move || {
                let result = run_pass(&backend, &mut buffers, buffer_size, &method);
                PassOutcome { buffers, result }
            })?;
        Ok(Self { handle })
    }

    /// `true` once the pass has returned; joining will not block.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the pass completes and take its buffers back.
    ///
    /// # Errors
    /// `BridgeError::PassPanicked` if the thread died outside the backend
    /// call; the buffers are lost in that case.
    pub fn join(self) -> Result<PassOutcome> {
        self.handle.join().map_err(|payload| {
            BridgeError::PassPanicked(panic_message(payload.as_ref()))
        })
    }
}
