//! Per-callback scheduling.
//!
//! ## Steps (per host callback)
//!
//! ```text
//! 1. Disabled or unloaded → zero every output, return (nothing is buffered)
//! 2. Push the input block into the input bank
//! 3. Input bank full → window ready:
//!    background   join previous pass → drain inputs → push previous
//!                 results to output bank → launch next pass
//!    synchronous  drain inputs → run pass inline → push its results
//! 4. Pop one block from the output bank into the outputs
//! ```
//!
//! In background mode the results pushed at window N were computed during
//! window N−1, which adds exactly one window of latency. In synchronous mode
//! the callback stalls for the whole backend call instead.
//!
//! Steady-state callbacks do not allocate, lock, or log. The only blocking
//! point is the join of a background pass that has not finished by the time
//! the next window fills.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tracing::error;

use super::pass::{run_pass, PendingPass};
use super::NnProcessor;

#[derive(Default)]
pub struct ProcessorDiagnostics {
    pub callbacks: AtomicUsize,
    pub silent_callbacks: AtomicUsize,
    pub windows: AtomicUsize,
    pub passes: AtomicUsize,
    pub inference_errors: AtomicUsize,
    pub joins_waited: AtomicUsize,
}

impl ProcessorDiagnostics {
    pub fn reset(&self) {
        self.callbacks.store(0, Ordering::Relaxed);
        self.silent_callbacks.store(0, Ordering::Relaxed);
        self.windows.store(0, Ordering::Relaxed);
        self.passes.store(0, Ordering::Relaxed);
        self.inference_errors.store(0, Ordering::Relaxed);
        self.joins_waited.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            callbacks: self.callbacks.load(Ordering::Relaxed),
            silent_callbacks: self.silent_callbacks.load(Ordering::Relaxed),
            windows: self.windows.load(Ordering::Relaxed),
            passes: self.passes.load(Ordering::Relaxed),
            inference_errors: self.inference_errors.load(Ordering::Relaxed),
            joins_waited: self.joins_waited.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_inference_error(&self) {
        self.inference_errors.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub callbacks: usize,
    pub silent_callbacks: usize,
    pub windows: usize,
    pub passes: usize,
    pub inference_errors: usize,
    /// Windows where the previous background pass was still running and the
    /// callback had to block on the join.
    pub joins_waited: usize,
}

impl NnProcessor {
    /// Process one host callback.
    ///
    /// `inputs` holds one block per input channel and `outputs` one block per
    /// output channel, all of the host block size. Missing input channels
    /// read as silence; outputs beyond the method's channel count are zeroed.
    pub fn perform(&mut self, inputs: &[&[f32]], outputs: &mut [&mut [f32]]) {
        self.diagnostics.callbacks.fetch_add(1, Ordering::Relaxed);

        if !self.enabled || !self.observe_loaded() {
            for out in outputs.iter_mut() {
                out.fill(0.0);
            }
            self.diagnostics
                .silent_callbacks
                .fetch_add(1, Ordering::Relaxed);
            return;
        }

        let block_len = inputs
            .first()
            .map(|block| block.len())
            .unwrap_or(self.block_size);
        self.in_bank.put_all(inputs, block_len);

        if self.in_bank.is_window_ready() {
            self.diagnostics.windows.fetch_add(1, Ordering::Relaxed);
            if self.negotiated.use_background {
                self.schedule_background();
            } else {
                self.compute_inline();
            }
        }

        self.out_bank.get_all(outputs);
    }

    /// Load state without ever waiting on the backend lock. While a pass
    /// holds the lock the last observed value is reused.
    fn observe_loaded(&mut self) -> bool {
        if let Some(model) = self.backend.0.try_lock() {
            self.loaded = model.is_loaded();
        }
        self.loaded
    }

    fn compute_inline(&mut self) {
        let buffer_size = self.negotiated.buffer_size;
        let mut buffers = match self.buffers.take() {
            Some(buffers) => buffers,
            None => self.fresh_buffers(),
        };

        self.in_bank.drain_into(&mut buffers.inputs);
        if let Err(e) = run_pass(&self.backend, &mut buffers, buffer_size, &self.method) {
            self.report_pass_error(&e);
        }
        self.diagnostics.passes.fetch_add(1, Ordering::Relaxed);
        self.out_bank.fill_from(&buffers.outputs);

        self.buffers = Some(buffers);
    }

    fn schedule_background(&mut self) {
        if let Some(pending) = self.pending.take() {
            if !pending.is_finished() {
                self.diagnostics.joins_waited.fetch_add(1, Ordering::Relaxed);
            }
            let outcome = pending.join();
            self.absorb_outcome(outcome);
        }

        let mut buffers = match self.buffers.take() {
            Some(buffers) => buffers,
            None => self.fresh_buffers(),
        };

        self.in_bank.drain_into(&mut buffers.inputs);
        // Results of the previous window (silence before the first pass).
        self.out_bank.fill_from(&buffers.outputs);

        match PendingPass::spawn(
            self.backend.clone(),
            buffers,
            self.negotiated.buffer_size,
            self.method.clone(),
        ) {
            Ok(pending) => {
                self.pending = Some(pending);
                self.diagnostics.passes.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                error!("failed to launch background pass: {e}");
                self.diagnostics.record_inference_error();
                self.buffers = Some(self.fresh_buffers());
            }
        }
    }
}
