//! `NnProcessor`: the per-instance processing object.
//!
//! ## Lifecycle
//!
//! ```text
//! NnProcessor::new()
//!     ├─► resolve + load model      (failure → unloaded, callbacks emit silence)
//!     ├─► look up method params     (unknown → falls back to "forward")
//!     ├─► negotiate buffer size     (too small → clamped, warning;
//!     │                              grown to a multiple of the host block)
//!     └─► allocate rings + flat buffers
//! prepare(block_size)               host (re)starts DSP
//! perform(inputs, outputs)          once per audio callback, see `scheduler`
//! drop                              joins any outstanding background pass
//! ```
//!
//! Control operations (`set_attribute`, `reload`, ...) lock the backend and
//! may therefore wait for an in-flight background pass. They must not be
//! called from the audio callback.

pub mod pass;
pub mod scheduler;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    buffering::ChannelBank,
    error::{BridgeError, Result},
    inference::{resolve_model_path, BackendHandle, MethodParams, DEFAULT_METHOD},
    ipc::events::{OutletEvent, ProcessorStatus},
    negotiate::{negotiate, NegotiatedConfig},
};

use pass::{ModelBuffers, PassOutcome, PendingPass};
use scheduler::ProcessorDiagnostics;

/// Outlet broadcast capacity: replies buffered for slow consumers.
const OUTLET_CAP: usize = 64;

/// Layout assumed when the backend cannot describe any method.
const FALLBACK_PARAMS: MethodParams = MethodParams {
    in_channels: 1,
    in_ratio: 1,
    out_channels: 1,
    out_ratio: 1,
};

/// Setup-time parameters for `NnProcessor`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct ProcessorConfig {
    /// Model file. Relative paths are resolved against `search_paths`.
    /// `None` uses the backend as handed in, without loading anything.
    pub model_path: Option<PathBuf>,
    /// Backend method to run. Default: `"forward"`.
    pub method: String,
    /// Requested window length in samples. 0 selects synchronous mode with
    /// the backend's minimum window. Default: 4096.
    pub buffer_size: usize,
    /// Host callback block size in samples. Default: 64.
    pub block_size: usize,
    /// Directories probed for relative model paths, in order.
    pub search_paths: Vec<PathBuf>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            method: DEFAULT_METHOD.to_string(),
            buffer_size: 4096,
            block_size: 64,
            search_paths: Vec::new(),
        }
    }
}

impl ProcessorConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw).map_err(anyhow::Error::from)?;
        Ok(config)
    }
}

/// One processing instance bound to one backend.
pub struct NnProcessor {
    config: ProcessorConfig,
    backend: BackendHandle,
    method: Arc<str>,
    negotiated: NegotiatedConfig,
    settable_attributes: Vec<String>,
    enabled: bool,
    /// Last observed backend load state. Refreshed whenever the backend lock
    /// is free, so the callback never waits on a running pass to read it.
    loaded: bool,
    block_size: usize,
    in_bank: ChannelBank,
    out_bank: ChannelBank,
    /// `None` while a background pass owns the buffers.
    buffers: Option<ModelBuffers>,
    pending: Option<PendingPass>,
    outlet_tx: broadcast::Sender<OutletEvent>,
    diagnostics: Arc<ProcessorDiagnostics>,
}

impl NnProcessor {
    /// Build a processor around `backend`.
    ///
    /// Model and method problems are reported and degrade to an unloaded or
    /// default-method processor; they never fail construction.
    ///
    /// # Errors
    /// Only `BridgeError::Allocation`, if a ring cannot be created.
    pub fn new(config: ProcessorConfig, backend: BackendHandle) -> Result<Self> {
        let mut method = if config.method.is_empty() {
            DEFAULT_METHOD.to_string()
        } else {
            config.method.clone()
        };

        let (loaded, params, settable_attributes, higher_ratio) = {
            let mut model = backend.0.lock();

            if let Some(path) = &config.model_path {
                let load_result = resolve_model_path(path, &config.search_paths)
                    .and_then(|resolved| {
                        info!(path = %resolved.display(), "loading model");
                        model.load(&resolved)
                    });
                if let Err(e) = load_result {
                    warn!("error during loading: {e}");
                }
            }

            let params = match model.method_params(&method) {
                Some(params) => params,
                None => {
                    if model.is_loaded() {
                        warn!(
                            "{}, using {DEFAULT_METHOD} instead",
                            BridgeError::UnknownMethod(method.clone())
                        );
                    }
                    method = DEFAULT_METHOD.to_string();
                    model.method_params(&method).unwrap_or(FALLBACK_PARAMS)
                }
            };

            (
                model.is_loaded(),
                params,
                model.settable_attributes(),
                model.higher_ratio(),
            )
        };

        let buffer = negotiate(config.buffer_size, higher_ratio);
        let mut negotiated = NegotiatedConfig::new(params, higher_ratio, buffer);
        negotiated.fit_block_size(config.block_size);

        // At least one input ring so windows keep ticking for generator
        // methods that take no audio input.
        let in_bank = ChannelBank::new(params.in_channels.max(1), negotiated.buffer_size)?;
        let out_bank = ChannelBank::new(params.out_channels, negotiated.buffer_size)?;
        let buffers = ModelBuffers::new(
            params.in_channels,
            params.out_channels,
            negotiated.buffer_size,
        );

        info!(
            method = method.as_str(),
            loaded,
            in_channels = params.in_channels,
            out_channels = params.out_channels,
            buffer_size = negotiated.buffer_size,
            background = negotiated.use_background,
            "processor ready"
        );

        let (outlet_tx, _) = broadcast::channel(OUTLET_CAP);
        let block_size = config.block_size;

        Ok(Self {
            config,
            backend,
            method: Arc::from(method),
            negotiated,
            settable_attributes,
            enabled: true,
            loaded,
            block_size,
            in_bank,
            out_bank,
            buffers: Some(buffers),
            pending: None,
            outlet_tx,
            diagnostics: Arc::new(ProcessorDiagnostics::default()),
        })
    }

    /// Host (re)started DSP with a new block size.
    ///
    /// Joins any outstanding pass and clears all buffered audio. If the block
    /// does not divide the window, the window grows and the rings are
    /// reallocated.
    ///
    /// # Errors
    /// `BridgeError::Allocation` if a resized ring cannot be created.
    pub fn prepare(&mut self, block_size: usize) -> Result<()> {
        self.finish_pending();
        self.block_size = block_size;

        if self.negotiated.fit_block_size(block_size) {
            let capacity = self.negotiated.buffer_size;
            let in_bank = ChannelBank::new(self.in_bank.channels(), capacity)?;
            let out_bank = ChannelBank::new(self.out_bank.channels(), capacity)?;
            self.in_bank = in_bank;
            self.out_bank = out_bank;
            self.buffers = Some(self.fresh_buffers());
        } else {
            self.in_bank.clear();
            self.out_bank.clear();
            if let Some(buffers) = self.buffers.as_mut() {
                buffers.silence_outputs();
            }
        }
        debug!(
            block_size,
            buffer_size = self.negotiated.buffer_size,
            "processor prepared"
        );
        Ok(())
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Reload the model from disk. Waits for any in-flight pass first.
    pub fn reload(&mut self) -> Result<()> {
        self.finish_pending();
        let mut model = self.backend.0.lock();
        let result = model.reload();
        self.loaded = model.is_loaded();
        match &result {
            Ok(()) => info!("model reloaded"),
            Err(e) => warn!("reload failed: {e}"),
        }
        result
    }

    /// Set a backend attribute from string arguments.
    ///
    /// # Errors
    /// `AttributeNotSettable` for names the model did not declare,
    /// `MissingArguments` without values, or the backend's own error for a
    /// malformed value. State is unchanged on error.
    pub fn set_attribute(&mut self, name: &str, args: &[String]) -> Result<()> {
        if !self.settable_attributes.iter().any(|a| a == name) {
            let err = BridgeError::AttributeNotSettable(name.to_string());
            warn!("{err}");
            return Err(err);
        }
        if args.is_empty() {
            let err = BridgeError::MissingArguments(name.to_string());
            warn!("{err}");
            return Err(err);
        }

        debug!(name, ?args, "setting attribute");
        self.backend
            .0
            .lock()
            .set_attribute(name, args)
            .inspect_err(|e| warn!("{e}"))
    }

    /// Current value of an attribute, also sent on the outlet.
    pub fn attribute(&self, name: &str) -> Result<String> {
        let value = self
            .backend
            .0
            .lock()
            .attribute_as_string(name)
            .inspect_err(|e| warn!("{e}"))?;
        let _ = self.outlet_tx.send(OutletEvent::Attribute {
            name: name.to_string(),
            value: value.clone(),
        });
        Ok(value)
    }

    /// Names of the model's layers, also sent on the outlet.
    pub fn layers(&self) -> Vec<String> {
        let names = self.backend.0.lock().available_layers();
        let _ = self.outlet_tx.send(OutletEvent::Layers {
            names: names.clone(),
        });
        names
    }

    /// Flattened weights of one layer, also sent on the outlet.
    pub fn layer_weights(&self, layer: &str) -> Result<Vec<f32>> {
        let weights = self
            .backend
            .0
            .lock()
            .layer_weights(layer)
            .inspect_err(|e| warn!("{e}"))?;
        let _ = self.outlet_tx.send(OutletEvent::Layer {
            name: layer.to_string(),
            weights: weights.clone(),
        });
        Ok(weights)
    }

    pub fn set_layer_weights(&mut self, layer: &str, weights: &[f32]) -> Result<()> {
        debug!(layer, count = weights.len(), "setting layer weights");
        self.backend
            .0
            .lock()
            .set_layer_weights(layer, weights)
            .inspect_err(|e| warn!("{e}"))
    }

    /// Subscribe to replies for `get`, `layers` and `get_weights`.
    pub fn subscribe_outlet(&self) -> broadcast::Receiver<OutletEvent> {
        self.outlet_tx.subscribe()
    }

    pub fn status(&self) -> ProcessorStatus {
        if !self.loaded {
            ProcessorStatus::Unloaded
        } else if !self.enabled {
            ProcessorStatus::Disabled
        } else if self.pending.is_some() {
            ProcessorStatus::Computing
        } else {
            ProcessorStatus::Running
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn negotiated(&self) -> &NegotiatedConfig {
        &self.negotiated
    }

    /// Method actually in use (after any fallback).
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn settable_attributes(&self) -> &[String] {
        &self.settable_attributes
    }

    /// Unread samples in the first input ring.
    pub fn input_fill(&self) -> usize {
        self.in_bank.fill()
    }

    /// Unread samples in the first output ring.
    pub fn output_fill(&self) -> usize {
        self.out_bank.fill()
    }

    pub fn has_pending_pass(&self) -> bool {
        self.pending.is_some()
    }

    pub fn diagnostics(&self) -> Arc<ProcessorDiagnostics> {
        Arc::clone(&self.diagnostics)
    }

    pub fn diagnostics_snapshot(&self) -> scheduler::DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    /// Join the outstanding pass, if any, and take its buffers back.
    fn finish_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            let outcome = pending.join();
            self.absorb_outcome(outcome);
        }
    }

    fn absorb_outcome(&mut self, outcome: Result<PassOutcome>) {
        match outcome {
            Ok(PassOutcome { buffers, result }) => {
                if let Err(e) = result {
                    self.report_pass_error(&e);
                }
                self.buffers = Some(buffers);
            }
            Err(e) => {
                self.report_pass_error(&e);
                self.buffers = Some(self.fresh_buffers());
            }
        }
    }

    fn fresh_buffers(&self) -> ModelBuffers {
        ModelBuffers::new(
            self.negotiated.input_channels,
            self.negotiated.output_channels,
            self.negotiated.buffer_size,
        )
    }

    fn report_pass_error(&self, err: &BridgeError) {
        self.diagnostics.record_inference_error();
        warn!("computation pass failed, window replaced with silence: {err}");
    }
}

impl Drop for NnProcessor {
    fn drop(&mut self) {
        if self.pending.is_some() {
            debug!("joining outstanding pass before teardown");
            self.finish_pending();
        }
    }
}

impl std::fmt::Debug for NnProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NnProcessor")
            .field("method", &self.method)
            .field("negotiated", &self.negotiated)
            .field("enabled", &self.enabled)
            .field("loaded", &self.loaded)
            .field("pending", &self.pending.is_some())
            .finish_non_exhaustive()
    }
}
