//! Inference backend abstraction.
//!
//! The `Backend` trait decouples the scheduler from any specific numerical
//! runtime. A backend exposes named methods (operations), each with its own
//! channel counts and rate ratios, plus attribute and layer introspection.
//!
//! `&mut self` on `perform` expresses that backends are stateful. All
//! mutation is serialised through `BackendHandle`'s `parking_lot::Mutex`,
//! which is also what lets a background pass own the backend while the
//! callback thread keeps running.

pub mod locate;
pub mod stub;

pub use locate::resolve_model_path;
pub use stub::StubBackend;

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Method used when none is given or the requested one is unknown.
pub const DEFAULT_METHOD: &str = "forward";

/// Channel layout of one backend method.
///
/// A ratio is the number of audio-rate samples per model-rate sample for
/// that side of the method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodParams {
    pub in_channels: usize,
    pub in_ratio: usize,
    pub out_channels: usize,
    pub out_ratio: usize,
}

impl MethodParams {
    /// Parse the flat `[in_dim, in_ratio, out_dim, out_ratio]` form some
    /// runtimes report. Returns `None` unless exactly four values are given.
    pub fn from_slice(values: &[usize]) -> Option<Self> {
        match *values {
            [in_channels, in_ratio, out_channels, out_ratio] => Some(Self {
                in_channels,
                in_ratio,
                out_channels,
                out_ratio,
            }),
            _ => None,
        }
    }

    /// Largest of the two rate ratios.
    pub fn max_ratio(&self) -> usize {
        self.in_ratio.max(self.out_ratio)
    }
}

/// Contract for inference backends.
pub trait Backend: Send + 'static {
    /// Load a model file.
    ///
    /// # Errors
    /// Returns an error if the file is missing or cannot be parsed.
    fn load(&mut self, path: &Path) -> Result<()>;

    /// Reload the current model from disk.
    fn reload(&mut self) -> Result<()>;

    fn is_loaded(&self) -> bool;

    /// Channel layout for `method`, or `None` if the model has no such method.
    fn method_params(&self, method: &str) -> Option<MethodParams>;

    /// Minimum window length: the largest rate ratio across all methods.
    fn higher_ratio(&self) -> usize;

    /// Run `method` on one window.
    ///
    /// `inputs` and `outputs` hold one contiguous array of `n_vec` samples
    /// per channel. Implementations must fully overwrite every output array.
    fn perform(
        &mut self,
        inputs: &[Vec<f32>],
        outputs: &mut [Vec<f32>],
        n_vec: usize,
        method: &str,
        n_batches: usize,
    ) -> Result<()>;

    fn settable_attributes(&self) -> Vec<String>;

    /// # Errors
    /// Fails with a descriptive error on an unknown name or malformed value.
    fn set_attribute(&mut self, name: &str, args: &[String]) -> Result<()>;

    fn attribute_as_string(&self, name: &str) -> Result<String>;

    fn available_layers(&self) -> Vec<String>;

    fn layer_weights(&self, layer: &str) -> Result<Vec<f32>>;

    fn set_layer_weights(&mut self, layer: &str, weights: &[f32]) -> Result<()>;
}

/// Thread-safe reference-counted handle to any `Backend` implementor.
///
/// Uses `parking_lot::Mutex` for non-poisoning on panic: a backend that
/// panics inside a pass stays usable for the next window.
#[derive(Clone)]
pub struct BackendHandle(pub Arc<Mutex<dyn Backend>>);

impl BackendHandle {
    /// Wrap any `Backend` in a `BackendHandle`.
    pub fn new<B: Backend>(backend: B) -> Self {
        Self(Arc::new(Mutex::new(backend)))
    }
}

impl std::fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendHandle").finish_non_exhaustive()
    }
}
