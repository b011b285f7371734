//! `StubBackend`: deterministic backend without a real numerical runtime.
//!
//! Every method applies a single scalar gain: output channel `c` is input
//! channel `c % in_channels` multiplied by `gain`. The gain is exposed both
//! as a settable attribute and as a one-element layer, so the full control
//! surface can be exercised end-to-end without model files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::inference::{Backend, MethodParams, DEFAULT_METHOD};

const GAIN_ATTRIBUTE: &str = "gain";
const GAIN_LAYER: &str = "gain.weight";

/// Gain-only reference backend.
#[derive(Debug, Clone)]
pub struct StubBackend {
    methods: BTreeMap<String, MethodParams>,
    higher_ratio: usize,
    path: Option<PathBuf>,
    loaded: bool,
    gain: f32,
}

impl StubBackend {
    /// Unloaded backend exposing a mono `forward` method at ratio 1.
    pub fn new() -> Self {
        let mut methods = BTreeMap::new();
        methods.insert(
            DEFAULT_METHOD.to_string(),
            MethodParams {
                in_channels: 1,
                in_ratio: 1,
                out_channels: 1,
                out_ratio: 1,
            },
        );
        Self {
            methods,
            higher_ratio: 1,
            path: None,
            loaded: false,
            gain: 1.0,
        }
    }

    /// Backend that reports itself loaded without a model file.
    pub fn loaded() -> Self {
        Self {
            loaded: true,
            ..Self::new()
        }
    }

    /// Add or replace a method.
    pub fn with_method(mut self, name: &str, params: MethodParams) -> Self {
        self.methods.insert(name.to_string(), params);
        self
    }

    /// Override the reported minimum window length.
    pub fn with_higher_ratio(mut self, higher_ratio: usize) -> Self {
        self.higher_ratio = higher_ratio;
        self
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    fn parse_gain(name: &str, raw: &str) -> Result<f32> {
        raw.trim()
            .parse::<f32>()
            .map_err(|e| BridgeError::InvalidAttribute {
                name: name.to_string(),
                reason: format!("'{raw}' is not a number ({e})"),
            })
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for StubBackend {
    fn load(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(BridgeError::ModelNotFound {
                path: path.to_path_buf(),
            });
        }
        debug!(path = %path.display(), "StubBackend::load");
        self.path = Some(path.to_path_buf());
        self.loaded = true;
        Ok(())
    }

    fn reload(&mut self) -> Result<()> {
        match self.path.clone() {
            Some(path) => self.load(&path),
            None if self.loaded => {
                debug!("StubBackend::reload: nothing on disk, no-op");
                Ok(())
            }
            None => Err(BridgeError::NotLoaded),
        }
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn method_params(&self, method: &str) -> Option<MethodParams> {
        self.methods.get(method).copied()
    }

    fn higher_ratio(&self) -> usize {
        self.higher_ratio
    }

    fn perform(
        &mut self,
        inputs: &[Vec<f32>],
        outputs: &mut [Vec<f32>],
        n_vec: usize,
        method: &str,
        _n_batches: usize,
    ) -> Result<()> {
        if !self.loaded {
            return Err(BridgeError::NotLoaded);
        }
        if !self.methods.contains_key(method) {
            return Err(BridgeError::UnknownMethod(method.to_string()));
        }

        for (c, out) in outputs.iter_mut().enumerate() {
            let n = n_vec.min(out.len());
            match inputs.get(c % inputs.len().max(1)) {
                Some(input) => {
                    for (o, i) in out[..n].iter_mut().zip(input.iter()) {
                        *o = i * self.gain;
                    }
                }
                None => out[..n].fill(0.0),
            }
        }
        Ok(())
    }

    fn settable_attributes(&self) -> Vec<String> {
        vec![GAIN_ATTRIBUTE.to_string()]
    }

    fn set_attribute(&mut self, name: &str, args: &[String]) -> Result<()> {
        if name != GAIN_ATTRIBUTE {
            return Err(BridgeError::AttributeNotSettable(name.to_string()));
        }
        let raw = args
            .first()
            .ok_or_else(|| BridgeError::MissingArguments(name.to_string()))?;
        self.gain = Self::parse_gain(name, raw)?;
        Ok(())
    }

    fn attribute_as_string(&self, name: &str) -> Result<String> {
        if name == GAIN_ATTRIBUTE {
            Ok(self.gain.to_string())
        } else {
            Err(BridgeError::InvalidAttribute {
                name: name.to_string(),
                reason: "no such attribute".into(),
            })
        }
    }

    fn available_layers(&self) -> Vec<String> {
        vec![GAIN_LAYER.to_string()]
    }

    fn layer_weights(&self, layer: &str) -> Result<Vec<f32>> {
        if layer == GAIN_LAYER {
            Ok(vec![self.gain])
        } else {
            Err(BridgeError::UnknownLayer(layer.to_string()))
        }
    }

    fn set_layer_weights(&mut self, layer: &str, weights: &[f32]) -> Result<()> {
        if layer != GAIN_LAYER {
            return Err(BridgeError::UnknownLayer(layer.to_string()));
        }
        match weights {
            [gain] => {
                self.gain = *gain;
                Ok(())
            }
            _ => Err(BridgeError::InvalidAttribute {
                name: layer.to_string(),
                reason: format!("expected 1 weight, got {}", weights.len()),
            }),
        }
    }
}
