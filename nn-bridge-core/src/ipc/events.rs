//! Control messages (host → processor) and outlet events (processor → host).
//!
//! | Selector | Message | Reply |
//! |----------|---------|-------|
//! | `enable` | `ControlMessage::Enable` | |
//! | `reload` | `ControlMessage::Reload` | |
//! | `set` | `ControlMessage::Set` | |
//! | `get` | `ControlMessage::Get` | `OutletEvent::Attribute` |
//! | `layers` | `ControlMessage::Layers` | `OutletEvent::Layers` |
//! | `get_weights` | `ControlMessage::GetWeights` | `OutletEvent::Layer` |
//! | `set_weights` | `ControlMessage::SetWeights` | |

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Control messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Enable or bypass processing. Bypassed callbacks emit silence.
    Enable { on: bool },
    /// Reload the model from disk.
    Reload,
    /// Set a settable attribute; values are passed to the backend as strings.
    Set { name: String, args: Vec<String> },
    /// Query an attribute.
    Get { name: String },
    /// List the model's layers.
    Layers,
    /// Fetch one layer's flattened weights.
    GetWeights { layer: String },
    /// Replace one layer's flattened weights.
    SetWeights { layer: String, weights: Vec<f32> },
}

impl ControlMessage {
    /// Host-side selector name of this message.
    pub fn selector(&self) -> &'static str {
        match self {
            Self::Enable { .. } => "enable",
            Self::Reload => "reload",
            Self::Set { .. } => "set",
            Self::Get { .. } => "get",
            Self::Layers => "layers",
            Self::GetWeights { .. } => "get_weights",
            Self::SetWeights { .. } => "set_weights",
        }
    }
}

// ---------------------------------------------------------------------------
// Outlet events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutletEvent {
    Attribute { name: String, value: String },
    Layers { names: Vec<String> },
    Layer { name: String, weights: Vec<f32> },
}

// ---------------------------------------------------------------------------
// Processor status
// ---------------------------------------------------------------------------

/// Coarse processor state, for host display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorStatus {
    /// No model loaded; callbacks emit silence.
    Unloaded,
    /// Bypassed by `enable 0`; callbacks emit silence.
    Disabled,
    /// Processing, no background pass in flight.
    Running,
    /// Processing, a background pass is in flight.
    Computing,
}
