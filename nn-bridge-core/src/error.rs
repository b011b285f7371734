use thiserror::Error;

/// All errors produced by nn-bridge-core.
///
/// None of these are fatal to the host: setup errors degrade to an unloaded
/// processor, control errors leave state unchanged, and inference errors
/// degrade to silence for one window.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("cannot allocate ring buffer with capacity {capacity}")]
    Allocation { capacity: usize },

    #[error("model file not found: {path}")]
    ModelNotFound { path: std::path::PathBuf },

    #[error("error during loading: {0}")]
    ModelLoad(String),

    #[error("method not found: {0}")]
    UnknownMethod(String),

    #[error("no model loaded")]
    NotLoaded,

    #[error("buffer size too small ({requested}), switching to {minimum}")]
    BufferTooSmall { requested: usize, minimum: usize },

    #[error("argument name not settable in current model: {0}")]
    AttributeNotSettable(String),

    #[error("invalid value for attribute {name}: {reason}")]
    InvalidAttribute { name: String, reason: String },

    #[error("{0} needs at least one value")]
    MissingArguments(String),

    #[error("unknown layer: {0}")]
    UnknownLayer(String),

    #[error("inference error: {0}")]
    Inference(String),

    #[error("computation pass panicked: {0}")]
    PassPanicked(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
