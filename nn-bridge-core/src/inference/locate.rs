//! Model file lookup.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{BridgeError, Result};

/// Resolve a model path against a list of search directories.
///
/// Absolute paths are used as is. Relative paths are tried against each
/// search directory in order, then against the current directory.
///
/// # Errors
/// Returns `BridgeError::ModelNotFound` when no candidate exists.
pub fn resolve_model_path(path: &Path, search_paths: &[PathBuf]) -> Result<PathBuf> {
    if path.is_absolute() {
        return if path.exists() {
            Ok(path.to_path_buf())
        } else {
            Err(BridgeError::ModelNotFound {
                path: path.to_path_buf(),
            })
        };
    }

    for dir in search_paths {
        let candidate = dir.join(path);
        debug!(candidate = %candidate.display(), "probing model path");
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    if path.exists() {
        return Ok(path.to_path_buf());
    }

    Err(BridgeError::ModelNotFound {
        path: path.to_path_buf(),
    })
}
