//! Error types for redpen.

use std::path::PathBuf;

/// Top-level error type for redpen operations.
#[derive(Debug, thiserror::Error)]
pub enum RedpenError {
    #[error("document not found: {}", path.display())]
    DocumentNotFound { path: PathBuf },

    #[error("unknown price for model `{model}`, check the provider's pricing page")]
    UnknownPricingTier { model: String },

    #[error("malformed inclusion at {}:{line}: {directive}", document.display())]
    MalformedInclusion {
        document: PathBuf,
        line: usize,
        directive: String,
    },

    #[error("include cycle at {}:{line}: {} is already open", document.display(), target.display())]
    IncludeCycle {
        document: PathBuf,
        line: usize,
        target: PathBuf,
    },

    #[error("unrecognized review mode `{mode}` (expected default, harsh or reviewer2)")]
    UnrecognizedMode { mode: String },

    #[error("invalid traversal state: {0}")]
    InvalidState(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("analysis service error: {0}")]
    Api(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Map an error to its exit code.
pub fn exit_code(error: &RedpenError) -> i32 {
    match error {
        RedpenError::DocumentNotFound { .. } => 3,
        RedpenError::UnknownPricingTier { .. } => 4,
        RedpenError::MalformedInclusion { .. } => 5,
        RedpenError::IncludeCycle { .. } => 5,
        RedpenError::UnrecognizedMode { .. } => 2,
        RedpenError::InvalidState(_) => 2,
        RedpenError::Config(_) => 2,
        RedpenError::Api(_) => 6,
        RedpenError::Io(_) => 1,
        RedpenError::Json(_) => 1,
    }
}
