use thiserror::Error;

/// Errors produced by engine operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("layer not found: {0}")]
    LayerNotFound(String),

    #[error("record not found: {layer}/{key}")]
    RecordNotFound { layer: String, key: String },

    #[error("validation error: {0}")]
    Validation(#[from] carto_types::TypeError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
