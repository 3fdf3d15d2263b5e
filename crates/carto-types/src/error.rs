use thiserror::Error;

/// Errors produced by type construction and validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid layer name {name:?}: {reason}")]
    InvalidLayerName { name: String, reason: String },

    #[error("invalid record key {key:?}: {reason}")]
    InvalidRecordKey { key: String, reason: String },

    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("unknown layer kind: {0:?}")]
    UnknownLayerKind(String),

    #[error("unknown distance formula: {0:?}")]
    UnknownDistanceFormula(String),
}

pub type Result<T> = std::result::Result<T, TypeError>;
