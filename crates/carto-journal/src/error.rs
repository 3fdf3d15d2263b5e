use thiserror::Error;

/// Errors raised on the durability path.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, JournalError>;
