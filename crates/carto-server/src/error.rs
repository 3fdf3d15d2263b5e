use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use thiserror::Error;

use carto_engine::EngineError;

use crate::reply::ErrorReply;

/// Errors raised while booting and running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("journal error: {0}")]
    Journal(#[from] carto_journal::JournalError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

/// An API failure carrying the tid already drawn for the request. Every
/// error body on the `/api` surface is `{"tid":N,"error":...}`.
#[derive(Clone, Copy, Debug)]
pub struct ApiError {
    tid: u64,
    status: StatusCode,
    message: &'static str,
}

impl ApiError {
    pub fn not_found(tid: u64) -> Self {
        Self {
            tid,
            status: StatusCode::NOT_FOUND,
            message: "not found",
        }
    }

    pub fn bad_request(tid: u64) -> Self {
        Self {
            tid,
            status: StatusCode::BAD_REQUEST,
            message: "bad request",
        }
    }

    pub fn unavailable(tid: u64) -> Self {
        Self {
            tid,
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: "unavailable",
        }
    }

    pub fn internal(tid: u64) -> Self {
        Self {
            tid,
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "internal error",
        }
    }

    pub fn from_engine(tid: u64, err: &EngineError) -> Self {
        match err {
            EngineError::LayerNotFound(_) | EngineError::RecordNotFound { .. } => {
                Self::not_found(tid)
            }
            EngineError::Validation(_) => Self::bad_request(tid),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorReply {
                tid: self.tid,
                error: self.message,
            }),
        )
            .into_response()
    }
}
