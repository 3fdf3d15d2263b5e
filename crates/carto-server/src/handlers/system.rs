use axum::extract::State;
use axum::Json;

use carto_journal::JournalEntry;

use crate::error::ApiError;
use crate::reply::{PongReply, RewriteReply, StatusReply};
use crate::state::{now_epoch, AppState};

/// `ANY /api/1.0/system/ping.json`
pub async fn ping(State(state): State<AppState>) -> Json<PongReply> {
    let tid = state.next_tid();
    Json(PongReply { tid, pong: "pong" })
}

/// `POST /api/1.0/system/shutdown.json`
///
/// Replies first, then signals the server to stop accepting connections
/// and drain. The graceful drain lets this response reach the client.
pub async fn shutdown(State(state): State<AppState>) -> Json<StatusReply> {
    let tid = state.next_tid();
    tracing::info!(tid, "shutdown requested over the API");
    state.signal_shutdown();
    Json(StatusReply {
        tid,
        status: "stopping",
    })
}

/// `POST /api/1.0/system/rewrite.json`
///
/// Compacts the journal to a snapshot of the live store. Unavailable when
/// the server runs without a journal.
pub async fn rewrite(State(state): State<AppState>) -> Result<Json<RewriteReply>, ApiError> {
    let tid = state.next_tid();
    let Some(journal) = state.journal() else {
        return Err(ApiError::unavailable(tid));
    };

    let at = now_epoch();
    let entries: Vec<JournalEntry> = state
        .registry()
        .snapshot()
        .into_iter()
        .map(|op| JournalEntry { tid, at, op })
        .collect();
    let bytes = journal.rewrite(&entries).map_err(|e| {
        tracing::error!(tid, error = %e, "journal rewrite failed");
        ApiError::internal(tid)
    })?;
    tracing::info!(tid, entries = entries.len(), bytes, "journal rewritten");
    Ok(Json(RewriteReply {
        tid,
        rewrite: "started",
    }))
}
