use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::Value;

use crate::state::{now_epoch, AppState};

const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// `GET /public/<layer>/<key>`
///
/// Serves the record's `$content` property as the response body, typed by
/// its `$content_type` property. This surface is not JSON: failures are
/// bare 404s without a tid in the body. The operation still draws a tid
/// so the global order counts it.
pub async fn fetch(
    State(state): State<AppState>,
    Path((layer_name, key)): Path<(String, String)>,
) -> Response {
    let _tid = state.next_tid();

    let Ok(layer) = state.registry().get(&layer_name) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(record) = layer.get(&key, now_epoch()) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(Value::String(content)) = record.properties.get("$content") else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let content_type = match record.properties.get("$content_type") {
        Some(Value::String(t)) => t.clone(),
        _ => DEFAULT_CONTENT_TYPE.to_string(),
    };
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        content.clone(),
    )
        .into_response()
}
