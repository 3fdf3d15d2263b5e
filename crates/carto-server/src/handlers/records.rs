use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;
use axum::Json;
use bytes::Bytes;
use serde_json::Value;

use carto_engine::{Mutation, PutRequest};
use carto_types::{validate_record_key, Position, Properties};

use crate::error::ApiError;
use crate::handlers::strip_json_suffix;
use crate::reply::{RecordReply, RecordView, StatusReply};
use crate::state::{now_epoch, AppState};

/// `PUT /api/1.0/records/<layer>/<key>.json`
///
/// The body is form pairs or a JSON object; both feed the same operator
/// grammar (see [`build_put_request`]). With `auto_create_layers` on, a
/// PUT into an unknown layer creates it first.
pub async fn put_record(
    State(state): State<AppState>,
    Path((layer_name, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<StatusReply>, ApiError> {
    let tid = state.next_tid();
    let key = strip_json_suffix(&key).ok_or_else(|| ApiError::not_found(tid))?;
    validate_record_key(key).map_err(|_| ApiError::bad_request(tid))?;

    let request = parse_put_body(&headers, &body).map_err(|_| ApiError::bad_request(tid))?;

    let layer = if state.registry().config().auto_create_layers {
        let (layer, _) = state
            .registry()
            .get_or_create(&layer_name)
            .map_err(|e| ApiError::from_engine(tid, &e))?;
        layer
    } else {
        state
            .registry()
            .get(&layer_name)
            .map_err(|e| ApiError::from_engine(tid, &e))?
    };

    let at = now_epoch();
    layer.put(key, &request, at);
    state.log_mutation(
        tid,
        at,
        Mutation::PutRecord {
            layer: layer_name,
            key: key.to_string(),
            body: request,
        },
    )?;
    Ok(Json(StatusReply {
        tid,
        status: "stored",
    }))
}

/// `GET /api/1.0/records/<layer>/<key>.json`
pub async fn get_record(
    State(state): State<AppState>,
    Path((layer_name, key)): Path<(String, String)>,
) -> Result<Json<RecordReply>, ApiError> {
    let tid = state.next_tid();
    let key = strip_json_suffix(&key).ok_or_else(|| ApiError::not_found(tid))?;

    let layer = state
        .registry()
        .get(&layer_name)
        .map_err(|e| ApiError::from_engine(tid, &e))?;
    let record = layer
        .get(key, now_epoch())
        .ok_or_else(|| ApiError::not_found(tid))?;
    Ok(Json(RecordReply {
        tid,
        record: RecordView::new(record, true),
    }))
}

/// `DELETE /api/1.0/records/<layer>/<key>.json`
pub async fn delete_record(
    State(state): State<AppState>,
    Path((layer_name, key)): Path<(String, String)>,
) -> Result<Json<StatusReply>, ApiError> {
    let tid = state.next_tid();
    let key = strip_json_suffix(&key).ok_or_else(|| ApiError::not_found(tid))?;

    let layer = state
        .registry()
        .get(&layer_name)
        .map_err(|e| ApiError::from_engine(tid, &e))?;
    let at = now_epoch();
    if !layer.delete(key, at) {
        return Err(ApiError::not_found(tid));
    }
    state.log_mutation(
        tid,
        at,
        Mutation::DeleteRecord {
            layer: layer_name,
            key: key.to_string(),
        },
    )?;
    Ok(Json(StatusReply {
        tid,
        status: "deleted",
    }))
}

/// A malformed PUT body. The detail only reaches the log; the client
/// gets a plain 400.
#[derive(Debug)]
pub struct BodyError(String);

impl std::fmt::Display for BodyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

fn bad(msg: impl Into<String>) -> BodyError {
    BodyError(msg.into())
}

/// Decode a PUT body into the operator set. JSON object bodies keep their
/// value types; form bodies store every plain value as a string.
pub fn parse_put_body(headers: &HeaderMap, body: &[u8]) -> Result<PutRequest, BodyError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if content_type.contains("json") {
        let map: Properties =
            serde_json::from_slice(body).map_err(|e| bad(format!("invalid JSON body: {e}")))?;
        build_put_request(map)
    } else {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body)
            .map_err(|e| bad(format!("invalid form body: {e}")))?;
        build_put_request(pairs.into_iter().map(|(k, v)| (k, Value::String(v))))
    }
}

/// Fold body pairs into a [`PutRequest`]. Reserved keys:
///
/// - `_loc`: `"lat,lon"` string or `[lat, lon]` array, sets the position
/// - `_expires_at`: absolute epoch seconds, `0` clears the expiry
/// - `_delete:<prop>` (truthy value): removes one property
/// - `_delete_all` (truthy value): clears the property map
/// - `_add_int:<prop>`: adds an integer delta to the property
///
/// Anything else is stored as-is.
pub fn build_put_request(
    pairs: impl IntoIterator<Item = (String, Value)>,
) -> Result<PutRequest, BodyError> {
    let mut request = PutRequest::default();
    for (key, value) in pairs {
        if key == "_loc" {
            request.position = Some(parse_loc(&value)?);
        } else if key == "_expires_at" {
            request.expires_at = Some(value_as_i64(&key, &value)?);
        } else if key == "_delete_all" {
            if truthy(&value) {
                request.delete_all = true;
            }
        } else if let Some(prop) = key.strip_prefix("_delete:") {
            if truthy(&value) {
                request.deletes.push(prop.to_string());
            }
        } else if let Some(prop) = key.strip_prefix("_add_int:") {
            let delta = value_as_i64(&key, &value)?;
            request.add_ints.push((prop.to_string(), delta));
        } else {
            request.sets.insert(key, value);
        }
    }
    Ok(request)
}

fn parse_loc(value: &Value) -> Result<Position, BodyError> {
    match value {
        Value::String(s) => Position::parse(s).map_err(|e| bad(e.to_string())),
        Value::Array(items) => {
            let [lat, lon] = items.as_slice() else {
                return Err(bad("_loc array must be [lat, lon]"));
            };
            let (Some(lat), Some(lon)) = (lat.as_f64(), lon.as_f64()) else {
                return Err(bad("_loc coordinates must be numbers"));
            };
            let position = Position::new(lat, lon);
            position.validate().map_err(|e| bad(e.to_string()))?;
            Ok(position)
        }
        other => Err(bad(format!("_loc must be a string or array, got {other}"))),
    }
}

fn value_as_i64(key: &str, value: &Value) -> Result<i64, BodyError> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| bad(format!("{key} must be an integer"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| bad(format!("{key} must be an integer, got {s:?}"))),
        other => Err(bad(format!("{key} must be an integer, got {other}"))),
    }
}

/// Form flags arrive as strings; JSON bodies may use any scalar.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0" && s != "false",
        Value::Array(_) | Value::Object(_) => true,
    }
}
