use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use carto_types::{Position, Rect};

use crate::error::ApiError;
use crate::handlers::strip_json_suffix;
use crate::reply::{KeysReply, SearchReply};
use crate::state::{now_epoch, AppState};

/// Raw query options shared by the search endpoints. Flags are numeric:
/// `0` disables, anything else enables.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    radius: Option<f64>,
    limit: Option<u64>,
    epsilon: Option<f64>,
    properties: Option<u8>,
    content: Option<u8>,
}

/// Validated options with defaults applied.
#[derive(Debug)]
struct SearchOptions {
    radius: f64,
    limit: usize,
    epsilon: Option<f64>,
    properties: bool,
    content: bool,
}

const DEFAULT_LIMIT: usize = 250;

fn validate(
    tid: u64,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<SearchOptions, ApiError> {
    let Query(params) = params.map_err(|_| ApiError::bad_request(tid))?;

    let radius = params.radius.unwrap_or(0.0);
    if !radius.is_finite() || radius < 0.0 {
        return Err(ApiError::bad_request(tid));
    }
    let limit = match params.limit {
        None => DEFAULT_LIMIT,
        Some(0) => return Err(ApiError::bad_request(tid)),
        Some(n) => usize::try_from(n).map_err(|_| ApiError::bad_request(tid))?,
    };
    if let Some(eps) = params.epsilon {
        if !eps.is_finite() || eps <= 0.0 {
            return Err(ApiError::bad_request(tid));
        }
    }
    Ok(SearchOptions {
        radius,
        limit,
        epsilon: params.epsilon,
        properties: params.properties.map_or(true, |n| n != 0),
        content: params.content.map_or(true, |n| n != 0),
    })
}

/// `GET /api/1.0/search/<layer>/nearby/<lat>,<lon>.json`
///
/// `radius` is in meters (degrees on flat layers); radius `0` is an
/// exact-point lookup.
pub async fn nearby(
    State(state): State<AppState>,
    Path((layer_name, center)): Path<(String, String)>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchReply>, ApiError> {
    let tid = state.next_tid();
    let opts = validate(tid, params)?;
    let center = strip_json_suffix(&center)
        .ok_or_else(|| ApiError::not_found(tid))
        .and_then(|s| Position::parse(s).map_err(|_| ApiError::bad_request(tid)))?;

    let layer = state
        .registry()
        .get(&layer_name)
        .map_err(|e| ApiError::from_engine(tid, &e))?;
    let result = layer.find_near(center, opts.radius, opts.limit, now_epoch());
    Ok(Json(SearchReply::new(tid, result, opts.properties)))
}

/// `GET /api/1.0/search/<layer>/in_rect/<lat0>,<lon0>,<lat1>,<lon1>.json`
pub async fn in_rect(
    State(state): State<AppState>,
    Path((layer_name, rect)): Path<(String, String)>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchReply>, ApiError> {
    let tid = state.next_tid();
    let opts = validate(tid, params)?;
    let rect = strip_json_suffix(&rect)
        .ok_or_else(|| ApiError::not_found(tid))
        .and_then(|s| Rect::parse(s).map_err(|_| ApiError::bad_request(tid)))?;

    let layer = state
        .registry()
        .get(&layer_name)
        .map_err(|e| ApiError::from_engine(tid, &e))?;
    let result = layer.find_in_rect(rect, opts.limit, opts.epsilon, now_epoch());
    Ok(Json(SearchReply::new(tid, result, opts.properties)))
}

/// `GET /api/1.0/search/<layer>/keys/<pattern>.json`
///
/// A trailing `*` scans by prefix; otherwise the pattern is an exact key.
/// With `content=0` the reply lists bare key strings.
pub async fn keys(
    State(state): State<AppState>,
    Path((layer_name, pattern)): Path<(String, String)>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let tid = state.next_tid();
    let opts = validate(tid, params)?;
    let pattern = strip_json_suffix(&pattern).ok_or_else(|| ApiError::not_found(tid))?;

    let layer = state
        .registry()
        .get(&layer_name)
        .map_err(|e| ApiError::from_engine(tid, &e))?;
    let result = layer.keys(pattern, opts.limit, now_epoch());

    if result.overflow {
        return Ok(Json(SearchReply {
            tid,
            overflow: Some(true),
            matches: Vec::new(),
        })
        .into_response());
    }
    if !opts.content {
        return Ok(Json(KeysReply {
            tid,
            keys: result.matches.into_iter().map(|r| r.key).collect(),
        })
        .into_response());
    }
    Ok(Json(SearchReply {
        tid,
        overflow: None,
        matches: result
            .matches
            .into_iter()
            .map(|r| crate::reply::MatchView::Record(crate::reply::RecordView::new(
                r,
                opts.properties,
            )))
            .collect(),
    })
    .into_response())
}
