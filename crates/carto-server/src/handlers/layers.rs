use axum::extract::{Path, State};
use axum::Json;

use carto_engine::{CreateOutcome, Mutation};

use crate::error::ApiError;
use crate::handlers::strip_json_suffix;
use crate::reply::{LayersReply, StatusReply};
use crate::state::{now_epoch, AppState};

/// `POST /api/1.0/layers/<name>.json`
pub async fn create_layer(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<StatusReply>, ApiError> {
    let tid = state.next_tid();
    let name = strip_json_suffix(&name).ok_or_else(|| ApiError::not_found(tid))?;

    let outcome = state
        .registry()
        .create(name)
        .map_err(|e| ApiError::from_engine(tid, &e))?;

    let status = match outcome {
        CreateOutcome::Created => {
            state.log_mutation(
                tid,
                now_epoch(),
                Mutation::CreateLayer {
                    layer: name.to_string(),
                },
            )?;
            "created"
        }
        CreateOutcome::Existing => "existing",
    };
    Ok(Json(StatusReply { tid, status }))
}

/// `DELETE /api/1.0/layers/<name>.json`
pub async fn drop_layer(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<StatusReply>, ApiError> {
    let tid = state.next_tid();
    let name = strip_json_suffix(&name).ok_or_else(|| ApiError::not_found(tid))?;

    state
        .registry()
        .drop_layer(name)
        .map_err(|e| ApiError::from_engine(tid, &e))?;
    state.log_mutation(
        tid,
        now_epoch(),
        Mutation::DropLayer {
            layer: name.to_string(),
        },
    )?;
    Ok(Json(StatusReply {
        tid,
        status: "deleted",
    }))
}

/// `GET /api/1.0/layers/index.json`
pub async fn list_layers(State(state): State<AppState>) -> Json<LayersReply> {
    let tid = state.next_tid();
    Json(LayersReply {
        tid,
        layers: state.registry().list(),
    })
}
