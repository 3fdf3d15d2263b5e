use axum::routing::{any, get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{layers, public, records, search, system};
use crate::state::AppState;

/// Build the axum router with the full API surface.
///
/// Record keys and search patterns may contain slashes, so those segments
/// are wildcards; the `.json` suffix rides along inside the capture and is
/// stripped by the handlers.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/1.0/layers/index.json", get(layers::list_layers))
        .route(
            "/api/1.0/layers/:name",
            post(layers::create_layer).delete(layers::drop_layer),
        )
        .route(
            "/api/1.0/records/:layer/*key",
            put(records::put_record)
                .get(records::get_record)
                .delete(records::delete_record),
        )
        .route("/api/1.0/search/:layer/nearby/:center", get(search::nearby))
        .route("/api/1.0/search/:layer/in_rect/:rect", get(search::in_rect))
        .route("/api/1.0/search/:layer/keys/*pattern", get(search::keys))
        .route("/api/1.0/system/ping.json", any(system::ping))
        .route("/api/1.0/system/shutdown.json", post(system::shutdown))
        .route("/api/1.0/system/rewrite.json", post(system::rewrite))
        .route("/public/:layer/*key", get(public::fetch))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
