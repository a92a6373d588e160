//! HTTP surface: shared state and the router.

pub mod error;
pub mod routes;

use std::{path::Path, sync::Arc};

use axum::{
    Router,
    http::{Method, header},
    routing::{get, post},
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::{ledger::TerritoryLedger, relay::RelayHub, relay::connection::ws_handler, store::RegionStore};

#[derive(Clone)]
pub struct AppState {
    pub ledger: TerritoryLedger,
    pub regions: Arc<dyn RegionStore>,
    pub relay: RelayHub,
}

/// API routes, the relay socket, and static files for everything else.
pub fn router(state: AppState, static_dir: &Path) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/runs", post(routes::submit_run))
        .route("/hexes", get(routes::list_hexes))
        .route("/capturePolygon", post(routes::capture_polygon))
        .route("/polygons", get(routes::list_polygons))
        .route("/ws", get(ws_handler))
        .fallback_service(ServeDir::new(static_dir))
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE])
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
