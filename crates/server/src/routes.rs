//! Route configuration.

use crate::auth::trace_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let calendar_routes = Router::new()
        .route("/calendar/Alive", get(handlers::alive))
        .route("/calendar/ReserveName", post(handlers::reserve_name))
        .route("/calendar/Authenticate", get(handlers::authenticate))
        .route("/calendar/AddFullSnapshot", post(handlers::add_full_snapshot))
        .route(
            "/calendar/AddPartialSnapshot",
            post(handlers::add_partial_snapshot),
        )
        .route(
            "/calendar/GetAvailableSnapshots",
            get(handlers::list_snapshots),
        )
        // Spelling used by older clients.
        .route(
            "/calendar/GetAvaliableSnapshots",
            get(handlers::list_snapshots),
        )
        .route("/calendar/GetSnapshotData", get(handlers::get_snapshot_data));

    let exporter_routes = Router::new()
        .route("/exporter/GetVersion", get(handlers::get_version))
        .route("/exporter/GetArchive", get(handlers::get_archive));

    let mut router = Router::new()
        .route("/v1/health", get(handlers::health_check))
        .merge(calendar_routes)
        .merge(exporter_routes);

    // When enabled, /metrics must be network-restricted to the scraper.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(middleware::from_fn(trace_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
