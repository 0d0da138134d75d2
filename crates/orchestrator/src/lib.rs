//! Saga orchestrator service.
//!
//! Wires the orchestrator to Kafka consumers, serves the HTTP surface, and
//! runs the timeout, recovery and purge sweeps in the background.

pub mod config;
pub mod error;
pub mod routes;
pub mod telemetry;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use saga_store::SagaStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::sagas::AppState;

/// Builds the router: health, metrics and the tenant-scoped saga routes.
pub fn create_app<S: SagaStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let scrape = Router::new()
        .route("/metrics", get(routes::ops::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::ops::health))
        .route(
            "/sagas",
            get(routes::sagas::list::<S>).post(routes::sagas::create::<S>),
        )
        .route(
            "/sagas/{id}",
            get(routes::sagas::get::<S>).delete(routes::sagas::purge::<S>),
        )
        .with_state(state)
        .merge(scrape)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
