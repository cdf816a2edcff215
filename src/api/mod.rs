//! Public API Surface (spec §4.8 / §6): an `axum::Router` factory the
//! embedding host mounts under its own prefix, the same `build_router(state)`
//! shape the teacher's `todo_backend_postgresql::api` module uses.

mod dto;
mod handlers;
mod state;

pub use state::{allow_all, ApiState, PermissionCheck, Subject};

use axum::http::Method;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/engines", get(handlers::list_engines))
        .route("/skus", get(handlers::list_skus))
        .route("/host", get(handlers::host_capacity))
        .route("/instances", get(handlers::list_instances).post(handlers::create_instance))
        .route("/instances/{id}", get(handlers::get_instance).delete(handlers::destroy_instance))
        .route("/instances/{id}/start", post(handlers::start_instance))
        .route("/instances/{id}/stop", post(handlers::stop_instance))
        .route("/instances/{id}/restart", post(handlers::restart_instance))
        .route("/instances/{id}/logs", get(handlers::logs))
        .route("/instances/{id}/stats", get(handlers::stats))
        .route("/instances/{id}/inspect", get(handlers::inspect))
        .route("/instances/{id}/metrics", get(handlers::metrics))
        .route("/instances/{id}/health", get(handlers::health))
        .route("/instances/{id}/snapshot", post(handlers::create_snapshot))
        .route("/instances/{id}/snapshots", get(handlers::list_snapshots))
        .route("/instances/{id}/restore/{sid}", post(handlers::restore_snapshot))
        .route("/instances/{id}/snapshots/{sid}", delete(handlers::delete_snapshot))
        .route("/instances/{id}/export", get(handlers::export))
        .route("/instances/{id}/credentials/rotate", post(handlers::rotate_credentials))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods([Method::GET, Method::POST, Method::DELETE]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
