//! Parley HTTP relay (Axum).
//!
//! `/ai` forwards a prompt with the caller's conversation to the generation
//! backend; `/conversation/{id}` and `/history/{id}` expose the stored log;
//! `/health` reports liveness.

pub mod envelope;
pub mod error;
pub mod routes;
pub mod state;

use axum::Router;
use error::ApiError;
use state::AppState;
use std::any::Any;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the application router with a custom state.
pub fn app_with_state(state: AppState) -> Router {
    let envelope = state.envelope.clone();
    let on_panic = move |panic: Box<dyn Any + Send + 'static>| {
        let detail = panic
            .downcast_ref::<String>()
            .map(String::as_str)
            .or_else(|| panic.downcast_ref::<&str>().copied())
            .unwrap_or("unknown panic");
        tracing::error!(detail, "handler panicked");
        envelope.error(&ApiError::internal("An unexpected error occurred."))
    };

    Router::new()
        .merge(routes::health_routes())
        .merge(routes::relay_routes())
        .merge(routes::history_routes())
        .with_state(state)
        .layer(CatchPanicLayer::custom(on_panic))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
