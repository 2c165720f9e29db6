//! fe_server
//!
//! HTTP surface of the invoicing gateway bridge: document registration
//! (streamed or buffered), invoice queries, RADIAN events, counterparty
//! master data and health, all under `/api/v1`.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod streaming;

pub use config::{ConfigError, Settings};
pub use error::ApiError;
pub use state::{bootstrap, AppState, RegistrationOptions};

use axum::{middleware::from_fn, Router};
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub const SERVICE_NAME: &str = "fe-gateway";

pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let api_routes = routes::api_routes().with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(middleware::correlation_id))
}

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod tests;
