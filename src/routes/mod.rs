mod detect;
mod health;
mod index;
mod metrics;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(index::index))
        .route("/detect", post(detect::detect))
        .route("/health", get(health::health))
        .route("/metrics", get(metrics::metrics_handler))
}
