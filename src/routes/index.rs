use crate::server::SharedState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Failed to read index page: {0}")]
    Read(#[from] std::io::Error),
}

impl IntoResponse for IndexError {
    fn into_response(self) -> Response {
        tracing::error!("{}", self);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Something went wrong: {}", self),
        )
            .into_response()
    }
}

/// Served from disk on every request so the page can be edited live.
#[instrument(skip(state))]
pub async fn index(State(state): State<SharedState>) -> Result<Html<String>, IndexError> {
    state.metrics.record_request("/");
    let page = tokio::fs::read_to_string(state.index_file.as_path()).await?;
    Ok(Html(page))
}
