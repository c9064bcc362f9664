//! Public configuration page for front-end identification.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use crate::AppState;

/// Structured configuration.
#[derive(Debug, Serialize)]
pub struct Status {
    version: String,
    name: String,
    url: String,
}

/// Public server status (configuration).
pub async fn status(State(state): State<AppState>) -> Json<Status> {
    Json(Status {
        version: state.config.version().to_owned(),
        name: if state.config.name.is_empty() {
            env!("CARGO_CRATE_NAME").into()
        } else {
            state.config.name.clone()
        },
        url: state.config.url.clone(),
    })
}

/// Prometheus exposition of the recorded metrics.
pub async fn metrics(
    State(state): State<AppState>,
) -> Result<String, StatusCode> {
    state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .ok_or(StatusCode::NOT_FOUND)
}
