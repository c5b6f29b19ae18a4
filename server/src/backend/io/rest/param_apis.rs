//! Endpoint exposing system parameters to the dashboards (e.g. the current
//! cycle label).

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use tracing::info;

use crate::backend::domain::BillingError;
use crate::backend::io::rest::error_response;
use crate::backend::AppState;

#[derive(Debug, Deserialize)]
pub struct ParamsQuery {
    /// Comma-separated parameter keys; all parameters when absent.
    pub keys: Option<String>,
}

pub async fn get_params(
    State(state): State<AppState>,
    Query(query): Query<ParamsQuery>,
) -> impl IntoResponse {
    info!("GET /api/params");

    let keys: Vec<String> = query
        .keys
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    match state.params.get_params(&keys).await {
        Ok(map) => (StatusCode::OK, Json(map)).into_response(),
        Err(e) => error_response(BillingError::Storage(e), "params"),
    }
}
