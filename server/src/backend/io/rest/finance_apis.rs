//! Endpoints for the staff finance dashboard: debtors, debt overview and
//! revenue rollups.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use chrono::Local;
use serde::Deserialize;
use tracing::info;

use crate::backend::io::rest::{error_response, require_staff};
use crate::backend::AppState;

#[derive(Debug, Deserialize)]
pub struct CycleQuery {
    pub cycle: String,
}

pub async fn finance_debtors(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CycleQuery>,
) -> impl IntoResponse {
    info!("GET /api/finance/debtors - cycle {}", query.cycle);
    if let Err(response) = require_staff(&headers) {
        return response;
    }

    let today = Local::now().date_naive();
    match state.finance_service.debtors(&query.cycle, today).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response(e, "debtors"),
    }
}

pub async fn finance_overview(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CycleQuery>,
) -> impl IntoResponse {
    info!("GET /api/finance/overview - cycle {}", query.cycle);
    if let Err(response) = require_staff(&headers) {
        return response;
    }

    let today = Local::now().date_naive();
    match state.finance_service.overview(&query.cycle, today).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response(e, "overview"),
    }
}

pub async fn finance_revenue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CycleQuery>,
) -> impl IntoResponse {
    info!("GET /api/finance/revenue - cycle {}", query.cycle);
    if let Err(response) = require_staff(&headers) {
        return response;
    }

    let today = Local::now().date_naive();
    match state.finance_service.revenue(&query.cycle, today).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response(e, "revenue"),
    }
}
