//! Endpoints for payment registration, balance summaries and histories.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use chrono::Local;
use serde::Deserialize;
use tracing::info;

use crate::backend::domain::BillingError;
use crate::backend::io::rest::{caller_from_headers, error_response};
use crate::backend::AppState;
use shared::RegisterPaymentRequest;

#[derive(Debug, Deserialize)]
pub struct StudentCycleQuery {
    pub student_id: String,
    pub cycle: String,
}

/// Register a receipt and distribute it across periods.
pub async fn register_payment(
    State(state): State<AppState>,
    Json(request): Json<RegisterPaymentRequest>,
) -> impl IntoResponse {
    info!(
        "POST /api/payments - student {} amount {:.2}",
        request.student_id, request.amount
    );

    let today = Local::now().date_naive();
    match state.payment_service.register_payment(request, today).await {
        Ok(response) => (StatusCode::CREATED, Json(response)).into_response(),
        Err(e) => error_response(e, "register payment"),
    }
}

/// Balance summary for one student in one cycle. Staff, or a guardian
/// linked to the student.
pub async fn payment_summary(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StudentCycleQuery>,
) -> impl IntoResponse {
    info!(
        "GET /api/payments/summary - student {} cycle {}",
        query.student_id, query.cycle
    );

    let Some(caller) = caller_from_headers(&headers) else {
        return (StatusCode::UNAUTHORIZED, "missing caller identity").into_response();
    };
    match state.access.can_view(&caller, &query.student_id).await {
        Ok(true) => {}
        Ok(false) => return error_response(BillingError::Forbidden, "summary authorization"),
        Err(e) => return error_response(e, "summary authorization"),
    }

    let today = Local::now().date_naive();
    match state
        .summary_service
        .compute_summary(&query.student_id, &query.cycle, today)
        .await
    {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => error_response(e, "compute summary"),
    }
}

/// Payment history of one student in one cycle. Same gate as the summary.
pub async fn payment_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StudentCycleQuery>,
) -> impl IntoResponse {
    info!(
        "GET /api/payments/history - student {} cycle {}",
        query.student_id, query.cycle
    );

    let Some(caller) = caller_from_headers(&headers) else {
        return (StatusCode::UNAUTHORIZED, "missing caller identity").into_response();
    };
    match state.access.can_view(&caller, &query.student_id).await {
        Ok(true) => {}
        Ok(false) => return error_response(BillingError::Forbidden, "history authorization"),
        Err(e) => return error_response(e, "history authorization"),
    }

    match state
        .payment_service
        .payment_history(&query.student_id, &query.cycle)
        .await
    {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(e) => error_response(e, "payment history"),
    }
}

/// Allocation rows of one student in one cycle, joined with payment data.
pub async fn allocation_history(
    State(state): State<AppState>,
    Query(query): Query<StudentCycleQuery>,
) -> impl IntoResponse {
    info!(
        "GET /api/payments/allocations - student {} cycle {}",
        query.student_id, query.cycle
    );

    match state
        .payment_service
        .allocation_history(&query.student_id, &query.cycle)
        .await
    {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(e) => error_response(e, "allocation history"),
    }
}
