//! Endpoints for the student roster.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use chrono::Local;
use tracing::info;

use crate::backend::io::rest::error_response;
use crate::backend::AppState;

/// Roster with resolved tuitions and census KPIs.
pub async fn list_students(State(state): State<AppState>) -> impl IntoResponse {
    info!("GET /api/students");

    let today = Local::now().date_naive();
    match state.roster_service.list_students(today).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response(e, "list students"),
    }
}

pub async fn get_student(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> impl IntoResponse {
    info!("GET /api/students/{student_id}");

    match state.roster_service.get_student(&student_id).await {
        Ok(student) => (StatusCode::OK, Json(student)).into_response(),
        Err(e) => error_response(e, "get student"),
    }
}
