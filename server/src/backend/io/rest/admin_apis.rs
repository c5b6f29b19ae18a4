//! Staff-only endpoints for record administration: students, price history,
//! cycle calendars, guardian links and parameters.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use tracing::info;

use crate::backend::io::rest::{error_response, require_staff};
use crate::backend::AppState;
use shared::{
    AddPriceRequest, CreateCycleRequest, CreateStudentRequest, LinkGuardianRequest,
    SetParamRequest,
};

pub async fn create_student(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateStudentRequest>,
) -> impl IntoResponse {
    info!("POST /api/students - {}", request.full_name);
    if let Err(response) = require_staff(&headers) {
        return response;
    }

    match state.admin_service.create_student(request).await {
        Ok(student) => (StatusCode::CREATED, Json(student)).into_response(),
        Err(e) => error_response(e, "create student"),
    }
}

pub async fn add_price(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(student_id): Path<String>,
    Json(request): Json<AddPriceRequest>,
) -> impl IntoResponse {
    info!("POST /api/students/{student_id}/prices");
    if let Err(response) = require_staff(&headers) {
        return response;
    }

    match state.admin_service.add_price(&student_id, request).await {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(e) => error_response(e, "add price"),
    }
}

pub async fn link_guardian(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(student_id): Path<String>,
    Json(request): Json<LinkGuardianRequest>,
) -> impl IntoResponse {
    info!("POST /api/students/{student_id}/guardians");
    if let Err(response) = require_staff(&headers) {
        return response;
    }

    match state
        .admin_service
        .link_guardian(&student_id, &request.guardian_id)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e, "link guardian"),
    }
}

pub async fn create_cycle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateCycleRequest>,
) -> impl IntoResponse {
    info!("POST /api/cycles - {}", request.label);
    if let Err(response) = require_staff(&headers) {
        return response;
    }

    match state.admin_service.create_cycle(request).await {
        Ok(cycle) => (StatusCode::CREATED, Json(cycle)).into_response(),
        Err(e) => error_response(e, "create cycle"),
    }
}

pub async fn set_param(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SetParamRequest>,
) -> impl IntoResponse {
    info!("POST /api/params - {}", request.key);
    if let Err(response) = require_staff(&headers) {
        return response;
    }

    match state
        .admin_service
        .set_param(&request.key, &request.value)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e, "set param"),
    }
}
