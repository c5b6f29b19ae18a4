//! REST interface for the billing backend.
//!
//! Handlers are a pure translation layer: extract the inputs, resolve the
//! caller identity, call the domain service and map the result onto an HTTP
//! status. No billing rules live here.

pub mod admin_apis;
pub mod finance_apis;
pub mod param_apis;
pub mod payment_apis;
pub mod student_apis;

pub use admin_apis::*;
pub use finance_apis::*;
pub use param_apis::*;
pub use payment_apis::*;
pub use student_apis::*;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use shared::Caller;
use tracing::{error, warn};

use crate::backend::domain::util::parse_role;
use crate::backend::domain::BillingError;

/// Header carrying the caller's role, set by the session layer upstream.
pub const ROLE_HEADER: &str = "x-caller-role";
/// Header carrying the guardian id for parent-portal requests.
pub const GUARDIAN_HEADER: &str = "x-guardian-id";

/// Resolve the caller identity placed in headers by the session layer.
pub fn caller_from_headers(headers: &HeaderMap) -> Option<Caller> {
    let role = headers
        .get(ROLE_HEADER)?
        .to_str()
        .ok()
        .and_then(parse_role)?;
    let guardian_id = headers
        .get(GUARDIAN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    Some(Caller { role, guardian_id })
}

/// Staff-only endpoints share this gate.
pub(crate) fn require_staff(headers: &HeaderMap) -> Result<(), Response> {
    match caller_from_headers(headers) {
        Some(caller) if caller.role.is_staff() => Ok(()),
        Some(_) => Err((StatusCode::FORBIDDEN, "staff only").into_response()),
        None => Err((StatusCode::UNAUTHORIZED, "missing caller identity").into_response()),
    }
}

/// Map a domain error onto an HTTP response. Storage failures are logged
/// and answered with a generic body.
pub(crate) fn error_response(err: BillingError, context: &str) -> Response {
    if err.is_validation() {
        warn!("{context}: {err}");
        return (StatusCode::BAD_REQUEST, err.to_string()).into_response();
    }
    match &err {
        BillingError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()).into_response(),
        BillingError::Forbidden => (StatusCode::FORBIDDEN, err.to_string()).into_response(),
        _ => {
            error!("{context}: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            )
                .into_response()
        }
    }
}
