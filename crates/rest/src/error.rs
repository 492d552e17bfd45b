//! Guard error to HTTP response mapping.
//!
//! # Error Mapping
//!
//! | Guard Error | HTTP Status |
//! |-------------|-------------|
//! | WriteNotAuthorized | 403 |
//! | MissingTenant / MissingGroup | 403 |
//! | InvalidIdentifier | 400 |
//! | NoActiveGuard / Disposed / Session | 500 |
//!
//! Internal failures surface as a generic server error; no detail and never
//! another tenant's data leaks into a response body.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use meridian_guard::error::GuardError;
use serde_json::json;

/// A guard failure on its way out as an HTTP response.
///
/// Handlers returning `Result<_, GuardRejection>` can propagate guard
/// errors with `?`.
#[derive(Debug)]
pub struct GuardRejection(pub GuardError);

impl From<GuardError> for GuardRejection {
    fn from(error: GuardError) -> Self {
        Self(error)
    }
}

impl GuardRejection {
    /// Returns the HTTP status this rejection maps to.
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            GuardError::WriteNotAuthorized { .. }
            | GuardError::MissingTenant
            | GuardError::MissingGroup { .. } => StatusCode::FORBIDDEN,
            GuardError::InvalidIdentifier { .. } => StatusCode::BAD_REQUEST,
            GuardError::NoActiveGuard | GuardError::Disposed | GuardError::Session(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for GuardRejection {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "internal guard failure");
            "internal server error".to_string()
        } else {
            self.0.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
