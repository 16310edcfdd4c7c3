//! Error response handling.
//!
//! Every error leaves the service as `{"detail": "..."}` with a status
//! derived from its category. Server-side details are logged, not sent.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AuthError;

// =============================================================================
// IntoResponse Implementation
// =============================================================================

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, detail) = error_details(&self);

        if status.is_server_error() {
            tracing::error!(error = %self, category = %self.category(), "Request failed");
        }

        let mut response = (status, Json(detail_json(&detail))).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }

        response
    }
}

/// Returns (HTTP status, client-facing detail).
fn error_details(error: &AuthError) -> (StatusCode, String) {
    match error {
        AuthError::Unauthenticated { message } => (StatusCode::UNAUTHORIZED, message.clone()),
        AuthError::InvalidCredential { .. } | AuthError::PrincipalNotFound => (
            StatusCode::UNAUTHORIZED,
            "Could not validate credentials".to_string(),
        ),
        AuthError::CredentialExpired => {
            (StatusCode::UNAUTHORIZED, "Token has expired".to_string())
        }
        AuthError::Forbidden { message } => (StatusCode::FORBIDDEN, message.clone()),
        AuthError::InvalidRequest { message } => (StatusCode::BAD_REQUEST, message.clone()),
        AuthError::Storage { .. } | AuthError::Configuration { .. } | AuthError::Internal { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        ),
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Builds the `{"detail": ...}` body.
#[must_use]
pub fn detail_json(detail: &str) -> serde_json::Value {
    json!({ "detail": detail })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthenticated_response() {
        let response = AuthError::unauthenticated("Could not validate credentials").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
    }

    #[test]
    fn test_forbidden_response() {
        let response = AuthError::forbidden("Administrator access required").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());
    }

    #[test]
    fn test_principal_not_found_is_not_revealed() {
        let (status, detail) = error_details(&AuthError::PrincipalNotFound);
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(detail, "Could not validate credentials");
    }

    #[test]
    fn test_storage_details_hidden() {
        let (status, detail) = error_details(&AuthError::storage("connection refused to 10.0.0.5"));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!detail.contains("10.0.0.5"));
    }

    #[test]
    fn test_detail_json() {
        assert_eq!(detail_json("nope"), json!({ "detail": "nope" }));
    }
}
