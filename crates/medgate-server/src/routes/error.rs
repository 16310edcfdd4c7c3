//! Handler error type.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use medgate_auth::{AuthError, middleware::detail_json};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    /// The body could not be read as the expected JSON document.
    #[error(transparent)]
    InvalidBody(#[from] JsonRejection),
}

impl ApiError {
    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::NotFound(detail.into())
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::BadRequest(detail.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Auth(e) => e.into_response(),
            Self::NotFound(detail) => {
                (StatusCode::NOT_FOUND, Json(detail_json(&detail))).into_response()
            }
            Self::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, Json(detail_json(&detail))).into_response()
            }
            Self::InvalidBody(rejection) => {
                (rejection.status(), Json(detail_json(&rejection.body_text()))).into_response()
            }
        }
    }
}
