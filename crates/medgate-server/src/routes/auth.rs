//! Login, logout and current-user endpoints.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use medgate_auth::{Authenticated, ClinicScope, Principal, RequestSource};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::server::AppState;

use super::ApiError;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: Principal,
}

#[derive(Debug, Serialize)]
pub struct CurrentUser {
    #[serde(flatten)]
    pub principal: Principal,
    pub clinic_label: String,
    pub scope: ClinicScope,
}

pub async fn login(
    State(state): State<AppState>,
    RequestSource(source): RequestSource,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Json(body) = payload?;
    if body.username.trim().is_empty() || body.password.is_empty() {
        return Err(ApiError::bad_request("Username and password are required"));
    }

    let success = state
        .login
        .login(body.username.trim(), &body.password, source)
        .await?;

    Ok(Json(TokenResponse {
        access_token: success.credential.token,
        token_type: "bearer",
        expires_in: success.credential.expires_in,
        user: success.principal,
    }))
}

/// Credentials are stateless, so logging out only acknowledges the request.
pub async fn logout(Authenticated(principal): Authenticated) -> Json<Value> {
    tracing::info!(user_id = principal.id, username = %principal.username, "User logged out");
    Json(json!({ "detail": "Logged out successfully" }))
}

pub async fn me(Authenticated(principal): Authenticated) -> Json<CurrentUser> {
    let scope = ClinicScope::resolve(&principal);
    let clinic_label = principal.clinic_label().to_string();
    Json(CurrentUser {
        principal,
        clinic_label,
        scope,
    })
}
