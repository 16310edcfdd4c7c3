//! HTTP routes.

pub mod auth;
pub mod clinics;
mod error;
pub mod health;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::server::AppState;

pub use error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .route("/clinics", get(clinics::list_clinics))
        .route("/clinics/{id}", put(clinics::rename_clinic))
}
