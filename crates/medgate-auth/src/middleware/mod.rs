//! HTTP surface for the access-control core.
//!
//! This module provides Axum pieces for:
//!
//! - Bearer credential extraction
//! - Request authentication through the [`SecurityOrchestrator`]
//! - Audit source extraction (client address, user agent)
//! - `{"detail": ...}` error responses
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use medgate_auth::middleware::{AuthState, Authenticated};
//!
//! async fn me(Authenticated(principal): Authenticated) -> String {
//!     format!("Hello, {}!", principal.username)
//! }
//!
//! let app = Router::new()
//!     .route("/me", get(me))
//!     .with_state(AuthState::new(security));
//! ```
//!
//! [`SecurityOrchestrator`]: crate::security::SecurityOrchestrator

pub mod auth;
pub mod error;

pub use auth::{AuthState, Authenticated, BearerCredential, RequestSource};
pub use error::detail_json;
