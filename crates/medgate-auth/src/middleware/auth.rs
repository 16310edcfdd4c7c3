//! Request extractors.
//!
//! - [`BearerCredential`] pulls the raw token out of `Authorization: Bearer`
//! - [`Authenticated`] runs verification and principal resolution
//! - [`RequestSource`] captures the client address and user agent for audit

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::audit::AuditSource;
use crate::error::AuthError;
use crate::principal::Principal;
use crate::security::{MISSING_CREDENTIALS, SecurityOrchestrator};

// =============================================================================
// Auth State
// =============================================================================

/// State required by the authentication extractors.
///
/// Make it available from the application state via `FromRef`.
#[derive(Clone)]
pub struct AuthState {
    pub security: Arc<SecurityOrchestrator>,
    /// Read the client address from proxy headers instead of the socket peer.
    pub trust_forwarded_headers: bool,
}

impl AuthState {
    #[must_use]
    pub fn new(security: Arc<SecurityOrchestrator>) -> Self {
        Self {
            security,
            trust_forwarded_headers: false,
        }
    }

    #[must_use]
    pub fn with_trusted_forwarded_headers(mut self, trust: bool) -> Self {
        self.trust_forwarded_headers = trust;
        self
    }
}

// =============================================================================
// Extractors
// =============================================================================

/// The raw bearer token of a request.
///
/// Rejects with `Unauthenticated` if the header is missing, not a Bearer
/// header, or empty.
#[derive(Debug, Clone)]
pub struct BearerCredential(pub String);

impl BearerCredential {
    fn from_parts(parts: &Parts) -> Option<Self> {
        parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| Self(t.to_string()))
    }
}

impl<S> FromRequestParts<S> for BearerCredential
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_parts(parts).ok_or_else(|| AuthError::unauthenticated(MISSING_CREDENTIALS))
    }
}

/// The freshly resolved principal behind a request's credential.
///
/// Authorization is left to the handler, which knows what it requires.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Principal);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = AuthState::from_ref(state);
        let credential = BearerCredential::from_parts(parts);

        let principal = auth_state
            .security
            .authenticate(credential.as_ref().map(|c| c.0.as_str()))
            .await?;

        tracing::debug!(
            user_id = principal.id,
            username = %principal.username,
            path = %parts.uri.path(),
            "Request authenticated"
        );

        Ok(Self(principal))
    }
}

/// Where the request came from, for audit records.
///
/// The socket peer comes from `ConnectInfo`; proxy headers are only read
/// when [`AuthState::trust_forwarded_headers`] is set.
#[derive(Debug, Clone, Default)]
pub struct RequestSource(pub AuditSource);

impl<S> FromRequestParts<S> for RequestSource
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let trust_forwarded = AuthState::from_ref(state).trust_forwarded_headers;
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self(AuditSource::from_headers(
            &parts.headers,
            peer,
            trust_forwarded,
        )))
    }
}
