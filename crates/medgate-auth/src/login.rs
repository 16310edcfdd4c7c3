//! Username/password login.
//!
//! Verifies a password against its stored Argon2 hash, issues an access
//! credential and records the attempt. Every failure produces the same
//! message, and an unknown username costs the same Argon2 run as a wrong
//! password, so callers cannot tell which usernames exist.

use std::sync::Arc;

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier as PhcVerifier, SaltString,
};
use serde::Serialize;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::audit::AuditSource;
use crate::clock::Clock;
use crate::config::AuditConfig;
use crate::error::AuthError;
use crate::principal::{Principal, UserId};
use crate::storage::LoginStore;
use crate::token::{CredentialIssuer, IssuedCredential};

/// Message returned for every failed login.
pub const INVALID_LOGIN: &str = "Invalid username or password";

/// Verified against when the username is unknown, so that path costs one
/// Argon2 run like a wrong password does. Matches no password.
const DUMMY_PASSWORD_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$FZafRkwWkVFiVgn+oddvWw$tOHCeXDTjmF3hR/o99Gf+cxzacpbYdSaMpdxSsSPNSA";

/// An account as needed for password login.
#[derive(Debug, Clone)]
pub struct LoginAccount {
    pub principal: Principal,
    /// PHC-formatted password hash.
    pub password_hash: String,
}

/// One login attempt, successful or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginAttempt {
    pub username: String,
    pub user_id: Option<UserId>,
    pub success: bool,
    pub failure_reason: Option<String>,
    #[serde(flatten)]
    pub source: AuditSource,
    #[serde(with = "time::serde::rfc3339")]
    pub attempted_at: OffsetDateTime,
}

/// A successful login.
#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub credential: IssuedCredential,
    pub principal: Principal,
}

// =============================================================================
// Password verification
// =============================================================================

/// Compares a plaintext password with a stored hash.
pub trait PasswordVerifier: Send + Sync {
    /// Returns `true` if `password` matches `hash`. A malformed hash never matches.
    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// Argon2 verifier for PHC-formatted hashes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Verifier;

impl PasswordVerifier for Argon2Verifier {
    fn verify(&self, password: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                tracing::warn!(error = %e, "Stored password hash is not a valid PHC string");
                false
            }
        }
    }
}

/// Hashes a password with Argon2id and a random salt.
///
/// # Errors
///
/// Returns `argon2::password_hash::Error` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

// =============================================================================
// Service
// =============================================================================

/// Password login flow.
#[derive(Clone)]
pub struct LoginService {
    store: Arc<dyn LoginStore>,
    verifier: Arc<dyn PasswordVerifier>,
    issuer: CredentialIssuer,
    audit: AuditConfig,
    clock: Arc<dyn Clock>,
}

impl LoginService {
    #[must_use]
    pub fn new(
        store: Arc<dyn LoginStore>,
        verifier: Arc<dyn PasswordVerifier>,
        issuer: CredentialIssuer,
        audit: AuditConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            verifier,
            issuer,
            audit,
            clock,
        }
    }

    /// Logs a user in.
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated` with [`INVALID_LOGIN`] for an unknown or
    /// inactive user or a wrong password, and a storage error if the account
    /// lookup fails.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        source: AuditSource,
    ) -> AuthResult<LoginSuccess> {
        let mut attempt = LoginAttempt {
            username: username.to_string(),
            user_id: None,
            success: false,
            failure_reason: None,
            source,
            attempted_at: self.clock.now(),
        };

        let Some(account) = self.store.find_login_account(username).await? else {
            let _ = self.verifier.verify(password, DUMMY_PASSWORD_HASH);
            attempt.failure_reason = Some("unknown_user".to_string());
            self.record_attempt(&attempt).await;
            tracing::debug!(username, "Login failed: unknown or inactive user");
            return Err(AuthError::unauthenticated(INVALID_LOGIN));
        };

        attempt.user_id = Some(account.principal.id);

        if !self.verifier.verify(password, &account.password_hash) {
            attempt.failure_reason = Some("invalid_password".to_string());
            self.record_attempt(&attempt).await;
            tracing::debug!(username, "Login failed: wrong password");
            return Err(AuthError::unauthenticated(INVALID_LOGIN));
        }

        let credential = self.issuer.issue(username).map_err(AuthError::from)?;

        attempt.success = true;
        self.record_attempt(&attempt).await;
        if let Err(e) = self
            .store
            .touch_last_login(account.principal.id, &attempt)
            .await
        {
            tracing::warn!(error = %e, user_id = account.principal.id, "Failed to update last login");
        }

        tracing::info!(
            user_id = account.principal.id,
            username,
            role = %account.principal.role,
            "User logged in"
        );

        Ok(LoginSuccess {
            credential,
            principal: account.principal,
        })
    }

    async fn record_attempt(&self, attempt: &LoginAttempt) {
        if !self.audit.log_login_attempts {
            return;
        }
        if let Err(e) = self.store.record_login_attempt(attempt).await {
            tracing::warn!(
                error = %e,
                username = %attempt.username,
                "Failed to record login attempt"
            );
        }
    }
}
