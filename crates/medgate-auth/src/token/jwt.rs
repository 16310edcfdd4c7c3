//! HS256 access tokens.
//!
//! Tokens are issued by the login flow and verified on every protected
//! request. The claim set is deliberately small:
//!
//! - `sub`: the principal's username
//! - `iat`: issue time (Unix seconds)
//! - `exp`: expiry time (Unix seconds)
//! - `type`: always `"access"`
//!
//! Expiry is checked against an injected [`Clock`] rather than by the JWT
//! library, so a token with expiry `T` is accepted strictly before `T` and
//! rejected from `T` onwards with no leeway.
//!
//! ## Example
//!
//! ```ignore
//! let issuer = CredentialIssuer::new(&config.signing, &config.tokens, clock.clone());
//! let verifier = CredentialVerifier::new(&config.signing, clock);
//!
//! let issued = issuer.issue("alice")?;
//! let verified = verifier.verify(&issued.token)?;
//! assert_eq!(verified.subject, "alice");
//! ```

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::clock::Clock;
use crate::config::{SigningConfig, TokenConfig};
use crate::error::AuthError;

/// The only token kind this service issues or accepts.
pub const ACCESS_TOKEN_TYPE: &str = "access";

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while issuing or verifying credentials.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Signature, encoding or payload is not acceptable.
    #[error("Invalid credential: {message}")]
    Invalid {
        /// Description of the failure.
        message: String,
    },

    /// The credential's expiry time has passed.
    #[error("Credential expired")]
    Expired,

    /// A required claim is absent or empty.
    #[error("Missing required claim: {claim}")]
    MissingClaim {
        /// Name of the missing claim.
        claim: String,
    },

    /// Failed to produce a token.
    #[error("Failed to encode credential: {message}")]
    Encoding {
        /// Description of the encoding error.
        message: String,
    },
}

impl CredentialError {
    /// Creates a new `Invalid` error.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Creates a new `MissingClaim` error.
    #[must_use]
    pub fn missing_claim(claim: impl Into<String>) -> Self {
        Self::MissingClaim {
            claim: claim.into(),
        }
    }

    /// Creates a new `Encoding` error.
    #[must_use]
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for CredentialError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::MissingRequiredClaim(claim) => Self::missing_claim(claim.clone()),
            ErrorKind::InvalidSignature => Self::invalid("signature does not verify"),
            _ => Self::invalid(err.to_string()),
        }
    }
}

impl From<CredentialError> for AuthError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Expired => AuthError::CredentialExpired,
            CredentialError::Invalid { message } => AuthError::invalid_credential(message),
            CredentialError::MissingClaim { claim } => {
                AuthError::invalid_credential(format!("missing claim '{claim}'"))
            }
            CredentialError::Encoding { message } => AuthError::internal(message),
        }
    }
}

// ============================================================================
// Claims
// ============================================================================

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessTokenClaims {
    /// Subject (username).
    #[serde(default)]
    pub sub: String,

    /// Issued at (Unix timestamp).
    #[serde(default)]
    pub iat: i64,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Token kind.
    #[serde(rename = "type", default)]
    pub token_type: String,
}

/// A credential whose signature, kind and freshness have been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCredential {
    /// The subject identifier (username).
    pub subject: String,

    /// When the credential was issued.
    pub issued_at: OffsetDateTime,

    /// When the credential stops being accepted.
    pub expires_at: OffsetDateTime,
}

/// A freshly signed access token.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    /// The compact JWT.
    pub token: String,

    /// When the token stops being accepted.
    pub expires_at: OffsetDateTime,

    /// Lifetime in whole seconds.
    pub expires_in: i64,
}

// ============================================================================
// Verifier
// ============================================================================

/// Verifies bearer credentials against the configured signing secret.
///
/// Thread-safe and cheap to share behind an `Arc`.
#[derive(Clone)]
pub struct CredentialVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl CredentialVerifier {
    /// Creates a verifier for the given signing configuration.
    #[must_use]
    pub fn new(signing: &SigningConfig, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false; // checked against our own clock
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            decoding_key: DecodingKey::from_secret(signing.secret.as_bytes()),
            validation,
            clock,
        }
    }

    /// Verifies a token against the current time.
    ///
    /// # Errors
    ///
    /// See [`Self::verify_at`].
    pub fn verify(&self, token: &str) -> Result<VerifiedCredential, CredentialError> {
        self.verify_at(token, self.clock.now())
    }

    /// Verifies a token as of `now`.
    ///
    /// # Errors
    ///
    /// - `Invalid` if the signature does not verify, the payload cannot be
    ///   decoded or the token kind is not `access`
    /// - `MissingClaim` if `sub` is absent or empty
    /// - `Expired` if `now` is at or past the `exp` claim
    pub fn verify_at(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<VerifiedCredential, CredentialError> {
        let claims = decode::<AccessTokenClaims>(token, &self.decoding_key, &self.validation)?.claims;

        if claims.sub.is_empty() {
            return Err(CredentialError::missing_claim("sub"));
        }

        if claims.token_type != ACCESS_TOKEN_TYPE {
            return Err(CredentialError::invalid(format!(
                "unexpected token type '{}'",
                claims.token_type
            )));
        }

        if now.unix_timestamp() >= claims.exp {
            return Err(CredentialError::Expired);
        }

        let expires_at = OffsetDateTime::from_unix_timestamp(claims.exp)
            .map_err(|e| CredentialError::invalid(e.to_string()))?;
        let issued_at = OffsetDateTime::from_unix_timestamp(claims.iat)
            .map_err(|e| CredentialError::invalid(e.to_string()))?;

        Ok(VerifiedCredential {
            subject: claims.sub,
            issued_at,
            expires_at,
        })
    }
}

// ============================================================================
// Issuer
// ============================================================================

/// Signs access tokens for the login flow.
#[derive(Clone)]
pub struct CredentialIssuer {
    encoding_key: EncodingKey,
    lifetime: Duration,
    clock: Arc<dyn Clock>,
}

impl CredentialIssuer {
    /// Creates an issuer for the given signing and token configuration.
    #[must_use]
    pub fn new(signing: &SigningConfig, tokens: &TokenConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(signing.secret.as_bytes()),
            lifetime: tokens.access_token_lifetime,
            clock,
        }
    }

    /// Issues an access token for `subject` with the configured lifetime.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn issue(&self, subject: &str) -> Result<IssuedCredential, CredentialError> {
        self.issue_at(subject, self.clock.now())
    }

    /// Issues an access token as if the current time were `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn issue_at(
        &self,
        subject: &str,
        now: OffsetDateTime,
    ) -> Result<IssuedCredential, CredentialError> {
        let expires_in = i64::try_from(self.lifetime.as_secs())
            .map_err(|_| CredentialError::encoding("token lifetime out of range"))?;
        let iat = now.unix_timestamp();
        let claims = AccessTokenClaims {
            sub: subject.to_string(),
            iat,
            exp: iat + expires_in,
            token_type: ACCESS_TOKEN_TYPE.to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| CredentialError::encoding(e.to_string()))?;
        let expires_at = OffsetDateTime::from_unix_timestamp(claims.exp)
            .map_err(|e| CredentialError::encoding(e.to_string()))?;

        Ok(IssuedCredential {
            token,
            expires_at,
            expires_in,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
