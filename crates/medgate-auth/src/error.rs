//! Authentication and authorization error types.
//!
//! This module defines every error the access-control core can surface.
//! Audit and anomaly failures are deliberately absent: those are absorbed
//! by their components and reported through typed outcomes instead.

use std::fmt;

/// Errors that can occur during authentication and authorization operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The bearer credential has a bad signature, cannot be decoded, or lacks a subject.
    #[error("Invalid credential: {message}")]
    InvalidCredential {
        /// Description of why the credential is invalid.
        message: String,
    },

    /// The bearer credential is past its expiry time.
    #[error("Credential expired")]
    CredentialExpired,

    /// No active principal matches the credential's subject.
    #[error("Principal not found")]
    PrincipalNotFound,

    /// The request could not be authenticated.
    ///
    /// This is what the orchestrator surfaces for every credential or
    /// principal failure, so callers cannot tell a missing account from a
    /// bad token.
    #[error("Unauthenticated: {message}")]
    Unauthenticated {
        /// Client-safe description.
        message: String,
    },

    /// The authenticated principal lacks the role, permission or clinic scope.
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Description naming the missing role or permission.
        message: String,
    },

    /// The request is malformed.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// An error occurred while reading or writing the backing store.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The auth configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidCredential` error.
    #[must_use]
    pub fn invalid_credential(message: impl Into<String>) -> Self {
        Self::InvalidCredential {
            message: message.into(),
        }
    }

    /// Creates a new `Unauthenticated` error.
    #[must_use]
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated {
            message: message.into(),
        }
    }

    /// Creates a new `Forbidden` error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredential { .. }
                | Self::CredentialExpired
                | Self::PrincipalNotFound
                | Self::Unauthenticated { .. }
                | Self::Forbidden { .. }
                | Self::InvalidRequest { .. }
        )
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. }
        )
    }

    /// Returns `true` if this is an authentication error.
    #[must_use]
    pub fn is_authentication_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredential { .. }
                | Self::CredentialExpired
                | Self::PrincipalNotFound
                | Self::Unauthenticated { .. }
        )
    }

    /// Returns `true` if this is an authorization error.
    #[must_use]
    pub fn is_authorization_error(&self) -> bool {
        matches!(self, Self::Forbidden { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidCredential { .. } | Self::CredentialExpired => ErrorCategory::Credential,
            Self::PrincipalNotFound | Self::Unauthenticated { .. } => {
                ErrorCategory::Authentication
            }
            Self::Forbidden { .. } => ErrorCategory::Authorization,
            Self::InvalidRequest { .. } => ErrorCategory::Validation,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of authentication/authorization errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Identity verification failed after the credential was accepted.
    Authentication,
    /// Permission, role or clinic-scope checks.
    Authorization,
    /// Credential decoding, signature and expiry.
    Credential,
    /// Request validation errors.
    Validation,
    /// Infrastructure/storage errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal server errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Authorization => write!(f, "authorization"),
            Self::Credential => write!(f, "credential"),
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::invalid_credential("bad signature");
        assert_eq!(err.to_string(), "Invalid credential: bad signature");

        let err = AuthError::CredentialExpired;
        assert_eq!(err.to_string(), "Credential expired");

        let err = AuthError::forbidden("Required permission: view_reports");
        assert_eq!(
            err.to_string(),
            "Forbidden: Required permission: view_reports"
        );
    }

    #[test]
    fn test_error_predicates() {
        let err = AuthError::PrincipalNotFound;
        assert!(err.is_client_error());
        assert!(err.is_authentication_error());
        assert!(!err.is_authorization_error());

        let err = AuthError::forbidden("no access");
        assert!(err.is_client_error());
        assert!(!err.is_authentication_error());
        assert!(err.is_authorization_error());

        let err = AuthError::storage("database down");
        assert!(!err.is_client_error());
        assert!(err.is_server_error());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            AuthError::CredentialExpired.category(),
            ErrorCategory::Credential
        );
        assert_eq!(
            AuthError::unauthenticated("x").category(),
            ErrorCategory::Authentication
        );
        assert_eq!(
            AuthError::forbidden("x").category(),
            ErrorCategory::Authorization
        );
        assert_eq!(
            AuthError::storage("x").category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(ErrorCategory::Credential.to_string(), "credential");
    }
}
