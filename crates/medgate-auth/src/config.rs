//! Authentication, audit and anomaly-detection configuration.
//!
//! Every tunable the core consumes lives here and is handed to components
//! at construction time; nothing reads process-wide state.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Root configuration for the access-control core.
///
/// # Example (TOML)
///
/// ```toml
/// [auth.signing]
/// secret = "change-me"
///
/// [auth.tokens]
/// access_token_lifetime = "8h"
///
/// [auth.anomaly]
/// rate_limit = 20
/// rate_window = "5m"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Token signing configuration.
    pub signing: SigningConfig,

    /// Token issuance configuration.
    pub tokens: TokenConfig,

    /// Audit trail configuration.
    pub audit: AuditConfig,

    /// Suspicious-activity heuristics.
    pub anomaly: AnomalyConfig,
}

/// Token signing configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Shared secret for the HMAC signature.
    pub secret: String,

    /// Signing algorithm. Only `HS256` is accepted.
    pub algorithm: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            algorithm: "HS256".to_string(),
        }
    }
}

impl std::fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningConfig")
            .field("secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// Token issuance configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Lifetime of an access token.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime: Duration::from_secs(480 * 60), // 8 hours
        }
    }
}

/// Audit trail configuration.
///
/// Mutating operations are always audited; only login-attempt logging can
/// be switched off.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Record login attempts (successful and failed).
    pub log_login_attempts: bool,

    /// Take the client address from `X-Forwarded-For` / `X-Real-IP`.
    ///
    /// Only enable behind a reverse proxy that overwrites these headers;
    /// otherwise the socket peer is recorded.
    pub trust_forwarded_headers: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_login_attempts: true,
            trust_forwarded_headers: false,
        }
    }
}

/// Thresholds for the suspicious-activity heuristics.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Run the detector after audited operations.
    pub enabled: bool,

    /// Amount above which a transaction counts as large.
    pub large_transaction_threshold: Decimal,

    /// Large transactions tolerated inside the window before flagging.
    pub large_transaction_limit: u64,

    /// Trailing window for the large-transaction heuristic.
    #[serde(with = "humantime_serde")]
    pub large_transaction_window: Duration,

    /// Audited actions tolerated inside the window before flagging.
    pub rate_limit: u64,

    /// Trailing window for the action-rate heuristic.
    #[serde(with = "humantime_serde")]
    pub rate_window: Duration,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            large_transaction_threshold: Decimal::from(10_000),
            large_transaction_limit: 3,
            large_transaction_window: Duration::from_secs(3600),
            rate_limit: 20,
            rate_window: Duration::from_secs(300),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Creates a configuration with the given signing secret and defaults elsewhere.
    #[must_use]
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            signing: SigningConfig {
                secret: secret.into(),
                ..SigningConfig::default()
            },
            ..Self::default()
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the signing secret is empty and
    /// `ConfigError::InvalidValue` if:
    /// - The signing algorithm is not `HS256`
    /// - The token lifetime is zero
    /// - An anomaly window is zero or the threshold is negative
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signing.secret.is_empty() {
            return Err(ConfigError::Missing("signing.secret".to_string()));
        }

        if self.signing.algorithm != "HS256" {
            return Err(ConfigError::InvalidValue(format!(
                "Invalid signing algorithm: '{}'. Must be HS256",
                self.signing.algorithm
            )));
        }

        if self.tokens.access_token_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "tokens.access_token_lifetime must be > 0".to_string(),
            ));
        }

        if self.anomaly.large_transaction_window.is_zero() || self.anomaly.rate_window.is_zero() {
            return Err(ConfigError::InvalidValue(
                "anomaly windows must be > 0".to_string(),
            ));
        }

        if self.anomaly.large_transaction_threshold.is_sign_negative() {
            return Err(ConfigError::InvalidValue(
                "anomaly.large_transaction_threshold must not be negative".to_string(),
            ));
        }

        Ok(())
    }
}
