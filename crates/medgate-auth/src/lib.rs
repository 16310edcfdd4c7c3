//! # medgate-auth
//!
//! Access control, audit trail and anomaly detection for the MedGate
//! multi-clinic record platform.
//!
//! This crate provides:
//! - Bearer credential verification and issuance
//! - Principal resolution with live grants and active flag
//! - Clinic scoping for every query that touches clinic data
//! - Permission, role and transaction-window checks
//! - Best-effort audit logging of every mutating action
//! - Advisory anomaly detection over the audit trail
//!
//! ## Overview
//!
//! Protected operations go through the [`SecurityOrchestrator`], which
//! verifies the credential, resolves the principal, evaluates the
//! operation's requirements, runs it, audits it and checks for anomalies.
//! Stores are injected as traits so the whole core runs against
//! [`storage::memory::InMemoryStore`] in tests.
//!
//! ## Modules
//!
//! - [`config`] - Signing, token, audit and anomaly configuration
//! - [`token`] - Credential verification and issuance
//! - [`principal`] - Principals, roles, permissions and the resolver
//! - [`scope`] - Clinic scope resolution
//! - [`permission`] - Permission evaluation and requirements
//! - [`audit`] - Audit records and the audit logger
//! - [`anomaly`] - Suspicious-activity heuristics
//! - [`security`] - The orchestrator
//! - [`login`] - Password login
//! - [`middleware`] - Axum extractors and error responses
//! - [`storage`] - Store traits and the in-memory store

pub mod anomaly;
pub mod audit;
pub mod clock;
pub mod config;
pub mod error;
pub mod login;
pub mod middleware;
pub mod permission;
pub mod principal;
pub mod scope;
pub mod security;
pub mod storage;
pub mod token;

pub use anomaly::{AnomalyDetector, AnomalyReason, AnomalySignal};
pub use audit::{AuditAction, AuditEntry, AuditLogger, AuditOutcome, AuditRecord, AuditSource};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, ErrorCategory};
pub use login::{Argon2Verifier, LoginService, PasswordVerifier};
pub use middleware::{AuthState, Authenticated, BearerCredential, RequestSource};
pub use permission::{PermissionEvaluator, Requirement};
pub use principal::{Clinic, ClinicId, Permission, Principal, PrincipalResolver, Role, UserId};
pub use scope::{ClinicScope, ScopeFilter};
pub use security::{Authorized, Mutation, Outcome, SecurityOrchestrator};
pub use storage::{AuditStore, ClinicStore, LoginStore, PrincipalStore};
pub use token::{CredentialIssuer, CredentialVerifier};

/// Result type for auth operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude for common imports.
///
/// ```ignore
/// use medgate_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::audit::{AuditAction, AuditEntry, AuditOutcome, AuditSource};
    pub use crate::config::AuthConfig;
    pub use crate::error::AuthError;
    pub use crate::middleware::{AuthState, Authenticated, RequestSource};
    pub use crate::permission::Requirement;
    pub use crate::principal::{Permission, Principal, Role};
    pub use crate::scope::ClinicScope;
    pub use crate::security::{Authorized, Mutation, Outcome, SecurityOrchestrator};
}
