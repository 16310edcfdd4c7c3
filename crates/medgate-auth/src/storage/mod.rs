//! Storage traits consumed by the access-control core.
//!
//! The core never talks to a database directly. Each component receives
//! the narrow capability it needs:
//!
//! - [`PrincipalStore`] - fetch principal by subject
//! - [`AuditStore`] - append audit record, count audit records in a window
//! - [`ClinicStore`] - list clinics visible to a scope
//! - [`LoginStore`] - password lookup and login bookkeeping
//!
//! # Implementations
//!
//! - [`memory::InMemoryStore`] - in-process fake used by tests and demos
//! - `medgate-auth-postgres` - PostgreSQL storage backend
//!
//! # Security Considerations
//!
//! - Never log password hashes
//! - Audit records are append-only; no trait exposes update or delete

pub mod memory;

use async_trait::async_trait;

use crate::AuthResult;
use crate::audit::{AuditCountFilter, AuditEntry, AuditRecord};
use crate::login::{LoginAccount, LoginAttempt};
use crate::principal::{Clinic, ClinicId, Principal, UserId};
use crate::scope::ClinicScope;

/// Lookup of principals by credential subject.
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    /// Finds the active principal with the given username, joined with its
    /// clinic name.
    ///
    /// Returns `None` when no active principal matches.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_active_principal(&self, username: &str) -> AuthResult<Option<Principal>>;
}

/// Append-only audit trail.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Appends one record, stamping it with the store's current time.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails. Callers are expected to absorb it.
    async fn append(&self, entry: &AuditEntry) -> AuthResult<AuditRecord>;

    /// Counts one principal's records inside a trailing window.
    ///
    /// The window is measured back from the store's own clock at query time.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn count_recent(&self, filter: &AuditCountFilter) -> AuthResult<u64>;
}

/// Clinic reference data.
#[async_trait]
pub trait ClinicStore: Send + Sync {
    /// Lists the active clinics visible to `scope`, ordered by name.
    ///
    /// An empty scope yields an empty list without touching storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list_clinics(&self, scope: &ClinicScope) -> AuthResult<Vec<Clinic>>;

    /// Renames a clinic, returning its previous state.
    ///
    /// Returns `None` when no clinic has the given id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn rename_clinic(&self, clinic_id: ClinicId, name: &str) -> AuthResult<Option<Clinic>>;
}

/// Password lookup and login bookkeeping.
#[async_trait]
pub trait LoginStore: Send + Sync {
    /// Finds an active account with its stored password hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_login_account(&self, username: &str) -> AuthResult<Option<LoginAccount>>;

    /// Records a login attempt, successful or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn record_login_attempt(&self, attempt: &LoginAttempt) -> AuthResult<()>;

    /// Stamps the user's last successful login.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn touch_last_login(&self, user_id: UserId, attempt: &LoginAttempt) -> AuthResult<()>;
}
