//! PostgreSQL storage backend for MedGate Auth
//!
//! Provides persistent storage for:
//!
//! - Users with their role, clinic and permission grants (`users`)
//! - Clinic reference data (`clinics`)
//! - The append-only audit trail (`audit_log`)
//! - Login attempts (`login_logs`)
//!
//! The schema lives in `migrations/` and can be applied with
//! [`PostgresSecurityStore::ensure_schema`].
//!
//! # Example
//!
//! ```ignore
//! use medgate_auth_postgres::PostgresSecurityStore;
//!
//! let store = PostgresSecurityStore::connect("postgres://localhost/medgate", 10).await?;
//! let user = store.users().find_active_by_username("alice").await?;
//! ```

pub mod audit;
pub mod clinic;
pub mod login;
pub mod storage_adapters;
pub mod user;

use std::sync::Arc;

use medgate_auth::AuthError;
use sqlx_core::pool::Pool;
use sqlx_postgres::Postgres;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use audit::AuditLogStorage;
pub use clinic::ClinicStorage;
pub use login::LoginLogStorage;
pub use user::{UserRow, UserStorage};

/// Schema for the tables the core reads and writes.
pub const SCHEMA: &str = include_str!("../migrations/0001_security_core.sql");

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row holds a value the core does not understand.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl StorageError {
    /// Create an `InvalidData` error.
    #[must_use]
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData(message.into())
    }

    /// Returns `true` if this is a database error.
    #[must_use]
    pub fn is_database_error(&self) -> bool {
        matches!(self, Self::Database(_))
    }

    /// Returns `true` if this is an invalid data error.
    #[must_use]
    pub fn is_invalid_data(&self) -> bool {
        matches!(self, Self::InvalidData(_))
    }
}

impl From<StorageError> for AuthError {
    fn from(e: StorageError) -> Self {
        AuthError::storage(e.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// PostgreSQL Security Store
// =============================================================================

/// PostgreSQL storage backend for the access-control core.
///
/// Holds a connection pool and hands out per-table storage types. The
/// core's store traits are implemented on this type in
/// [`storage_adapters`].
#[derive(Debug, Clone)]
pub struct PostgresSecurityStore {
    pool: Arc<PgPool>,
}

impl PostgresSecurityStore {
    /// Create new storage with an existing connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create new storage by connecting to the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> StorageResult<Self> {
        use sqlx_core::pool::PoolOptions;
        let pool = PoolOptions::<Postgres>::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Creates the tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if a statement fails.
    pub async fn ensure_schema(&self) -> StorageResult<()> {
        sqlx_core::raw_sql::raw_sql(SCHEMA)
            .execute(self.pool.as_ref())
            .await?;
        tracing::info!("Security schema is up to date");
        Ok(())
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // -------------------------------------------------------------------------
    // Storage Accessors
    // -------------------------------------------------------------------------

    /// Get user storage operations.
    #[must_use]
    pub fn users(&self) -> UserStorage<'_> {
        UserStorage::new(&self.pool)
    }

    /// Get clinic storage operations.
    #[must_use]
    pub fn clinics(&self) -> ClinicStorage<'_> {
        ClinicStorage::new(&self.pool)
    }

    /// Get audit log storage operations.
    #[must_use]
    pub fn audit_log(&self) -> AuditLogStorage<'_> {
        AuditLogStorage::new(&self.pool)
    }

    /// Get login log storage operations.
    #[must_use]
    pub fn login_logs(&self) -> LoginLogStorage<'_> {
        LoginLogStorage::new(&self.pool)
    }
}

// =============================================================================
// Tests
// =============================================================================
