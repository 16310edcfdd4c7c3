//! Login log storage and last-login bookkeeping.

use sqlx_core::query::query;

use medgate_auth::login::LoginAttempt;
use medgate_auth::principal::UserId;

use crate::{PgPool, StorageResult};

/// Login log storage operations.
pub struct LoginLogStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> LoginLogStorage<'a> {
    /// Create a new login log storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Record a login attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn record(&self, attempt: &LoginAttempt) -> StorageResult<()> {
        query(
            r#"
            INSERT INTO login_logs
                (user_id, username, ip_address, user_agent, success, failure_reason, attempted_at)
            VALUES ($1, $2, $3::inet, $4, $5, $6, $7)
            "#,
        )
        .bind(attempt.user_id)
        .bind(&attempt.username)
        .bind(attempt.source.ip_address.map(|ip| ip.to_string()))
        .bind(attempt.source.user_agent.as_deref())
        .bind(attempt.success)
        .bind(attempt.failure_reason.as_deref())
        .bind(attempt.attempted_at)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Stamp the user's last successful login.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn touch_last_login(&self, user_id: UserId, attempt: &LoginAttempt) -> StorageResult<()> {
        query(
            r#"
            UPDATE users
            SET last_login = $2,
                last_login_ip = $3::inet
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(attempt.attempted_at)
        .bind(attempt.source.ip_address.map(|ip| ip.to_string()))
        .execute(self.pool)
        .await?;

        Ok(())
    }
}
