//! Audit log storage.
//!
//! Rows are only ever inserted. Trailing windows are measured from the
//! database's `NOW()`, not the application clock.

use sqlx_core::query_as::query_as;
use time::OffsetDateTime;

use medgate_auth::audit::{AuditCountFilter, AuditEntry, AuditRecord};

use crate::{PgPool, StorageError, StorageResult};

/// Audit log storage operations.
pub struct AuditLogStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> AuditLogStorage<'a> {
    /// Create a new audit log storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Append one record, stamped with the database time.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn append(&self, entry: &AuditEntry) -> StorageResult<AuditRecord> {
        let ip_address = entry.source.ip_address.map(|ip| ip.to_string());

        let (id, timestamp): (i64, OffsetDateTime) = query_as(
            r#"
            INSERT INTO audit_log
                (table_name, record_id, action, old_values, new_values,
                 user_id, ip_address, user_agent, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7::inet, $8, NOW())
            RETURNING id, timestamp
            "#,
        )
        .bind(&entry.table_name)
        .bind(entry.record_id)
        .bind(entry.action.as_str())
        .bind(entry.old_values.clone())
        .bind(entry.new_values.clone())
        .bind(entry.user_id)
        .bind(ip_address)
        .bind(entry.source.user_agent.as_deref())
        .fetch_one(self.pool)
        .await?;

        Ok(AuditRecord::from_entry(id, entry, timestamp))
    }

    /// Count one user's records inside a trailing window.
    ///
    /// With `amount_above` set, only rows whose `new_values.amount` parses
    /// as a number above it are counted.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count_recent(&self, filter: &AuditCountFilter) -> StorageResult<u64> {
        let window_secs = i64::try_from(filter.window.as_secs())
            .map_err(|_| StorageError::invalid_data("audit window out of range"))?;

        let (count,): (i64,) = match filter.amount_above {
            None => {
                query_as(
                    r#"
                    SELECT COUNT(*)
                    FROM audit_log
                    WHERE user_id = $1
                      AND timestamp > NOW() - ($2::bigint * INTERVAL '1 second')
                    "#,
                )
                .bind(filter.user_id)
                .bind(window_secs)
                .fetch_one(self.pool)
                .await?
            }
            Some(threshold) => {
                query_as(
                    r#"
                    SELECT COUNT(*)
                    FROM audit_log
                    WHERE user_id = $1
                      AND timestamp > NOW() - ($2::bigint * INTERVAL '1 second')
                      AND CASE
                            WHEN btrim(new_values->>'amount') ~ '^-?[0-9]+(\.[0-9]+)?$'
                            THEN CAST(btrim(new_values->>'amount') AS NUMERIC) > $3
                            ELSE FALSE
                          END
                    "#,
                )
                .bind(filter.user_id)
                .bind(window_secs)
                .bind(threshold)
                .fetch_one(self.pool)
                .await?
            }
        };

        u64::try_from(count).map_err(|_| StorageError::invalid_data("negative audit count"))
    }
}
