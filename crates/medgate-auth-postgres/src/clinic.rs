//! Clinic storage.

use sqlx_core::query_as::query_as;
use sqlx_postgres::Postgres;

use medgate_auth::principal::{Clinic, ClinicId};
use medgate_auth::scope::ClinicScope;

use crate::{PgPool, StorageResult};

/// Clinic storage operations.
pub struct ClinicStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> ClinicStorage<'a> {
    /// Create a new clinic storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List the active clinics a scope can see, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_active(&self, scope: &ClinicScope) -> StorageResult<Vec<Clinic>> {
        let Some(sql) = list_active_sql(scope) else {
            return Ok(Vec::new());
        };

        let query = query_as::<Postgres, (i64, String, bool)>(&sql);
        let query = match scope.clinic_ids() {
            Some(ids) => query.bind(ids),
            None => query,
        };
        let rows = query.fetch_all(self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|(id, name, active)| Clinic { id, name, active })
            .collect())
    }

    /// Rename a clinic, returning the row as it was before the update.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn rename(&self, clinic_id: ClinicId, name: &str) -> StorageResult<Option<Clinic>> {
        let row: Option<(i64, String, bool)> = query_as(
            r#"
            UPDATE clinics AS c
            SET name = $2
            FROM (SELECT id, name FROM clinics WHERE id = $1 FOR UPDATE) AS prev
            WHERE c.id = prev.id
            RETURNING c.id, prev.name, c.is_active
            "#,
        )
        .bind(clinic_id)
        .bind(name)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|(id, name, active)| Clinic { id, name, active }))
    }
}

/// Listing query for a scope; `None` when the scope sees nothing.
fn list_active_sql(scope: &ClinicScope) -> Option<String> {
    let predicate = scope.sql_predicate("id", 1)?;
    Some(format!(
        "SELECT id, name, is_active FROM clinics WHERE is_active = TRUE AND {predicate} ORDER BY name"
    ))
}
