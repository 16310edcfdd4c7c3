//! User storage.
//!
//! Users are looked up by username together with their clinic's name. The
//! `permissions` column holds the explicit grant mapping as JSONB.

use sqlx_core::query_as::query_as;

use medgate_auth::principal::{ClinicId, PermissionGrants, Principal, Role, UserId};

use crate::{PgPool, StorageError, StorageResult};

// =============================================================================
// Types
// =============================================================================

type UserTuple = (
    i64,
    String,
    Option<String>,
    Option<String>,
    String,
    Option<i64>,
    Option<String>,
    serde_json::Value,
    bool,
    String,
);

/// User record from the database, joined with its clinic name.
#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: UserId,
    pub username: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub role: String,
    pub clinic_id: Option<ClinicId>,
    pub clinic_name: Option<String>,
    pub permissions: serde_json::Value,
    pub is_active: bool,
    pub password_hash: String,
}

impl UserRow {
    fn from_tuple(row: UserTuple) -> Self {
        Self {
            id: row.0,
            username: row.1,
            full_name: row.2,
            email: row.3,
            role: row.4,
            clinic_id: row.5,
            clinic_name: row.6,
            permissions: row.7,
            is_active: row.8,
            password_hash: row.9,
        }
    }

    /// Converts the row into a principal.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if the role column holds an unknown role.
    pub fn to_principal(&self) -> StorageResult<Principal> {
        let role: Role = self.role.parse().map_err(|_| {
            StorageError::invalid_data(format!(
                "user {} has unknown role '{}'",
                self.id, self.role
            ))
        })?;

        Ok(Principal {
            id: self.id,
            username: self.username.clone(),
            full_name: self.full_name.clone(),
            email: self.email.clone(),
            role,
            clinic_id: self.clinic_id,
            clinic_name: self.clinic_name.clone(),
            grants: PermissionGrants::from_json(&self.permissions),
            active: self.is_active,
        })
    }
}

// =============================================================================
// User Storage
// =============================================================================

/// User storage operations.
pub struct UserStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> UserStorage<'a> {
    /// Create a new user storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Find an active user by username.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_active_by_username(&self, username: &str) -> StorageResult<Option<UserRow>> {
        let row: Option<UserTuple> = query_as(
            r#"
            SELECT u.id, u.username, u.full_name, u.email, u.role,
                   u.clinic_id, c.name, u.permissions, u.is_active, u.password_hash
            FROM users u
            LEFT JOIN clinics c ON c.id = u.clinic_id
            WHERE u.username = $1
              AND u.is_active = TRUE
            "#,
        )
        .bind(username)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(UserRow::from_tuple))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medgate_auth::principal::Permission;
    use serde_json::json;

    fn row(role: &str) -> UserRow {
        UserRow {
            id: 12,
            username: "nora".to_string(),
            full_name: Some("Nora Vale".to_string()),
            email: None,
            role: role.to_string(),
            clinic_id: Some(3),
            clinic_name: Some("Harbour".to_string()),
            permissions: json!({ "view_clinic": true, "edit_clinic": false }),
            is_active: true,
            password_hash: "$argon2id$...".to_string(),
        }
    }

    #[test]
    fn test_row_to_principal() {
        let principal = row("management_staff").to_principal().unwrap();
        assert_eq!(principal.role, Role::ManagementStaff);
        assert_eq!(principal.clinic_id, Some(3));
        assert_eq!(principal.clinic_label(), "Harbour");
        assert!(principal.grants.is_granted(Permission::ViewClinic));
        assert!(!principal.grants.is_granted(Permission::EditClinic));
    }

    #[test]
    fn test_unknown_role_is_invalid_data() {
        let err = row("owner").to_principal().unwrap_err();
        assert!(err.is_invalid_data());
    }
}
