//! Principals, roles and permission grants.
//!
//! A [`Principal`] is the fully loaded user behind a verified credential.
//! It is re-read from the store on every request because grants and the
//! active flag can change between calls.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::PrincipalStore;

/// Identifier of a user row.
pub type UserId = i64;

/// Identifier of a clinic row.
pub type ClinicId = i64;

// =============================================================================
// Role
// =============================================================================

/// Organisational role, totally ordered by rank.
///
/// Variants are declared lowest rank first so the derived ordering gives
/// `Staff < ManagementStaff < Manager < Administrator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Staff,
    ManagementStaff,
    Manager,
    Administrator,
}

impl Role {
    /// Returns the stable string identifier.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Staff => "staff",
            Self::ManagementStaff => "management_staff",
            Self::Manager => "manager",
            Self::Administrator => "administrator",
        }
    }

    /// Human-readable name used in denial messages.
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Staff => "Staff",
            Self::ManagementStaff => "Management Staff",
            Self::Manager => "Manager",
            Self::Administrator => "Administrator",
        }
    }

    /// Returns `true` if this role ranks at or above `minimum`.
    #[must_use]
    pub fn at_least(self, minimum: Role) -> bool {
        self >= minimum
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "staff" => Ok(Self::Staff),
            "management_staff" => Ok(Self::ManagementStaff),
            "manager" => Ok(Self::Manager),
            "administrator" => Ok(Self::Administrator),
            other => Err(AuthError::invalid_request(format!("unknown role '{other}'"))),
        }
    }
}

// =============================================================================
// Permission
// =============================================================================

/// The closed set of grantable permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewAll,
    EditAll,
    DeleteAll,
    ManageUsers,
    AuditAccess,
    ViewClinic,
    EditClinic,
    CreateTransactions,
    ViewReports,
    ApproveTransactions,
}

impl Permission {
    /// Every permission, in declaration order.
    pub const ALL: [Permission; 10] = [
        Self::ViewAll,
        Self::EditAll,
        Self::DeleteAll,
        Self::ManageUsers,
        Self::AuditAccess,
        Self::ViewClinic,
        Self::EditClinic,
        Self::CreateTransactions,
        Self::ViewReports,
        Self::ApproveTransactions,
    ];

    /// Returns the stable string identifier.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ViewAll => "view_all",
            Self::EditAll => "edit_all",
            Self::DeleteAll => "delete_all",
            Self::ManageUsers => "manage_users",
            Self::AuditAccess => "audit_access",
            Self::ViewClinic => "view_clinic",
            Self::EditClinic => "edit_clinic",
            Self::CreateTransactions => "create_transactions",
            Self::ViewReports => "view_reports",
            Self::ApproveTransactions => "approve_transactions",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| AuthError::invalid_request(format!("unknown permission '{s}'")))
    }
}

// =============================================================================
// Grants
// =============================================================================

/// Explicit per-principal permission grants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionGrants(BTreeMap<Permission, bool>);

impl PermissionGrants {
    /// Creates an empty grant mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the JSON object stored alongside a user.
    ///
    /// Unknown permission names and non-boolean values are skipped; a
    /// missing or non-object value yields no grants.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::default();
        };

        let mut grants = BTreeMap::new();
        for (name, granted) in object {
            match (name.parse::<Permission>(), granted.as_bool()) {
                (Ok(permission), Some(granted)) => {
                    grants.insert(permission, granted);
                }
                _ => {
                    tracing::debug!(permission = %name, "Ignoring unrecognised grant entry");
                }
            }
        }
        Self(grants)
    }

    /// Sets a grant.
    pub fn set(&mut self, permission: Permission, granted: bool) {
        self.0.insert(permission, granted);
    }

    /// Returns `true` if the permission is present and truthy.
    #[must_use]
    pub fn is_granted(&self, permission: Permission) -> bool {
        self.0.get(&permission).copied().unwrap_or(false)
    }

    /// Serializes the grants back to the stored JSON shape.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.0
                .iter()
                .map(|(p, granted)| (p.as_str().to_string(), serde_json::Value::Bool(*granted)))
                .collect(),
        )
    }
}

impl FromIterator<(Permission, bool)> for PermissionGrants {
    fn from_iter<I: IntoIterator<Item = (Permission, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// =============================================================================
// Principal
// =============================================================================

/// The authenticated identity making a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Principal {
    /// User row identifier.
    pub id: UserId,

    /// Login name; the credential's subject.
    pub username: String,

    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    /// Email address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Organisational role.
    pub role: Role,

    /// Home clinic; `None` means organisation-wide affiliation.
    pub clinic_id: Option<ClinicId>,

    /// Name of the home clinic, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clinic_name: Option<String>,

    /// Explicit permission grants.
    pub grants: PermissionGrants,

    /// Inactive principals never authenticate.
    pub active: bool,
}

impl Principal {
    /// Creates a builder for a principal.
    #[must_use]
    pub fn builder(id: UserId, username: impl Into<String>, role: Role) -> PrincipalBuilder {
        PrincipalBuilder::new(id, username, role)
    }

    /// Returns `true` for administrators.
    #[must_use]
    pub fn is_administrator(&self) -> bool {
        self.role == Role::Administrator
    }

    /// Display label for the principal's clinic affiliation.
    #[must_use]
    pub fn clinic_label(&self) -> &str {
        self.clinic_name.as_deref().unwrap_or("All Clinics")
    }
}

/// Builder for [`Principal`].
pub struct PrincipalBuilder {
    principal: Principal,
}

impl PrincipalBuilder {
    fn new(id: UserId, username: impl Into<String>, role: Role) -> Self {
        Self {
            principal: Principal {
                id,
                username: username.into(),
                full_name: None,
                email: None,
                role,
                clinic_id: None,
                clinic_name: None,
                grants: PermissionGrants::new(),
                active: true,
            },
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn full_name(mut self, full_name: impl Into<String>) -> Self {
        self.principal.full_name = Some(full_name.into());
        self
    }

    /// Sets the email address.
    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.principal.email = Some(email.into());
        self
    }

    /// Sets the home clinic.
    #[must_use]
    pub fn clinic(mut self, clinic_id: ClinicId, clinic_name: impl Into<String>) -> Self {
        self.principal.clinic_id = Some(clinic_id);
        self.principal.clinic_name = Some(clinic_name.into());
        self
    }

    /// Grants a permission.
    #[must_use]
    pub fn grant(mut self, permission: Permission) -> Self {
        self.principal.grants.set(permission, true);
        self
    }

    /// Replaces the grant mapping.
    #[must_use]
    pub fn grants(mut self, grants: PermissionGrants) -> Self {
        self.principal.grants = grants;
        self
    }

    /// Sets the active flag.
    #[must_use]
    pub fn active(mut self, active: bool) -> Self {
        self.principal.active = active;
        self
    }

    /// Builds the principal.
    #[must_use]
    pub fn build(self) -> Principal {
        self.principal
    }
}

/// A clinic as referenced by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clinic {
    pub id: ClinicId,
    pub name: String,
    pub active: bool,
}

// =============================================================================
// Resolver
// =============================================================================

/// Loads the principal behind a verified subject.
#[derive(Clone)]
pub struct PrincipalResolver {
    store: Arc<dyn PrincipalStore>,
}

impl PrincipalResolver {
    /// Creates a resolver over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn PrincipalStore>) -> Self {
        Self { store }
    }

    /// Resolves an active principal by username.
    ///
    /// # Errors
    ///
    /// Returns `PrincipalNotFound` if no active principal matches, or a
    /// storage error if the lookup fails.
    pub async fn resolve(&self, subject: &str) -> AuthResult<Principal> {
        match self.store.find_active_principal(subject).await? {
            Some(principal) if principal.active => Ok(principal),
            Some(_) => {
                tracing::debug!(username = %subject, "Principal is inactive");
                Err(AuthError::PrincipalNotFound)
            }
            None => {
                tracing::debug!(username = %subject, "No principal for subject");
                Err(AuthError::PrincipalNotFound)
            }
        }
    }
}
