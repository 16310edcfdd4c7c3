//! Permission evaluation.
//!
//! Checks never fail: a missing permission is a `false`, not an error.
//! [`Requirement`] turns the same checks into declarative gates whose
//! first failure names what is missing.

use std::fmt;
use std::sync::Arc;

use time::Date;

use crate::clock::Clock;
use crate::principal::{ClinicId, Permission, Principal, Role};

/// Decides whether a principal may perform an action.
#[derive(Clone)]
pub struct PermissionEvaluator {
    clock: Arc<dyn Clock>,
}

impl PermissionEvaluator {
    /// Creates an evaluator. The clock decides what "today" means for
    /// transaction edits.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Checks a permission, optionally scoped to a clinic.
    ///
    /// Administrators are always granted. Anyone else needs a truthy grant
    /// and, for a clinic-scoped check, that clinic must be their home
    /// clinic. A non-administrator without a home clinic fails every
    /// clinic-scoped check.
    #[must_use]
    pub fn check(
        &self,
        principal: &Principal,
        permission: Permission,
        target_clinic: Option<ClinicId>,
    ) -> bool {
        if principal.is_administrator() {
            return true;
        }

        if !principal.grants.is_granted(permission) {
            return false;
        }

        match target_clinic {
            None => true,
            Some(target) => principal.clinic_id == Some(target),
        }
    }

    /// Administrators edit anything; managers edit only transactions dated
    /// today by the server clock; nobody else edits.
    #[must_use]
    pub fn can_edit_transaction(&self, principal: &Principal, transaction_date: Date) -> bool {
        match principal.role {
            Role::Administrator => true,
            Role::Manager => transaction_date == self.clock.now().date(),
            Role::ManagementStaff | Role::Staff => false,
        }
    }

    /// Only administrators delete transactions.
    #[must_use]
    pub fn can_delete_transaction(&self, principal: &Principal) -> bool {
        principal.is_administrator()
    }

    /// Evaluates one requirement.
    ///
    /// # Errors
    ///
    /// Returns the client-facing denial message if the requirement is not met.
    pub fn require(&self, principal: &Principal, requirement: &Requirement) -> Result<(), String> {
        let granted = match requirement {
            Requirement::Permission { permission, clinic } => {
                self.check(principal, *permission, *clinic)
            }
            Requirement::MinimumRole(role) => principal.role.at_least(*role),
            Requirement::EditTransaction { transaction_date } => {
                self.can_edit_transaction(principal, *transaction_date)
            }
            Requirement::DeleteTransaction => self.can_delete_transaction(principal),
        };

        if granted {
            Ok(())
        } else {
            tracing::debug!(
                user_id = principal.id,
                role = %principal.role,
                requirement = %requirement,
                "Requirement not met"
            );
            Err(requirement.denial_message())
        }
    }
}

// =============================================================================
// Requirements
// =============================================================================

/// Something an operation requires of its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// A granted permission, optionally for a specific clinic.
    Permission {
        permission: Permission,
        clinic: Option<ClinicId>,
    },
    /// A role at or above the given rank.
    MinimumRole(Role),
    /// The right to edit a transaction dated `transaction_date`.
    EditTransaction { transaction_date: Date },
    /// The right to delete a transaction.
    DeleteTransaction,
}

impl Requirement {
    #[must_use]
    pub fn permission(permission: Permission) -> Self {
        Self::Permission {
            permission,
            clinic: None,
        }
    }

    #[must_use]
    pub fn permission_in(permission: Permission, clinic: ClinicId) -> Self {
        Self::Permission {
            permission,
            clinic: Some(clinic),
        }
    }

    /// Access to financial data: management staff or higher.
    #[must_use]
    pub fn finance_access() -> Self {
        Self::MinimumRole(Role::ManagementStaff)
    }

    /// Manager or higher.
    #[must_use]
    pub fn manager() -> Self {
        Self::MinimumRole(Role::Manager)
    }

    /// Administrators only.
    #[must_use]
    pub fn administrator() -> Self {
        Self::MinimumRole(Role::Administrator)
    }

    /// Client-facing message naming what is missing.
    #[must_use]
    pub fn denial_message(&self) -> String {
        match self {
            Self::Permission {
                permission,
                clinic: None,
            } => format!("Required permission: {permission}"),
            Self::Permission {
                permission,
                clinic: Some(clinic),
            } => format!("Required permission: {permission} for clinic {clinic}"),
            Self::MinimumRole(Role::Administrator) => "Administrator access required".to_string(),
            Self::MinimumRole(Role::Manager) => {
                "Manager or Administrator access required".to_string()
            }
            Self::MinimumRole(Role::ManagementStaff) => {
                "Finance module access required".to_string()
            }
            Self::MinimumRole(Role::Staff) => "Staff access required".to_string(),
            Self::EditTransaction { .. } => {
                "You don't have permission to edit this transaction".to_string()
            }
            Self::DeleteTransaction => "Only administrators can delete transactions".to_string(),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permission {
                permission,
                clinic: None,
            } => write!(f, "permission:{permission}"),
            Self::Permission {
                permission,
                clinic: Some(clinic),
            } => write!(f, "permission:{permission}@{clinic}"),
            Self::MinimumRole(role) => write!(f, "role>={role}"),
            Self::EditTransaction { transaction_date } => {
                write!(f, "edit_transaction:{transaction_date}")
            }
            Self::DeleteTransaction => f.write_str("delete_transaction"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use time::macros::{date, datetime};

    fn evaluator() -> PermissionEvaluator {
        PermissionEvaluator::new(Arc::new(FixedClock::new(datetime!(2024-06-12 15:30 UTC))))
    }

    fn staff_at(clinic: ClinicId) -> Principal {
        Principal::builder(10, "stan", Role::Staff)
            .clinic(clinic, "Clinic")
            .grant(Permission::CreateTransactions)
            .build()
    }

    #[test]
    fn test_administrator_granted_everything() {
        let eval = evaluator();
        let admin = Principal::builder(1, "root", Role::Administrator).build();
        for permission in Permission::ALL {
            assert!(eval.check(&admin, permission, None));
            assert!(eval.check(&admin, permission, Some(123_456_789)));
        }
    }

    #[test]
    fn test_staff_scoped_to_home_clinic() {
        let eval = evaluator();
        let staff = staff_at(7);
        assert!(eval.check(&staff, Permission::CreateTransactions, Some(7)));
        assert!(!eval.check(&staff, Permission::CreateTransactions, Some(9)));
        assert!(eval.check(&staff, Permission::CreateTransactions, None));
    }

    #[test]
    fn test_missing_or_false_grant_denied() {
        let eval = evaluator();
        let mut staff = staff_at(7);
        assert!(!eval.check(&staff, Permission::ViewReports, Some(7)));

        staff.grants.set(Permission::CreateTransactions, false);
        assert!(!eval.check(&staff, Permission::CreateTransactions, Some(7)));
    }

    #[test]
    fn test_no_home_clinic_denied_for_scoped_checks() {
        let eval = evaluator();
        let roaming = Principal::builder(11, "ro", Role::Manager)
            .grant(Permission::ViewAll)
            .grant(Permission::EditAll)
            .build();
        assert!(!eval.check(&roaming, Permission::ViewAll, Some(1)));
        assert!(!eval.check(&roaming, Permission::EditAll, Some(2)));
        assert!(eval.check(&roaming, Permission::ViewAll, None));
    }

    #[test]
    fn test_manager_edits_only_today() {
        let eval = evaluator();
        let manager = Principal::builder(2, "meg", Role::Manager)
            .clinic(1, "Main")
            .build();
        assert!(eval.can_edit_transaction(&manager, date!(2024-06-12)));
        assert!(!eval.can_edit_transaction(&manager, date!(2024-06-11)));
        assert!(!eval.can_edit_transaction(&manager, date!(2024-06-13)));
    }

    #[test]
    fn test_transaction_edit_by_role() {
        let eval = evaluator();
        let yesterday = date!(2024-06-11);
        let admin = Principal::builder(1, "root", Role::Administrator).build();
        let mgmt = Principal::builder(3, "mo", Role::ManagementStaff).build();
        assert!(eval.can_edit_transaction(&admin, yesterday));
        assert!(!eval.can_edit_transaction(&mgmt, date!(2024-06-12)));
        assert!(!eval.can_edit_transaction(&staff_at(1), date!(2024-06-12)));
    }

    #[test]
    fn test_delete_is_admin_only() {
        let eval = evaluator();
        let admin = Principal::builder(1, "root", Role::Administrator).build();
        let manager = Principal::builder(2, "meg", Role::Manager).build();
        assert!(eval.can_delete_transaction(&admin));
        assert!(!eval.can_delete_transaction(&manager));
    }

    #[test]
    fn test_role_gates() {
        let eval = evaluator();
        let mgmt = Principal::builder(3, "mo", Role::ManagementStaff).build();

        assert!(eval.require(&mgmt, &Requirement::finance_access()).is_ok());
        assert_eq!(
            eval.require(&mgmt, &Requirement::manager()).unwrap_err(),
            "Manager or Administrator access required"
        );
        assert_eq!(
            eval.require(&mgmt, &Requirement::administrator()).unwrap_err(),
            "Administrator access required"
        );
        assert!(eval.require(&staff_at(1), &Requirement::finance_access()).is_err());
    }

    #[test]
    fn test_denial_names_permission() {
        let eval = evaluator();
        let err = eval
            .require(
                &staff_at(7),
                &Requirement::permission_in(Permission::CreateTransactions, 9),
            )
            .unwrap_err();
        assert_eq!(err, "Required permission: create_transactions for clinic 9");
    }
}
