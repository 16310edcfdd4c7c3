//! Clinic scope resolution.
//!
//! A principal's scope is one of three shapes and every query builder has
//! to honour all three:
//!
//! | Scope | Meaning | Query |
//! |-------|---------|-------|
//! | `All` | administrator | no clinic filter |
//! | `Clinic(id)` | home clinic only | inclusion filter |
//! | `Empty` | no clinic at all | empty result, store not queried |

use std::future::Future;

use serde::Serialize;

use crate::AuthResult;
use crate::principal::{ClinicId, Principal};

/// The clinics a principal may operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "clinic_id", rename_all = "snake_case")]
pub enum ClinicScope {
    /// Every clinic.
    All,
    /// Exactly the principal's home clinic.
    Clinic(ClinicId),
    /// No clinic.
    Empty,
}

/// How a query should constrain its clinic column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeFilter {
    Unfiltered,
    Include(Vec<ClinicId>),
    Nothing,
}

impl ClinicScope {
    /// Computes the scope of a principal.
    #[must_use]
    pub fn resolve(principal: &Principal) -> Self {
        if principal.is_administrator() {
            return Self::All;
        }
        match principal.clinic_id {
            Some(id) => Self::Clinic(id),
            None => Self::Empty,
        }
    }

    /// Returns `true` if `clinic_id` is inside the scope.
    #[must_use]
    pub fn contains(&self, clinic_id: ClinicId) -> bool {
        match self {
            Self::All => true,
            Self::Clinic(id) => *id == clinic_id,
            Self::Empty => false,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Accessible clinic ids; `None` means all clinics.
    #[must_use]
    pub fn clinic_ids(&self) -> Option<Vec<ClinicId>> {
        match self {
            Self::All => None,
            Self::Clinic(id) => Some(vec![*id]),
            Self::Empty => Some(Vec::new()),
        }
    }

    #[must_use]
    pub fn filter(&self) -> ScopeFilter {
        match self {
            Self::All => ScopeFilter::Unfiltered,
            Self::Clinic(id) => ScopeFilter::Include(vec![*id]),
            Self::Empty => ScopeFilter::Nothing,
        }
    }

    /// Runs a scoped query.
    ///
    /// The closure receives `None` for an unfiltered query or the ids to
    /// include. For an empty scope it is not called and no rows are returned.
    ///
    /// # Errors
    ///
    /// Returns whatever the query returns.
    pub async fn fetch<T, F, Fut>(&self, query: F) -> AuthResult<Vec<T>>
    where
        F: FnOnce(Option<Vec<ClinicId>>) -> Fut,
        Fut: Future<Output = AuthResult<Vec<T>>>,
    {
        match self.filter() {
            ScopeFilter::Unfiltered => query(None).await,
            ScopeFilter::Include(ids) => query(Some(ids)).await,
            ScopeFilter::Nothing => Ok(Vec::new()),
        }
    }

    /// Renders a SQL predicate over `column`.
    ///
    /// `Include` binds the id array as parameter `$param`; the caller must
    /// bind [`ClinicScope::clinic_ids`] there. Returns `None` when the scope
    /// is empty and the query should not run.
    #[must_use]
    pub fn sql_predicate(&self, column: &str, param: usize) -> Option<String> {
        match self {
            Self::All => Some("TRUE".to_string()),
            Self::Clinic(_) => Some(format!("{column} = ANY(${param})")),
            Self::Empty => None,
        }
    }
}
