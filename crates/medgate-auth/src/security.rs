//! The single entry point for protected operations.
//!
//! [`SecurityOrchestrator`] sequences every protected call:
//!
//! 1. verify the bearer credential
//! 2. resolve the principal (fresh on every call)
//! 3. evaluate the operation's [`Requirement`]s
//! 4. run the operation
//! 5. write the audit record, whether or not step 4 succeeded
//! 6. run the anomaly heuristics and log a positive signal
//!
//! Failures in steps 1-2 surface as `Unauthenticated`, in step 3 as
//! `Forbidden`; both happen before the operation runs. Steps 5-6 never
//! change the operation's result.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use crate::AuthResult;
use crate::anomaly::{AnomalyDetector, AnomalySignal};
use crate::audit::{AuditEntry, AuditLogger, AuditOutcome};
use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::permission::{PermissionEvaluator, Requirement};
use crate::principal::{ClinicId, Permission, Principal, PrincipalResolver};
use crate::scope::ClinicScope;
use crate::storage::{AuditStore, PrincipalStore};
use crate::token::{CredentialError, CredentialVerifier};

/// Detail returned for every credential or principal failure except expiry.
pub const INVALID_CREDENTIALS: &str = "Could not validate credentials";

/// Detail returned for an expired credential.
pub const EXPIRED_CREDENTIALS: &str = "Token has expired";

/// Detail returned when no credential was presented.
pub const MISSING_CREDENTIALS: &str = "Not authenticated";

/// A principal that passed authentication and authorization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Authorized {
    pub principal: Principal,
    pub scope: ClinicScope,
}

/// What a mutating operation hands back for the audit record.
///
/// Fields left as `None` keep whatever the caller put in the audit entry.
#[derive(Debug, Clone)]
pub struct Mutation<T> {
    pub value: T,
    pub record_id: Option<i64>,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
}

impl<T> Mutation<T> {
    /// A result with no extra audit detail.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            value,
            record_id: None,
            old_values: None,
            new_values: None,
        }
    }

    #[must_use]
    pub fn record_id(mut self, record_id: i64) -> Self {
        self.record_id = Some(record_id);
        self
    }

    #[must_use]
    pub fn old_values(mut self, values: serde_json::Value) -> Self {
        self.old_values = Some(values);
        self
    }

    #[must_use]
    pub fn new_values(mut self, values: serde_json::Value) -> Self {
        self.new_values = Some(values);
        self
    }
}

/// The result of an audited operation.
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub value: T,
    pub audit: AuditOutcome,
    pub anomaly: AnomalySignal,
}

/// Drives verification, resolution, authorization, audit and anomaly checks.
#[derive(Clone)]
pub struct SecurityOrchestrator {
    verifier: CredentialVerifier,
    resolver: PrincipalResolver,
    evaluator: PermissionEvaluator,
    audit: AuditLogger,
    anomaly: AnomalyDetector,
}

impl SecurityOrchestrator {
    /// Wires the components from configuration and injected stores.
    #[must_use]
    pub fn new(
        config: &AuthConfig,
        principals: Arc<dyn PrincipalStore>,
        audit: Arc<dyn AuditStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            verifier: CredentialVerifier::new(&config.signing, clock.clone()),
            resolver: PrincipalResolver::new(principals),
            evaluator: PermissionEvaluator::new(clock),
            audit: AuditLogger::new(audit.clone()),
            anomaly: AnomalyDetector::new(audit, config.anomaly.clone()),
        }
    }

    #[must_use]
    pub fn evaluator(&self) -> &PermissionEvaluator {
        &self.evaluator
    }

    /// Verifies the credential and resolves its principal.
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated` for a missing, invalid or expired
    /// credential and for a subject with no active principal. A store
    /// failure is returned as-is.
    pub async fn authenticate(&self, raw_credential: Option<&str>) -> AuthResult<Principal> {
        let Some(token) = raw_credential else {
            return Err(AuthError::unauthenticated(MISSING_CREDENTIALS));
        };

        let verified = self.verifier.verify(token).map_err(|e| {
            tracing::debug!(error = %e, "Credential rejected");
            match e {
                CredentialError::Expired => AuthError::unauthenticated(EXPIRED_CREDENTIALS),
                _ => AuthError::unauthenticated(INVALID_CREDENTIALS),
            }
        })?;

        match self.resolver.resolve(&verified.subject).await {
            Ok(principal) => Ok(principal),
            Err(AuthError::PrincipalNotFound) => {
                Err(AuthError::unauthenticated(INVALID_CREDENTIALS))
            }
            Err(e) => Err(e),
        }
    }

    /// Evaluates requirements in order.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` naming the first requirement that is not met.
    pub fn authorize(&self, principal: &Principal, requirements: &[Requirement]) -> AuthResult<()> {
        for requirement in requirements {
            if let Err(message) = self.evaluator.require(principal, requirement) {
                return Err(AuthError::forbidden(message));
            }
        }
        Ok(())
    }

    /// Authenticates, authorizes and resolves the clinic scope.
    ///
    /// # Errors
    ///
    /// See [`Self::authenticate`] and [`Self::authorize`].
    pub async fn protect(
        &self,
        raw_credential: Option<&str>,
        requirements: &[Requirement],
    ) -> AuthResult<Authorized> {
        let principal = self.authenticate(raw_credential).await?;
        self.authorize(&principal, requirements)?;
        let scope = ClinicScope::resolve(&principal);
        Ok(Authorized { principal, scope })
    }

    /// Checks a single permission without failing.
    #[must_use]
    pub fn check(
        &self,
        principal: &Principal,
        permission: Permission,
        clinic: Option<ClinicId>,
    ) -> bool {
        self.evaluator.check(principal, permission, clinic)
    }

    /// Runs a mutating operation for an authorized principal.
    ///
    /// An audit record is written after the operation whether it succeeded
    /// or not, then the anomaly heuristics run. Neither can change the
    /// operation's result.
    ///
    /// # Errors
    ///
    /// Returns the operation's own error.
    pub async fn mutate<T, E, F, Fut>(
        &self,
        authorized: &Authorized,
        mut entry: AuditEntry,
        operation: F,
    ) -> Result<Outcome<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Mutation<T>, E>>,
    {
        entry.user_id = authorized.principal.id;

        let result = operation().await;

        let value = match result {
            Ok(mutation) => {
                if let Some(record_id) = mutation.record_id {
                    entry.record_id = Some(record_id);
                }
                if mutation.old_values.is_some() {
                    entry.old_values = mutation.old_values;
                }
                if mutation.new_values.is_some() {
                    entry.new_values = mutation.new_values;
                }
                Ok(mutation.value)
            }
            Err(e) => Err(e),
        };

        let audit = self.audit.record(&entry).await;
        let anomaly = self
            .anomaly
            .evaluate(entry.user_id, &entry.action, entry.amount())
            .await;

        value.map(|value| Outcome {
            value,
            audit,
            anomaly,
        })
    }

    /// Protects and runs a mutating operation in one call.
    ///
    /// # Errors
    ///
    /// Returns authentication and authorization failures converted into
    /// `E` before the operation runs, or the operation's own error.
    pub async fn execute<T, E, F, Fut>(
        &self,
        raw_credential: Option<&str>,
        requirements: &[Requirement],
        entry: AuditEntry,
        operation: F,
    ) -> Result<Outcome<T>, E>
    where
        E: From<AuthError>,
        F: FnOnce(Authorized) -> Fut,
        Fut: Future<Output = Result<Mutation<T>, E>>,
    {
        let authorized = self.protect(raw_credential, requirements).await?;
        let context = authorized.clone();
        self.mutate(&authorized, entry, move || operation(context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditAction;
    use crate::clock::FixedClock;
    use crate::principal::Role;
    use crate::storage::memory::InMemoryStore;
    use crate::token::CredentialIssuer;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use time::macros::{date, datetime};

    struct Fixture {
        clock: Arc<FixedClock>,
        store: Arc<InMemoryStore>,
        issuer: CredentialIssuer,
        security: SecurityOrchestrator,
    }

    async fn fixture() -> Fixture {
        let clock = Arc::new(FixedClock::new(datetime!(2024-06-12 10:00 UTC)));
        let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
        store
            .insert_principal(Principal::builder(1, "root", Role::Administrator).build())
            .await;
        store
            .insert_principal(
                Principal::builder(2, "meg", Role::Manager)
                    .clinic(7, "North")
                    .build(),
            )
            .await;
        store
            .insert_principal(
                Principal::builder(3, "stan", Role::Staff)
                    .clinic(7, "North")
                    .grant(Permission::CreateTransactions)
                    .build(),
            )
            .await;
        store
            .insert_principal(
                Principal::builder(4, "gone", Role::Staff)
                    .active(false)
                    .build(),
            )
            .await;

        let config = AuthConfig::with_secret("orchestrator-secret");
        let issuer = CredentialIssuer::new(&config.signing, &config.tokens, clock.clone());
        let security =
            SecurityOrchestrator::new(&config, store.clone(), store.clone(), clock.clone());
        Fixture {
            clock,
            store,
            issuer,
            security,
        }
    }

    fn token(f: &Fixture, subject: &str) -> String {
        f.issuer.issue(subject).unwrap().token
    }

    #[tokio::test]
    async fn test_authenticate_resolves_principal() {
        let f = fixture().await;
        let principal = f
            .security
            .authenticate(Some(&token(&f, "meg")))
            .await
            .unwrap();
        assert_eq!(principal.role, Role::Manager);
    }

    #[tokio::test]
    async fn test_authentication_failures_look_alike() {
        let f = fixture().await;
        for raw in [
            token(&f, "gone"),
            token(&f, "nobody"),
            "not-a-token".to_string(),
        ] {
            let err = f.security.authenticate(Some(&raw)).await.unwrap_err();
            assert_eq!(err.to_string(), format!("Unauthenticated: {INVALID_CREDENTIALS}"));
        }

        let err = f.security.authenticate(None).await.unwrap_err();
        assert!(err.is_authentication_error());
    }

    #[tokio::test]
    async fn test_expired_credential() {
        let f = fixture().await;
        let raw = token(&f, "meg");
        f.clock.advance(time::Duration::minutes(480));
        let err = f.security.authenticate(Some(&raw)).await.unwrap_err();
        assert_eq!(err.to_string(), format!("Unauthenticated: {EXPIRED_CREDENTIALS}"));
    }

    #[tokio::test]
    async fn test_protect_returns_scope() {
        let f = fixture().await;
        let authorized = f
            .security
            .protect(Some(&token(&f, "meg")), &[Requirement::finance_access()])
            .await
            .unwrap();
        assert_eq!(authorized.scope, ClinicScope::Clinic(7));

        let authorized = f
            .security
            .protect(Some(&token(&f, "root")), &[Requirement::administrator()])
            .await
            .unwrap();
        assert_eq!(authorized.scope, ClinicScope::All);
    }

    #[tokio::test]
    async fn test_first_failing_requirement_is_reported() {
        let f = fixture().await;
        let err = f
            .security
            .protect(
                Some(&token(&f, "stan")),
                &[
                    Requirement::permission_in(Permission::CreateTransactions, 7),
                    Requirement::permission(Permission::ApproveTransactions),
                    Requirement::administrator(),
                ],
            )
            .await
            .unwrap_err();
        assert!(err.is_authorization_error());
        assert_eq!(
            err.to_string(),
            "Forbidden: Required permission: approve_transactions"
        );
    }

    #[tokio::test]
    async fn test_manager_transaction_edit_window() {
        let f = fixture().await;
        let raw = token(&f, "meg");
        let today = f
            .security
            .protect(
                Some(&raw),
                &[Requirement::EditTransaction {
                    transaction_date: date!(2024-06-12),
                }],
            )
            .await;
        assert!(today.is_ok());

        let yesterday = f
            .security
            .protect(
                Some(&raw),
                &[Requirement::EditTransaction {
                    transaction_date: date!(2024-06-11),
                }],
            )
            .await;
        assert!(yesterday.unwrap_err().is_authorization_error());
    }

    #[tokio::test]
    async fn test_denied_operation_never_runs() {
        let f = fixture().await;
        let ran = AtomicBool::new(false);
        let result: Result<Outcome<()>, AuthError> = f
            .security
            .execute(
                Some(&token(&f, "stan")),
                &[Requirement::permission_in(Permission::CreateTransactions, 9)],
                AuditEntry::new(0, "transactions", AuditAction::Insert),
                |_| async {
                    ran.store(true, Ordering::SeqCst);
                    Ok(Mutation::new(()))
                },
            )
            .await;
        assert!(result.unwrap_err().is_authorization_error());
        assert!(!ran.load(Ordering::SeqCst));
        assert!(f.store.audit_records().await.is_empty());
    }

    #[tokio::test]
    async fn test_mutation_is_audited() {
        let f = fixture().await;
        let outcome: Outcome<i64> = f
            .security
            .execute(
                Some(&token(&f, "stan")),
                &[Requirement::permission_in(Permission::CreateTransactions, 7)],
                AuditEntry::new(0, "transactions", AuditAction::Insert),
                |authorized| async move {
                    assert_eq!(authorized.principal.id, 3);
                    Ok::<_, AuthError>(
                        Mutation::new(101)
                            .record_id(101)
                            .new_values(json!({ "amount": "120.00", "clinic_id": 7 })),
                    )
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.value, 101);
        assert!(outcome.audit.is_committed());
        assert!(!outcome.anomaly.flagged);

        let records = f.store.audit_records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_id, 3);
        assert_eq!(records[0].record_id, Some(101));
        assert_eq!(records[0].table_name, "transactions");
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_change_result() {
        let f = fixture().await;
        let authorized = f
            .security
            .protect(Some(&token(&f, "root")), &[])
            .await
            .unwrap();
        let entry = AuditEntry::new(0, "clinics", AuditAction::Update).record_id(7);

        let healthy: Outcome<&str> = f
            .security
            .mutate(&authorized, entry.clone(), || async {
                Ok::<_, AuthError>(Mutation::new("updated"))
            })
            .await
            .unwrap();

        f.store.fail_audit_writes(true);
        let degraded: Outcome<&str> = f
            .security
            .mutate(&authorized, entry, || async {
                Ok::<_, AuthError>(Mutation::new("updated"))
            })
            .await
            .unwrap();

        assert_eq!(healthy.value, degraded.value);
        assert!(healthy.audit.is_committed());
        assert!(degraded.audit.is_failed());
    }

    #[tokio::test]
    async fn test_failed_operation_still_audited() {
        let f = fixture().await;
        let authorized = f
            .security
            .protect(Some(&token(&f, "root")), &[])
            .await
            .unwrap();

        let result: Result<Outcome<()>, AuthError> = f
            .security
            .mutate(
                &authorized,
                AuditEntry::new(0, "transactions", AuditAction::Delete).record_id(5),
                || async { Err(AuthError::invalid_request("transaction is locked")) },
            )
            .await;

        assert!(matches!(result, Err(AuthError::InvalidRequest { .. })));
        let records = f.store.audit_records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, AuditAction::Delete);
        assert_eq!(records[0].user_id, 1);
    }

    #[tokio::test]
    async fn test_anomaly_signal_is_advisory() {
        let f = fixture().await;
        let authorized = f
            .security
            .protect(Some(&token(&f, "root")), &[])
            .await
            .unwrap();

        let mut last = None;
        for i in 0..4 {
            let outcome: Outcome<i32> = f
                .security
                .mutate(
                    &authorized,
                    AuditEntry::new(0, "transactions", AuditAction::Insert)
                        .new_values(json!({ "amount": 25_000 })),
                    || async move { Ok::<_, AuthError>(Mutation::new(i)) },
                )
                .await
                .unwrap();
            last = Some(outcome);
        }

        let last = last.unwrap();
        assert_eq!(last.value, 3);
        assert!(last.anomaly.flagged);
    }
}
