//! In-memory implementation of every storage trait.
//!
//! Used as the store fake in tests and for running the server without a
//! database. Audit windows are evaluated against the store's own [`Clock`],
//! and audit writes can be made to fail on demand.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::AuthResult;
use crate::audit::{AuditCountFilter, AuditEntry, AuditRecord};
use crate::clock::{Clock, SystemClock};
use crate::error::AuthError;
use crate::login::{LoginAccount, LoginAttempt};
use crate::principal::{Clinic, ClinicId, Principal, UserId};
use crate::scope::ClinicScope;

use super::{AuditStore, ClinicStore, LoginStore, PrincipalStore};

/// In-memory store backed by `tokio` locks.
pub struct InMemoryStore {
    /// Principals keyed by username.
    principals: RwLock<HashMap<String, Principal>>,
    /// Stored password hashes keyed by username.
    password_hashes: RwLock<HashMap<String, String>>,
    clinics: RwLock<HashMap<ClinicId, Clinic>>,
    audit: RwLock<Vec<AuditRecord>>,
    login_attempts: RwLock<Vec<LoginAttempt>>,
    last_logins: RwLock<HashMap<UserId, OffsetDateTime>>,
    audit_counter: AtomicI64,
    fail_audit_writes: AtomicBool,
    clock: Arc<dyn Clock>,
}

impl InMemoryStore {
    /// Creates an empty store on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store on the given clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            principals: RwLock::new(HashMap::new()),
            password_hashes: RwLock::new(HashMap::new()),
            clinics: RwLock::new(HashMap::new()),
            audit: RwLock::new(Vec::new()),
            login_attempts: RwLock::new(Vec::new()),
            last_logins: RwLock::new(HashMap::new()),
            audit_counter: AtomicI64::new(1),
            fail_audit_writes: AtomicBool::new(false),
            clock,
        }
    }

    /// Inserts or replaces a principal.
    pub async fn insert_principal(&self, principal: Principal) {
        self.principals
            .write()
            .await
            .insert(principal.username.clone(), principal);
    }

    /// Inserts a principal together with its password hash.
    pub async fn insert_login_account(&self, principal: Principal, password_hash: impl Into<String>) {
        self.password_hashes
            .write()
            .await
            .insert(principal.username.clone(), password_hash.into());
        self.insert_principal(principal).await;
    }

    /// Inserts or replaces a clinic.
    pub async fn insert_clinic(&self, clinic: Clinic) {
        self.clinics.write().await.insert(clinic.id, clinic);
    }

    /// Makes subsequent audit appends fail (or succeed again).
    pub fn fail_audit_writes(&self, fail: bool) {
        self.fail_audit_writes.store(fail, Ordering::SeqCst);
    }

    /// Returns every audit record written so far.
    pub async fn audit_records(&self) -> Vec<AuditRecord> {
        self.audit.read().await.clone()
    }

    /// Returns every recorded login attempt.
    pub async fn login_attempts(&self) -> Vec<LoginAttempt> {
        self.login_attempts.read().await.clone()
    }

    /// Returns the user's last successful login time.
    pub async fn last_login(&self, user_id: UserId) -> Option<OffsetDateTime> {
        self.last_logins.read().await.get(&user_id).copied()
    }

    async fn with_clinic_name(&self, mut principal: Principal) -> Principal {
        if principal.clinic_name.is_none() {
            if let Some(clinic_id) = principal.clinic_id {
                principal.clinic_name = self
                    .clinics
                    .read()
                    .await
                    .get(&clinic_id)
                    .map(|c| c.name.clone());
            }
        }
        principal
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PrincipalStore for InMemoryStore {
    async fn find_active_principal(&self, username: &str) -> AuthResult<Option<Principal>> {
        let principal = self
            .principals
            .read()
            .await
            .get(username)
            .filter(|p| p.active)
            .cloned();

        match principal {
            Some(p) => Ok(Some(self.with_clinic_name(p).await)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl AuditStore for InMemoryStore {
    async fn append(&self, entry: &AuditEntry) -> AuthResult<AuditRecord> {
        if self.fail_audit_writes.load(Ordering::SeqCst) {
            return Err(AuthError::storage("audit store unavailable"));
        }

        let id = self.audit_counter.fetch_add(1, Ordering::SeqCst);
        let record = AuditRecord::from_entry(id, entry, self.clock.now());
        self.audit.write().await.push(record.clone());
        Ok(record)
    }

    async fn count_recent(&self, filter: &AuditCountFilter) -> AuthResult<u64> {
        let window = time::Duration::try_from(filter.window)
            .map_err(|e| AuthError::invalid_request(format!("invalid window: {e}")))?;
        let since = self.clock.now() - window;

        let count = self
            .audit
            .read()
            .await
            .iter()
            .filter(|r| r.user_id == filter.user_id && r.timestamp > since)
            .filter(|r| match filter.amount_above {
                Some(threshold) => r.amount().is_some_and(|amount| amount > threshold),
                None => true,
            })
            .count();

        Ok(count as u64)
    }
}

#[async_trait]
impl ClinicStore for InMemoryStore {
    async fn list_clinics(&self, scope: &ClinicScope) -> AuthResult<Vec<Clinic>> {
        scope
            .fetch(|ids| async move {
                let mut clinics: Vec<Clinic> = self
                    .clinics
                    .read()
                    .await
                    .values()
                    .filter(|c| c.active)
                    .filter(|c| ids.as_ref().is_none_or(|ids| ids.contains(&c.id)))
                    .cloned()
                    .collect();
                clinics.sort_by(|a, b| a.name.cmp(&b.name));
                Ok(clinics)
            })
            .await
    }

    async fn rename_clinic(&self, clinic_id: ClinicId, name: &str) -> AuthResult<Option<Clinic>> {
        let mut clinics = self.clinics.write().await;
        Ok(clinics.get_mut(&clinic_id).map(|clinic| {
            let previous = clinic.clone();
            clinic.name = name.to_string();
            previous
        }))
    }
}

#[async_trait]
impl LoginStore for InMemoryStore {
    async fn find_login_account(&self, username: &str) -> AuthResult<Option<LoginAccount>> {
        let Some(password_hash) = self.password_hashes.read().await.get(username).cloned() else {
            return Ok(None);
        };

        Ok(self
            .find_active_principal(username)
            .await?
            .map(|principal| LoginAccount {
                principal,
                password_hash,
            }))
    }

    async fn record_login_attempt(&self, attempt: &LoginAttempt) -> AuthResult<()> {
        self.login_attempts.write().await.push(attempt.clone());
        Ok(())
    }

    async fn touch_last_login(&self, user_id: UserId, attempt: &LoginAttempt) -> AuthResult<()> {
        self.last_logins
            .write()
            .await
            .insert(user_id, attempt.attempted_at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditAction;
    use crate::clock::FixedClock;
    use crate::principal::Role;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::time::Duration;
    use time::macros::datetime;

    fn clinic(id: ClinicId, name: &str, active: bool) -> Clinic {
        Clinic {
            id,
            name: name.to_string(),
            active,
        }
    }

    #[tokio::test]
    async fn test_principal_gets_clinic_name() {
        let store = InMemoryStore::new();
        store.insert_clinic(clinic(7, "Riverside", true)).await;
        let mut principal = Principal::builder(1, "sam", Role::Staff).build();
        principal.clinic_id = Some(7);
        store.insert_principal(principal).await;

        let found = store.find_active_principal("sam").await.unwrap().unwrap();
        assert_eq!(found.clinic_name.as_deref(), Some("Riverside"));
    }

    #[tokio::test]
    async fn test_list_clinics_filters_and_sorts() {
        let store = InMemoryStore::new();
        store.insert_clinic(clinic(1, "Westside", true)).await;
        store.insert_clinic(clinic(2, "Eastside", true)).await;
        store.insert_clinic(clinic(3, "Closed", false)).await;

        let all = store.list_clinics(&ClinicScope::All).await.unwrap();
        let names: Vec<_> = all.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Eastside", "Westside"]);

        let home = store.list_clinics(&ClinicScope::Clinic(1)).await.unwrap();
        assert_eq!(home.len(), 1);
        assert_eq!(home[0].id, 1);

        // Inactive clinics stay hidden even inside the scope
        assert!(store.list_clinics(&ClinicScope::Clinic(3)).await.unwrap().is_empty());
        assert!(store.list_clinics(&ClinicScope::Empty).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rename_clinic_returns_previous() {
        let store = InMemoryStore::new();
        store.insert_clinic(clinic(4, "Old Name", true)).await;

        let previous = store.rename_clinic(4, "New Name").await.unwrap().unwrap();
        assert_eq!(previous.name, "Old Name");
        let listed = store.list_clinics(&ClinicScope::Clinic(4)).await.unwrap();
        assert_eq!(listed[0].name, "New Name");

        assert!(store.rename_clinic(99, "Nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_count_recent_respects_window_and_amount() {
        let clock = Arc::new(FixedClock::new(datetime!(2024-05-01 12:00 UTC)));
        let store = InMemoryStore::with_clock(clock.clone());

        let large = AuditEntry::new(9, "transactions", AuditAction::Insert)
            .new_values(json!({ "amount": 15000 }));
        let small = AuditEntry::new(9, "transactions", AuditAction::Insert)
            .new_values(json!({ "amount": "20.00" }));

        store.append(&large).await.unwrap();
        clock.advance(time::Duration::minutes(50));
        store.append(&large).await.unwrap();
        store.append(&small).await.unwrap();
        clock.advance(time::Duration::minutes(20));

        let hour_large = AuditCountFilter {
            user_id: 9,
            window: Duration::from_secs(3600),
            amount_above: Some(Decimal::from(10_000)),
        };
        assert_eq!(store.count_recent(&hour_large).await.unwrap(), 1);

        let hour_all = AuditCountFilter {
            amount_above: None,
            ..hour_large.clone()
        };
        assert_eq!(store.count_recent(&hour_all).await.unwrap(), 2);

        let other_user = AuditCountFilter {
            user_id: 10,
            ..hour_all
        };
        assert_eq!(store.count_recent(&other_user).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failing_audit_writes() {
        let store = InMemoryStore::new();
        store.fail_audit_writes(true);
        let entry = AuditEntry::new(1, "clinics", AuditAction::Update);
        assert!(store.append(&entry).await.is_err());

        store.fail_audit_writes(false);
        let record = store.append(&entry).await.unwrap();
        assert_eq!(record.id, 1);
    }
}
