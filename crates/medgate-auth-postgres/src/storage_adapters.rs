//! Core store traits implemented over PostgreSQL.
//!
//! [`PostgresSecurityStore`] owns an `Arc<PgPool>`, so it can be handed to
//! the core as `Arc<dyn PrincipalStore>`, `Arc<dyn AuditStore>` and so on.

use async_trait::async_trait;

use medgate_auth::audit::{AuditCountFilter, AuditEntry, AuditRecord};
use medgate_auth::login::{LoginAccount, LoginAttempt};
use medgate_auth::principal::{Clinic, ClinicId, Principal, UserId};
use medgate_auth::AuthResult;
use medgate_auth::scope::ClinicScope;
use medgate_auth::storage::{AuditStore, ClinicStore, LoginStore, PrincipalStore};

use crate::PostgresSecurityStore;

#[async_trait]
impl PrincipalStore for PostgresSecurityStore {
    async fn find_active_principal(&self, username: &str) -> AuthResult<Option<Principal>> {
        match self.users().find_active_by_username(username).await? {
            Some(row) => Ok(Some(row.to_principal()?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl AuditStore for PostgresSecurityStore {
    async fn append(&self, entry: &AuditEntry) -> AuthResult<AuditRecord> {
        Ok(self.audit_log().append(entry).await?)
    }

    async fn count_recent(&self, filter: &AuditCountFilter) -> AuthResult<u64> {
        Ok(self.audit_log().count_recent(filter).await?)
    }
}

#[async_trait]
impl ClinicStore for PostgresSecurityStore {
    async fn list_clinics(&self, scope: &ClinicScope) -> AuthResult<Vec<Clinic>> {
        Ok(self.clinics().list_active(scope).await?)
    }

    async fn rename_clinic(&self, clinic_id: ClinicId, name: &str) -> AuthResult<Option<Clinic>> {
        Ok(self.clinics().rename(clinic_id, name).await?)
    }
}

#[async_trait]
impl LoginStore for PostgresSecurityStore {
    async fn find_login_account(&self, username: &str) -> AuthResult<Option<LoginAccount>> {
        let Some(row) = self.users().find_active_by_username(username).await? else {
            return Ok(None);
        };
        let principal = row.to_principal()?;
        Ok(Some(LoginAccount {
            principal,
            password_hash: row.password_hash,
        }))
    }

    async fn record_login_attempt(&self, attempt: &LoginAttempt) -> AuthResult<()> {
        Ok(self.login_logs().record(attempt).await?)
    }

    async fn touch_last_login(&self, user_id: UserId, attempt: &LoginAttempt) -> AuthResult<()> {
        Ok(self.login_logs().touch_last_login(user_id, attempt).await?)
    }
}
