//! Clinic reference endpoints.
//!
//! Listing is scoped to the caller's clinics. Renaming goes through the
//! orchestrator so the change is audited and checked for anomalies.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{Method, Uri},
};
use medgate_auth::audit::table_for_path;
use medgate_auth::{
    AuditAction, AuditEntry, BearerCredential, Clinic, ClinicId, Mutation, Permission,
    RequestSource, Requirement,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::server::AppState;

use super::ApiError;

pub async fn list_clinics(
    State(state): State<AppState>,
    BearerCredential(token): BearerCredential,
) -> Result<Json<Vec<Clinic>>, ApiError> {
    let authorized = state
        .security()
        .protect(Some(&token), &[Requirement::finance_access()])
        .await?;

    let clinics = state.clinics.list_clinics(&authorized.scope).await?;
    Ok(Json(clinics))
}

#[derive(Debug, Deserialize)]
pub struct RenameClinic {
    pub name: String,
}

/// Body problems are reported only once the caller is authorized, so an
/// unauthenticated request always gets 401.
pub async fn rename_clinic(
    State(state): State<AppState>,
    Path(clinic_id): Path<ClinicId>,
    method: Method,
    uri: Uri,
    BearerCredential(token): BearerCredential,
    RequestSource(source): RequestSource,
    payload: Result<Json<RenameClinic>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let authorized = state
        .security()
        .protect(
            Some(&token),
            &[Requirement::permission_in(Permission::EditClinic, clinic_id)],
        )
        .await?;

    let Json(body) = payload?;
    let name = body.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::bad_request("Clinic name is required"));
    }

    // user_id is filled in by the orchestrator from the authorized principal
    let entry = AuditEntry::new(0, table_for_path(uri.path()), AuditAction::from_method(&method))
        .record_id(clinic_id)
        .source(source);

    let store = state.clinics.clone();
    let outcome = state
        .security()
        .mutate(&authorized, entry, move || async move {
            let Some(previous) = store.rename_clinic(clinic_id, &name).await? else {
                return Err(ApiError::not_found("Clinic not found"));
            };
            let updated = Clinic {
                name,
                ..previous.clone()
            };
            Ok(Mutation::new(updated.clone())
                .old_values(json!({ "name": previous.name }))
                .new_values(json!({ "name": updated.name })))
        })
        .await?;

    Ok(Json(json!({
        "clinic": outcome.value,
        "audit": outcome.audit,
        "anomaly": outcome.anomaly,
    })))
}
