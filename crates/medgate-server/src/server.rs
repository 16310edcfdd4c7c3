use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, extract::FromRef};
use medgate_auth::{
    Argon2Verifier, AuditStore, AuthState, Clock, ClinicStore, CredentialIssuer, LoginService,
    LoginStore, PrincipalStore, SecurityOrchestrator, SystemClock,
    storage::memory::InMemoryStore,
};
use medgate_auth_postgres::PostgresSecurityStore;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::{config::AppConfig, routes};

/// The stores the server is wired against.
#[derive(Clone)]
pub struct Stores {
    pub principals: Arc<dyn PrincipalStore>,
    pub audit: Arc<dyn AuditStore>,
    pub clinics: Arc<dyn ClinicStore>,
    pub logins: Arc<dyn LoginStore>,
}

impl Stores {
    /// Uses one backend for every store.
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: PrincipalStore + AuditStore + ClinicStore + LoginStore + 'static,
    {
        Self {
            principals: store.clone(),
            audit: store.clone(),
            clinics: store.clone(),
            logins: store,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub auth: AuthState,
    pub login: Arc<LoginService>,
    pub clinics: Arc<dyn ClinicStore>,
}

impl AppState {
    pub fn security(&self) -> &SecurityOrchestrator {
        &self.auth.security
    }
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

/// Builds the router over explicit stores and clock.
pub fn build_router(cfg: &AppConfig, stores: Stores, clock: Arc<dyn Clock>) -> Router {
    let security = Arc::new(SecurityOrchestrator::new(
        &cfg.auth,
        stores.principals,
        stores.audit,
        clock.clone(),
    ));
    let issuer = CredentialIssuer::new(&cfg.auth.signing, &cfg.auth.tokens, clock.clone());
    let login = Arc::new(LoginService::new(
        stores.logins,
        Arc::new(Argon2Verifier),
        issuer,
        cfg.auth.audit.clone(),
        clock,
    ));

    let state = AppState {
        auth: AuthState::new(security)
            .with_trusted_forwarded_headers(cfg.auth.audit.trust_forwarded_headers),
        login,
        clinics: stores.clinics,
    };

    routes::router()
        .with_state(state)
        // Middleware stack (outermost first: trace -> cors -> timeout -> body limit)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http().make_span_with(
                        |req: &axum::http::Request<_>| {
                            tracing::info_span!(
                                "http.request",
                                http.method = %req.method(),
                                http.target = %req.uri(),
                            )
                        },
                    ),
                )
                .layer(CorsLayer::permissive())
                .layer(TimeoutLayer::new(cfg.request_timeout()))
                .layer(axum::extract::DefaultBodyLimit::max(
                    cfg.server.body_limit_bytes,
                )),
        )
}

/// Builds the application from configuration.
///
/// With `database.url` set the server runs on PostgreSQL, otherwise on an
/// empty in-memory store.
pub async fn build_app(cfg: &AppConfig) -> anyhow::Result<Router> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let stores = match cfg.database.url.as_deref() {
        Some(url) => {
            let store =
                PostgresSecurityStore::connect(url, cfg.database.max_connections).await?;
            if cfg.database.ensure_schema {
                store.ensure_schema().await?;
                tracing::info!("Database schema ensured");
            }
            tracing::info!(max_connections = cfg.database.max_connections, "Connected to PostgreSQL");
            Stores::from_shared(Arc::new(store))
        }
        None => {
            tracing::warn!("No database.url configured; using the in-memory store");
            Stores::from_shared(Arc::new(InMemoryStore::with_clock(clock.clone())))
        }
    };

    Ok(build_router(cfg, stores, clock))
}

pub struct MedgateServer {
    addr: SocketAddr,
    app: Router,
}

impl MedgateServer {
    pub async fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        Ok(Self {
            addr: cfg.addr(),
            app: build_app(cfg).await?,
        })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::{Extension, extract::ConnectInfo};
    use axum::http::{Request, StatusCode, header};
    use medgate_auth::login::hash_password;
    use medgate_auth::{Clinic, FixedClock, Permission, Principal, Role};
    use serde_json::{Value, json};
    use time::macros::datetime;
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        store: Arc<InMemoryStore>,
    }

    const PEER: &str = "192.0.2.50:41000";

    async fn harness() -> Harness {
        harness_with(false).await
    }

    async fn harness_with(trust_forwarded_headers: bool) -> Harness {
        let clock = Arc::new(FixedClock::new(datetime!(2024-06-12 10:00 UTC)));
        let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
        store
            .insert_clinic(Clinic {
                id: 1,
                name: "North".into(),
                active: true,
            })
            .await;
        store
            .insert_clinic(Clinic {
                id: 2,
                name: "South".into(),
                active: true,
            })
            .await;

        let hash = hash_password("pw").unwrap();
        store
            .insert_login_account(
                Principal::builder(1, "root", Role::Administrator).build(),
                hash.clone(),
            )
            .await;
        store
            .insert_login_account(
                Principal::builder(2, "mona", Role::Manager)
                    .clinic(1, "North")
                    .grant(Permission::EditClinic)
                    .build(),
                hash.clone(),
            )
            .await;
        store
            .insert_login_account(
                Principal::builder(3, "stu", Role::Staff).clinic(1, "North").build(),
                hash,
            )
            .await;

        let mut cfg = AppConfig {
            auth: medgate_auth::AuthConfig::with_secret("router-test-secret"),
            ..AppConfig::default()
        };
        cfg.auth.audit.trust_forwarded_headers = trust_forwarded_headers;
        let peer: std::net::SocketAddr = PEER.parse().unwrap();
        let app = build_router(&cfg, Stores::from_shared(store.clone()), clock)
            .layer(Extension(ConnectInfo(peer)));
        Harness { app, store }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn token(app: &Router, username: &str) -> String {
        let req = Request::post("/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "username": username, "password": "pw" }).to_string(),
            ))
            .unwrap();
        let (status, body) = send(app, req).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["access_token"].as_str().unwrap().to_string()
    }

    fn rename(id: i64, token: &str, name: &str) -> Request<Body> {
        Request::put(format!("/clinics/{id}"))
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", "1.2.3.4")
            .body(Body::from(json!({ "name": name }).to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn manager_renames_home_clinic_with_audit() {
        let h = harness().await;
        let token = token(&h.app, "mona").await;

        let (status, body) = send(&h.app, rename(1, &token, "North Central")).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["clinic"]["name"], "North Central");
        assert_eq!(body["audit"]["status"], "committed");

        let records = h.store.audit_records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_id, 2);
        assert_eq!(records[0].table_name, "clinics");
        assert_eq!(records[0].action.as_str(), "UPDATE");
        assert_eq!(records[0].record_id, Some(1));
        assert_eq!(records[0].old_values, Some(json!({ "name": "North" })));
        // The forwarded header is not trusted by default
        assert_eq!(
            records[0].ip_address.map(|ip| ip.to_string()).as_deref(),
            Some("192.0.2.50")
        );
    }

    #[tokio::test]
    async fn trusted_proxy_header_is_recorded() {
        let h = harness_with(true).await;
        let token = token(&h.app, "mona").await;

        let (status, body) = send(&h.app, rename(1, &token, "North Central")).await;
        assert_eq!(status, StatusCode::OK, "{body}");

        let records = h.store.audit_records().await;
        assert_eq!(
            records[0].ip_address.map(|ip| ip.to_string()).as_deref(),
            Some("1.2.3.4")
        );
    }

    #[tokio::test]
    async fn bad_token_with_blank_name_is_unauthorized() {
        let h = harness().await;

        let (status, body) = send(&h.app, rename(1, "not-a-token", " ")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["detail"], "Could not validate credentials");
        assert!(h.store.audit_records().await.is_empty());
    }

    #[tokio::test]
    async fn blank_clinic_name_is_bad_request_once_authorized() {
        let h = harness().await;
        let token = token(&h.app, "mona").await;

        let (status, body) = send(&h.app, rename(1, &token, "  ")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Clinic name is required");
        assert!(h.store.audit_records().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_body_gets_json_detail() {
        let h = harness().await;
        let token = token(&h.app, "mona").await;

        let req = Request::put("/clinics/1")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"name\":"))
            .unwrap();
        let (status, body) = send(&h.app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().is_some_and(|d| !d.is_empty()), "{body}");

        let req = Request::post("/auth/login")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("username=root"))
            .unwrap();
        let (status, body) = send(&h.app, req).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(body["detail"].is_string(), "{body}");
    }

    #[tokio::test]
    async fn manager_cannot_rename_other_clinic() {
        let h = harness().await;
        let token = token(&h.app, "mona").await;

        let (status, body) = send(&h.app, rename(2, &token, "Elsewhere")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["detail"], "Required permission: edit_clinic for clinic 2");
        assert!(h.store.audit_records().await.is_empty());
    }

    #[tokio::test]
    async fn missing_clinic_is_still_audited() {
        let h = harness().await;
        let token = token(&h.app, "root").await;

        let (status, body) = send(&h.app, rename(42, &token, "Ghost")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Clinic not found");
        assert_eq!(h.store.audit_records().await.len(), 1);
    }

    #[tokio::test]
    async fn staff_lacks_finance_access() {
        let h = harness().await;
        let token = token(&h.app, "stu").await;

        let req = Request::get("/clinics")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&h.app, req).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["detail"], "Finance module access required");
    }

    #[tokio::test]
    async fn blank_login_is_bad_request() {
        let h = harness().await;
        let req = Request::post("/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "username": " ", "password": "" }).to_string()))
            .unwrap();
        let (status, _) = send(&h.app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
