use crate::config::Config;
use crate::db::{HostStore, StoreHandle, UserStore};
use crate::error::LaasError;
use crate::handlers::{host, metadata, user};
use crate::service::{Mailer, PendingAccountsHandle, SessionCache};
use axum::{
    Router,
    extract::FromRef,
    http::{HeaderValue, Method, header},
    routing::{delete, get, post},
};
use axum_extra::extract::cookie::Key;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

/// Values the handlers read from configuration.
pub struct Settings {
    pub db_salt: String,
    pub email_domains: Vec<String>,
    pub insecure_cookie: bool,
    pub metadata: Value,
}

impl Settings {
    pub fn from_config(cfg: &Config) -> Self {
        let email_domains = cfg.email_domains();
        let metadata = json!({
            "name": cfg.lab_name,
            "organization": cfg.lab_org,
            "contact": cfg.lab_contact,
            "emailDomainWhiteList": email_domains,
        });
        Self {
            db_salt: cfg.db_salt.clone(),
            email_domains,
            insecure_cookie: cfg.insecure_cookie,
            metadata,
        }
    }
}

#[derive(Clone)]
pub struct LaasState {
    pub store: StoreHandle,
    pub users: UserStore,
    pub hosts: HostStore,
    pub sessions: Arc<SessionCache>,
    pub pending: PendingAccountsHandle,
    pub settings: Arc<Settings>,
    cookie_key: Key,
}

impl LaasState {
    pub fn new(
        store: StoreHandle,
        sessions: Arc<SessionCache>,
        pending: PendingAccountsHandle,
        settings: Settings,
    ) -> Self {
        Self {
            users: UserStore::new(store.clone()),
            hosts: HostStore::new(store.clone()),
            store,
            sessions,
            pending,
            settings: Arc::new(settings),
            // Sessions die with the process, so a per-process cookie key loses nothing.
            cookie_key: Key::generate(),
        }
    }

    /// Open the database and start the registries described by `cfg`.
    pub async fn from_config(cfg: &Config, mailer: Arc<dyn Mailer>) -> Result<Self, LaasError> {
        let store =
            StoreHandle::open(&cfg.database_url(), cfg.db_queue_size, cfg.db_queue_policy).await?;
        let pending =
            PendingAccountsHandle::spawn(cfg.pending_ttl(), cfg.pending_sweep(), mailer).await?;
        let sessions = Arc::new(SessionCache::new(cfg.session_ttl()));
        Ok(Self::new(store, sessions, pending, Settings::from_config(cfg)))
    }

    pub fn shutdown(&self) {
        self.pending.shutdown();
        self.store.shutdown();
    }
}

impl FromRef<LaasState> for Key {
    fn from_ref(state: &LaasState) -> Self {
        state.cookie_key.clone()
    }
}

pub fn laas_router(state: LaasState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        .route("/metadata.json", get(metadata::metadata))
        .route("/api/user/create", post(user::create))
        .route("/api/user/verify", post(user::verify))
        .route("/api/user/login", post(user::login))
        .route("/api/user/me", get(user::me))
        .route("/api/user/logout", post(user::logout))
        .route("/api/user/delete", delete(user::delete_self))
        .route("/api/host/{name}", get(host::get_host))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        ))
        .layer(cors)
        .with_state(state)
}
