//! The session manager wires the store, flag, refresh coordinator, request
//! client, route guard and auth form into one handle for the front end.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::info;

use crate::api::{ApiClient, ApiError, PendingRequest};
use crate::auth::{
    AuthFields, AuthForm, AuthMode, CredentialStore, GuardDecision, RefreshCoordinator,
    RouteGuard, SessionBroadcaster, SubmitError,
};
use crate::config::Config;

#[derive(Debug, Deserialize)]
struct ProbeResponse {
    message: String,
}

/// Handle on the signed-in session. Clone is cheap; clones share state.
#[derive(Debug, Clone)]
pub struct SessionManager {
    store: CredentialStore,
    flag: SessionBroadcaster,
    api: ApiClient,
    guard: RouteGuard,
    form: AuthForm,
    probe_path: String,
}

impl SessionManager {
    /// Build from config, opening the configured credential store
    pub fn new(config: &Config) -> Result<Self> {
        let store = config.open_store()?;
        Self::with_store(config, store)
    }

    /// Build over an existing store. The flag starts out matching whatever
    /// session the store already holds.
    pub fn with_store(config: &Config, store: CredentialStore) -> Result<Self> {
        let base_url = config.base_url()?;
        let refresh_url = base_url
            .join(config.endpoints.refresh.trim_start_matches('/'))
            .context("Invalid refresh endpoint")?;

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to build HTTP client")?;

        let flag = SessionBroadcaster::new(store.load().is_authenticated());
        let refresher =
            RefreshCoordinator::new(client.clone(), refresh_url, store.clone(), flag.clone());
        let api = ApiClient::new(client, base_url, store.clone(), refresher);
        let guard = RouteGuard::new(
            store.clone(),
            flag.clone(),
            config.home_route.clone(),
            config.protected_routes.clone(),
        );
        let form = AuthForm::new(
            api.clone(),
            store.clone(),
            flag.clone(),
            config.endpoints.clone(),
        );

        Ok(Self {
            store,
            flag,
            api,
            guard,
            form,
            probe_path: config.endpoints.probe.clone(),
        })
    }

    pub async fn submit(&self, mode: AuthMode, fields: &AuthFields) -> Result<(), SubmitError> {
        self.form.submit(mode, fields).await
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<(), SubmitError> {
        self.submit(AuthMode::Login, &AuthFields::login(username, password))
            .await
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<(), SubmitError> {
        self.submit(
            AuthMode::Register,
            &AuthFields::register(username, email, password),
        )
        .await
    }

    /// End the session. Safe to call when already logged out.
    pub fn logout(&self) {
        self.store.clear();
        self.flag.set(false);
        info!("Logged out");
    }

    pub async fn request(&self, request: PendingRequest) -> Result<reqwest::Response, ApiError> {
        self.api.request(request).await
    }

    /// Call the protected probe endpoint and return its message
    pub async fn probe(&self) -> Result<String, ApiError> {
        let response: ProbeResponse = self.api.get_json(&self.probe_path).await?;
        Ok(response.message)
    }

    pub fn check_route(&self, route: &str) -> GuardDecision {
        self.guard.check(route)
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.flag.subscribe()
    }

    pub fn is_logged_in(&self) -> bool {
        self.flag.get()
    }

    pub fn display_name(&self) -> Option<String> {
        self.store.load().display_name
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn flag(&self) -> &SessionBroadcaster {
        &self.flag
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn guard(&self) -> &RouteGuard {
        &self.guard
    }
}
