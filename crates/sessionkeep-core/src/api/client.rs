//! API client for communicating with the token backend.
//!
//! Every call goes through [`ApiClient::request`], which attaches the stored
//! access token, and on a 401 asks the [`RefreshCoordinator`] for a new one
//! and replays the call exactly once.

use reqwest::{Client, Response, StatusCode, Url};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::auth::{CredentialStore, RefreshCoordinator};

use super::{ApiError, PendingRequest};

/// API client for the token backend.
/// Clone is cheap - reqwest::Client and the store share state internally.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    store: CredentialStore,
    refresher: RefreshCoordinator,
}

impl ApiClient {
    pub fn new(
        client: Client,
        base_url: Url,
        store: CredentialStore,
        refresher: RefreshCoordinator,
    ) -> Self {
        Self {
            client,
            base_url,
            store,
            refresher,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve an endpoint path against the base address
    pub fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::InvalidRequest(format!("Invalid path {}: {}", path, e)))
    }

    /// Send a request, renewing the session once if the backend rejects the token.
    ///
    /// A missing token is not an error; the call goes out unauthenticated and
    /// the backend decides. A replayed call that is rejected again fails with
    /// [`ApiError::Unauthenticated`] without another refresh.
    pub async fn request(&self, request: PendingRequest) -> Result<Response, ApiError> {
        let mut request = request;
        let mut token = if request.is_public() {
            None
        } else {
            self.store.access_token()
        };

        loop {
            let response = self.dispatch(&request, token.as_deref()).await?;

            if response.status() != StatusCode::UNAUTHORIZED || request.is_public() {
                return Self::check_response(response).await;
            }

            if request.is_retry() {
                warn!(path = %request.path, "Request still unauthorized after token refresh");
                return Err(ApiError::Unauthenticated);
            }

            debug!(path = %request.path, had_token = token.is_some(), "Access token rejected, refreshing");
            match self.refresher.refresh_rejected(token.as_deref()).await {
                Ok(new_token) => {
                    token = Some(new_token);
                    request = request.into_retry();
                }
                Err(e) => {
                    debug!(path = %request.path, error = %e, "Session could not be renewed");
                    return Err(ApiError::Unauthenticated);
                }
            }
        }
    }

    /// GET a protected resource and parse its JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.request(PendingRequest::get(path)).await?;
        Self::parse_json(response).await
    }

    /// POST to a protected resource and parse its JSON body
    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self
            .request(PendingRequest::post(path).with_json(body)?)
            .await?;
        Self::parse_json(response).await
    }

    /// POST to an endpoint that does not use the session (login, registration)
    pub async fn post_public<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self
            .request(PendingRequest::post(path).public().with_json(body)?)
            .await?;
        Self::parse_json(response).await
    }

    async fn dispatch(
        &self,
        request: &PendingRequest,
        token: Option<&str>,
    ) -> Result<Response, ApiError> {
        let url = self.url(&request.path)?;

        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(request.headers.clone());
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        debug!(
            method = %request.method,
            path = %request.path,
            retry = request.is_retry(),
            authenticated = token.is_some(),
            "Dispatching request"
        );
        Ok(builder.send().await?)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let url = response.url().clone();
        response.json().await.map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SessionBroadcaster;

    fn client(base: &str) -> ApiClient {
        let http = Client::new();
        let base_url = Url::parse(base).unwrap();
        let store = CredentialStore::in_memory();
        let refresher = RefreshCoordinator::new(
            http.clone(),
            base_url.join("token/refresh/").unwrap(),
            store.clone(),
            SessionBroadcaster::default(),
        );
        ApiClient::new(http, base_url, store, refresher)
    }

    #[test]
    fn test_url_joins_relative_paths() {
        let api = client("https://api.example.com/api/");
        assert_eq!(
            api.url("token/").unwrap().as_str(),
            "https://api.example.com/api/token/"
        );
    }

    #[test]
    fn test_url_strips_leading_slash() {
        let api = client("https://api.example.com/api/");
        assert_eq!(
            api.url("/protected-view/").unwrap().as_str(),
            "https://api.example.com/api/protected-view/"
        );
    }
}
