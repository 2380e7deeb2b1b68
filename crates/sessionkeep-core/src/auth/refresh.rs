//! Single-flight renewal of the access token.
//!
//! However many calls observe a 401 at the same time, only one exchange
//! request goes to the refresh endpoint. The first caller starts a shared
//! future; everyone arriving while it runs awaits that same future and gets
//! the same token or the same error. Once it settles the slot is released
//! so a later expiry can start a new cycle.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{CredentialStore, SessionBroadcaster};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Token refresh rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
    /// Present when the backend rotates refresh tokens
    #[serde(default)]
    refresh: Option<String>,
}

type RefreshFuture = Shared<BoxFuture<'static, Result<String, RefreshError>>>;

struct InFlight {
    id: u64,
    future: RefreshFuture,
}

#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    client: Client,
    refresh_url: Url,
    store: CredentialStore,
    flag: SessionBroadcaster,
    in_flight: Mutex<Option<InFlight>>,
    next_id: AtomicU64,
}

impl fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("refresh_url", &self.inner.refresh_url.as_str())
            .field("in_progress", &self.is_refreshing())
            .finish()
    }
}

impl RefreshCoordinator {
    pub fn new(
        client: Client,
        refresh_url: Url,
        store: CredentialStore,
        flag: SessionBroadcaster,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                refresh_url,
                store,
                flag,
                in_flight: Mutex::new(None),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Exchange the refresh token for a new access token, joining an
    /// exchange that is already running.
    pub async fn refresh(&self) -> Result<String, RefreshError> {
        self.join_or_start(None).await
    }

    /// Renew after the backend rejected `sent`, the token a request carried.
    ///
    /// If the store already holds a different token, an earlier refresh has
    /// replaced it and that token is returned without a new exchange.
    pub async fn refresh_rejected(&self, sent: Option<&str>) -> Result<String, RefreshError> {
        self.join_or_start(Some(sent)).await
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|f| f.future.peek().is_none())
    }

    async fn join_or_start(&self, rejected: Option<Option<&str>>) -> Result<String, RefreshError> {
        let (id, future) = {
            let mut slot = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            match slot.as_ref().filter(|f| f.future.peek().is_none()) {
                Some(in_flight) => {
                    debug!(id = in_flight.id, "Joining token refresh in progress");
                    (in_flight.id, in_flight.future.clone())
                }
                None => {
                    if let Some(sent) = rejected {
                        if let Some(current) = self.inner.store.access_token() {
                            if Some(current.as_str()) != sent {
                                debug!("Access token already replaced, skipping refresh");
                                return Ok(current);
                            }
                        }
                    }

                    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                    let future = Inner::exchange(Arc::clone(&self.inner)).boxed().shared();
                    *slot = Some(InFlight {
                        id,
                        future: future.clone(),
                    });
                    debug!(id, "Starting token refresh");
                    (id, future)
                }
            }
        };

        let result = future.await;

        let mut slot = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|f| f.id == id) {
            *slot = None;
        }

        result
    }
}

impl Inner {
    async fn exchange(self: Arc<Self>) -> Result<String, RefreshError> {
        let epoch = self.flag.epoch();

        let Some(refresh_token) = self.store.refresh_token() else {
            warn!("No refresh token available, ending session");
            self.end_session(epoch);
            return Err(RefreshError::NoRefreshToken);
        };

        match self.request_access(&refresh_token).await {
            Ok(tokens) => {
                let rotated = tokens.refresh.is_some();
                let applied = self.flag.epoch() == epoch
                    && self.store.update_access_token(
                        &refresh_token,
                        tokens.access.clone(),
                        tokens.refresh,
                    );
                if !applied {
                    debug!("Session changed during refresh, discarding new token");
                    return Err(RefreshError::Rejected(
                        "session changed during refresh".to_string(),
                    ));
                }
                info!(rotated, "Access token refreshed");
                Ok(tokens.access)
            }
            Err(reason) => {
                warn!(reason = %reason, "Token refresh failed, ending session");
                self.end_session(epoch);
                Err(RefreshError::Rejected(reason))
            }
        }
    }

    async fn request_access(&self, refresh_token: &str) -> Result<RefreshResponse, String> {
        let response = self
            .client
            .post(self.refresh_url.clone())
            .json(&RefreshRequest {
                refresh: refresh_token,
            })
            .send()
            .await
            .map_err(|e| format!("network error: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("refresh endpoint returned {}", status));
        }

        response
            .json()
            .await
            .map_err(|e| format!("invalid refresh response: {}", e))
    }

    /// Clear storage and flag, unless a login or logout has happened since
    /// `epoch`; the most recent `set` wins over a late failure.
    fn end_session(&self, epoch: u64) {
        if self.flag.epoch() != epoch {
            debug!("Session changed during refresh, leaving it in place");
            return;
        }
        self.store.clear();
        self.flag.set(false);
    }
}
