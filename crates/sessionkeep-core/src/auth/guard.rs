use tracing::debug;

use super::{CredentialStore, SessionBroadcaster};

/// Outcome of a navigation check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Admit,
    Redirect { to: String },
}

/// Gates navigation to routes that need a signed-in user.
///
/// Both the broadcast flag and the stored access token must agree before a
/// protected route is admitted; they are written on different paths and a
/// true flag over an emptied store must still redirect.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    store: CredentialStore,
    flag: SessionBroadcaster,
    home: String,
    protected: Vec<String>,
}

impl RouteGuard {
    pub fn new(
        store: CredentialStore,
        flag: SessionBroadcaster,
        home: impl Into<String>,
        protected: Vec<String>,
    ) -> Self {
        Self {
            store,
            flag,
            home: home.into(),
            protected,
        }
    }

    /// Whether `route` falls under one of the protected prefixes
    pub fn is_protected(&self, route: &str) -> bool {
        let route = trim_slash(route);
        self.protected.iter().any(|prefix| {
            let prefix = trim_slash(prefix);
            route == prefix
                || route
                    .strip_prefix(prefix)
                    .is_some_and(|rest| prefix.is_empty() || rest.starts_with('/'))
        })
    }

    /// Check any route; unprotected routes are always admitted
    pub fn check(&self, route: &str) -> GuardDecision {
        if self.is_protected(route) {
            self.check_protected(route)
        } else {
            GuardDecision::Admit
        }
    }

    /// Check a route known to need a session
    pub fn check_protected(&self, route: &str) -> GuardDecision {
        let logged_in = self.flag.get();
        let has_token = self.store.access_token().is_some();

        if logged_in && has_token {
            GuardDecision::Admit
        } else {
            debug!(route, logged_in, has_token, "Redirecting unauthenticated navigation");
            GuardDecision::Redirect {
                to: self.home.clone(),
            }
        }
    }
}

/// `/dashboard/` and `/dashboard` name the same route
fn trim_slash(route: &str) -> &str {
    route.strip_suffix('/').unwrap_or(route)
}
