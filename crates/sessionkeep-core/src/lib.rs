//! Core library for sessionkeep.
//!
//! Owns the access/refresh token pair for a signed-in user and keeps the
//! session alive while the application makes API calls:
//!
//! - [`auth`]: persisted session, credential backends, the logged-in
//!   broadcaster, the route guard, the login/registration form and the
//!   single-flight refresh coordinator
//! - [`api`]: the authenticated request client and its error types
//! - [`config`]: base API address, backend contract and storage selection
//! - [`manager`]: [`SessionManager`], which wires the pieces together

pub mod api;
pub mod auth;
pub mod config;
pub mod manager;

pub use api::{ApiClient, ApiError, PendingRequest};
pub use auth::{
    AuthFields, AuthForm, AuthMode, CredentialStore, GuardDecision, RefreshCoordinator,
    RefreshError, RouteGuard, Session, SessionBroadcaster, SubmitError,
};
pub use config::Config;
pub use manager::SessionManager;
