//! Authentication module for managing the user's token session.
//!
//! This module provides:
//! - `Session`: the access/refresh token pair plus display name
//! - `CredentialStore`: infallible session persistence over a pluggable backend
//! - `SessionBroadcaster`: the observable logged-in flag
//! - `RefreshCoordinator`: single-flight exchange of the refresh token
//! - `RouteGuard`: admits or redirects navigation to protected routes
//! - `AuthForm`: login/registration validation and submission

pub mod broadcast;
pub mod credentials;
pub mod form;
pub mod guard;
pub mod refresh;
pub mod session;

pub use broadcast::SessionBroadcaster;
pub use credentials::{
    CredentialBackend, CredentialStore, FileBackend, KeyringBackend, MemoryBackend,
};
pub use form::{validate, AuthFields, AuthForm, AuthMode, Field, FieldError, SubmitError};
pub use guard::{GuardDecision, RouteGuard};
pub use refresh::{RefreshCoordinator, RefreshError};
pub use session::Session;
