//! REST API client module for the token backend.
//!
//! This module provides the `ApiClient`, which attaches the current access
//! token to every protected call and transparently renews it once when the
//! backend answers 401.
//!
//! The backend uses JWT bearer token authentication; tokens are obtained
//! from the token endpoint and renewed through the refresh endpoint.

pub mod client;
pub mod error;
pub mod request;

pub use client::ApiClient;
pub use error::{ApiError, BackendMessage};
pub use request::PendingRequest;
