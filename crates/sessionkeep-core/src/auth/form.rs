//! Login and registration form controller.
//!
//! Validates input locally and only then talks to the backend. Failures come
//! back as user-facing messages: per-field for validation, a single line for
//! backend and network problems.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError, PendingRequest};
use crate::config::Endpoints;

use super::{CredentialStore, Session, SessionBroadcaster};

/// Minimum password length, both modes
pub const MIN_PASSWORD_LENGTH: usize = 6;

const AUTH_FAILED_MESSAGE: &str = "Authentication failed. Check credentials.";
const NETWORK_ERROR_MESSAGE: &str = "Network error: check backend connection.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Login,
    Register,
}

#[derive(Debug, Clone, Default)]
pub struct AuthFields {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl AuthFields {
    pub fn login(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: String::new(),
            password: password.into(),
        }
    }

    pub fn register(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Username,
    Email,
    Password,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Field::Username => "username",
            Field::Email => "email",
            Field::Password => "password",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: Field,
    pub message: &'static str,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("{}", summarize(.0))]
    Invalid(Vec<FieldError>),

    #[error("{0}")]
    Rejected(String),

    #[error("{0}")]
    Network(String),
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.message)
        .collect::<Vec<_>>()
        .join("; ")
}

impl SubmitError {
    /// Message for a field, if validation flagged it
    pub fn field_message(&self, field: Field) -> Option<&'static str> {
        match self {
            SubmitError::Invalid(errors) => errors
                .iter()
                .find(|e| e.field == field)
                .map(|e| e.message),
            _ => None,
        }
    }

    fn from_api(error: ApiError) -> Self {
        if error.is_network() {
            return SubmitError::Network(NETWORK_ERROR_MESSAGE.to_string());
        }
        SubmitError::Rejected(
            error
                .backend_detail()
                .unwrap_or(AUTH_FAILED_MESSAGE)
                .to_string(),
        )
    }
}

/// Check the fields for `mode` without touching the network
pub fn validate(mode: AuthMode, fields: &AuthFields) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if fields.username.trim().is_empty() {
        errors.push(FieldError {
            field: Field::Username,
            message: "Username is required",
        });
    }

    if mode == AuthMode::Register {
        if fields.email.is_empty() {
            errors.push(FieldError {
                field: Field::Email,
                message: "Email is required",
            });
        } else if !is_valid_email(&fields.email) {
            errors.push(FieldError {
                field: Field::Email,
                message: "Enter a valid email",
            });
        }
    }

    if fields.password.is_empty() {
        errors.push(FieldError {
            field: Field::Password,
            message: "Password is required",
        });
    } else if fields.password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.push(FieldError {
            field: Field::Password,
            message: "Password must be at least 6 characters",
        });
    }

    errors
}

/// `local@domain.tld`: no whitespace, something before the `@`, and a dot
/// after it with something on both sides.
fn is_valid_email(email: &str) -> bool {
    if email.is_empty() || email.chars().any(char::is_whitespace) {
        return false;
    }
    email.match_indices('@').any(|(at, _)| {
        let domain = &email[at + 1..];
        at > 0
            && domain
                .match_indices('.')
                .any(|(dot, _)| dot > 0 && dot + 1 < domain.len())
    })
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenPair {
    access: String,
    refresh: String,
}

/// Submits validated login/registration forms and opens the session.
#[derive(Debug, Clone)]
pub struct AuthForm {
    api: ApiClient,
    store: CredentialStore,
    flag: SessionBroadcaster,
    endpoints: Endpoints,
}

impl AuthForm {
    pub fn new(
        api: ApiClient,
        store: CredentialStore,
        flag: SessionBroadcaster,
        endpoints: Endpoints,
    ) -> Self {
        Self {
            api,
            store,
            flag,
            endpoints,
        }
    }

    /// Validate, register if asked, obtain tokens and open the session.
    pub async fn submit(&self, mode: AuthMode, fields: &AuthFields) -> Result<(), SubmitError> {
        let errors = validate(mode, fields);
        if !errors.is_empty() {
            debug!(?mode, count = errors.len(), "Form rejected by validation");
            return Err(SubmitError::Invalid(errors));
        }

        if mode == AuthMode::Register {
            let body = RegisterRequest {
                username: &fields.username,
                email: &fields.email,
                password: &fields.password,
            };
            let request = PendingRequest::post(self.endpoints.register.clone())
                .public()
                .with_json(&body)
                .map_err(SubmitError::from_api)?;
            self.api.request(request).await.map_err(|e| {
                warn!(error = %e, "Registration failed");
                SubmitError::from_api(e)
            })?;
            info!(username = %fields.username, "Registration successful");
        }

        let mut credentials = serde_json::Map::new();
        credentials.insert(
            self.endpoints.identifier_field.clone(),
            serde_json::Value::String(fields.username.clone()),
        );
        credentials.insert(
            "password".to_string(),
            serde_json::Value::String(fields.password.clone()),
        );

        let tokens: TokenPair = self
            .api
            .post_public(&self.endpoints.token, &credentials)
            .await
            .map_err(|e| {
                warn!(error = %e, "Login failed");
                SubmitError::from_api(e)
            })?;

        self.store.save(&Session::new(
            tokens.access,
            tokens.refresh,
            fields.username.clone(),
        ));
        self.flag.set(true);
        info!(username = %fields.username, "Login successful");
        Ok(())
    }
}
