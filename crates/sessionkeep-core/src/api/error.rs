use std::fmt;

use thiserror::Error;

/// Message the backend attached to an error response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendMessage {
    /// Human-readable message extracted from the body, if it had one
    pub detail: Option<String>,
    /// Raw body, truncated
    pub body: String,
}

impl fmt::Display for BackendMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => f.write_str(detail),
            None => f.write_str(&self.body),
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    /// Terminal for this call: the session could not be renewed, or the
    /// renewed token was rejected too.
    #[error("Not authenticated - please log in")]
    Unauthenticated,

    /// 401 on a request that does not take part in token refresh
    #[error("Unauthorized: {0}")]
    Unauthorized(BackendMessage),

    #[error("Access denied: {0}")]
    AccessDenied(BackendMessage),

    #[error("Resource not found: {0}")]
    NotFound(BackendMessage),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(BackendMessage),

    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: BackendMessage },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Pull a user-facing message out of a JSON error body.
    ///
    /// Prefers `{"detail": "..."}`; otherwise takes the first message of a
    /// field-keyed body such as `{"username": ["already taken"]}`.
    fn extract_detail(body: &str) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        let object = value.as_object()?;

        if let Some(detail) = object.get("detail").and_then(|d| d.as_str()) {
            return Some(detail.to_string());
        }

        object.values().find_map(|v| match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Array(items) => {
                items.first().and_then(|i| i.as_str()).map(str::to_string)
            }
            _ => None,
        })
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = BackendMessage {
            detail: Self::extract_detail(body),
            body: Self::truncate_body(body),
        };
        match status.as_u16() {
            401 => ApiError::Unauthorized(message),
            403 => ApiError::AccessDenied(message),
            404 => ApiError::NotFound(message),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(message),
            code => ApiError::Rejected {
                status: code,
                message,
            },
        }
    }

    /// The backend's own message, when the error came with one
    pub fn backend_detail(&self) -> Option<&str> {
        match self {
            ApiError::Unauthorized(m)
            | ApiError::AccessDenied(m)
            | ApiError::NotFound(m)
            | ApiError::ServerError(m)
            | ApiError::Rejected { message: m, .. } => m.detail.as_deref(),
            _ => None,
        }
    }

    /// Transport failure: no response was received
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::NetworkError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_extracts_detail() {
        let err = ApiError::from_status(
            StatusCode::UNAUTHORIZED,
            r#"{"detail":"No active account found with the given credentials"}"#,
        );
        assert!(matches!(err, ApiError::Unauthorized(_)));
        assert_eq!(
            err.backend_detail(),
            Some("No active account found with the given credentials")
        );
    }

    #[test]
    fn test_from_status_field_errors() {
        let err = ApiError::from_status(
            StatusCode::BAD_REQUEST,
            r#"{"username":["A user with that username already exists."]}"#,
        );
        assert!(matches!(err, ApiError::Rejected { status: 400, .. }));
        assert_eq!(
            err.backend_detail(),
            Some("A user with that username already exists.")
        );
    }

    #[test]
    fn test_from_status_plain_body_has_no_detail() {
        let err = ApiError::from_status(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(matches!(err, ApiError::ServerError(_)));
        assert_eq!(err.backend_detail(), None);
        assert_eq!(err.to_string(), "Server error: upstream down");
    }

    #[test]
    fn test_from_status_rate_limited() {
        let err = ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, "");
        assert!(matches!(err, ApiError::RateLimited));
    }

    #[test]
    fn test_truncate_body() {
        let body = "x".repeat(MAX_ERROR_BODY_LENGTH + 10);
        let truncated = ApiError::truncate_body(&body);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.contains("510 total bytes"));
    }

    #[test]
    fn test_truncate_body_respects_char_boundary() {
        let body = "é".repeat(MAX_ERROR_BODY_LENGTH);
        let truncated = ApiError::truncate_body(&body);
        assert!(truncated.contains("truncated"));
    }
}
