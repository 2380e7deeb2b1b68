use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::Serialize;

use super::ApiError;

/// Description of an outbound call.
///
/// Requests are rebuilt from this description on every dispatch, so a call
/// that fails authorization can be replayed unchanged with a new token. The
/// `retried` tag travels with the description: a replayed request is never
/// replayed again.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub headers: HeaderMap,
    public: bool,
    retried: bool,
}

impl PendingRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: HeaderMap::new(),
            public: false,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Attach a JSON body
    pub fn with_json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to encode body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Send without a bearer token and without the refresh protocol.
    /// Used for token issuance and registration.
    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn is_retry(&self) -> bool {
        self.retried
    }

    /// The replay of this request after a token refresh
    pub(crate) fn into_retry(self) -> Self {
        Self {
            retried: true,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_request_is_not_retry() {
        let request = PendingRequest::get("protected-view/");
        assert!(!request.is_retry());
        assert!(!request.is_public());
        assert_eq!(request.method, Method::GET);
    }

    #[test]
    fn test_into_retry_keeps_description() {
        let request = PendingRequest::post("items/")
            .with_json(&json!({"name": "a"}))
            .unwrap()
            .with_header(
                HeaderName::from_static("x-trace"),
                HeaderValue::from_static("1"),
            );
        let retry = request.clone().into_retry();

        assert!(retry.is_retry());
        assert_eq!(retry.method, request.method);
        assert_eq!(retry.path, request.path);
        assert_eq!(retry.body, request.body);
        assert_eq!(retry.headers, request.headers);
    }
}
