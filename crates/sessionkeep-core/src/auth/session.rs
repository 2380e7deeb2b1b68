use serde::{Deserialize, Serialize};

/// Storage key for the access token
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

/// Storage key for the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Storage key for the display name
pub const USERNAME_KEY: &str = "username";

/// The signed-in user's token pair.
///
/// Tokens are opaque: nothing in this crate inspects or validates them.
/// An empty session (all fields `None`) means logged out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "accessToken", default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(rename = "refreshToken", default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(rename = "username", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Session {
    /// Session created by a successful login
    pub fn new(access_token: String, refresh_token: String, display_name: String) -> Self {
        Self {
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
            display_name: Some(display_name),
        }
    }

    /// Get the bearer token, if any
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// A session is authenticated while it holds an access token
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.display_name.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_session_is_logged_out() {
        let session = Session::default();
        assert!(session.is_empty());
        assert!(!session.is_authenticated());
        assert_eq!(session.access_token(), None);
    }

    #[test]
    fn test_refresh_only_session_is_not_authenticated() {
        let session = Session {
            refresh_token: Some("r".to_string()),
            ..Session::default()
        };
        assert!(!session.is_authenticated());
        assert!(!session.is_empty());
    }

    #[test]
    fn test_session_uses_storage_keys() {
        let session = Session::new("a".into(), "r".into(), "alice".into());
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json[ACCESS_TOKEN_KEY], "a");
        assert_eq!(json[REFRESH_TOKEN_KEY], "r");
        assert_eq!(json[USERNAME_KEY], "alice");
    }

    #[test]
    fn test_missing_keys_parse_as_absent() {
        let session: Session = serde_json::from_str(r#"{"accessToken":"a"}"#).unwrap();
        assert_eq!(session.access_token(), Some("a"));
        assert_eq!(session.refresh_token(), None);
        assert_eq!(session.display_name(), None);
    }
}
