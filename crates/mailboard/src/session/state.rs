//! Session state and the user profile

use log::warn;
use serde::{Deserialize, Serialize};

/// How the account signs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Google,
    Email,
}

/// Profile of the signed-in user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<AuthProvider>,
}

impl User {
    /// Display name, falling back to the email address
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.email
        } else {
            &self.name
        }
    }
}

/// The live session
///
/// The access token only ever lives here, in memory. `user` is set only
/// after a successful validation in this process; the token may rotate
/// without touching it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub access_token: Option<String>,
    pub user: Option<User>,
    /// True only while startup validation is running
    pub initializing: bool,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// Receives session lifecycle notifications
pub trait SessionListener: Send + Sync {
    /// The session could not be recovered and the user must sign in again.
    ///
    /// Called at most once per `SessionManager`.
    fn on_sign_in_required(&self);
}

/// Client-side mail state that must not outlive the session
///
/// Purged whenever the session is torn down (logout, failed refresh,
/// failed startup validation).
pub trait PreviewSink: Send + Sync {
    /// Drop all cached previews, cursors and load status, in memory and
    /// in the local store
    fn purge(&self);
}

/// Listener that only logs
pub struct LogListener;

impl SessionListener for LogListener {
    fn on_sign_in_required(&self) {
        warn!("Session expired, sign-in required");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_deserializes_with_optional_fields() {
        let user: User = serde_json::from_str(
            r#"{ "id": "u1", "email": "ada@example.com", "provider": "email" }"#,
        )
        .unwrap();
        assert_eq!(user.name, "");
        assert_eq!(user.display_name(), "ada@example.com");
        assert_eq!(user.provider, Some(AuthProvider::Email));
    }

    #[test]
    fn test_default_session_is_anonymous() {
        let session = Session::default();
        assert!(!session.is_authenticated());
        assert!(!session.initializing);
        assert!(session.access_token.is_none());
    }
}
