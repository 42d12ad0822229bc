//! Session Store - Auth Token and User Profile Holder
//!
//! In-process replacement for the dashboard's cookie jar: keeps the
//! access token, refresh token and sanitized user profile. Implements the
//! `TokenSource` port for the price stream and the REST client.

use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::adapters::api::types::User;
use crate::ports::TokenSource;

/// Env var that seeds the auth token at startup.
pub const AUTH_TOKEN_ENV: &str = "BTC_STREAM_AUTH_TOKEN";

/// Minimum length of a well-formed access token.
const MIN_TOKEN_LENGTH: usize = 10;

/// Persisted session contents (also the session file format).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    /// Access token.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Logged-in user.
    #[serde(default)]
    pub user: Option<User>,
}

/// Thread-safe session holder.
#[derive(Debug, Default)]
pub struct SessionStore {
    inner: RwLock<SessionData>,
}

impl SessionStore {
    /// Empty (logged-out) store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded from `BTC_STREAM_AUTH_TOKEN`, if set.
    pub fn from_env() -> Self {
        let store = Self::new();
        if let Ok(token) = std::env::var(AUTH_TOKEN_ENV) {
            store.set_tokens(Some(token), None);
            info!(env = AUTH_TOKEN_ENV, "Auth token loaded from environment");
        }
        store
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionData> {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionData> {
        self.inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Read a session file (JSON `SessionData`).
    ///
    /// # Errors
    /// If the file cannot be read or parsed.
    pub fn read_file(path: &Path) -> Result<SessionData> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session file: {}", path.display()))?;
        let mut data: SessionData = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session file: {}", path.display()))?;
        data.user = data.user.and_then(User::sanitized);
        Ok(data)
    }

    /// Replace the whole session with the contents of a file.
    ///
    /// # Errors
    /// If the file cannot be read or parsed; the current session is kept.
    pub fn load_file(&self, path: &Path) -> Result<()> {
        let data = Self::read_file(path)?;
        debug!(
            path = %path.display(),
            has_token = data.auth_token.is_some(),
            "Session file loaded"
        );
        self.replace(data);
        Ok(())
    }

    /// Replace the whole session.
    pub fn replace(&self, data: SessionData) {
        *self.write() = data;
    }

    /// Set the access token and, when given, the refresh token.
    pub fn set_tokens(&self, auth_token: Option<String>, refresh_token: Option<String>) {
        let mut data = self.write();
        data.auth_token = auth_token.filter(|t| !t.trim().is_empty());
        if refresh_token.is_some() {
            data.refresh_token = refresh_token;
        }
    }

    /// Store the user profile, dropping profiles without identity fields.
    pub fn set_user(&self, user: User) {
        self.write().user = user.sanitized();
    }

    /// Current refresh token.
    pub fn refresh_token(&self) -> Option<String> {
        self.read().refresh_token.clone()
    }

    /// Whether an access token is present.
    pub fn has_auth_token(&self) -> bool {
        self.read().auth_token.is_some()
    }

    /// Token and user profile both present.
    pub fn is_authenticated(&self) -> bool {
        let data = self.read();
        data.auth_token.is_some() && data.user.is_some()
    }

    /// Forget everything (logout, 401, failed refresh).
    pub fn clear_all(&self) {
        *self.write() = SessionData::default();
        info!("Session cleared");
    }
}

impl TokenSource for SessionStore {
    fn auth_token(&self) -> Option<String> {
        self.read().auth_token.clone()
    }
}

/// JWT-shaped token check used before sending a bearer header.
///
/// At least 10 characters and exactly three non-empty dot-separated parts.
pub fn is_valid_token_format(token: &str) -> bool {
    let token = token.trim();
    if token.len() < MIN_TOKEN_LENGTH {
        return false;
    }
    let parts: Vec<&str> = token.split('.').collect();
    parts.len() == 3 && parts.iter().all(|p| !p.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: 1,
            username: "alice".into(),
            email: "alice@example.com".into(),
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_token_lifecycle() {
        let store = SessionStore::new();
        assert_eq!(store.auth_token(), None);

        store.set_tokens(Some("aaa.bbb.ccc".into()), Some("refresh".into()));
        assert_eq!(store.auth_token().as_deref(), Some("aaa.bbb.ccc"));
        assert_eq!(store.refresh_token().as_deref(), Some("refresh"));
        assert!(!store.is_authenticated());

        store.set_user(user());
        assert!(store.is_authenticated());

        store.clear_all();
        assert!(!store.has_auth_token());
        assert!(store.refresh_token().is_none());
    }

    #[test]
    fn test_blank_token_is_absent() {
        let store = SessionStore::new();
        store.set_tokens(Some("   ".into()), None);
        assert!(!store.has_auth_token());
    }

    #[test]
    fn test_set_tokens_keeps_refresh_when_not_given() {
        let store = SessionStore::new();
        store.set_tokens(Some("first.token.value".into()), Some("r1".into()));
        store.set_tokens(Some("second.token.value".into()), None);
        assert_eq!(store.refresh_token().as_deref(), Some("r1"));
    }

    #[test]
    fn test_token_format() {
        assert!(is_valid_token_format("header.payload.signature"));
        assert!(!is_valid_token_format("a.b.c"));
        assert!(!is_valid_token_format("no-dots-at-all-here"));
        assert!(!is_valid_token_format("header..signature"));
        assert!(!is_valid_token_format("one.two.three.four"));
    }

    #[test]
    fn test_load_file_round_trip() {
        let dir = std::env::temp_dir().join(format!("btc-session-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("session.json");
        std::fs::write(
            &path,
            r#"{"auth_token":"aaa.bbb.ccc","user":{"id":0,"username":"","email":""}}"#,
        )
        .unwrap();

        let store = SessionStore::new();
        store.load_file(&path).unwrap();

        assert_eq!(store.auth_token().as_deref(), Some("aaa.bbb.ccc"));
        assert!(!store.is_authenticated());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_missing_file_keeps_session() {
        let store = SessionStore::new();
        store.set_tokens(Some("keep.this.token".into()), None);
        assert!(store.load_file(Path::new("/nonexistent/session.json")).is_err());
        assert!(store.has_auth_token());
    }
}
