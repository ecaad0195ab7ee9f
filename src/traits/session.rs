//! Session storage traits
//!
//! [`Session`] is the view the impersonation core works with: the key/value
//! attributes of one principal's session. [`SessionStore`] is a backend that
//! holds many sessions by id; [`StoreSession`](crate::session::StoreSession)
//! bridges the two.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Attributes of a single session.
///
/// Values are JSON so that their type survives the round trip: a boolean
/// `true` stays distinct from `1` or `"true"`.
#[async_trait]
pub trait Session: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn put(&self, key: &str, value: Value) -> Result<()>;

    /// Remove a key. Removing a missing key is not an error.
    async fn forget(&self, key: &str) -> Result<()>;

    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

#[async_trait]
impl<T: Session + ?Sized> Session for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, value: Value) -> Result<()> {
        (**self).put(key, value).await
    }

    async fn forget(&self, key: &str) -> Result<()> {
        (**self).forget(key).await
    }

    async fn has(&self, key: &str) -> Result<bool> {
        (**self).has(key).await
    }
}

/// Session data stored in the session store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    /// Session attributes
    pub data: HashMap<String, Value>,

    /// When the session was created
    pub created_at: SystemTime,

    /// When the session expires
    pub expires_at: SystemTime,
}

impl SessionData {
    /// Create a new session with expiration
    pub fn new(ttl: Duration) -> Self {
        let now = SystemTime::now();
        Self {
            data: HashMap::new(),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        SystemTime::now() > self.expires_at
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// Extend the session expiration
    pub fn extend(&mut self, ttl: Duration) {
        self.expires_at = SystemTime::now() + ttl;
    }
}

/// Backend holding many sessions keyed by session id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load session data by session ID
    ///
    /// Returns `Ok(None)` if the session doesn't exist or has expired.
    async fn load(&self, session_id: &str) -> Result<Option<SessionData>>;

    /// Save session data with a session ID
    async fn save(&self, session_id: &str, data: SessionData) -> Result<()>;

    /// Delete a session
    async fn delete(&self, session_id: &str) -> Result<()>;

    /// Clean up expired sessions
    async fn cleanup_expired(&self) -> Result<usize>;

    /// Check if the session store is healthy
    fn is_healthy(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_data_keeps_value_types() {
        let mut data = SessionData::new(Duration::from_secs(60));
        data.set("flag", json!(true));
        data.set("count", json!(1));

        assert_eq!(data.get("flag"), Some(&json!(true)));
        assert_ne!(data.get("count"), Some(&json!(true)));
        assert_eq!(data.remove("flag"), Some(json!(true)));
        assert!(data.get("flag").is_none());
        assert!(!data.is_expired());
    }

    #[test]
    fn test_session_data_extend() {
        let mut data = SessionData::new(Duration::ZERO);
        let before = data.expires_at;
        data.extend(Duration::from_secs(3600));
        assert!(data.expires_at > before);
    }
}
