use crate::error::Result;
use crate::traits::session::{Session, SessionData, SessionStore};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// One session of a [`SessionStore`], addressed by id.
///
/// Every write loads the session, applies the change and saves it back. A
/// session that does not exist yet (or has expired) is created on the first
/// write with the configured lifetime.
///
/// # Example
///
/// ```rust,ignore
/// use tideway_impersonation::session::{InMemorySessionStore, SessionConfig, StoreSession};
///
/// let store = InMemorySessionStore::new();
/// let session = StoreSession::new(store, session_id, SessionConfig::default().default_ttl());
/// ```
#[derive(Clone)]
pub struct StoreSession<St: SessionStore> {
    store: St,
    session_id: String,
    ttl: Duration,
}

impl<St: SessionStore> StoreSession<St> {
    pub fn new(store: St, session_id: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            session_id: session_id.into(),
            ttl,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[async_trait]
impl<St: SessionStore> Session for StoreSession<St> {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self
            .store
            .load(&self.session_id)
            .await?
            .and_then(|data| data.get(key).cloned()))
    }

    async fn put(&self, key: &str, value: Value) -> Result<()> {
        let mut data = self
            .store
            .load(&self.session_id)
            .await?
            .unwrap_or_else(|| SessionData::new(self.ttl));
        data.set(key, value);
        self.store.save(&self.session_id, data).await
    }

    async fn forget(&self, key: &str) -> Result<()> {
        if let Some(mut data) = self.store.load(&self.session_id).await? {
            if data.remove(key).is_some() {
                self.store.save(&self.session_id, data).await?;
            }
        }
        Ok(())
    }
}
