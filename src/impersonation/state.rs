//! Typed access to the impersonation record stored in the session.
//!
//! This layer has no policy: it reads and writes the six namespaced session
//! keys, computes and checks the integrity digest, and answers expiry
//! questions. Decisions about when those checks run live in
//! [`Impersonator`](super::Impersonator).

use crate::clock::Clock;
use crate::error::{ImpersonationError, Result};
use crate::impersonation::integrity::{IntegrityGuard, IntegrityPayload};
use crate::traits::principal::PrincipalId;
use crate::traits::session::Session;
use serde_json::Value;
use std::sync::Arc;

/// Prefix owned by the impersonation core. Nothing outside it is touched.
pub const KEY_PREFIX: &str = "impersonation.";

pub const IMPERSONATING_KEY: &str = "impersonation.impersonating";
pub const IMPERSONATED_BY_KEY: &str = "impersonation.impersonated_by";
pub const GUARD_NAME_KEY: &str = "impersonation.guard_name";
pub const INTEGRITY_KEY: &str = "impersonation.integrity";
pub const STARTED_AT_KEY: &str = "impersonation.started_at";
pub const LEAVE_REDIRECT_URL_KEY: &str = "impersonation.leave_redirect_url";

/// Every key of the record, in the order they are cleared.
pub const RECORD_KEYS: [&str; 6] = [
    IMPERSONATING_KEY,
    IMPERSONATED_BY_KEY,
    GUARD_NAME_KEY,
    INTEGRITY_KEY,
    STARTED_AT_KEY,
    LEAVE_REDIRECT_URL_KEY,
];

/// The values written when an episode starts.
///
/// Built up front and committed with [`ImpersonationState::write`], so the
/// session never holds a half-written record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImpersonationRecord {
    pub impersonator: PrincipalId,
    pub guard_name: String,
    pub started_at: u64,
    pub leave_redirect_url: Option<String>,
}

impl ImpersonationRecord {
    #[must_use]
    pub fn new(impersonator: PrincipalId, guard_name: impl Into<String>, started_at: u64) -> Self {
        Self {
            impersonator,
            guard_name: guard_name.into(),
            started_at,
            leave_redirect_url: None,
        }
    }

    #[must_use]
    pub fn leave_redirect_url(mut self, url: Option<String>) -> Self {
        self.leave_redirect_url = url;
        self
    }

    fn payload(&self) -> IntegrityPayload {
        IntegrityPayload {
            impersonator: Some(self.impersonator.clone()),
            guard_name: Some(self.guard_name.clone()),
            started_at: Some(self.started_at),
            leave_redirect_url: self.leave_redirect_url.clone(),
        }
    }
}

/// Reads and writes the impersonation record of one session.
#[derive(Clone)]
pub struct ImpersonationState {
    session: Arc<dyn Session>,
    integrity: IntegrityGuard,
    clock: Arc<dyn Clock>,
}

impl ImpersonationState {
    pub fn new(session: Arc<dyn Session>, integrity: IntegrityGuard, clock: Arc<dyn Clock>) -> Self {
        Self {
            session,
            integrity,
            clock,
        }
    }

    pub(crate) fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    // ---- record commit ----

    /// Replace the stored record with `record`, signed, in one commit.
    ///
    /// The impersonating flag is written last. If any write fails, the record
    /// is cleared before the error is returned.
    pub async fn write(&self, record: &ImpersonationRecord) -> Result<()> {
        let digest = self.integrity.compute_digest(&record.payload())?;

        if let Err(err) = self.write_fields(record, digest).await {
            if let Err(clear_err) = self.clear().await {
                tracing::error!(
                    target: "impersonation.state",
                    error = %clear_err,
                    "Failed to clear partially written impersonation record"
                );
            }
            return Err(err);
        }

        Ok(())
    }

    async fn write_fields(&self, record: &ImpersonationRecord, digest: String) -> Result<()> {
        self.session
            .put(IMPERSONATED_BY_KEY, record.impersonator.to_value())
            .await?;
        self.session
            .put(GUARD_NAME_KEY, Value::from(record.guard_name.as_str()))
            .await?;
        self.session
            .put(STARTED_AT_KEY, Value::from(record.started_at))
            .await?;
        match &record.leave_redirect_url {
            Some(url) => {
                self.session
                    .put(LEAVE_REDIRECT_URL_KEY, Value::from(url.as_str()))
                    .await?
            }
            None => self.session.forget(LEAVE_REDIRECT_URL_KEY).await?,
        }
        self.session.put(INTEGRITY_KEY, Value::from(digest)).await?;
        self.session.put(IMPERSONATING_KEY, Value::Bool(true)).await
    }

    /// The stored record, if an episode is active and all its fields are present.
    pub async fn record(&self) -> Result<Option<ImpersonationRecord>> {
        if !self.is_impersonating().await? {
            return Ok(None);
        }

        let (Some(impersonator), Some(guard_name), Some(started_at)) = (
            self.impersonator().await?,
            self.guard_name().await?,
            self.started_at().await?,
        ) else {
            return Ok(None);
        };

        Ok(Some(
            ImpersonationRecord::new(impersonator, guard_name, started_at)
                .leave_redirect_url(self.leave_redirect_url().await?),
        ))
    }

    // ---- field setters ----

    pub async fn set_impersonator(&self, id: &PrincipalId) -> Result<&Self> {
        self.session.put(IMPERSONATED_BY_KEY, id.to_value()).await?;
        Ok(self)
    }

    pub async fn set_guard_name(&self, guard_name: &str) -> Result<&Self> {
        self.session
            .put(GUARD_NAME_KEY, Value::from(guard_name))
            .await?;
        Ok(self)
    }

    pub async fn set_started_at(&self, timestamp: u64) -> Result<&Self> {
        self.session
            .put(STARTED_AT_KEY, Value::from(timestamp))
            .await?;
        Ok(self)
    }

    /// Store the leave URL. `None` leaves the current value in place.
    pub async fn set_leave_redirect_url(&self, url: Option<&str>) -> Result<&Self> {
        if let Some(url) = url {
            self.session
                .put(LEAVE_REDIRECT_URL_KEY, Value::from(url))
                .await?;
        }
        Ok(self)
    }

    pub async fn mark_as_impersonating(&self) -> Result<&Self> {
        self.session
            .put(IMPERSONATING_KEY, Value::Bool(true))
            .await?;
        Ok(self)
    }

    /// Sign the fields currently in the session and store the digest.
    pub async fn generate_integrity_hash(&self) -> Result<&Self> {
        let digest = self.integrity.compute_digest(&self.payload().await?)?;
        self.session.put(INTEGRITY_KEY, Value::from(digest)).await?;
        Ok(self)
    }

    // ---- getters ----

    pub async fn impersonator(&self) -> Result<Option<PrincipalId>> {
        Ok(self
            .session
            .get(IMPERSONATED_BY_KEY)
            .await?
            .as_ref()
            .and_then(PrincipalId::from_value))
    }

    pub async fn guard_name(&self) -> Result<Option<String>> {
        self.get_string(GUARD_NAME_KEY).await
    }

    pub async fn started_at(&self) -> Result<Option<u64>> {
        Ok(self
            .session
            .get(STARTED_AT_KEY)
            .await?
            .and_then(|value| value.as_u64()))
    }

    pub async fn leave_redirect_url(&self) -> Result<Option<String>> {
        self.get_string(LEAVE_REDIRECT_URL_KEY).await
    }

    pub async fn integrity_hash(&self) -> Result<Option<String>> {
        self.get_string(INTEGRITY_KEY).await
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(match self.session.get(key).await? {
            Some(Value::String(value)) => Some(value),
            _ => None,
        })
    }

    // ---- checks ----

    /// Strict check: only a stored boolean `true` counts.
    pub async fn is_impersonating(&self) -> Result<bool> {
        Ok(matches!(
            self.session.get(IMPERSONATING_KEY).await?,
            Some(Value::Bool(true))
        ))
    }

    /// Whether the flag key exists and the episode was started on `guard`.
    pub async fn is_impersonating_on(&self, guard: &str) -> Result<bool> {
        if !self.session.has(IMPERSONATING_KEY).await? {
            return Ok(false);
        }
        Ok(self.guard_name().await?.as_deref() == Some(guard))
    }

    /// Whether the episode has outlived `ttl` seconds.
    ///
    /// No TTL or no episode is never expired. An episode without a readable
    /// start time is always expired. Exactly `ttl` seconds is still valid.
    pub async fn is_expired(&self, ttl: Option<u64>) -> Result<bool> {
        let Some(ttl) = ttl else {
            return Ok(false);
        };

        if !self.is_impersonating().await? {
            return Ok(false);
        }

        let Some(started_at) = self.started_at().await? else {
            return Ok(true);
        };

        let elapsed = self.clock.now_secs().saturating_sub(started_at);
        Ok(elapsed > ttl)
    }

    /// Check the stored digest against the stored fields.
    ///
    /// Does nothing when no episode is active. On a missing or mismatching
    /// digest the whole record is erased and [`ImpersonationError::TamperedSession`]
    /// is returned.
    pub async fn verify_integrity(&self) -> Result<()> {
        if !self.is_impersonating().await? {
            return Ok(());
        }

        let stored = match self.integrity_hash().await? {
            Some(hash) if !hash.is_empty() => hash,
            _ => return self.tampered("missing_hash").await,
        };

        if !self.integrity.verify(&self.payload().await?, &stored)? {
            return self.tampered("hash_mismatch").await;
        }

        Ok(())
    }

    async fn tampered(&self, reason: &'static str) -> Result<()> {
        let impersonator = self.session.get(IMPERSONATED_BY_KEY).await?;
        self.clear().await?;

        tracing::warn!(
            target: "impersonation.tampered",
            reason = reason,
            claimed_impersonator = ?impersonator,
            "Impersonation session failed integrity check and was cleared"
        );

        Err(ImpersonationError::TamperedSession)
    }

    async fn payload(&self) -> Result<IntegrityPayload> {
        Ok(IntegrityPayload {
            impersonator: self.impersonator().await?,
            guard_name: self.guard_name().await?,
            started_at: self.started_at().await?,
            leave_redirect_url: self.leave_redirect_url().await?,
        })
    }

    /// Remove every key of the record. Safe to call on an empty record.
    pub async fn clear(&self) -> Result<()> {
        for key in RECORD_KEYS {
            self.session.forget(key).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::impersonation::test::InMemorySession;
    use secrecy::SecretString;
    use serde_json::json;

    const NOW: u64 = 1_700_000_000;

    fn setup() -> (Arc<InMemorySession>, ImpersonationState, ManualClock) {
        let session = Arc::new(InMemorySession::new());
        let clock = ManualClock::new(NOW);
        let integrity =
            IntegrityGuard::new(Arc::new(SecretString::from("test-app-key".to_string()))).unwrap();
        let state = ImpersonationState::new(session.clone(), integrity, Arc::new(clock.clone()));
        (session, state, clock)
    }

    fn record() -> ImpersonationRecord {
        ImpersonationRecord::new(PrincipalId::Int(1), "web", NOW)
            .leave_redirect_url(Some("/admin/users".to_string()))
    }

    #[tokio::test]
    async fn test_write_persists_all_fields() {
        let (session, state, _) = setup();
        state.write(&record()).await.unwrap();

        assert!(state.is_impersonating().await.unwrap());
        assert_eq!(state.impersonator().await.unwrap(), Some(PrincipalId::Int(1)));
        assert_eq!(state.guard_name().await.unwrap().as_deref(), Some("web"));
        assert_eq!(state.started_at().await.unwrap(), Some(NOW));
        assert_eq!(
            state.leave_redirect_url().await.unwrap().as_deref(),
            Some("/admin/users")
        );
        assert!(state.integrity_hash().await.unwrap().is_some());
        assert_eq!(state.record().await.unwrap(), Some(record()));
        for key in RECORD_KEYS {
            assert!(session.contains(key), "missing {key}");
        }
    }

    #[tokio::test]
    async fn test_write_then_verify_succeeds() {
        let (_, state, _) = setup();
        state.write(&record()).await.unwrap();
        state.verify_integrity().await.unwrap();
    }

    #[tokio::test]
    async fn test_fluent_setters_then_sign_verifies() {
        let (_, state, _) = setup();
        state
            .set_guard_name("web")
            .await
            .unwrap()
            .set_impersonator(&PrincipalId::from("usr_1"))
            .await
            .unwrap()
            .set_started_at(NOW)
            .await
            .unwrap()
            .set_leave_redirect_url(None)
            .await
            .unwrap()
            .mark_as_impersonating()
            .await
            .unwrap()
            .generate_integrity_hash()
            .await
            .unwrap();

        state.verify_integrity().await.unwrap();
        assert_eq!(state.leave_redirect_url().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_without_leave_url_removes_previous_one() {
        let (_, state, _) = setup();
        state.write(&record()).await.unwrap();
        state
            .write(&record().leave_redirect_url(None))
            .await
            .unwrap();

        assert_eq!(state.leave_redirect_url().await.unwrap(), None);
        state.verify_integrity().await.unwrap();
    }

    #[tokio::test]
    async fn test_strict_impersonating_flag() {
        let (session, state, _) = setup();
        assert!(!state.is_impersonating().await.unwrap());

        for truthy in [json!(1), json!("1"), json!("true"), json!([true]), json!({"on": true})] {
            session.put(IMPERSONATING_KEY, truthy).await.unwrap();
            assert!(!state.is_impersonating().await.unwrap());
        }

        session.put(IMPERSONATING_KEY, json!(false)).await.unwrap();
        assert!(!state.is_impersonating().await.unwrap());

        session.put(IMPERSONATING_KEY, json!(true)).await.unwrap();
        assert!(state.is_impersonating().await.unwrap());
    }

    #[tokio::test]
    async fn test_is_expired_without_ttl_or_episode() {
        let (_, state, clock) = setup();
        assert!(!state.is_expired(Some(10)).await.unwrap());

        state.write(&record()).await.unwrap();
        clock.advance(1_000_000);
        assert!(!state.is_expired(None).await.unwrap());
    }

    #[tokio::test]
    async fn test_is_expired_boundary() {
        let (_, state, clock) = setup();
        state.write(&record()).await.unwrap();

        for ttl in [0_u64, 1, 60, 3600] {
            clock.set(NOW + ttl);
            assert!(!state.is_expired(Some(ttl)).await.unwrap(), "ttl {ttl} at boundary");

            clock.set(NOW + ttl + 1);
            assert!(state.is_expired(Some(ttl)).await.unwrap(), "ttl {ttl} past boundary");
        }
    }

    #[tokio::test]
    async fn test_is_expired_when_start_time_missing() {
        let (session, state, _) = setup();
        state.write(&record()).await.unwrap();
        session.forget(STARTED_AT_KEY).await.unwrap();

        assert!(state.is_expired(Some(3600)).await.unwrap());
        assert!(!state.is_expired(None).await.unwrap());
    }

    #[tokio::test]
    async fn test_start_time_in_future_is_not_expired() {
        let (_, state, clock) = setup();
        state.write(&record()).await.unwrap();
        clock.set(NOW - 100);

        assert!(!state.is_expired(Some(10)).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_is_noop_when_not_impersonating() {
        let (session, state, _) = setup();
        session.put(IMPERSONATED_BY_KEY, json!(99)).await.unwrap();

        state.verify_integrity().await.unwrap();
        assert!(session.contains(IMPERSONATED_BY_KEY));
    }

    #[tokio::test]
    async fn test_missing_hash_is_tampering() {
        let (session, state, _) = setup();
        state.write(&record()).await.unwrap();
        session.forget(INTEGRITY_KEY).await.unwrap();

        let err = state.verify_integrity().await.unwrap_err();
        assert!(err.is_tampered());
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn test_each_covered_field_is_protected() {
        let tampered_values = [
            (IMPERSONATED_BY_KEY, json!(2)),
            (IMPERSONATED_BY_KEY, json!("1")),
            (GUARD_NAME_KEY, json!("api")),
            (STARTED_AT_KEY, json!(NOW + 3600)),
            (LEAVE_REDIRECT_URL_KEY, json!("https://evil.example")),
            (INTEGRITY_KEY, json!("0".repeat(64))),
        ];

        for (key, value) in tampered_values {
            let (session, state, _) = setup();
            state.write(&record()).await.unwrap();
            session.put(key, value).await.unwrap();

            let err = state.verify_integrity().await.unwrap_err();
            assert!(err.is_tampered(), "tampering with {key} not detected");
            for key in RECORD_KEYS {
                assert!(!session.contains(key));
            }
        }
    }

    #[tokio::test]
    async fn test_removed_leave_url_is_tampering() {
        let (session, state, _) = setup();
        state.write(&record()).await.unwrap();
        session.forget(LEAVE_REDIRECT_URL_KEY).await.unwrap();

        assert!(state.verify_integrity().await.unwrap_err().is_tampered());
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let (session, state, _) = setup();
        session.put("other.key", json!("kept")).await.unwrap();
        state.write(&record()).await.unwrap();

        state.clear().await.unwrap();
        let after_once = session.snapshot();
        state.clear().await.unwrap();

        assert_eq!(session.snapshot(), after_once);
        assert_eq!(session.get("other.key").await.unwrap(), Some(json!("kept")));
        assert!(!state.is_impersonating().await.unwrap());
    }

    #[tokio::test]
    async fn test_is_impersonating_on_guard() {
        let (_, state, _) = setup();
        assert!(!state.is_impersonating_on("web").await.unwrap());

        state.write(&record()).await.unwrap();
        assert!(state.is_impersonating_on("web").await.unwrap());
        assert!(!state.is_impersonating_on("api").await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_record() {
        let (session, state, _) = setup();
        session.fail_writes_after(2);

        assert!(state.write(&record()).await.is_err());
        session.fail_writes_after(usize::MAX);
        assert!(!state.is_impersonating().await.unwrap());
        for key in RECORD_KEYS {
            assert!(!session.contains(key));
        }
    }
}
