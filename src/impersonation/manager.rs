use crate::clock::{Clock, SystemClock};
use crate::error::{ImpersonationError, Result};
use crate::impersonation::config::ImpersonationConfig;
use crate::impersonation::events::{EventSink, ImpersonationEvent, NoopEventSink};
use crate::impersonation::integrity::IntegrityGuard;
use crate::impersonation::state::{ImpersonationRecord, ImpersonationState};
use crate::traits::auth::{AuthGateway, PrincipalDirectory};
use crate::traits::principal::{PrincipalId, SharedPrincipal};
use crate::traits::session::Session;
use std::sync::Arc;

/// Flash message shown after the TTL check ends an episode.
pub const TTL_EXPIRED_MESSAGE: &str =
    "Your impersonation session has expired and you have been returned to your original account.";

/// Denial message for routes that must not run while impersonating.
pub const PREVENT_IMPERSONATION_MESSAGE: &str =
    "This action is not allowed while impersonating another user.";

/// Denial message for routes that only make sense while impersonating.
pub const REQUIRE_IMPERSONATION_MESSAGE: &str = "This action requires active impersonation.";

/// The parts of the current request the core needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    full_url: String,
}

impl RequestContext {
    pub fn new(full_url: impl Into<String>) -> Self {
        Self {
            full_url: full_url.into(),
        }
    }

    pub fn from_request<B>(request: &axum::http::Request<B>) -> Self {
        Self::new(request.uri().to_string())
    }

    /// URL of the request, used as the default leave redirect.
    pub fn full_url(&self) -> &str {
        &self.full_url
    }
}

/// Outcome of a TTL check that ended the episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlExpiry {
    /// Stored leave URL, or the configured default.
    pub redirect_url: String,
    /// Always [`TTL_EXPIRED_MESSAGE`].
    pub message: String,
}

/// Drives impersonation episodes for one session.
///
/// Build one per request around that request's [`Session`]. Cloning is cheap;
/// every collaborator is behind an `Arc`.
///
/// # Example
///
/// ```rust,ignore
/// use tideway_impersonation::{Impersonator, ImpersonationConfig, RequestContext};
///
/// let impersonator = Impersonator::new(session, auth, directory, ImpersonationConfig::from_env())?;
///
/// // Admin starts impersonating user 42, returning to /admin/users afterwards
/// let redirect = impersonator
///     .start_by_key(&request, &42.into(), Some("/admin/users".into()), Some("/dashboard".into()))
///     .await?;
///
/// // Later, from the impersonated session
/// impersonator.stop().await?;
/// ```
#[derive(Clone)]
pub struct Impersonator {
    state: ImpersonationState,
    auth: Arc<dyn AuthGateway>,
    directory: Arc<dyn PrincipalDirectory>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    config: ImpersonationConfig,
}

impl Impersonator {
    /// Create an impersonator with the system clock and no event sink.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` has no integrity secret.
    pub fn new(
        session: Arc<dyn Session>,
        auth: Arc<dyn AuthGateway>,
        directory: Arc<dyn PrincipalDirectory>,
        config: ImpersonationConfig,
    ) -> Result<Self> {
        let integrity = IntegrityGuard::from_config(&config)?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        Ok(Self {
            state: ImpersonationState::new(session, integrity, clock.clone()),
            auth,
            directory,
            events: Arc::new(NoopEventSink),
            clock,
            config,
        })
    }

    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.state = self.state.with_clock(clock.clone());
        self.clock = clock;
        self
    }

    /// Start impersonating `target`.
    ///
    /// The leave URL defaults to the current request URL. Returns
    /// `start_redirect_url` unchanged so the caller can redirect.
    pub async fn start(
        &self,
        request: &RequestContext,
        target: SharedPrincipal,
        leave_redirect_url: Option<String>,
        start_redirect_url: Option<String>,
    ) -> Result<Option<String>> {
        self.ensure_enabled()?;
        self.ensure_not_already_impersonating().await?;

        let guard_name = self.current_guard_name().await?;
        let impersonator = self.auth.current_principal(&guard_name).await?;
        let impersonator = self.ensure_can_impersonate(impersonator, &target, &guard_name)?;
        self.ensure_can_be_impersonated(&impersonator, &target, &guard_name)?;

        let record = ImpersonationRecord::new(
            impersonator.id(),
            guard_name.as_str(),
            self.clock.now_secs(),
        )
        .leave_redirect_url(Some(
            leave_redirect_url.unwrap_or_else(|| request.full_url().to_string()),
        ));

        self.state.write(&record).await?;

        if let Err(err) = self.auth.login(&guard_name, target.clone()).await {
            if let Err(clear_err) = self.state.clear().await {
                tracing::error!(
                    target: "impersonation.state",
                    error = %clear_err,
                    "Failed to clear impersonation record after login failure"
                );
            }
            return Err(err);
        }

        tracing::info!(
            target: "impersonation.started",
            impersonator_id = %impersonator.id(),
            impersonated_id = %target.id(),
            guard = %guard_name,
            "Impersonation started"
        );

        self.emit(ImpersonationEvent::Started {
            impersonator,
            impersonated: target,
            guard_name,
        })
        .await;

        Ok(start_redirect_url)
    }

    /// Start impersonating the principal with the given id.
    pub async fn start_by_key(
        &self,
        request: &RequestContext,
        key: &PrincipalId,
        leave_redirect_url: Option<String>,
        start_redirect_url: Option<String>,
    ) -> Result<Option<String>> {
        let target = self.directory.find_by_id(key).await?.ok_or_else(|| {
            ImpersonationError::not_found(format!("User with key [{}] not found.", key))
        })?;

        self.start(request, target, leave_redirect_url, start_redirect_url)
            .await
    }

    /// Start impersonating the principal with the given email address.
    pub async fn start_by_email(
        &self,
        request: &RequestContext,
        email: &str,
        leave_redirect_url: Option<String>,
        start_redirect_url: Option<String>,
    ) -> Result<Option<String>> {
        let target = self.directory.find_by_email(email).await?.ok_or_else(|| {
            ImpersonationError::not_found(format!("User with email [{}] not found.", email))
        })?;

        self.start(request, target, leave_redirect_url, start_redirect_url)
            .await
    }

    /// Stop impersonating and restore the original principal.
    ///
    /// Fails with [`ImpersonationError::Expired`] (after clearing the record)
    /// once the configured TTL has passed; use [`Impersonator::force_stop`] to
    /// end an expired episode.
    pub async fn stop(&self) -> Result<()> {
        self.ensure_is_impersonating().await?;
        self.state.verify_integrity().await?;
        self.ensure_not_expired().await?;

        self.perform_stop().await
    }

    /// Stop impersonating without checking the TTL.
    pub async fn force_stop(&self) -> Result<()> {
        self.ensure_is_impersonating().await?;
        self.state.verify_integrity().await?;

        self.perform_stop().await
    }

    async fn perform_stop(&self) -> Result<()> {
        let Some(record) = self.state.record().await? else {
            self.state.clear().await?;
            return Err(ImpersonationError::TamperedSession);
        };
        let guard_name = record.guard_name;

        let impersonated = self.auth.current_principal(&guard_name).await?;

        self.state.clear().await?;

        self.auth.logout(&guard_name).await?;
        self.auth
            .login_by_id(&guard_name, &record.impersonator)
            .await?;

        let impersonator = self.auth.current_principal(&guard_name).await?;

        tracing::info!(
            target: "impersonation.stopped",
            impersonator_id = %record.impersonator,
            impersonated_id = ?impersonated.as_ref().map(|p| p.id()),
            guard = %guard_name,
            duration_secs = self.clock.now_secs().saturating_sub(record.started_at),
            "Impersonation stopped"
        );

        match (impersonator, impersonated) {
            (Some(impersonator), Some(impersonated)) => {
                self.emit(ImpersonationEvent::Stopped {
                    impersonator,
                    impersonated,
                    guard_name,
                })
                .await;
            }
            _ => {
                tracing::warn!(
                    target: "impersonation.stopped",
                    guard = %guard_name,
                    "Impersonation stopped without a resolvable principal; event not dispatched"
                );
            }
        }

        Ok(())
    }

    /// End the episode if it outlived the configured TTL.
    ///
    /// Meant to run once per request. Returns where to send the restored
    /// principal, or `None` when nothing expired.
    pub async fn check_ttl(&self) -> Result<Option<TtlExpiry>> {
        if !self.is_impersonating().await? {
            return Ok(None);
        }

        if !self.state.is_expired(self.config.ttl_seconds).await? {
            return Ok(None);
        }

        let redirect_url = self
            .leave_redirect_url()
            .await?
            .unwrap_or_else(|| self.config.default_redirect_url.clone());

        tracing::info!(
            target: "impersonation.expired",
            ttl_secs = ?self.config.ttl_seconds,
            redirect_url = %redirect_url,
            "Impersonation expired"
        );

        self.force_stop().await?;

        Ok(Some(TtlExpiry {
            redirect_url,
            message: TTL_EXPIRED_MESSAGE.to_string(),
        }))
    }

    /// Deny the request while an episode is active.
    pub async fn prevent_impersonation(&self) -> Result<()> {
        if self.is_impersonating().await? {
            return Err(ImpersonationError::forbidden(PREVENT_IMPERSONATION_MESSAGE));
        }
        Ok(())
    }

    /// Deny the request unless an episode is active.
    pub async fn require_impersonation(&self) -> Result<()> {
        if !self.is_impersonating().await? {
            return Err(ImpersonationError::forbidden(REQUIRE_IMPERSONATION_MESSAGE));
        }
        Ok(())
    }

    pub async fn is_impersonating(&self) -> Result<bool> {
        self.state.is_impersonating().await
    }

    /// The principal who started the current episode.
    pub async fn impersonator(&self) -> Result<Option<SharedPrincipal>> {
        match self.state.impersonator().await? {
            Some(id) => self.directory.find_by_id(&id).await,
            None => Ok(None),
        }
    }

    pub async fn impersonator_id(&self) -> Result<Option<PrincipalId>> {
        self.state.impersonator().await
    }

    pub async fn leave_redirect_url(&self) -> Result<Option<String>> {
        self.state.leave_redirect_url().await
    }

    /// Alias for [`Impersonator::start`].
    pub async fn as_principal(
        &self,
        request: &RequestContext,
        target: SharedPrincipal,
        leave_redirect_url: Option<String>,
        start_redirect_url: Option<String>,
    ) -> Result<Option<String>> {
        self.start(request, target, leave_redirect_url, start_redirect_url)
            .await
    }

    /// Alias for [`Impersonator::stop`].
    pub async fn leave(&self) -> Result<()> {
        self.stop().await
    }

    /// Alias for [`Impersonator::is_impersonating`].
    pub async fn impersonating(&self) -> Result<bool> {
        self.is_impersonating().await
    }

    /// Alias for [`Impersonator::impersonator`].
    pub async fn get_impersonator(&self) -> Result<Option<SharedPrincipal>> {
        self.impersonator().await
    }

    pub fn state(&self) -> &ImpersonationState {
        &self.state
    }

    pub fn auth(&self) -> &Arc<dyn AuthGateway> {
        &self.auth
    }

    pub fn config(&self) -> &ImpersonationConfig {
        &self.config
    }

    /// Guard to record for a new episode.
    ///
    /// A configured override wins. Otherwise the first declared guard with an
    /// authenticated principal is used, falling back to the default guard.
    async fn current_guard_name(&self) -> Result<String> {
        if let Some(guard) = &self.config.guard {
            return Ok(guard.clone());
        }

        for guard in self.auth.guard_names() {
            if self.auth.is_authenticated(&guard).await? {
                return Ok(guard);
            }
        }

        Ok(self.auth.default_guard())
    }

    async fn emit(&self, event: ImpersonationEvent) {
        let name = event.name();
        if let Err(err) = self.events.dispatch(event).await {
            tracing::warn!(
                target: "impersonation.event_dispatch_failed",
                event = name,
                error = %err,
                "Failed to dispatch impersonation event"
            );
        }
    }

    fn ensure_enabled(&self) -> Result<()> {
        if !self.config.enabled {
            tracing::warn!(
                target: "impersonation.rejected",
                reason = "not_enabled",
                "Impersonation rejected: feature disabled"
            );
            return Err(ImpersonationError::NotEnabled);
        }
        Ok(())
    }

    async fn ensure_not_already_impersonating(&self) -> Result<()> {
        if self.is_impersonating().await? {
            let active = self.state.impersonator().await?;
            tracing::warn!(
                target: "impersonation.rejected",
                impersonator_id = ?active,
                reason = "already_impersonating",
                "Impersonation rejected: episode already active"
            );
            return Err(ImpersonationError::AlreadyImpersonating);
        }
        Ok(())
    }

    async fn ensure_is_impersonating(&self) -> Result<()> {
        if !self.is_impersonating().await? {
            return Err(ImpersonationError::NotImpersonating);
        }
        Ok(())
    }

    async fn ensure_not_expired(&self) -> Result<()> {
        if self.state.is_expired(self.config.ttl_seconds).await? {
            self.state.clear().await?;
            tracing::info!(
                target: "impersonation.expired",
                ttl_secs = ?self.config.ttl_seconds,
                "Impersonation stop rejected: episode expired"
            );
            return Err(ImpersonationError::Expired);
        }
        Ok(())
    }

    fn ensure_can_impersonate(
        &self,
        impersonator: Option<SharedPrincipal>,
        target: &SharedPrincipal,
        guard_name: &str,
    ) -> Result<SharedPrincipal> {
        match impersonator {
            Some(impersonator) if impersonator.can_impersonate() => Ok(impersonator),
            impersonator => {
                let reason = if impersonator.is_some() {
                    "policy_denied"
                } else {
                    "not_authenticated"
                };
                tracing::warn!(
                    target: "impersonation.rejected",
                    impersonator_id = ?impersonator.as_ref().map(|p| p.id()),
                    target_id = %target.id(),
                    guard = %guard_name,
                    reason = reason,
                    "Impersonation rejected: principal cannot impersonate"
                );
                Err(ImpersonationError::CannotImpersonate)
            }
        }
    }

    fn ensure_can_be_impersonated(
        &self,
        impersonator: &SharedPrincipal,
        target: &SharedPrincipal,
        guard_name: &str,
    ) -> Result<()> {
        if !target.can_be_impersonated() {
            tracing::warn!(
                target: "impersonation.rejected",
                impersonator_id = %impersonator.id(),
                target_id = %target.id(),
                guard = %guard_name,
                reason = "target_protected",
                "Impersonation rejected: target cannot be impersonated"
            );
            return Err(ImpersonationError::CannotBeImpersonated);
        }
        Ok(())
    }
}
