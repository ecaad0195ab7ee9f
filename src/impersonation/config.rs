//! Impersonation configuration.

use crate::utils::{get_env_parsed, get_env_with_prefix};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Configuration for impersonation behavior.
///
/// # Example
///
/// ```rust
/// use tideway_impersonation::ImpersonationConfig;
///
/// let config = ImpersonationConfig::new()
///     .ttl_seconds(Some(3600))
///     .default_redirect_url("/admin")
///     .secret("base64:0b6c1bd3a7...");
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImpersonationConfig {
    /// Whether impersonation can be started at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Maximum episode duration in seconds (None = no limit).
    #[serde(default)]
    pub ttl_seconds: Option<u64>,

    /// Where the TTL check sends the impersonator when no leave URL was stored.
    #[serde(default = "default_redirect_url")]
    pub default_redirect_url: String,

    /// Guard to record for new episodes instead of detecting the active one.
    #[serde(default)]
    pub guard: Option<String>,

    /// Server-side key for the integrity digest.
    ///
    /// Never serialized; load it with [`ImpersonationConfig::from_env`] or set
    /// it with [`ImpersonationConfig::secret`].
    #[serde(skip)]
    pub secret: Option<Arc<SecretString>>,
}

impl Default for ImpersonationConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            ttl_seconds: None,
            default_redirect_url: default_redirect_url(),
            guard: None,
            secret: None,
        }
    }
}

impl ImpersonationConfig {
    /// Create a new config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    ///
    /// Reads `IMPERSONATION_ENABLED`, `IMPERSONATION_TTL_SECONDS`,
    /// `IMPERSONATION_DEFAULT_REDIRECT_URL`, `IMPERSONATION_GUARD` and
    /// `IMPERSONATION_SECRET`, each optionally prefixed with `TIDEWAY_`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(enabled) = get_env_parsed("IMPERSONATION_ENABLED") {
            config.enabled = enabled;
        }

        if let Some(ttl) = get_env_with_prefix("IMPERSONATION_TTL_SECONDS") {
            let ttl = ttl.trim();
            if ttl.is_empty() || ttl.eq_ignore_ascii_case("null") {
                config.ttl_seconds = None;
            } else if let Ok(seconds) = ttl.parse() {
                config.ttl_seconds = Some(seconds);
            } else {
                tracing::warn!(value = %ttl, "Ignoring invalid IMPERSONATION_TTL_SECONDS");
            }
        }

        if let Some(url) = get_env_with_prefix("IMPERSONATION_DEFAULT_REDIRECT_URL") {
            config.default_redirect_url = url;
        }

        if let Some(guard) = get_env_with_prefix("IMPERSONATION_GUARD") {
            if !guard.is_empty() {
                config.guard = Some(guard);
            }
        }

        if let Some(secret) = get_env_with_prefix("IMPERSONATION_SECRET") {
            config.secret = Some(Arc::new(SecretString::from(secret)));
        }

        config
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn ttl_seconds(mut self, ttl: Option<u64>) -> Self {
        self.ttl_seconds = ttl;
        self
    }

    #[must_use]
    pub fn default_redirect_url(mut self, url: impl Into<String>) -> Self {
        self.default_redirect_url = url.into();
        self
    }

    #[must_use]
    pub fn guard(mut self, guard: Option<String>) -> Self {
        self.guard = guard;
        self
    }

    #[must_use]
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(Arc::new(SecretString::from(secret.into())));
        self
    }
}

fn default_enabled() -> bool {
    true
}

fn default_redirect_url() -> String {
    "/".to_string()
}
