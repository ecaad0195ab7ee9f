//! Tamper evidence for the stored impersonation record.
//!
//! The authorization-relevant fields of an episode (who is impersonating,
//! on which guard, since when, and where to return) are bound together by an
//! HMAC-SHA256 digest keyed with a server-side secret. Editing any one of them
//! in the session without the secret makes verification fail.

use crate::error::{ImpersonationError, Result};
use crate::impersonation::config::ImpersonationConfig;
use crate::traits::principal::PrincipalId;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// The fields covered by the digest.
///
/// Serialized as compact JSON in declaration order; absent values become
/// `null`, so "missing" and "empty string" hash differently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityPayload {
    pub impersonator: Option<PrincipalId>,
    pub guard_name: Option<String>,
    pub started_at: Option<u64>,
    pub leave_redirect_url: Option<String>,
}

impl IntegrityPayload {
    /// Canonical byte form that is fed to the HMAC.
    pub fn canonical(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Computes and checks integrity digests.
///
/// The secret is kept in a [`SecretString`] and never leaves this type.
#[derive(Clone)]
pub struct IntegrityGuard {
    secret: Arc<SecretString>,
}

impl IntegrityGuard {
    /// Create a guard from a secret.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the secret is empty.
    pub fn new(secret: Arc<SecretString>) -> Result<Self> {
        if secret.expose_secret().is_empty() {
            return Err(ImpersonationError::configuration(
                "Impersonation integrity secret must not be empty",
            ));
        }
        Ok(Self { secret })
    }

    /// Create a guard from the configured secret.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no secret is configured. Set
    /// `IMPERSONATION_SECRET` or call [`ImpersonationConfig::secret`].
    pub fn from_config(config: &ImpersonationConfig) -> Result<Self> {
        let secret = config.secret.clone().ok_or_else(|| {
            ImpersonationError::configuration(
                "Impersonation requires an integrity secret. \
                Set IMPERSONATION_SECRET or ImpersonationConfig::secret.",
            )
        })?;
        Self::new(secret)
    }

    /// Lowercase hex HMAC-SHA256 of the canonical payload.
    pub fn compute_digest(&self, payload: &IntegrityPayload) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| ImpersonationError::internal("HMAC error"))?;
        mac.update(payload.canonical()?.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Whether `stored` is the digest of `payload`, compared in constant time.
    pub fn verify(&self, payload: &IntegrityPayload, stored: &str) -> Result<bool> {
        let expected = self.compute_digest(payload)?;
        Ok(constant_time_compare(expected.as_bytes(), stored.as_bytes()))
    }
}

impl std::fmt::Debug for IntegrityGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityGuard").finish_non_exhaustive()
    }
}

fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
