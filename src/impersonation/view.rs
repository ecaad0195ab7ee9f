//! Predicates for templates and UI code.
//!
//! A guard of `None` means the gateway's default guard.

use crate::error::Result;
use crate::impersonation::manager::Impersonator;
use crate::traits::principal::SharedPrincipal;

/// Whether an episode is active.
///
/// With a guard, true when the impersonation flag is present and the episode
/// was started on that guard.
pub async fn impersonating(impersonator: &Impersonator, guard: Option<&str>) -> Result<bool> {
    match guard {
        Some(guard) => impersonator.state().is_impersonating_on(guard).await,
        None => impersonator.is_impersonating().await,
    }
}

/// Whether the principal on `guard` may start impersonating.
pub async fn can_impersonate(impersonator: &Impersonator, guard: Option<&str>) -> Result<bool> {
    Ok(current(impersonator, guard)
        .await?
        .is_some_and(|principal| principal.can_impersonate()))
}

/// Whether `principal`, or the principal on `guard` if none is given, may be
/// impersonated.
pub async fn can_be_impersonated(
    impersonator: &Impersonator,
    principal: Option<SharedPrincipal>,
    guard: Option<&str>,
) -> Result<bool> {
    let principal = match principal {
        Some(principal) => Some(principal),
        None => current(impersonator, guard).await?,
    };

    Ok(principal.is_some_and(|principal| principal.can_be_impersonated()))
}

async fn current(impersonator: &Impersonator, guard: Option<&str>) -> Result<Option<SharedPrincipal>> {
    let auth = impersonator.auth();
    let guard = match guard {
        Some(guard) => guard.to_string(),
        None => auth.default_guard(),
    };
    auth.current_principal(&guard).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impersonation::config::ImpersonationConfig;
    use crate::impersonation::manager::RequestContext;
    use crate::impersonation::state::IMPERSONATING_KEY;
    use crate::impersonation::test::{Harness, RestrictedUser};
    use crate::traits::session::Session;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_impersonating_without_guard() {
        let h = Harness::new();
        let imp = h.impersonator(ImpersonationConfig::new());
        assert!(!impersonating(&imp, None).await.unwrap());

        imp.start(&RequestContext::new("/"), h.user.clone(), None, None)
            .await
            .unwrap();
        assert!(impersonating(&imp, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_impersonating_on_guard() {
        let h = Harness::new();
        let imp = h.impersonator(ImpersonationConfig::new());

        imp.start(&RequestContext::new("/"), h.user.clone(), None, None)
            .await
            .unwrap();

        assert!(impersonating(&imp, Some("web")).await.unwrap());
        assert!(!impersonating(&imp, Some("api")).await.unwrap());
    }

    #[tokio::test]
    async fn test_impersonating_on_guard_only_needs_flag_key() {
        let h = Harness::new();
        let imp = h.impersonator(ImpersonationConfig::new());

        imp.start(&RequestContext::new("/"), h.user.clone(), None, None)
            .await
            .unwrap();
        h.session.put(IMPERSONATING_KEY, json!(false)).await.unwrap();

        assert!(!impersonating(&imp, None).await.unwrap());
        assert!(impersonating(&imp, Some("web")).await.unwrap());
    }

    #[tokio::test]
    async fn test_can_impersonate() {
        let h = Harness::new();
        let imp = h.impersonator(ImpersonationConfig::new());

        assert!(can_impersonate(&imp, None).await.unwrap());
        assert!(can_impersonate(&imp, Some("web")).await.unwrap());
        // Nobody is logged in on api.
        assert!(!can_impersonate(&imp, Some("api")).await.unwrap());

        h.auth
            .acting_as("web", Arc::new(RestrictedUser::new(10, "ops@example.com").deny_impersonating()));
        assert!(!can_impersonate(&imp, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_can_be_impersonated() {
        let h = Harness::new();
        let imp = h.impersonator(ImpersonationConfig::new());
        let protected: SharedPrincipal = Arc::new(RestrictedUser::new(11, "root@example.com").protected());

        assert!(can_be_impersonated(&imp, Some(h.user.clone()), None).await.unwrap());
        assert!(!can_be_impersonated(&imp, Some(protected.clone()), None).await.unwrap());

        // Falls back to the principal on the guard.
        assert!(can_be_impersonated(&imp, None, None).await.unwrap());
        assert!(!can_be_impersonated(&imp, None, Some("api")).await.unwrap());

        h.auth.acting_as("api", protected);
        assert!(!can_be_impersonated(&imp, None, Some("api")).await.unwrap());
    }
}
