//! Authentication collaborators consumed by the impersonation core.
//!
//! The core never authenticates anyone itself. It asks an [`AuthGateway`]
//! which principal a named guard currently holds and tells it to switch, and it
//! resolves targets through a [`PrincipalDirectory`].

use crate::error::Result;
use crate::traits::principal::{PrincipalId, SharedPrincipal};
use async_trait::async_trait;

/// Named authentication guards ("web", "api", ...) and their active principal.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// Configured guard names in declaration order.
    fn guard_names(&self) -> Vec<String>;

    /// Name of the guard used when no configured guard is authenticated.
    fn default_guard(&self) -> String;

    async fn is_authenticated(&self, guard: &str) -> Result<bool>;

    async fn current_principal(&self, guard: &str) -> Result<Option<SharedPrincipal>>;

    async fn login(&self, guard: &str, principal: SharedPrincipal) -> Result<()>;

    async fn logout(&self, guard: &str) -> Result<()>;

    /// Log in the principal with the given id on `guard`.
    async fn login_by_id(&self, guard: &str, id: &PrincipalId) -> Result<()>;
}

/// Lookup of principals that are not necessarily logged in.
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    async fn find_by_id(&self, id: &PrincipalId) -> Result<Option<SharedPrincipal>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<SharedPrincipal>>;
}
