//! Tideway Impersonation - session-scoped user impersonation for Axum apps
//!
//! Lets an authorized principal (typically an administrator) temporarily act
//! as another principal within the same session, then return to their own
//! identity. The stored impersonation record is signed with HMAC-SHA256, so a
//! session edited by hand is detected and cleared instead of trusted.
//!
//! # Features
//!
//! - **State machine**: start, stop and force stop with policy checks
//! - **Integrity**: tamper-evident session record keyed by a server secret
//! - **TTL**: optional maximum episode duration, enforced per request
//! - **Middleware**: Axum gates for TTL, "must not" and "must" impersonate
//! - **Events**: started/stopped notifications for audit logging
//! - **Sessions**: in-memory session store and a per-session adapter
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tideway_impersonation::{ImpersonationConfig, Impersonator, RequestContext};
//!
//! tideway_impersonation::init_tracing();
//!
//! // IMPERSONATION_SECRET must be set
//! let config = ImpersonationConfig::from_env();
//! let impersonator = Impersonator::new(session, auth, directory, config)?;
//!
//! impersonator
//!     .start_by_key(&RequestContext::new("/admin/users"), &42.into(), None, None)
//!     .await?;
//! assert!(impersonator.is_impersonating().await?);
//!
//! impersonator.stop().await?;
//! ```

pub mod clock;
mod error;
pub mod impersonation;
#[cfg(feature = "sessions")]
pub mod session;
pub mod traits;
mod utils;

// Re-exports for public API
pub use clock::{Clock, FixedClock, ManualClock, SystemClock};
pub use error::{ImpersonationError, Result};
pub use impersonation::{
    BroadcastEventSink, EventSink, ImpersonationConfig, ImpersonationEvent,
    ImpersonationMiddleware, ImpersonationState, Impersonator, IntegrityGuard, NoopEventSink,
    RequestContext, TtlExpiry,
};
#[cfg(feature = "sessions")]
pub use session::{InMemorySessionStore, SessionConfig, StoreSession};
pub use traits::{
    AuthGateway, Principal, PrincipalDirectory, PrincipalId, Session, SessionData, SessionStore,
    SharedPrincipal,
};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging with sensible defaults
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "impersonation=debug")
/// - `TIDEWAY_LOG_JSON`: Set to "true" for JSON formatted logs
///
/// # Example
///
/// ```rust,no_run
/// #[tokio::main]
/// async fn main() {
///     tideway_impersonation::init_tracing();
///     // ... rest of your app
/// }
/// ```
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("TIDEWAY_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
