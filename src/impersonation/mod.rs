//! User impersonation.
//!
//! Lets an authorized principal temporarily act as another one within the
//! same session, then return to their own identity.
//!
//! # Overview
//!
//! - [`Impersonator`] drives an episode: start, stop, force stop and the
//!   per-request TTL check
//! - [`ImpersonationState`] reads and writes the six `impersonation.*` session
//!   keys
//! - [`IntegrityGuard`] signs those keys with HMAC-SHA256 so edits to the
//!   session are detected
//! - [`ImpersonationMiddleware`] exposes the request gates to axum routers
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tideway_impersonation::{ImpersonationConfig, Impersonator, RequestContext};
//!
//! let config = ImpersonationConfig::from_env().ttl_seconds(Some(3600));
//! let impersonator = Impersonator::new(session, auth, directory, config)?;
//!
//! let redirect = impersonator
//!     .start_by_email(&RequestContext::from_request(&request), "customer@example.com", None, Some("/".into()))
//!     .await?;
//! ```

mod config;
mod events;
mod integrity;
mod manager;
mod middleware;
mod state;
pub mod view;


pub use config::ImpersonationConfig;
pub use events::{BroadcastEventSink, EventSink, ImpersonationEvent, NoopEventSink};
pub use integrity::{IntegrityGuard, IntegrityPayload};
pub use manager::{
    Impersonator, PREVENT_IMPERSONATION_MESSAGE, REQUIRE_IMPERSONATION_MESSAGE, RequestContext,
    TTL_EXPIRED_MESSAGE, TtlExpiry,
};
pub use middleware::ImpersonationMiddleware;
pub use state::{
    GUARD_NAME_KEY, IMPERSONATED_BY_KEY, IMPERSONATING_KEY, INTEGRITY_KEY, ImpersonationRecord,
    ImpersonationState, KEY_PREFIX, LEAVE_REDIRECT_URL_KEY, RECORD_KEYS, STARTED_AT_KEY,
};
