//! Trait definitions for the collaborators of the impersonation core
//!
//! Applications implement these for their session backend, their
//! authentication layer and their principal types.

pub mod auth;
pub mod principal;
pub mod session;

pub use auth::{AuthGateway, PrincipalDirectory};
pub use principal::{Principal, PrincipalId, SharedPrincipal};
pub use session::{Session, SessionData, SessionStore};
