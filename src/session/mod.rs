//! Session backends.
//!
//! An in-memory [`SessionStore`](crate::traits::SessionStore) and the
//! [`StoreSession`] adapter that exposes one stored session as a
//! [`Session`](crate::traits::Session).

mod config;
mod handle;
mod in_memory;

pub use config::SessionConfig;
pub use handle::StoreSession;
pub use in_memory::InMemorySessionStore;
