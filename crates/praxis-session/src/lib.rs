//! Session persistence for the Praxis engine.
//!
//! A [`Session`] is the durable record of one tutoring exchange. The
//! [`SessionStore`] trait abstracts the storage medium (the bundled
//! [`FileSessionStore`] keeps one JSON file per session); the
//! [`SessionManager`] layers a write-through read cache and per-session-id
//! locking on top of whichever store backs it.

/// Session record and status types.
pub mod session;
/// Durable storage trait and the file-backed implementation.
pub mod store;
/// Write-through cached manager with per-id locking.
pub mod manager;

pub use manager::{SessionManager, SessionManagerConfig};
pub use session::{Session, SessionStatus, SessionSummary};
pub use store::{FileSessionStore, SessionStore};
