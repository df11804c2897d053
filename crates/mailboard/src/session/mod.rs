//! Session lifecycle
//!
//! This module provides:
//! - The in-memory session (access token, user, initializing flag)
//! - Single-flight refresh coordination with a queue of waiting requests
//! - The `SessionManager` every network-issuing component goes through

mod jwt;
mod manager;
mod refresh;
mod state;

pub use jwt::{expires_at, is_expired};
pub use manager::{ME_PATH, REFRESH_PATH, STORED_TOKEN_KEY, SessionManager};
pub use refresh::{RefreshCoordinator, RefreshError, Replay, Turn, Waiter};
pub use state::{AuthProvider, LogListener, PreviewSink, Session, SessionListener, User};
