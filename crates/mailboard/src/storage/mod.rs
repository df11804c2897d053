//! Persisted local client state
//!
//! This module defines the key/value abstraction used for everything the
//! client keeps across restarts (preview cache snapshot, stored credential,
//! kanban column configuration). The trait-based design allows swapping
//! between in-memory and SQLite-backed implementations.

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryLocalStore;
pub use sqlite::SqliteLocalStore;
pub use traits::{LocalStore, load_json, save_json};
