//! Local store trait and JSON helpers

use anyhow::{Context, Result};
use log::warn;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// String key/value store for client state
pub trait LocalStore: Send + Sync {
    /// Get the value stored under `key`
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace the value under `key`
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key` (no-op if absent)
    fn remove(&self, key: &str) -> Result<()>;

    /// Remove everything
    fn clear(&self) -> Result<()>;
}

/// Load a JSON value, treating unreadable or corrupt entries as absent
///
/// A corrupt entry is logged and removed so the next write starts clean.
pub fn load_json<T: DeserializeOwned>(store: &dyn LocalStore, key: &str) -> Option<T> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!("Failed to read local state {}: {}", key, e);
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Discarding corrupt local state {}: {}", key, e);
            if let Err(e) = store.remove(key) {
                warn!("Failed to remove corrupt local state {}: {}", key, e);
            }
            None
        }
    }
}

/// Serialize a value as JSON under `key`
pub fn save_json<T: Serialize + ?Sized>(store: &dyn LocalStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value)
        .with_context(|| format!("Failed to serialize local state {}", key))?;
    store
        .set(key, &raw)
        .with_context(|| format!("Failed to write local state {}", key))
}
