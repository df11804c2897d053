//! Folder preview cache

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::LoadStatus;
use crate::models::{MessageId, MessagePreview, folders};

/// Ordered previews per folder key, with pagination cursors
///
/// Only previews, cursors and the search query are persisted; load status
/// starts over as `Unloaded` in every process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreviewCache {
    #[serde(default)]
    previews: BTreeMap<String, Vec<MessagePreview>>,
    #[serde(default)]
    page_tokens: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    search_query: Option<String>,
    #[serde(skip)]
    status: BTreeMap<String, LoadStatus>,
}

/// Column lists captured before an optimistic board change
pub type FolderSnapshot = BTreeMap<String, Vec<MessagePreview>>;

impl PreviewCache {
    pub fn new() -> Self {
        Self::default()
    }

    // === Folders ===

    /// Previews of a folder, in display order
    pub fn folder(&self, key: &str) -> &[MessagePreview] {
        self.previews.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn folder_keys(&self) -> impl Iterator<Item = &str> {
        self.previews.keys().map(String::as_str)
    }

    /// Replace a folder's previews
    pub fn set_folder(&mut self, key: &str, previews: Vec<MessagePreview>) {
        self.previews.insert(key.to_string(), previews);
    }

    /// Append previews to a folder
    pub fn append(&mut self, key: &str, previews: Vec<MessagePreview>) {
        self.previews.entry(key.to_string()).or_default().extend(previews);
    }

    pub fn remove_folder(&mut self, key: &str) {
        self.previews.remove(key);
        self.page_tokens.remove(key);
        self.status.remove(key);
    }

    // === Cursors ===

    pub fn page_token(&self, key: &str) -> Option<&str> {
        self.page_tokens.get(key).map(String::as_str)
    }

    pub fn set_page_token(&mut self, key: &str, token: Option<String>) {
        match token {
            Some(token) => self.page_tokens.insert(key.to_string(), token),
            None => self.page_tokens.remove(key),
        };
    }

    /// Whether another page can be fetched
    pub fn has_more(&self, key: &str) -> bool {
        self.page_tokens.contains_key(key)
    }

    // === Load status ===

    pub fn status(&self, key: &str) -> LoadStatus {
        self.status.get(key).copied().unwrap_or_default()
    }

    pub fn set_status(&mut self, key: &str, status: LoadStatus) {
        self.status.insert(key.to_string(), status);
    }

    /// Flag a folder so the next selection fetches it again
    pub fn mark_reload(&mut self, key: &str) {
        self.set_status(key, LoadStatus::ReloadNeeded);
    }

    // === Messages across folders ===

    /// First cached copy of a message, searching every folder
    pub fn find(&self, id: &MessageId) -> Option<&MessagePreview> {
        self.previews
            .values()
            .flat_map(|list| list.iter())
            .find(|p| &p.id == id)
    }

    /// Apply `f` to every cached copy of a message; returns the number of copies
    pub fn update_everywhere(&mut self, id: &MessageId, mut f: impl FnMut(&mut MessagePreview)) -> usize {
        let mut updated = 0;
        for preview in self.previews.values_mut().flat_map(|list| list.iter_mut()) {
            if &preview.id == id {
                f(preview);
                updated += 1;
            }
        }
        updated
    }

    /// Remove a message from every folder except those in `keep`
    ///
    /// Returns the first removed copy, if any.
    pub fn remove_everywhere(&mut self, id: &MessageId, keep: &[&str]) -> Option<MessagePreview> {
        let mut removed = None;
        for (key, list) in self.previews.iter_mut() {
            if keep.contains(&key.as_str()) {
                continue;
            }
            if let Some(pos) = list.iter().position(|p| &p.id == id) {
                let preview = list.remove(pos);
                list.retain(|p| &p.id != id);
                removed.get_or_insert(preview);
            }
        }
        removed
    }

    /// Remove a message from the given folders only
    ///
    /// Returns the first removed copy and the keys it was removed from.
    pub fn remove_from(&mut self, keys: &[&str], id: &MessageId) -> (Option<MessagePreview>, Vec<String>) {
        let mut removed = None;
        let mut touched = Vec::new();
        for key in keys {
            if let Some(list) = self.previews.get_mut(*key)
                && let Some(pos) = list.iter().position(|p| &p.id == id)
            {
                let preview = list.remove(pos);
                list.retain(|p| &p.id != id);
                removed.get_or_insert(preview);
                touched.push(key.to_string());
            }
        }
        (removed, touched)
    }

    /// Insert at `index` (clamped to the list length)
    pub fn insert_at(&mut self, key: &str, index: usize, preview: MessagePreview) {
        let list = self.previews.entry(key.to_string()).or_default();
        let index = index.min(list.len());
        list.insert(index, preview);
    }

    pub fn position(&self, key: &str, id: &MessageId) -> Option<usize> {
        self.folder(key).iter().position(|p| &p.id == id)
    }

    // === Snapshots ===

    /// Copy the lists of the given folders
    pub fn snapshot<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> FolderSnapshot {
        keys.into_iter()
            .map(|key| (key.to_string(), self.folder(key).to_vec()))
            .collect()
    }

    /// Put back lists captured by `snapshot`
    pub fn restore(&mut self, snapshot: FolderSnapshot) {
        for (key, list) in snapshot {
            self.previews.insert(key, list);
        }
    }

    // === Search ===

    pub fn search_query(&self) -> Option<&str> {
        self.search_query.as_deref()
    }

    /// Replace the search results wholesale
    pub fn set_search_results(&mut self, query: &str, results: Vec<MessagePreview>) {
        self.previews.insert(folders::SEARCH_RESULTS.to_string(), results);
        self.page_tokens.remove(folders::SEARCH_RESULTS);
        self.status
            .insert(folders::SEARCH_RESULTS.to_string(), LoadStatus::Loaded);
        self.search_query = Some(query.to_string());
    }

    pub fn clear_search(&mut self) {
        self.remove_folder(folders::SEARCH_RESULTS);
        self.search_query = None;
    }
}
