//! Folder browsing with optimistic updates
//!
//! Flag changes (read, star, trash) are applied to every cached copy first
//! and then sent to the server. Their failures are logged and not rolled
//! back; the next reload of the folder reconciles.

use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use super::{LoadKind, LoadStatus, MailboxError, SharedCache};
use crate::api::{MailApi, ModifyEmail};
use crate::models::{MessageId, MessagePreview, folders};

/// Previews fetched per folder page
pub const PAGE_SIZE: usize = 20;

/// What the user is looking at in the current folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub folder: String,
    /// The open message
    pub selected: Option<MessageId>,
    /// Multi-select set for bulk actions
    pub checked: BTreeSet<MessageId>,
    /// Keyboard cursor into the current folder
    pub cursor: Option<usize>,
}

impl Default for Selection {
    fn default() -> Self {
        Self::new(folders::INBOX)
    }
}

impl Selection {
    fn new(folder: &str) -> Self {
        Self {
            folder: folder.to_string(),
            selected: None,
            checked: BTreeSet::new(),
            cursor: None,
        }
    }
}

/// Folder view over the shared preview cache
pub struct Mailbox {
    api: MailApi,
    cache: Arc<SharedCache>,
    selection: RwLock<Selection>,
}

impl Mailbox {
    /// Create a mailbox view; the cache is purged with the session
    pub fn new(api: MailApi, cache: Arc<SharedCache>) -> Self {
        api.session().attach_cache(cache.clone());
        Self {
            api,
            cache,
            selection: RwLock::new(Selection::default()),
        }
    }

    pub fn cache(&self) -> &Arc<SharedCache> {
        &self.cache
    }

    pub fn selection(&self) -> Selection {
        self.selection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn selection_mut(&self) -> RwLockWriteGuard<'_, Selection> {
        self.selection.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Previews of a folder as currently cached
    pub fn previews(&self, folder: &str) -> Vec<MessagePreview> {
        self.cache.read(|c| c.folder(folder).to_vec())
    }

    pub fn status(&self, folder: &str) -> LoadStatus {
        self.cache.read(|c| c.status(folder))
    }

    pub fn is_loading(&self, folder: &str) -> bool {
        self.status(folder).is_loading()
    }

    pub fn has_more(&self, folder: &str) -> bool {
        self.cache.read(|c| c.has_more(folder))
    }

    // === Folders and pages ===

    /// Switch to a folder, fetching its first page when needed
    ///
    /// Resets the selection. The search results pseudo-folder is never
    /// fetched.
    pub fn select_folder(&self, folder: &str) -> Result<(), MailboxError> {
        *self.selection_mut() = Selection::new(folder);

        if folder == folders::SEARCH_RESULTS {
            return Ok(());
        }
        if self.status(folder).needs_fetch() {
            self.load_page(folder, true)?;
        }
        Ok(())
    }

    /// Fetch the first (`is_initial`) or next page of a folder
    ///
    /// Returns `LoadInProgress` when a fetch of this folder is outstanding.
    /// A non-initial call with no cursor left is a no-op. On failure the
    /// previous status is restored.
    pub fn load_page(&self, folder: &str, is_initial: bool) -> Result<(), MailboxError> {
        if folder == folders::SEARCH_RESULTS {
            return Ok(());
        }

        let kind = if is_initial { LoadKind::Initial } else { LoadKind::More };
        let claimed = self.cache.update(|c| {
            let previous = c.status(folder);
            if previous.is_loading() {
                return Err(MailboxError::LoadInProgress(folder.to_string()));
            }
            let cursor = if is_initial {
                None
            } else {
                match c.page_token(folder) {
                    Some(token) => Some(token.to_string()),
                    None => return Ok(None),
                }
            };
            c.set_status(folder, LoadStatus::Loading(kind));
            Ok(Some((previous, cursor)))
        })?;

        let Some((previous, cursor)) = claimed else {
            debug!("No more pages in {}", folder);
            return Ok(());
        };

        match self.api.list_emails(folder, PAGE_SIZE, cursor.as_deref()) {
            Ok(page) => {
                let count = page.previews.len();
                self.cache.update(|c| {
                    if is_initial {
                        c.set_folder(folder, page.previews);
                    } else {
                        c.append(folder, page.previews);
                    }
                    c.set_page_token(folder, page.next_page_token);
                    c.set_status(folder, LoadStatus::Loaded);
                });
                debug!("Loaded {} previews into {} ({:?})", count, folder, kind);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to load {}: {}", folder, e);
                if !e.is_session_lost() {
                    self.cache.update(|c| c.set_status(folder, previous));
                }
                Err(e.into())
            }
        }
    }

    // === Messages ===

    /// Open a message, marking it read if needed
    pub fn open_message(&self, id: &MessageId) -> Result<MessagePreview, MailboxError> {
        let preview = self
            .cache
            .read(|c| c.find(id).cloned())
            .ok_or_else(|| MailboxError::UnknownMessage(id.clone()))?;

        {
            let mut selection = self.selection_mut();
            let folder = selection.folder.clone();
            selection.selected = Some(id.clone());
            if let Some(position) = self.cache.read(|c| c.position(&folder, id)) {
                selection.cursor = Some(position);
            }
        }

        if preview.unread {
            self.cache
                .update(|c| c.update_everywhere(id, |p| p.set_unread(false)));
            self.send_modify(id, ModifyEmail::unread(false));
        }
        Ok(MessagePreview {
            unread: false,
            ..preview
        })
    }

    /// Flip the starred flag everywhere; returns the new state
    pub fn toggle_star(&self, id: &MessageId) -> Result<bool, MailboxError> {
        let starred = self.cache.update(|c| {
            let current = c.find(id).map(|p| p.starred)?;
            let starred = !current;
            c.update_everywhere(id, |p| p.set_starred(starred));

            if starred {
                if c.position(folders::STARRED, id).is_none()
                    && let Some(preview) = c.find(id).cloned()
                {
                    c.insert_at(folders::STARRED, 0, preview);
                }
            } else if let Some(position) = c.position(folders::STARRED, id) {
                let mut list = c.folder(folders::STARRED).to_vec();
                list.remove(position);
                c.set_folder(folders::STARRED, list);
            }
            Some(starred)
        });
        let starred = starred.ok_or_else(|| MailboxError::UnknownMessage(id.clone()))?;

        self.send_modify(id, ModifyEmail::starred(starred));
        Ok(starred)
    }

    /// Mark every checked message read or unread; returns how many
    pub fn mark_read_unread(&self, make_read: bool) -> usize {
        let ids = std::mem::take(&mut self.selection_mut().checked);
        if ids.is_empty() {
            return 0;
        }

        self.cache.update(|c| {
            for id in &ids {
                c.update_everywhere(id, |p| p.set_unread(!make_read));
            }
        });
        for id in &ids {
            self.send_modify(id, ModifyEmail::unread(!make_read));
        }
        ids.len()
    }

    /// Move every checked message to the trash; returns how many
    pub fn delete_selected(&self) -> usize {
        let ids = {
            let mut selection = self.selection_mut();
            let ids = std::mem::take(&mut selection.checked);
            if selection.selected.as_ref().is_some_and(|s| ids.contains(s)) {
                selection.selected = None;
            }
            ids
        };
        if ids.is_empty() {
            return 0;
        }

        self.cache.update(|c| {
            for id in &ids {
                c.remove_everywhere(id, &[]);
            }
            c.mark_reload(folders::TRASH);
        });
        info!("Moved {} messages to trash", ids.len());

        for id in &ids {
            self.send_modify(id, ModifyEmail::trash());
        }
        ids.len()
    }

    fn send_modify(&self, id: &MessageId, changes: ModifyEmail) {
        if let Err(e) = self.api.modify_email(id, &changes) {
            warn!("Failed to update {} ({:?}): {}", id, changes, e);
        }
    }

    // === Selection ===

    /// Add or remove a message from the multi-select set
    pub fn toggle_select(&self, id: &MessageId) -> bool {
        let mut selection = self.selection_mut();
        if selection.checked.remove(id) {
            false
        } else {
            selection.checked.insert(id.clone());
            true
        }
    }

    /// Check every message in the current folder, or uncheck all if they
    /// already are
    pub fn select_all_toggle(&self) {
        let mut selection = self.selection_mut();
        let ids: BTreeSet<MessageId> = self
            .cache
            .read(|c| c.folder(&selection.folder).iter().map(|p| p.id.clone()).collect());

        if !ids.is_empty() && ids.is_subset(&selection.checked) {
            selection.checked.clear();
        } else {
            selection.checked = ids;
        }
    }

    /// Move the cursor by `delta`, clamped to the current folder
    ///
    /// Returns the message under the cursor.
    pub fn move_cursor(&self, delta: isize) -> Option<MessageId> {
        let mut selection = self.selection_mut();
        let list = self.cache.read(|c| c.folder(&selection.folder).to_vec());
        if list.is_empty() {
            selection.cursor = None;
            return None;
        }

        let next = match selection.cursor {
            Some(current) => current.saturating_add_signed(delta).min(list.len() - 1),
            None => 0,
        };
        selection.cursor = Some(next);
        Some(list[next].id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{ApiError, ApiRequest, ApiResponse, MockTransport};
    use crate::session::SessionManager;
    use crate::storage::{InMemoryLocalStore, LocalStore};
    use serde_json::json;

    fn mailbox(
        handler: impl Fn(&ApiRequest) -> Result<ApiResponse, ApiError> + Send + Sync + 'static,
    ) -> (Mailbox, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new(handler));
        let store: Arc<dyn LocalStore> = Arc::new(InMemoryLocalStore::new());
        let session = Arc::new(SessionManager::new(transport.clone(), store.clone()));
        let cache = Arc::new(SharedCache::restore(store));
        (Mailbox::new(MailApi::new(session), cache), transport)
    }

    fn ok() -> Result<ApiResponse, ApiError> {
        Ok(ApiResponse::json(200, &json!({ "success": true })))
    }

    fn seed(mailbox: &Mailbox, folder: &str, ids: &[&str]) {
        let list = ids.iter().map(|id| MessagePreview::new(*id, *id)).collect();
        mailbox.cache().update(|c| {
            c.set_folder(folder, list);
            c.set_status(folder, LoadStatus::Loaded);
        });
    }

    #[test]
    fn test_select_folder_fetches_once() {
        let (mailbox, transport) = mailbox(|_| {
            Ok(ApiResponse::json(200, &json!({ "data": { "threads": [{ "id": "t1" }] } })))
        });

        mailbox.select_folder("inbox").unwrap();
        mailbox.select_folder("sent").unwrap();
        mailbox.select_folder("inbox").unwrap();

        assert_eq!(transport.count("/mailboxes/inbox/emails"), 1);
        assert_eq!(mailbox.status("inbox"), LoadStatus::Loaded);
        assert!(!mailbox.has_more("inbox"));
    }

    #[test]
    fn test_reload_needed_folder_is_replaced_on_select() {
        let (mailbox, transport) = mailbox(|_| {
            Ok(ApiResponse::json(200, &json!({ "data": { "threads": [{ "id": "fresh" }] } })))
        });
        seed(&mailbox, "trash", &["old1", "old2"]);
        mailbox.cache().update(|c| c.mark_reload("trash"));
        assert_eq!(mailbox.status("trash"), LoadStatus::ReloadNeeded);

        mailbox.select_folder("trash").unwrap();
        let ids: Vec<_> = mailbox.previews("trash").into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![MessageId::new("fresh")]);
        assert_eq!(mailbox.status("trash"), LoadStatus::Loaded);

        mailbox.select_folder("trash").unwrap();
        assert_eq!(transport.count("/mailboxes/trash/emails"), 1);
    }

    #[test]
    fn test_search_results_never_fetched() {
        let (mailbox, transport) = mailbox(|_| ok());
        mailbox.select_folder(folders::SEARCH_RESULTS).unwrap();
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn test_failed_load_restores_status() {
        let (mailbox, _) = mailbox(|_| Err(ApiError::Transport("offline".into())));
        assert!(matches!(
            mailbox.load_page("inbox", true),
            Err(MailboxError::Api(_))
        ));
        assert_eq!(mailbox.status("inbox"), LoadStatus::Unloaded);
    }

    #[test]
    fn test_load_more_without_cursor_is_noop() {
        let (mailbox, transport) = mailbox(|_| ok());
        seed(&mailbox, "inbox", &["a"]);
        mailbox.load_page("inbox", false).unwrap();
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn test_concurrent_load_is_rejected() {
        let (mailbox, _) = mailbox(|_| ok());
        mailbox
            .cache()
            .update(|c| c.set_status("inbox", LoadStatus::Loading(LoadKind::Initial)));
        assert!(matches!(
            mailbox.load_page("inbox", true),
            Err(MailboxError::LoadInProgress(_))
        ));
    }

    #[test]
    fn test_toggle_star_maintains_starred_folder() {
        let (mailbox, transport) = mailbox(|_| ok());
        seed(&mailbox, "inbox", &["a", "b"]);
        seed(&mailbox, folders::STARRED, &["x"]);
        let id = MessageId::new("b");

        assert!(mailbox.toggle_star(&id).unwrap());
        let starred = mailbox.previews(folders::STARRED);
        assert_eq!(starred[0].id, id);
        assert!(starred[0].starred);
        assert!(mailbox.previews("inbox")[1].starred);

        assert!(!mailbox.toggle_star(&id).unwrap());
        assert_eq!(mailbox.previews(folders::STARRED).len(), 1);
        assert_eq!(transport.count("/emails/b/modify"), 2);
    }

    #[test]
    fn test_star_failure_is_not_rolled_back() {
        let (mailbox, _) = mailbox(|_| Err(ApiError::Transport("offline".into())));
        seed(&mailbox, "inbox", &["a"]);
        assert!(mailbox.toggle_star(&MessageId::new("a")).unwrap());
        assert!(mailbox.previews("inbox")[0].starred);
    }

    #[test]
    fn test_open_message_marks_read() {
        let (mailbox, transport) = mailbox(|_| ok());
        mailbox.cache().update(|c| {
            let mut preview = MessagePreview::new("a", "a");
            preview.set_unread(true);
            c.set_folder("inbox", vec![MessagePreview::new("z", "z"), preview]);
        });

        let opened = mailbox.open_message(&MessageId::new("a")).unwrap();
        assert!(!opened.unread);
        assert!(!mailbox.previews("inbox")[1].unread);
        assert_eq!(mailbox.selection().cursor, Some(1));
        assert_eq!(transport.count("/modify"), 1);

        mailbox.open_message(&MessageId::new("a")).unwrap();
        assert_eq!(transport.count("/modify"), 1);
    }

    #[test]
    fn test_mark_read_unread_clears_selection() {
        let (mailbox, transport) = mailbox(|_| ok());
        seed(&mailbox, "inbox", &["a", "b", "c"]);
        mailbox.toggle_select(&MessageId::new("a"));
        mailbox.toggle_select(&MessageId::new("c"));

        assert_eq!(mailbox.mark_read_unread(false), 2);
        let inbox = mailbox.previews("inbox");
        assert!(inbox[0].unread && !inbox[1].unread && inbox[2].unread);
        assert!(mailbox.selection().checked.is_empty());
        assert_eq!(transport.count("/modify"), 2);
    }

    #[test]
    fn test_delete_selected_marks_trash_for_reload() {
        let (mailbox, transport) = mailbox(|_| ok());
        seed(&mailbox, "inbox", &["a", "b"]);
        seed(&mailbox, folders::STARRED, &["a"]);
        mailbox.open_message(&MessageId::new("a")).unwrap();
        mailbox.toggle_select(&MessageId::new("a"));

        assert_eq!(mailbox.delete_selected(), 1);
        assert_eq!(mailbox.previews("inbox").len(), 1);
        assert!(mailbox.previews(folders::STARRED).is_empty());
        assert!(mailbox.selection().selected.is_none());
        assert_eq!(mailbox.status(folders::TRASH), LoadStatus::ReloadNeeded);
        assert_eq!(transport.count("/emails/a/modify"), 1);
    }

    #[test]
    fn test_select_all_toggle_and_cursor() {
        let (mailbox, _) = mailbox(|_| ok());
        seed(&mailbox, "inbox", &["a", "b", "c"]);

        mailbox.select_all_toggle();
        assert_eq!(mailbox.selection().checked.len(), 3);
        mailbox.select_all_toggle();
        assert!(mailbox.selection().checked.is_empty());

        assert_eq!(mailbox.move_cursor(1).unwrap().as_str(), "a");
        assert_eq!(mailbox.move_cursor(5).unwrap().as_str(), "c");
        assert_eq!(mailbox.move_cursor(-1).unwrap().as_str(), "b");
        assert_eq!(mailbox.move_cursor(-9).unwrap().as_str(), "a");
    }
}
