//! Email-triage kanban board
//!
//! Columns are label-backed lists kept in the shared preview cache under
//! `board:<column id>`. Moves and snoozes are applied optimistically and
//! rolled back to the exact pre-change column lists if the server call
//! fails.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::sync::{Arc, PoisonError, RwLock};

use crate::api::{MailApi, ModifyEmail};
use crate::cache::{LoadStatus, MailboxError, SharedCache};
use crate::http::ApiError;
use crate::models::{ColumnConfig, MessageId, MessagePreview, folders};

/// Previews fetched per column
pub const COLUMN_PAGE_SIZE: usize = 10;

/// Label of the snoozed column in the default configuration
const SNOOZED_LABEL: &str = "SNOOZED";

/// Preview cache key of a board column
pub fn column_key(id: &str) -> String {
    format!("board:{}", id)
}

pub struct KanbanBoard {
    api: MailApi,
    cache: Arc<SharedCache>,
    config: RwLock<ColumnConfig>,
}

impl KanbanBoard {
    /// Create a board using the stored column configuration
    pub fn new(api: MailApi, cache: Arc<SharedCache>) -> Self {
        let config = ColumnConfig::load(api.session().store().as_ref());
        api.session().attach_cache(cache.clone());
        Self {
            api,
            cache,
            config: RwLock::new(config),
        }
    }

    // === Configuration ===

    pub fn columns(&self) -> ColumnConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Validate, persist and adopt a new column configuration
    pub fn update_columns(&self, config: ColumnConfig) -> Result<(), MailboxError> {
        config.save(self.api.session().store().as_ref())?;
        info!("Saved board configuration with {} columns", config.columns().len());
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        Ok(())
    }

    /// Go back to the default columns
    pub fn reset_columns(&self) -> ColumnConfig {
        let config = ColumnConfig::reset(self.api.session().store().as_ref());
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config.clone();
        config
    }

    // === Columns ===

    /// Cached previews of a column
    pub fn column(&self, id: &str) -> Vec<MessagePreview> {
        self.cache.read(|c| c.folder(&column_key(id)).to_vec())
    }

    /// Whether any column needs to be fetched again
    pub fn needs_reload(&self) -> bool {
        let keys: Vec<String> = self.columns().ids().map(column_key).collect();
        self.cache
            .read(|c| keys.iter().any(|key| c.status(key).needs_fetch()))
    }

    /// Fetch the first page of every column concurrently
    ///
    /// A column whose fetch fails is shown empty. Nothing is written when
    /// the session was lost during the fetch.
    pub fn load_columns(&self) {
        let config = self.columns();
        let api = &self.api;

        let fetched: Vec<(String, Result<Vec<MessagePreview>, ApiError>)> = config
            .columns()
            .par_iter()
            .map(|column| {
                let previews = api
                    .list_emails(&column.label, COLUMN_PAGE_SIZE, None)
                    .map(|page| page.previews);
                (column.id.clone(), previews)
            })
            .collect();

        if fetched
            .iter()
            .any(|(_, result)| result.as_ref().is_err_and(ApiError::is_session_lost))
        {
            warn!("Session lost while loading the board");
            return;
        }

        let loaded = fetched.into_iter().map(|(id, result)| {
            let previews = result.unwrap_or_else(|e| {
                warn!("Failed to load column {}: {}", id, e);
                Vec::new()
            });
            (id, previews)
        });

        self.cache.update(|c| {
            for (id, previews) in loaded {
                let key = column_key(&id);
                debug!("Column {} has {} cards", id, previews.len());
                c.set_folder(&key, previews);
                c.set_page_token(&key, None);
                c.set_status(&key, LoadStatus::Loaded);
            }
        });
    }

    /// Move a card to `index` in column `to`
    ///
    /// The card is removed from every column and inserted in `to`; the
    /// label of `to` is then applied on the server. On failure every column
    /// list is restored exactly. Either way the source and destination
    /// columns are marked for reload.
    pub fn move_card(
        &self,
        message_id: &MessageId,
        from: &str,
        to: &str,
        index: usize,
    ) -> Result<(), MailboxError> {
        let config = self.columns();
        if config.get(from).is_none() {
            return Err(MailboxError::UnknownColumn(from.to_string()));
        }
        let label = config
            .label_for_column(to)
            .ok_or_else(|| MailboxError::UnknownColumn(to.to_string()))?
            .to_string();

        let from_key = column_key(from);
        let to_key = column_key(to);
        if from == to && self.cache.read(|c| c.position(&from_key, message_id)) == Some(index) {
            return Ok(());
        }

        let keys: Vec<String> = config.ids().map(column_key).collect();
        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();

        let snapshot = self.cache.update(|c| {
            let snapshot = c.snapshot(key_refs.iter().copied());
            let (removed, _) = c.remove_from(&key_refs, message_id);
            let preview = removed?;
            c.insert_at(&to_key, index, preview);
            Some(snapshot)
        });
        let snapshot = snapshot.ok_or_else(|| MailboxError::UnknownMessage(message_id.clone()))?;
        debug!("Moved {} from {} to {} at {}", message_id, from, to, index);

        let result = self
            .api
            .modify_email(message_id, &ModifyEmail::labels(vec![label]));

        match &result {
            Err(e) if e.is_session_lost() => {}
            _ => self.cache.update(|c| {
                if result.is_err() {
                    c.restore(snapshot);
                }
                c.mark_reload(&from_key);
                c.mark_reload(&to_key);
            }),
        }

        result.map_err(|e| {
            warn!("Move of {} failed, rolled back: {}", message_id, e);
            e.into()
        })
    }

    /// Snooze a card until `until`
    ///
    /// The card leaves every other column and is put first in the snoozed
    /// column (if the board has one). Rolled back on failure.
    pub fn snooze(&self, message_id: &MessageId, until: DateTime<Utc>) -> Result<(), MailboxError> {
        let config = self.columns();
        let snoozed_id = config
            .columns()
            .iter()
            .find(|c| c.id == folders::SNOOZED || c.label == SNOOZED_LABEL)
            .map(|c| c.id.clone());
        let snoozed_key = snoozed_id.as_deref().map(column_key);

        let keys: Vec<String> = config.ids().map(column_key).collect();
        let sources: Vec<&str> = keys
            .iter()
            .map(String::as_str)
            .filter(|key| Some(*key) != snoozed_key.as_deref())
            .collect();

        let (snapshot, touched) = self.cache.update(|c| {
            let snapshot = c.snapshot(keys.iter().map(String::as_str));
            let (removed, touched) = c.remove_from(&sources, message_id);
            if let (Some(preview), Some(key)) = (removed, &snoozed_key) {
                c.insert_at(key, 0, preview);
            }
            (snapshot, touched)
        });

        let result = self.api.snooze_email(message_id, until);

        match &result {
            Err(e) if e.is_session_lost() => {}
            _ => self.cache.update(|c| {
                if result.is_err() {
                    c.restore(snapshot);
                }
                for key in touched.iter().chain(snoozed_key.iter()) {
                    c.mark_reload(key);
                }
            }),
        }

        match result {
            Ok(()) => {
                info!("Snoozed {} until {}", message_id, until);
                Ok(())
            }
            Err(e) => {
                warn!("Snooze of {} failed, rolled back: {}", message_id, e);
                Err(e.into())
            }
        }
    }
}
