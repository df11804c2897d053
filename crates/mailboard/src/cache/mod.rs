//! Mailbox state cache
//!
//! This module provides:
//! - `PreviewCache`: folder key to ordered previews, cursors and load status
//! - `SharedCache`: the cache behind a lock, persisted on every change
//! - `Mailbox`: folder browsing, pagination and optimistic flag changes

mod mailbox;
mod previews;
mod shared;

pub use mailbox::{Mailbox, PAGE_SIZE, Selection};
pub use previews::{FolderSnapshot, PreviewCache};
pub use shared::SharedCache;

use crate::http::ApiError;
use crate::models::{ColumnConfigError, MessageId};

/// Local store key of the persisted preview cache
pub const PREVIEWS_KEY: &str = "email_previews_map";

/// Which page a fetch is loading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    Initial,
    More,
}

/// Load state of one folder
///
/// `Unloaded -> Loading(Initial) -> Loaded`, `Loaded -> Loading(More) -> Loaded`,
/// `Loaded -> ReloadNeeded -> Loading(Initial) -> Loaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadStatus {
    #[default]
    Unloaded,
    Loading(LoadKind),
    Loaded,
    ReloadNeeded,
}

impl LoadStatus {
    pub fn is_loading(self) -> bool {
        matches!(self, LoadStatus::Loading(_))
    }

    /// Whether selecting the folder should fetch its first page
    pub fn needs_fetch(self) -> bool {
        matches!(self, LoadStatus::Unloaded | LoadStatus::ReloadNeeded)
    }
}

/// Errors from mailbox, board and search operations
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("A page of {0} is already loading")]
    LoadInProgress(String),
    #[error("Message {0} is not in the cache")]
    UnknownMessage(MessageId),
    #[error("Unknown column: {0}")]
    UnknownColumn(String),
    #[error("Search query is empty")]
    EmptyQuery,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Columns(#[from] ColumnConfigError),
}
