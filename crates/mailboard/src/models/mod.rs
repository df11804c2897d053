//! Domain models for the mailbox client

mod column;
mod preview;

pub use column::{COLUMNS_KEY, ColumnConfig, ColumnConfigError, KanbanColumn};
pub use preview::{MessageId, MessagePreview, STARRED_LABEL, UNREAD_LABEL};

/// Well-known folder keys of the preview cache
pub mod folders {
    pub const INBOX: &str = "inbox";
    pub const STARRED: &str = "starred";
    pub const SENT: &str = "sent";
    pub const DRAFTS: &str = "drafts";
    pub const ARCHIVE: &str = "archive";
    pub const TRASH: &str = "trash";
    /// Pseudo-folder holding the results of the last search
    pub const SEARCH_RESULTS: &str = "search_results";
    /// Board column receiving snoozed messages
    pub const SNOOZED: &str = "snoozed";
}
