//! Mailboard - client core for the mail dashboard
//!
//! This crate provides the platform-independent client logic behind the
//! mailbox dashboard:
//! - Session management with single-flight token refresh and request replay
//! - Typed wrappers over the mail REST API
//! - An optimistic, persisted folder preview cache with pagination
//! - The email-triage kanban board (moves with full rollback, snooze)
//! - Search with fallback lookup and a one-time index sync
//!
//! The crate has zero UI dependencies. All network access goes through the
//! [`Transport`] trait and all persisted state through [`LocalStore`].

pub mod api;
pub mod board;
pub mod cache;
pub mod config;
pub mod http;
pub mod models;
pub mod search;
pub mod session;
pub mod storage;

pub use api::{EmailPage, MailApi, ModifyEmail, OutgoingEmail};
pub use board::KanbanBoard;
pub use cache::{LoadStatus, Mailbox, MailboxError, PreviewCache, SharedCache};
pub use config::ClientConfig;
pub use http::{ApiError, ApiRequest, ApiResponse, MockTransport, Transport, UreqTransport};
pub use models::{ColumnConfig, ColumnConfigError, KanbanColumn, MessageId, MessagePreview, folders};
pub use search::SearchCoordinator;
pub use session::{PreviewSink, RefreshError, Session, SessionListener, SessionManager, User};
pub use storage::{InMemoryLocalStore, LocalStore, SqliteLocalStore};
