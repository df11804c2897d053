//! Typed wrappers over the mail REST API

mod mail;

pub use mail::{EmailPage, Label, MailApi, MailboxInfo, ModifyEmail, OutgoingEmail};
