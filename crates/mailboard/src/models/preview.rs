//! Message preview model shown in folder lists, kanban columns and search

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

use crate::http::envelope;

/// Label carried by starred messages
pub const STARRED_LABEL: &str = "STARRED";
/// Label carried by unread messages
pub const UNREAD_LABEL: &str = "UNREAD";

/// Unique identifier for a message (or thread, when listed by thread)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Summary of a message as listed in a folder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePreview {
    pub id: MessageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Display name of the sender (falls back to the address)
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_email: Option<String>,
    pub subject: String,
    pub snippet: String,
    pub timestamp: DateTime<Utc>,
    pub unread: bool,
    pub starred: bool,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    #[serde(default)]
    pub has_attachments: bool,
}

impl MessagePreview {
    /// Minimal preview, mostly useful for tests and optimistic inserts
    pub fn new(id: impl Into<MessageId>, subject: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            thread_id: None,
            sender: String::new(),
            sender_email: None,
            subject: subject.into(),
            snippet: String::new(),
            timestamp: DateTime::UNIX_EPOCH,
            unread: false,
            starred: false,
            labels: BTreeSet::new(),
            has_attachments: false,
        }
    }

    /// Normalize a preview from any of the shapes the API returns
    ///
    /// Field names arrive in camelCase or snake_case, the sender as a plain
    /// string or an object, labels as strings or `{id, name}` objects.
    /// Returns `None` only when no identifier can be found.
    pub fn from_json(value: &Value) -> Option<Self> {
        let id = string_field(value, &["id", "threadId", "thread_id", "message_id", "messageId"])?;
        let thread_id = string_field(value, &["threadId", "thread_id"]);

        let (sender, sender_email) = parse_sender(
            envelope::first_field(value, &["sender", "from", "fromName", "from_name"]),
        );

        let labels: BTreeSet<String> = envelope::first_field(value, &["labels", "labelIds", "label_ids", "tags"])
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(label_name).collect())
            .unwrap_or_default();

        let unread = match envelope::first_field(value, &["unread", "isUnread", "is_unread"]) {
            Some(v) => v.as_bool().unwrap_or(false),
            None => match value.get("read").and_then(Value::as_bool) {
                Some(read) => !read,
                None => labels.contains(UNREAD_LABEL),
            },
        };

        let starred = envelope::first_field(value, &["starred", "isStarred", "is_starred"])
            .and_then(Value::as_bool)
            .unwrap_or(false)
            || labels.contains(STARRED_LABEL);

        let has_attachments = match envelope::first_field(value, &["hasAttachments", "has_attachments"]) {
            Some(v) => v.as_bool().unwrap_or(false),
            None => value
                .get("attachments")
                .and_then(Value::as_array)
                .is_some_and(|a| !a.is_empty()),
        };

        let mut preview = Self {
            id: MessageId(id),
            thread_id,
            sender,
            sender_email,
            subject: string_field(value, &["subject", "title"]).unwrap_or_default(),
            snippet: string_field(value, &["snippet", "preview", "summary"]).unwrap_or_default(),
            timestamp: envelope::first_field(value, &["timestamp", "receivedOn", "received_on", "date"])
                .and_then(parse_timestamp)
                .unwrap_or(DateTime::UNIX_EPOCH),
            unread,
            starred: false,
            labels,
            has_attachments,
        };
        preview.set_starred(starred);
        Some(preview)
    }

    /// Normalize every item of a list, skipping items without an id
    pub fn list_from_json(items: &[Value]) -> Vec<Self> {
        items.iter().filter_map(Self::from_json).collect()
    }

    /// Set the starred flag, keeping the `STARRED` label in sync
    pub fn set_starred(&mut self, starred: bool) {
        self.starred = starred;
        if starred {
            self.labels.insert(STARRED_LABEL.to_string());
        } else {
            self.labels.remove(STARRED_LABEL);
        }
    }

    /// Set the unread flag, keeping the `UNREAD` label in sync
    pub fn set_unread(&mut self, unread: bool) {
        self.unread = unread;
        if unread {
            self.labels.insert(UNREAD_LABEL.to_string());
        } else {
            self.labels.remove(UNREAD_LABEL);
        }
    }
}

fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| value.get(key))
        .find_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn label_name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(_) => string_field(value, &["id", "name"]),
        _ => None,
    }
}

/// Sender as `(display name, address)`
fn parse_sender(value: Option<&Value>) -> (String, Option<String>) {
    match value {
        Some(Value::String(s)) => parse_address(s),
        Some(obj @ Value::Object(_)) => {
            let email = string_field(obj, &["email", "address"]);
            let name = string_field(obj, &["name", "display_name"])
                .or_else(|| email.clone())
                .unwrap_or_default();
            (name, email)
        }
        _ => (String::new(), None),
    }
}

/// Split `"Name <addr>"`; a bare address is both name and address
fn parse_address(s: &str) -> (String, Option<String>) {
    let s = s.trim();
    if let Some(start) = s.rfind('<')
        && let Some(end) = s.rfind('>')
        && start < end
    {
        let email = s[start + 1..end].trim().to_string();
        let name = s[..start].trim().trim_matches('"').trim();
        let name = if name.is_empty() { email.clone() } else { name.to_string() };
        return (name, Some(email));
    }
    let email = s.contains('@').then(|| s.to_string());
    (s.to_string(), email)
}

/// ISO-8601 / RFC 2822 string, or epoch milliseconds (number or digits)
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(ms) = s.parse::<i64>() {
                return Utc.timestamp_millis_opt(ms).single();
            }
            DateTime::parse_from_rfc3339(s)
                .or_else(|_| DateTime::parse_from_rfc2822(s))
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                        .ok()
                        .map(|naive| naive.and_utc())
                })
        }
        _ => None,
    }
}
