//! Kanban column configuration

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::storage::{self, LocalStore};

/// Local store key of the column configuration
pub const COLUMNS_KEY: &str = "kanban_columns_config";

/// One board column, backed by a mail label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KanbanColumn {
    pub id: String,
    pub title: String,
    /// Label applied to a message moved into this column
    #[serde(alias = "gmailLabel")]
    pub label: String,
}

impl KanbanColumn {
    pub fn new(id: impl Into<String>, title: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ColumnConfigError {
    #[error("At least one column is required")]
    Empty,
    #[error("Duplicate column id: {0}")]
    DuplicateId(String),
    #[error("Column {0} has an empty title")]
    EmptyTitle(String),
    #[error("Duplicate column title: {0}")]
    DuplicateTitle(String),
    #[error("Column {0} has an empty label")]
    EmptyLabel(String),
    #[error("Unknown column: {0}")]
    UnknownColumn(String),
    #[error("Cannot remove the last column")]
    LastColumn,
    #[error("Failed to persist column configuration")]
    Storage(#[source] anyhow::Error),
}

/// Ordered list of board columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnConfig {
    columns: Vec<KanbanColumn>,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self::defaults()
    }
}

impl ColumnConfig {
    /// Wrap a list of columns without validating it
    pub fn new(columns: Vec<KanbanColumn>) -> Self {
        Self { columns }
    }

    /// Inbox, To Do, Snoozed, Done
    pub fn defaults() -> Self {
        Self::new(vec![
            KanbanColumn::new("inbox", "Inbox", "INBOX"),
            KanbanColumn::new("todo", "To Do", "todo"),
            KanbanColumn::new("snoozed", "Snoozed", "SNOOZED"),
            KanbanColumn::new("done", "Done", "done"),
        ])
    }

    /// Load the stored configuration
    ///
    /// Falls back to the defaults when nothing is stored, the stored list
    /// cannot be parsed, or it fails `validate` (empty, duplicate ids or
    /// titles, blank titles or labels).
    pub fn load(store: &dyn LocalStore) -> Self {
        let Some(columns) = storage::load_json::<Vec<KanbanColumn>>(store, COLUMNS_KEY) else {
            return Self::defaults();
        };
        let config = Self::new(columns);
        match config.validate() {
            Ok(()) => config,
            Err(e) => {
                warn!("Ignoring stored column configuration: {}", e);
                Self::defaults()
            }
        }
    }

    /// Validate and persist
    pub fn save(&self, store: &dyn LocalStore) -> Result<(), ColumnConfigError> {
        self.validate()?;
        storage::save_json(store, COLUMNS_KEY, &self.columns).map_err(ColumnConfigError::Storage)
    }

    /// Drop the stored configuration and return the defaults
    pub fn reset(store: &dyn LocalStore) -> Self {
        if let Err(e) = store.remove(COLUMNS_KEY) {
            warn!("Failed to reset column configuration: {}", e);
        }
        Self::defaults()
    }

    pub fn validate(&self) -> Result<(), ColumnConfigError> {
        if self.columns.is_empty() {
            return Err(ColumnConfigError::Empty);
        }

        let mut ids = HashSet::new();
        let mut titles = HashSet::new();
        for column in &self.columns {
            if !ids.insert(column.id.as_str()) {
                return Err(ColumnConfigError::DuplicateId(column.id.clone()));
            }
            let title = column.title.trim();
            if title.is_empty() {
                return Err(ColumnConfigError::EmptyTitle(column.id.clone()));
            }
            if !titles.insert(title.to_lowercase()) {
                return Err(ColumnConfigError::DuplicateTitle(column.title.clone()));
            }
            if column.label.trim().is_empty() {
                return Err(ColumnConfigError::EmptyLabel(column.id.clone()));
            }
        }
        Ok(())
    }

    pub fn columns(&self) -> &[KanbanColumn] {
        &self.columns
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.id.as_str())
    }

    pub fn get(&self, id: &str) -> Option<&KanbanColumn> {
        self.columns.iter().find(|c| c.id == id)
    }

    /// Label mapped to a column id
    pub fn label_for_column(&self, id: &str) -> Option<&str> {
        self.get(id).map(|c| c.label.as_str())
    }

    /// Append a column; the id is derived from the title
    pub fn add_column(
        &mut self,
        title: &str,
        label: &str,
    ) -> Result<&KanbanColumn, ColumnConfigError> {
        let column = KanbanColumn::new(column_id(title), title.trim(), label.trim());
        let mut candidate = self.clone();
        candidate.columns.push(column);
        candidate.validate()?;
        *self = candidate;
        Ok(&self.columns[self.columns.len() - 1])
    }

    pub fn rename_column(&mut self, id: &str, title: &str) -> Result<(), ColumnConfigError> {
        let mut candidate = self.clone();
        let column = candidate
            .columns
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| ColumnConfigError::UnknownColumn(id.to_string()))?;
        column.title = title.trim().to_string();
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }

    pub fn remove_column(&mut self, id: &str) -> Result<KanbanColumn, ColumnConfigError> {
        let index = self
            .columns
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| ColumnConfigError::UnknownColumn(id.to_string()))?;
        if self.columns.len() == 1 {
            return Err(ColumnConfigError::LastColumn);
        }
        Ok(self.columns.remove(index))
    }
}

/// Lowercase title with whitespace runs collapsed to `_`
fn column_id(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryLocalStore;

    #[test]
    fn test_load_falls_back_to_defaults() {
        let store = InMemoryLocalStore::new();
        assert_eq!(ColumnConfig::load(&store), ColumnConfig::defaults());

        store.set(COLUMNS_KEY, "[]").unwrap();
        assert_eq!(ColumnConfig::load(&store), ColumnConfig::defaults());

        store.set(COLUMNS_KEY, "{not json").unwrap();
        assert_eq!(ColumnConfig::load(&store), ColumnConfig::defaults());
    }

    #[test]
    fn test_load_rejects_invalid_stored_configurations() {
        let store = InMemoryLocalStore::new();
        store
            .set(
                COLUMNS_KEY,
                r#"[{"id":"todo","title":"To Do","label":"todo"},{"id":"todo","title":"Later","label":"later"}]"#,
            )
            .unwrap();
        assert_eq!(ColumnConfig::load(&store), ColumnConfig::defaults());

        store
            .set(COLUMNS_KEY, r#"[{"id":"todo","title":"  ","label":"todo"}]"#)
            .unwrap();
        assert_eq!(ColumnConfig::load(&store), ColumnConfig::defaults());
    }

    #[test]
    fn test_reads_legacy_label_field() {
        let store = InMemoryLocalStore::new();
        store
            .set(
                COLUMNS_KEY,
                r#"[{"id":"inbox","title":"Inbox","gmailLabel":"INBOX"},{"id":"later","title":"Later","gmailLabel":"Label_7"}]"#,
            )
            .unwrap();

        let config = ColumnConfig::load(&store);
        assert_eq!(config.columns().len(), 2);
        assert_eq!(config.label_for_column("later"), Some("Label_7"));
    }

    #[test]
    fn test_save_rejects_invalid_configurations() {
        let store = InMemoryLocalStore::new();

        assert!(matches!(
            ColumnConfig::new(vec![]).save(&store),
            Err(ColumnConfigError::Empty)
        ));
        assert!(matches!(
            ColumnConfig::new(vec![
                KanbanColumn::new("a", "Inbox", "INBOX"),
                KanbanColumn::new("b", "inbox", "todo"),
            ])
            .save(&store),
            Err(ColumnConfigError::DuplicateTitle(_))
        ));
        assert!(matches!(
            ColumnConfig::new(vec![KanbanColumn::new("a", "A", " ")]).save(&store),
            Err(ColumnConfigError::EmptyLabel(_))
        ));
        assert!(store.get(COLUMNS_KEY).unwrap().is_none());
    }

    #[test]
    fn test_add_rename_remove() {
        let mut config = ColumnConfig::defaults();

        let added = config.add_column("Waiting  On Reply", "Label_3").unwrap();
        assert_eq!(added.id, "waiting_on_reply");
        assert!(matches!(
            config.add_column("done", "x"),
            Err(ColumnConfigError::DuplicateId(_))
        ));

        config.rename_column("todo", "Next").unwrap();
        assert_eq!(config.get("todo").unwrap().title, "Next");
        assert!(matches!(
            config.rename_column("todo", "Inbox"),
            Err(ColumnConfigError::DuplicateTitle(_))
        ));
        assert_eq!(config.get("todo").unwrap().title, "Next");

        config.remove_column("waiting_on_reply").unwrap();
        assert_eq!(config.columns().len(), 4);
    }

    #[test]
    fn test_cannot_remove_last_column() {
        let mut config = ColumnConfig::new(vec![KanbanColumn::new("inbox", "Inbox", "INBOX")]);
        assert!(matches!(
            config.remove_column("inbox"),
            Err(ColumnConfigError::LastColumn)
        ));
    }

    #[test]
    fn test_save_then_reset() {
        let store = InMemoryLocalStore::new();
        let mut config = ColumnConfig::defaults();
        config.rename_column("done", "Finished").unwrap();
        config.save(&store).unwrap();
        assert_eq!(ColumnConfig::load(&store), config);

        assert_eq!(ColumnConfig::reset(&store), ColumnConfig::defaults());
        assert_eq!(ColumnConfig::load(&store), ColumnConfig::defaults());
    }
}
