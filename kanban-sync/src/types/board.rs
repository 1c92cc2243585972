//! Board-level types: Column, Item, ItemStatus

use super::ids::{ColumnId, ItemId, ProjectId};
use crate::reindex::Positioned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A column defines a workflow stage within a project
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Column {
    pub id: ColumnId,
    pub project_id: ProjectId,
    pub name: String,
    pub position: usize,
    /// Destination for items whose status becomes complete
    #[serde(default)]
    pub is_ruler: bool,
}

impl Column {
    /// Create a new column with a fresh id
    pub fn new(project_id: impl Into<ProjectId>, name: impl Into<String>, position: usize) -> Self {
        Self {
            id: ColumnId::new(),
            project_id: project_id.into(),
            name: name.into(),
            position,
            is_ruler: false,
        }
    }

    /// Use an explicit id instead of a generated ULID
    pub fn with_id(mut self, id: impl Into<ColumnId>) -> Self {
        self.id = id.into();
        self
    }

    /// Mark this column as the project's ruler column
    pub fn as_ruler(mut self) -> Self {
        self.is_ruler = true;
        self
    }
}

impl Positioned for Column {
    type Id = ColumnId;

    fn id(&self) -> &ColumnId {
        &self.id
    }

    fn position(&self) -> usize {
        self.position
    }

    fn set_position(&mut self, position: usize) {
        self.position = position;
    }
}

/// Workflow status of an item. `Complete` is the terminal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Todo,
    InProgress,
    Complete,
}

impl ItemStatus {
    /// Whether this is the terminal status watched by the ruler automation
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
        };
        f.write_str(s)
    }
}

/// An item (card) on the board
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: ItemId,
    pub column_id: ColumnId,
    pub position: usize,
    #[serde(default)]
    pub status: ItemStatus,
    #[serde(default)]
    pub title: String,
    /// Other domain fields, carried through untouched
    #[serde(default, flatten)]
    pub fields: Map<String, Value>,
}

impl Item {
    /// Create a new item with a fresh id
    pub fn new(column_id: impl Into<ColumnId>, title: impl Into<String>, position: usize) -> Self {
        Self {
            id: ItemId::new(),
            column_id: column_id.into(),
            position,
            status: ItemStatus::default(),
            title: title.into(),
            fields: Map::new(),
        }
    }

    /// Use an explicit id instead of a generated ULID
    pub fn with_id(mut self, id: impl Into<ItemId>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the status
    pub fn with_status(mut self, status: ItemStatus) -> Self {
        self.status = status;
        self
    }

    /// Set an additional domain field
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

impl Positioned for Item {
    type Id = ItemId;

    fn id(&self) -> &ItemId {
        &self.id
    }

    fn position(&self) -> usize {
        self.position
    }

    fn set_position(&mut self, position: usize) {
        self.position = position;
    }
}
