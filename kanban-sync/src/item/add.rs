//! AddItem command

use crate::error::{Result, SyncError};
use crate::mutation::{with_items, EntityKey, Mutate, MutationPlan};
use crate::reindex;
use crate::types::{ActivityKind, BoardSnapshot, ColumnId, Item, ItemId, ItemStatus};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Add a new item to a column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddItem {
    /// The item ID
    pub id: ItemId,
    pub column_id: ColumnId,
    pub title: String,
    #[serde(default)]
    pub status: ItemStatus,
    /// Insertion index; appended when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

impl AddItem {
    /// Create a new AddItem command with a generated id
    pub fn new(column_id: impl Into<ColumnId>, title: impl Into<String>) -> Self {
        Self {
            id: ItemId::new(),
            column_id: column_id.into(),
            title: title.into(),
            status: ItemStatus::default(),
            index: None,
            fields: Map::new(),
        }
    }

    /// Use an explicit item id
    pub fn with_id(mut self, id: impl Into<ItemId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_status(mut self, status: ItemStatus) -> Self {
        self.status = status;
        self
    }

    /// Insert at a specific index instead of appending
    pub fn at_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Set an additional domain field
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

impl Mutate for AddItem {
    fn op_string(&self) -> &'static str {
        "add item"
    }

    fn target(&self) -> EntityKey {
        EntityKey::Item(self.id.clone())
    }

    fn plan(&self, board: &BoardSnapshot) -> Result<MutationPlan> {
        if board.find_item(&self.id).is_some() {
            return Err(SyncError::duplicate_id("item", self.id.to_string()));
        }
        if board.find_column(&self.column_id).is_none() {
            return Err(SyncError::ColumnNotFound {
                id: self.column_id.to_string(),
            });
        }

        let items = board.column_items(&self.column_id);
        let item = Item {
            id: self.id.clone(),
            column_id: self.column_id.clone(),
            position: 0,
            status: self.status,
            title: self.title.clone(),
            fields: self.fields.clone(),
        };
        let index = self.index.unwrap_or(items.len());
        let items = reindex::insert_at(items, item, index);

        MutationPlan::diff(
            ActivityKind::Insert,
            self.target(),
            board,
            with_items(board, items),
        )
    }
}
