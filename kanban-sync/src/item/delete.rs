//! DeleteItem command

use crate::error::{Result, SyncError};
use crate::mutation::{with_items, EntityKey, Mutate, MutationPlan};
use crate::reindex;
use crate::types::{ActivityKind, BoardSnapshot, ItemId};
use serde::{Deserialize, Serialize};

/// Delete an item and close the gap it leaves in its column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteItem {
    /// The item ID to delete
    pub id: ItemId,
}

impl DeleteItem {
    pub fn new(id: impl Into<ItemId>) -> Self {
        Self { id: id.into() }
    }
}

impl Mutate for DeleteItem {
    fn op_string(&self) -> &'static str {
        "delete item"
    }

    fn target(&self) -> EntityKey {
        EntityKey::Item(self.id.clone())
    }

    fn plan(&self, board: &BoardSnapshot) -> Result<MutationPlan> {
        let item = board
            .find_item(&self.id)
            .ok_or_else(|| SyncError::ItemNotFound {
                id: self.id.to_string(),
            })?;

        let (remaining, _) = reindex::remove_by(board.column_items(&item.column_id), &self.id);
        let mut next = with_items(board, remaining);
        next.items.retain(|i| i.id != self.id);

        MutationPlan::diff(ActivityKind::Delete, self.target(), board, next)
    }
}
