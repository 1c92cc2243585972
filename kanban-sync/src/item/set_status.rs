//! SetItemStatus command

use crate::error::{Result, SyncError};
use crate::mutation::{with_items, EntityKey, Mutate, MutationPlan};
use crate::types::{ActivityKind, BoardSnapshot, ItemId, ItemStatus};
use serde::{Deserialize, Serialize};

/// Change an item's status. Completing an item may trigger the ruler
/// automation once the change has been committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetItemStatus {
    /// The item ID
    pub id: ItemId,
    pub status: ItemStatus,
}

impl SetItemStatus {
    pub fn new(id: impl Into<ItemId>, status: ItemStatus) -> Self {
        Self {
            id: id.into(),
            status,
        }
    }

    /// Shorthand for setting the terminal status
    pub fn complete(id: impl Into<ItemId>) -> Self {
        Self::new(id, ItemStatus::Complete)
    }
}

impl Mutate for SetItemStatus {
    fn op_string(&self) -> &'static str {
        "set item status"
    }

    fn target(&self) -> EntityKey {
        EntityKey::Item(self.id.clone())
    }

    fn plan(&self, board: &BoardSnapshot) -> Result<MutationPlan> {
        let mut item = board
            .find_item(&self.id)
            .cloned()
            .ok_or_else(|| SyncError::ItemNotFound {
                id: self.id.to_string(),
            })?;
        item.status = self.status;

        MutationPlan::diff(
            ActivityKind::Update,
            self.target(),
            board,
            with_items(board, vec![item]),
        )
    }
}
