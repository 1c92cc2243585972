//! DeleteColumn command

use crate::error::{Result, SyncError};
use crate::mutation::{with_columns, EntityKey, Mutate, MutationPlan};
use crate::reindex;
use crate::types::{ActivityKind, BoardSnapshot, ColumnId};
use serde::{Deserialize, Serialize};

/// Delete a column (fails if it has items)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteColumn {
    /// The column ID to delete
    pub id: ColumnId,
}

impl DeleteColumn {
    pub fn new(id: impl Into<ColumnId>) -> Self {
        Self { id: id.into() }
    }
}

impl Mutate for DeleteColumn {
    fn op_string(&self) -> &'static str {
        "delete column"
    }

    fn target(&self) -> EntityKey {
        EntityKey::Column(self.id.clone())
    }

    fn plan(&self, board: &BoardSnapshot) -> Result<MutationPlan> {
        let column = board
            .find_column(&self.id)
            .ok_or_else(|| SyncError::ColumnNotFound {
                id: self.id.to_string(),
            })?;

        let count = board.column_items(&self.id).len();
        if count > 0 {
            return Err(SyncError::ColumnNotEmpty {
                id: self.id.to_string(),
                count,
            });
        }

        let (remaining, _) = reindex::remove_by(board.project_columns(&column.project_id), &self.id);
        let mut next = with_columns(board, remaining);
        next.columns.retain(|c| c.id != self.id);

        MutationPlan::diff(ActivityKind::Delete, self.target(), board, next)
    }
}
