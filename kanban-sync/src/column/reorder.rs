//! ReorderColumn command

use crate::error::{Result, SyncError};
use crate::mutation::{with_columns, EntityKey, Mutate, MutationPlan};
use crate::reindex;
use crate::types::{ActivityKind, BoardSnapshot, ColumnId};
use serde::{Deserialize, Serialize};

/// Move a column to a new index among its project's columns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderColumn {
    /// The column ID to move
    pub id: ColumnId,
    /// Target index, clamped to the project's column count
    pub index: usize,
}

impl ReorderColumn {
    pub fn new(id: impl Into<ColumnId>, index: usize) -> Self {
        Self {
            id: id.into(),
            index,
        }
    }
}

impl Mutate for ReorderColumn {
    fn op_string(&self) -> &'static str {
        "reorder column"
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

        let columns = reindex::move_within(
            board.project_columns(&column.project_id),
            &self.id,
            self.index,
        )
        .ok_or_else(|| SyncError::ColumnNotFound {
            id: self.id.to_string(),
        })?;

        MutationPlan::diff(
            ActivityKind::Update,
            self.target(),
            board,
            with_columns(board, columns),
        )
    }
}
