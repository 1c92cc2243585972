//! SetRulerColumn command

use crate::error::{Result, SyncError};
use crate::mutation::{with_columns, EntityKey, Mutate, MutationPlan};
use crate::types::{ActivityKind, BoardSnapshot, Column, ColumnId};
use serde::{Deserialize, Serialize};

/// Designate (or clear) a project's ruler column.
///
/// Setting a ruler clears the previous ruler of the same project in the same
/// plan, so the store never holds two rulers for one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetRulerColumn {
    /// The column ID
    pub id: ColumnId,
    #[serde(default = "default_true")]
    pub is_ruler: bool,
}

fn default_true() -> bool {
    true
}

impl SetRulerColumn {
    /// Make `id` the ruler column of its project
    pub fn new(id: impl Into<ColumnId>) -> Self {
        Self {
            id: id.into(),
            is_ruler: true,
        }
    }

    /// Remove the ruler flag from `id`
    pub fn clear(id: impl Into<ColumnId>) -> Self {
        Self {
            id: id.into(),
            is_ruler: false,
        }
    }
}

impl Mutate for SetRulerColumn {
    fn op_string(&self) -> &'static str {
        "set ruler column"
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

        let columns: Vec<Column> = board
            .project_columns(&column.project_id)
            .into_iter()
            .map(|mut c| {
                c.is_ruler = if c.id == self.id {
                    self.is_ruler
                } else {
                    c.is_ruler && !self.is_ruler
                };
                c
            })
            .collect();

        MutationPlan::diff(
            ActivityKind::Update,
            self.target(),
            board,
            with_columns(board, columns),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::board_fixture;

    fn rulers(board: &BoardSnapshot) -> Vec<String> {
        board
            .columns
            .iter()
            .filter(|c| c.is_ruler && c.project_id.as_str() == "p1")
            .map(|c| c.id.to_string())
            .collect()
    }

    #[test]
    fn test_set_ruler_replaces_previous() {
        let board = board_fixture();
        assert_eq!(rulers(&board), vec!["done"]);

        let plan = SetRulerColumn::new("doing").plan(&board).unwrap();

        assert_eq!(rulers(&plan.next), vec!["doing"]);
        assert_eq!(plan.column_patches.len(), 2);
        assert_eq!(plan.column_patches[0].id.as_str(), "done");
        assert_eq!(plan.column_patches[0].is_ruler, Some(false));
    }

    #[test]
    fn test_clear_ruler() {
        let board = board_fixture();
        let plan = SetRulerColumn::clear("done").plan(&board).unwrap();
        assert!(rulers(&plan.next).is_empty());
    }

    #[test]
    fn test_clearing_a_non_ruler_keeps_existing_ruler() {
        let board = board_fixture();
        let plan = SetRulerColumn::clear("todo").plan(&board).unwrap();
        assert!(plan.is_noop());
    }

    #[test]
    fn test_setting_current_ruler_is_noop() {
        let board = board_fixture();
        let plan = SetRulerColumn::new("done").plan(&board).unwrap();
        assert!(plan.is_noop());
    }
}
