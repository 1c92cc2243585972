//! MoveItem command

use crate::error::{Result, SyncError};
use crate::mutation::{with_items, EntityKey, Mutate, MutationPlan};
use crate::reindex;
use crate::types::{ActivityKind, BoardSnapshot, ColumnId, ItemId};
use serde::{Deserialize, Serialize};

/// Move an item within its column or into another column of the same project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveItem {
    /// The item ID to move
    pub id: ItemId,
    /// Destination column
    pub column_id: ColumnId,
    /// Destination index; the end of the column when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    /// Set when the ruler automation issued the move
    #[serde(default)]
    pub automated: bool,
}

impl MoveItem {
    /// Move an item to the end of `column_id`
    pub fn new(id: impl Into<ItemId>, column_id: impl Into<ColumnId>) -> Self {
        Self {
            id: id.into(),
            column_id: column_id.into(),
            index: None,
            automated: false,
        }
    }

    /// Move to a specific index instead of the end
    pub fn at_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Mark the move as automation-originated
    pub fn automated(mut self) -> Self {
        self.automated = true;
        self
    }
}

impl Mutate for MoveItem {
    fn op_string(&self) -> &'static str {
        "move item"
    }

    fn target(&self) -> EntityKey {
        EntityKey::Item(self.id.clone())
    }

    fn automated(&self) -> bool {
        self.automated
    }

    fn plan(&self, board: &BoardSnapshot) -> Result<MutationPlan> {
        let item = board
            .find_item(&self.id)
            .ok_or_else(|| SyncError::ItemNotFound {
                id: self.id.to_string(),
            })?;
        let target = board
            .find_column(&self.column_id)
            .ok_or_else(|| SyncError::ColumnNotFound {
                id: self.column_id.to_string(),
            })?;
        let source = board
            .find_column(&item.column_id)
            .ok_or_else(|| SyncError::ColumnNotFound {
                id: item.column_id.to_string(),
            })?;

        if source.project_id != target.project_id {
            return Err(SyncError::validation(format!(
                "cannot move item {} from project {} into column {} of project {}",
                self.id, source.project_id, target.id, target.project_id
            )));
        }

        let not_found = || SyncError::ItemNotFound {
            id: self.id.to_string(),
        };

        let (updated, kind) = if source.id == target.id {
            let index = self.index.unwrap_or(usize::MAX);
            let items = reindex::move_within(board.column_items(&source.id), &self.id, index)
                .ok_or_else(not_found)?;
            (items, ActivityKind::Update)
        } else {
            let (mut source_items, mut target_items) = reindex::move_between(
                board.column_items(&source.id),
                board.column_items(&target.id),
                &self.id,
                self.index,
            )
            .ok_or_else(not_found)?;
            for moved in target_items.iter_mut().filter(|i| i.id == self.id) {
                moved.column_id = target.id.clone();
            }
            source_items.append(&mut target_items);
            (source_items, ActivityKind::UpdateColumn)
        };

        MutationPlan::diff(kind, self.target(), board, with_items(board, updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::board_fixture;

    fn column(board: &BoardSnapshot, id: &str) -> Vec<(String, usize)> {
        board
            .column_items(&id.into())
            .into_iter()
            .map(|i| (i.id.to_string(), i.position))
            .collect()
    }

    #[test]
    fn test_move_to_end_of_empty_column() {
        let board = board_fixture();
        let plan = MoveItem::new("b", "doing").plan(&board).unwrap();

        assert_eq!(
            column(&plan.next, "todo"),
            vec![("a".into(), 0), ("c".into(), 1)]
        );
        assert_eq!(column(&plan.next, "doing"), vec![("b".into(), 0)]);
        assert_eq!(plan.kind, ActivityKind::UpdateColumn);
        // b changed column, c shifted up
        assert_eq!(plan.item_patches.len(), 2);
    }

    #[test]
    fn test_move_within_column_and_back() {
        let board = board_fixture();
        let plan = MoveItem::new("a", "todo").at_index(2).plan(&board).unwrap();
        assert_eq!(
            column(&plan.next, "todo"),
            vec![("b".into(), 0), ("c".into(), 1), ("a".into(), 2)]
        );
        assert_eq!(plan.kind, ActivityKind::Update);

        let back = MoveItem::new("a", "todo")
            .at_index(0)
            .plan(&plan.next)
            .unwrap();
        assert_eq!(back.next, board);
    }

    #[test]
    fn test_move_into_middle_of_column() {
        let board = board_fixture();
        let plan = MoveItem::new("a", "done").at_index(1).plan(&board).unwrap();

        assert_eq!(
            column(&plan.next, "done"),
            vec![("d".into(), 0), ("a".into(), 1), ("e".into(), 2)]
        );
        assert_eq!(plan.next.find_item(&"a".into()).unwrap().column_id.as_str(), "done");
    }

    #[test]
    fn test_move_to_current_place_is_noop() {
        let board = board_fixture();
        let plan = MoveItem::new("c", "todo").plan(&board).unwrap();
        assert!(plan.is_noop());
    }

    #[test]
    fn test_move_into_foreign_project_is_rejected() {
        let board = board_fixture();
        let result = MoveItem::new("a", "other").plan(&board);
        assert!(matches!(result, Err(SyncError::Validation { .. })));
    }

    #[test]
    fn test_move_unknown_item_or_column() {
        let board = board_fixture();
        assert!(matches!(
            MoveItem::new("zzz", "todo").plan(&board),
            Err(SyncError::ItemNotFound { .. })
        ));
        assert!(matches!(
            MoveItem::new("a", "zzz").plan(&board),
            Err(SyncError::ColumnNotFound { .. })
        ));
    }
}
