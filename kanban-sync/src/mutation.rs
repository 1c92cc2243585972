//! Mutation commands and the plans they produce.
//!
//! A command never touches the store. Given the current board it computes the
//! complete next board; [`MutationPlan::diff`] then derives the field-level
//! remote writes, the set of touched entities and the status transitions, and
//! checks the ordering invariants of every container involved.

use crate::column::{AddColumn, DeleteColumn, ReorderColumn, SetRulerColumn};
use crate::error::{Result, SyncError};
use crate::item::{AddItem, DeleteItem, MoveItem, SetItemStatus};
use crate::remote::{ColumnPatch, ItemPatch};
use crate::types::{
    ActivityKind, BoardSnapshot, Column, ColumnId, Item, ItemId, ItemStatus, ProjectId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// An entity the pipeline can gate on
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum EntityKey {
    Column(ColumnId),
    Item(ItemId),
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(id) => write!(f, "column {id}"),
            Self::Item(id) => write!(f, "item {id}"),
        }
    }
}

/// An item whose status changed in a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTransition {
    pub item_id: ItemId,
    pub from: ItemStatus,
    pub to: ItemStatus,
}

impl StatusTransition {
    /// Whether this transition enters the terminal status from a non-terminal one
    pub fn completes(&self) -> bool {
        self.to.is_terminal() && !self.from.is_terminal()
    }
}

/// Everything the pipeline needs to apply one mutation
#[derive(Debug, Clone)]
pub struct MutationPlan {
    pub kind: ActivityKind,
    /// The entity the command targeted
    pub target: EntityKey,
    /// The full board after the mutation
    pub next: BoardSnapshot,
    pub column_patches: Vec<ColumnPatch>,
    pub item_patches: Vec<ItemPatch>,
    pub inserted_columns: Vec<Column>,
    pub inserted_items: Vec<Item>,
    pub deleted_columns: Vec<ColumnId>,
    pub deleted_items: Vec<ItemId>,
    pub status_transitions: Vec<StatusTransition>,
    /// Every entity created, deleted or changed
    pub touched: BTreeSet<EntityKey>,
}

impl MutationPlan {
    /// Compare `before` and `next` and derive the writes that turn one into
    /// the other. Fails with [`SyncError::InvariantViolation`] if any container
    /// touched by the change ends up with non-contiguous positions, more than
    /// one ruler, or items pointing at a missing column.
    pub fn diff(
        kind: ActivityKind,
        target: EntityKey,
        before: &BoardSnapshot,
        next: BoardSnapshot,
    ) -> Result<Self> {
        let old_columns: HashMap<&ColumnId, &Column> =
            before.columns.iter().map(|c| (&c.id, c)).collect();
        let old_items: HashMap<&ItemId, &Item> = before.items.iter().map(|i| (&i.id, i)).collect();

        let mut plan = Self {
            kind,
            target,
            next: BoardSnapshot::default(),
            column_patches: Vec::new(),
            item_patches: Vec::new(),
            inserted_columns: Vec::new(),
            inserted_items: Vec::new(),
            deleted_columns: Vec::new(),
            deleted_items: Vec::new(),
            status_transitions: Vec::new(),
            touched: BTreeSet::new(),
        };

        for column in &next.columns {
            match old_columns.get(&column.id) {
                Some(old) => {
                    if let Some(patch) = ColumnPatch::diff(old, column) {
                        plan.touched.insert(EntityKey::Column(column.id.clone()));
                        plan.column_patches.push(patch);
                    }
                }
                None => {
                    plan.touched.insert(EntityKey::Column(column.id.clone()));
                    plan.inserted_columns.push(column.clone());
                }
            }
        }
        for item in &next.items {
            match old_items.get(&item.id) {
                Some(old) => {
                    if let Some(patch) = ItemPatch::diff(old, item) {
                        if old.status != item.status {
                            plan.status_transitions.push(StatusTransition {
                                item_id: item.id.clone(),
                                from: old.status,
                                to: item.status,
                            });
                        }
                        plan.touched.insert(EntityKey::Item(item.id.clone()));
                        plan.item_patches.push(patch);
                    }
                }
                None => {
                    plan.touched.insert(EntityKey::Item(item.id.clone()));
                    plan.inserted_items.push(item.clone());
                }
            }
        }

        let next_column_ids: BTreeSet<&ColumnId> = next.columns.iter().map(|c| &c.id).collect();
        let next_item_ids: BTreeSet<&ItemId> = next.items.iter().map(|i| &i.id).collect();
        for column in &before.columns {
            if !next_column_ids.contains(&column.id) {
                plan.touched.insert(EntityKey::Column(column.id.clone()));
                plan.deleted_columns.push(column.id.clone());
            }
        }
        for item in &before.items {
            if !next_item_ids.contains(&item.id) {
                plan.touched.insert(EntityKey::Item(item.id.clone()));
                plan.deleted_items.push(item.id.clone());
            }
        }

        // Clear the old ruler before setting the new one, so the remote
        // never holds two rulers between writes.
        plan.column_patches
            .sort_by_key(|p| (p.is_ruler != Some(false), p.position, p.id.clone()));
        plan.item_patches
            .sort_by_key(|p| (p.column_id.clone(), p.position, p.id.clone()));

        plan.next = next;
        plan.check_invariants(before)?;
        Ok(plan)
    }

    /// Whether applying the plan would change nothing
    pub fn is_noop(&self) -> bool {
        self.touched.is_empty()
    }

    /// Status changes that enter the terminal value
    pub fn completions(&self) -> impl Iterator<Item = &StatusTransition> {
        self.status_transitions.iter().filter(|t| t.completes())
    }

    /// Containers whose ordering the plan can change: the projects of
    /// touched columns and the columns touched items left or entered.
    pub fn containers(&self, before: &BoardSnapshot) -> (BTreeSet<ProjectId>, BTreeSet<ColumnId>) {
        let mut projects = BTreeSet::new();
        let mut columns = BTreeSet::new();

        for key in &self.touched {
            match key {
                EntityKey::Column(id) => {
                    let column = self.next.find_column(id).or_else(|| before.find_column(id));
                    if let Some(column) = column {
                        projects.insert(column.project_id.clone());
                    }
                }
                EntityKey::Item(id) => {
                    if let Some(item) = before.find_item(id) {
                        columns.insert(item.column_id.clone());
                    }
                    if let Some(item) = self.next.find_item(id) {
                        columns.insert(item.column_id.clone());
                    }
                }
            }
        }
        (projects, columns)
    }

    fn check_invariants(&self, before: &BoardSnapshot) -> Result<()> {
        let (projects, columns) = self.containers(before);

        for project in &projects {
            self.next
                .check_project(project)
                .map_err(SyncError::invariant)?;
        }
        for column in &columns {
            self.next.check_column(column).map_err(SyncError::invariant)?;
        }
        self.next.check_references().map_err(SyncError::invariant)
    }
}

/// A command that computes the next board from the current one
pub trait Mutate: fmt::Debug + Send + Sync {
    /// Canonical op string (e.g., "move item")
    fn op_string(&self) -> &'static str;

    /// The entity the command acts on
    fn target(&self) -> EntityKey;

    /// Whether the automation rule originated this command
    fn automated(&self) -> bool {
        false
    }

    /// Compute the plan against `board`. Validation failures are returned
    /// before anything is applied.
    fn plan(&self, board: &BoardSnapshot) -> Result<MutationPlan>;
}

/// Any mutation the pipeline accepts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    AddColumn(AddColumn),
    DeleteColumn(DeleteColumn),
    ReorderColumn(ReorderColumn),
    SetRulerColumn(SetRulerColumn),
    AddItem(AddItem),
    DeleteItem(DeleteItem),
    MoveItem(MoveItem),
    SetItemStatus(SetItemStatus),
}

impl Mutation {
    /// Borrow the underlying command
    pub fn command(&self) -> &dyn Mutate {
        match self {
            Self::AddColumn(cmd) => cmd,
            Self::DeleteColumn(cmd) => cmd,
            Self::ReorderColumn(cmd) => cmd,
            Self::SetRulerColumn(cmd) => cmd,
            Self::AddItem(cmd) => cmd,
            Self::DeleteItem(cmd) => cmd,
            Self::MoveItem(cmd) => cmd,
            Self::SetItemStatus(cmd) => cmd,
        }
    }

    pub fn op_string(&self) -> &'static str {
        self.command().op_string()
    }

    pub fn target(&self) -> EntityKey {
        self.command().target()
    }

    pub fn automated(&self) -> bool {
        self.command().automated()
    }

    pub fn plan(&self, board: &BoardSnapshot) -> Result<MutationPlan> {
        self.command().plan(board)
    }
}

macro_rules! impl_from_command {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Mutation {
                fn from(cmd: $variant) -> Self {
                    Self::$variant(cmd)
                }
            }
        )*
    };
}

impl_from_command!(
    AddColumn,
    DeleteColumn,
    ReorderColumn,
    SetRulerColumn,
    AddItem,
    DeleteItem,
    MoveItem,
    SetItemStatus,
);

/// Replace columns by id, leaving the rest of the board untouched
pub(crate) fn with_columns(board: &BoardSnapshot, updated: Vec<Column>) -> BoardSnapshot {
    let mut by_id: HashMap<ColumnId, Column> =
        updated.into_iter().map(|c| (c.id.clone(), c)).collect();
    let mut columns: Vec<Column> = board
        .columns
        .iter()
        .map(|c| by_id.remove(&c.id).unwrap_or_else(|| c.clone()))
        .collect();
    let mut inserted: Vec<Column> = by_id.into_values().collect();
    inserted.sort_by(|a, b| a.id.cmp(&b.id));
    columns.extend(inserted);
    BoardSnapshot::new(columns, board.items.clone())
}

/// Replace items by id, leaving the rest of the board untouched
pub(crate) fn with_items(board: &BoardSnapshot, updated: Vec<Item>) -> BoardSnapshot {
    let mut by_id: HashMap<ItemId, Item> =
        updated.into_iter().map(|i| (i.id.clone(), i)).collect();
    let mut items: Vec<Item> = board
        .items
        .iter()
        .map(|i| by_id.remove(&i.id).unwrap_or_else(|| i.clone()))
        .collect();
    let mut inserted: Vec<Item> = by_id.into_values().collect();
    inserted.sort_by(|a, b| a.id.cmp(&b.id));
    items.extend(inserted);
    BoardSnapshot::new(board.columns.clone(), items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board() -> BoardSnapshot {
        BoardSnapshot::new(
            vec![
                Column::new("p1", "To Do", 0).with_id("todo"),
                Column::new("p1", "Done", 1).with_id("done").as_ruler(),
            ],
            vec![
                Item::new("todo", "A", 0).with_id("a"),
                Item::new("todo", "B", 1).with_id("b"),
            ],
        )
    }

    #[test]
    fn test_identical_boards_diff_to_noop() {
        let board = board();
        let plan = MutationPlan::diff(
            ActivityKind::Update,
            EntityKey::Item("a".into()),
            &board,
            board.clone(),
        )
        .unwrap();
        assert!(plan.is_noop());
    }

    #[test]
    fn test_diff_collects_patches_and_transitions() {
        let before = board();
        let mut next = before.clone();
        next.items[0].status = ItemStatus::Complete;
        next.items[0].position = 1;
        next.items[1].position = 0;

        let plan = MutationPlan::diff(
            ActivityKind::Update,
            EntityKey::Item("a".into()),
            &before,
            next,
        )
        .unwrap();

        assert_eq!(plan.item_patches.len(), 2);
        assert_eq!(plan.touched.len(), 2);
        assert_eq!(plan.completions().count(), 1);
    }

    #[test]
    fn test_diff_orders_ruler_unset_first() {
        let before = board();
        let mut next = before.clone();
        next.columns[0].is_ruler = true;
        next.columns[1].is_ruler = false;

        let plan = MutationPlan::diff(
            ActivityKind::Update,
            EntityKey::Column("todo".into()),
            &before,
            next,
        )
        .unwrap();

        assert_eq!(plan.column_patches[0].is_ruler, Some(false));
        assert_eq!(plan.column_patches[1].is_ruler, Some(true));
    }

    #[test]
    fn test_diff_rejects_duplicate_positions() {
        let before = board();
        let mut next = before.clone();
        next.items[1].position = 0;

        let result = MutationPlan::diff(
            ActivityKind::Update,
            EntityKey::Item("b".into()),
            &before,
            next,
        );
        assert!(matches!(result, Err(SyncError::InvariantViolation { .. })));
    }

    #[test]
    fn test_diff_tracks_inserts_and_deletes() {
        let before = board();
        let mut next = before.clone();
        next.items.retain(|i| i.id.as_str() != "b");
        next.items.push(Item::new("done", "N", 0).with_id("n"));

        let plan = MutationPlan::diff(
            ActivityKind::Insert,
            EntityKey::Item("n".into()),
            &before,
            next,
        )
        .unwrap();

        assert_eq!(plan.deleted_items, vec![ItemId::from("b")]);
        assert_eq!(plan.inserted_items[0].id.as_str(), "n");
    }

    #[test]
    fn test_mutation_serializes_with_op_tag() {
        let mutation = Mutation::from(MoveItem::new("a", "done"));
        let json = serde_json::to_value(&mutation).unwrap();
        assert_eq!(json["op"], "move_item");
        assert_eq!(mutation.op_string(), "move item");
        assert_eq!(mutation.target(), EntityKey::Item("a".into()));
    }
}
