//! Immutable board state and the read-side views computed from it

use super::board::{Column, Item};
use super::ids::{ColumnId, ItemId, ProjectId};
use crate::reindex::{self, Positioned};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// A full copy of the columns and items held by the store.
///
/// Nothing derived is cached here: sorting by position and grouping by column
/// are computed on every read, so a snapshot can never disagree with itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    pub columns: Vec<Column>,
    pub items: Vec<Item>,
}

impl BoardSnapshot {
    pub fn new(columns: Vec<Column>, items: Vec<Item>) -> Self {
        Self { columns, items }
    }

    pub fn find_column(&self, id: &ColumnId) -> Option<&Column> {
        self.columns.iter().find(|c| &c.id == id)
    }

    pub fn find_item(&self, id: &ItemId) -> Option<&Item> {
        self.items.iter().find(|i| &i.id == id)
    }

    /// Columns of a project in display order
    pub fn project_columns(&self, project_id: &ProjectId) -> Vec<Column> {
        reindex::sorted(
            self.columns
                .iter()
                .filter(|c| &c.project_id == project_id)
                .cloned(),
        )
    }

    /// Items of a column in display order
    pub fn column_items(&self, column_id: &ColumnId) -> Vec<Item> {
        reindex::sorted(
            self.items
                .iter()
                .filter(|i| &i.column_id == column_id)
                .cloned(),
        )
    }

    /// Items grouped by column, each group in display order
    pub fn items_by_column(&self) -> BTreeMap<ColumnId, Vec<Item>> {
        let mut groups: BTreeMap<ColumnId, Vec<Item>> = BTreeMap::new();
        for item in &self.items {
            groups
                .entry(item.column_id.clone())
                .or_default()
                .push(item.clone());
        }
        groups
            .into_iter()
            .map(|(column, items)| (column, reindex::sorted(items)))
            .collect()
    }

    /// Index of an item within its column's display order
    pub fn item_index(&self, id: &ItemId) -> Option<usize> {
        let item = self.find_item(id)?;
        reindex::index_of(&self.column_items(&item.column_id), id)
    }

    /// Index of a column within its project's display order
    pub fn column_index(&self, id: &ColumnId) -> Option<usize> {
        let column = self.find_column(id)?;
        reindex::index_of(&self.project_columns(&column.project_id), id)
    }

    /// Project that owns the column an item lives in
    pub fn item_project(&self, id: &ItemId) -> Option<&ProjectId> {
        let item = self.find_item(id)?;
        self.find_column(&item.column_id).map(|c| &c.project_id)
    }

    /// The project's ruler column, if one is designated
    pub fn ruler_column(&self, project_id: &ProjectId) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| &c.project_id == project_id && c.is_ruler)
    }

    /// Distinct projects present on the board
    pub fn projects(&self) -> Vec<ProjectId> {
        let mut seen = HashSet::new();
        self.columns
            .iter()
            .filter(|c| seen.insert(c.project_id.clone()))
            .map(|c| c.project_id.clone())
            .collect()
    }

    /// Check the ordering invariants of one project and its columns.
    ///
    /// Returns a description of the first violation found.
    pub fn check_project(&self, project_id: &ProjectId) -> Result<(), String> {
        let columns = self.project_columns(project_id);
        if !reindex::is_contiguous(&columns) {
            return Err(format!(
                "column positions of project {project_id} are not contiguous"
            ));
        }
        let rulers = columns.iter().filter(|c| c.is_ruler).count();
        if rulers > 1 {
            return Err(format!("project {project_id} has {rulers} ruler columns"));
        }
        for column in &columns {
            self.check_column(&column.id)?;
        }
        Ok(())
    }

    /// Check that a column's item positions are contiguous and unique
    pub fn check_column(&self, column_id: &ColumnId) -> Result<(), String> {
        let items = self.column_items(column_id);
        if !reindex::is_contiguous(&items) {
            let positions: Vec<usize> = items.iter().map(|i| i.position()).collect();
            return Err(format!(
                "item positions of column {column_id} are not contiguous: {positions:?}"
            ));
        }
        Ok(())
    }

    /// Check that every item references an existing column
    pub fn check_references(&self) -> Result<(), String> {
        let known: HashSet<&ColumnId> = self.columns.iter().map(|c| &c.id).collect();
        match self.items.iter().find(|i| !known.contains(&i.column_id)) {
            Some(orphan) => Err(format!(
                "item {} references unknown column {}",
                orphan.id, orphan.column_id
            )),
            None => Ok(()),
        }
    }
}
