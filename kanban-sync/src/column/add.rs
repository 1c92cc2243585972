//! AddColumn command

use crate::error::{Result, SyncError};
use crate::mutation::{with_columns, EntityKey, Mutate, MutationPlan};
use crate::reindex;
use crate::types::{ActivityKind, BoardSnapshot, Column, ColumnId, ProjectId};
use serde::{Deserialize, Serialize};

/// Add a new column to a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddColumn {
    /// The column ID
    pub id: ColumnId,
    pub project_id: ProjectId,
    /// The column display name
    pub name: String,
    /// Insertion index among the project's columns; appended when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl AddColumn {
    /// Create a new AddColumn command with a generated id
    pub fn new(project_id: impl Into<ProjectId>, name: impl Into<String>) -> Self {
        Self {
            id: ColumnId::new(),
            project_id: project_id.into(),
            name: name.into(),
            index: None,
        }
    }

    /// Use an explicit column id
    pub fn with_id(mut self, id: impl Into<ColumnId>) -> Self {
        self.id = id.into();
        self
    }

    /// Insert at a specific index instead of appending
    pub fn at_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

impl Mutate for AddColumn {
    fn op_string(&self) -> &'static str {
        "add column"
    }

    fn target(&self) -> EntityKey {
        EntityKey::Column(self.id.clone())
    }

    fn plan(&self, board: &BoardSnapshot) -> Result<MutationPlan> {
        if board.find_column(&self.id).is_some() {
            return Err(SyncError::duplicate_id("column", self.id.to_string()));
        }

        let columns = board.project_columns(&self.project_id);
        let column = Column {
            id: self.id.clone(),
            project_id: self.project_id.clone(),
            name: self.name.clone(),
            position: 0,
            is_ruler: false,
        };
        let index = self.index.unwrap_or(columns.len());
        let columns = reindex::insert_at(columns, column, index);

        MutationPlan::diff(
            ActivityKind::Insert,
            self.target(),
            board,
            with_columns(board, columns),
        )
    }
}
