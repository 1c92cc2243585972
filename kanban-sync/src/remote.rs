//! Interface to the remote data service that persists board state.
//!
//! The service is a CRUD façade; this crate only needs field-level writes keyed
//! by entity id. Implementations classify their failures through
//! [`RemoteError`] so the retry wrapper can tell transient from terminal.

use crate::error::SyncError;
use crate::retry::RetryableError;
use crate::types::{Column, ColumnId, Item, ItemId, ItemStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures reported by a [`RemoteBoardService`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Connection dropped, reset or unreachable
    #[error("network failure: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A database constraint rejected the write
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// The service refused the payload
    #[error("rejected: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Whether another attempt could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout)
    }
}

impl RetryableError for RemoteError {
    fn is_retriable(&self) -> bool {
        self.is_transient()
    }
}

impl From<RemoteError> for SyncError {
    fn from(error: RemoteError) -> Self {
        if error.is_transient() {
            SyncError::TransientNetwork {
                message: error.to_string(),
            }
        } else {
            SyncError::TerminalRemote {
                message: error.to_string(),
            }
        }
    }
}

/// Field-level update of a column. `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnPatch {
    pub id: ColumnId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_ruler: Option<bool>,
}

impl ColumnPatch {
    /// Diff two versions of the same column
    pub fn diff(before: &Column, after: &Column) -> Option<Self> {
        let patch = Self {
            id: after.id.clone(),
            position: (before.position != after.position).then_some(after.position),
            is_ruler: (before.is_ruler != after.is_ruler).then_some(after.is_ruler),
        };
        (!patch.is_empty()).then_some(patch)
    }

    /// The patch that undoes this one, given the column as it was before
    pub fn revert(&self, before: &Column) -> Self {
        Self {
            id: self.id.clone(),
            position: self.position.map(|_| before.position),
            is_ruler: self.is_ruler.map(|_| before.is_ruler),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_none() && self.is_ruler.is_none()
    }
}

/// Field-level update of an item. `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPatch {
    pub id: ItemId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_id: Option<ColumnId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ItemStatus>,
}

impl ItemPatch {
    /// Diff two versions of the same item
    pub fn diff(before: &Item, after: &Item) -> Option<Self> {
        let patch = Self {
            id: after.id.clone(),
            column_id: (before.column_id != after.column_id).then(|| after.column_id.clone()),
            position: (before.position != after.position).then_some(after.position),
            status: (before.status != after.status).then_some(after.status),
        };
        (!patch.is_empty()).then_some(patch)
    }

    /// The patch that undoes this one, given the item as it was before
    pub fn revert(&self, before: &Item) -> Self {
        Self {
            id: self.id.clone(),
            column_id: self.column_id.as_ref().map(|_| before.column_id.clone()),
            position: self.position.map(|_| before.position),
            status: self.status.map(|_| before.status),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.column_id.is_none() && self.position.is_none() && self.status.is_none()
    }

    /// Whether the patch touches the item's placement (column or position)
    pub fn is_placement(&self) -> bool {
        self.column_id.is_some() || self.position.is_some()
    }
}

/// Remote persistence consumed by the mutation pipeline
#[async_trait]
pub trait RemoteBoardService: Send + Sync {
    /// Persist a column's position
    async fn update_column_position(
        &self,
        column_id: &ColumnId,
        position: usize,
    ) -> Result<(), RemoteError>;

    /// Persist a column's ruler flag
    async fn update_column_ruler(
        &self,
        column_id: &ColumnId,
        is_ruler: bool,
    ) -> Result<(), RemoteError>;

    /// Persist an item's placement; `column_id` is only sent when it changed
    async fn update_item_placement(
        &self,
        item_id: &ItemId,
        column_id: Option<&ColumnId>,
        position: usize,
    ) -> Result<(), RemoteError>;

    /// Persist an item's status
    async fn update_item_status(
        &self,
        item_id: &ItemId,
        status: ItemStatus,
    ) -> Result<(), RemoteError>;

    async fn insert_column(&self, column: &Column) -> Result<(), RemoteError>;

    async fn delete_column(&self, column_id: &ColumnId) -> Result<(), RemoteError>;

    async fn insert_item(&self, item: &Item) -> Result<(), RemoteError>;

    async fn delete_item(&self, item_id: &ItemId) -> Result<(), RemoteError>;

    /// Whether the bulk endpoints below apply all rows atomically
    fn supports_bulk(&self) -> bool {
        false
    }

    /// Apply several column patches in one atomic write
    async fn bulk_update_columns(&self, patches: &[ColumnPatch]) -> Result<(), RemoteError> {
        let _ = patches;
        Err(RemoteError::Rejected(
            "bulk column updates are not supported".into(),
        ))
    }

    /// Apply several item patches in one atomic write
    async fn bulk_update_items(&self, patches: &[ItemPatch]) -> Result<(), RemoteError> {
        let _ = patches;
        Err(RemoteError::Rejected("bulk item updates are not supported".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(RemoteError::Network("reset".into()).is_transient());
        assert!(RemoteError::Timeout.is_transient());
        assert!(!RemoteError::Unauthorized("x".into()).is_transient());
        assert!(!RemoteError::NotFound("x".into()).is_transient());
        assert!(!RemoteError::Constraint("x".into()).is_transient());
    }

    #[test]
    fn test_conversion_to_sync_error() {
        let err: SyncError = RemoteError::Timeout.into();
        assert!(err.is_retryable());

        let err: SyncError = RemoteError::NotFound("item".into()).into();
        assert!(matches!(err, SyncError::TerminalRemote { .. }));
    }

    #[test]
    fn test_item_patch_diff_and_revert() {
        let before = Item::new("todo", "A", 1).with_id("a");
        let mut after = before.clone();
        after.column_id = "done".into();
        after.position = 0;

        let patch = ItemPatch::diff(&before, &after).unwrap();
        assert_eq!(patch.column_id, Some(ColumnId::from("done")));
        assert_eq!(patch.position, Some(0));
        assert!(patch.status.is_none());
        assert!(patch.is_placement());

        let revert = patch.revert(&before);
        assert_eq!(revert.column_id, Some(ColumnId::from("todo")));
        assert_eq!(revert.position, Some(1));

        assert!(ItemPatch::diff(&before, &before).is_none());
    }

    #[test]
    fn test_column_patch_only_serializes_changed_fields() {
        let before = Column::new("p", "Done", 2).with_id("done");
        let after = before.clone().as_ruler();
        let patch = ColumnPatch::diff(&before, &after).unwrap();
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({"id": "done", "is_ruler": true}));
    }
}
