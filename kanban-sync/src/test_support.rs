//! Test helpers: a scripted in-memory remote and a board fixture.
//!
//! Available to this crate's tests and, through the `test-support` feature,
//! to integration tests and downstream crates.

use crate::remote::{ColumnPatch, ItemPatch, RemoteBoardService, RemoteError};
use crate::types::{BoardSnapshot, Column, ColumnId, Item, ItemId, ItemStatus};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::{watch, Notify};

/// Two projects:
///
/// ```text
/// p1: todo(0) [a0 b1 c2]   doing(1) []   done(2, ruler) [d0 e1]
/// p2: other(0) [x0]
/// ```
///
/// `d` and `e` are complete, everything else is todo. `p2` has no ruler.
pub fn board_fixture() -> BoardSnapshot {
    let columns = vec![
        Column::new("p1", "To Do", 0).with_id("todo"),
        Column::new("p1", "Doing", 1).with_id("doing"),
        Column::new("p1", "Done", 2).with_id("done").as_ruler(),
        Column::new("p2", "Other", 0).with_id("other"),
    ];
    let items = vec![
        Item::new("todo", "Write the parser", 0).with_id("a"),
        Item::new("todo", "Hook up the API", 1).with_id("b"),
        Item::new("todo", "Review docs", 2).with_id("c"),
        Item::new("done", "Set up CI", 0)
            .with_id("d")
            .with_status(ItemStatus::Complete),
        Item::new("done", "Pick a license", 1)
            .with_id("e")
            .with_status(ItemStatus::Complete),
        Item::new("other", "Unrelated work", 0).with_id("x"),
    ];
    BoardSnapshot::new(columns, items)
}

#[derive(Debug, Default)]
struct MockState {
    board: BoardSnapshot,
    calls: Vec<String>,
    attempts: usize,
    fail_next: VecDeque<RemoteError>,
    fail_after: Option<(usize, RemoteError)>,
}

/// In-memory [`RemoteBoardService`] that records every successful write,
/// mirrors it onto its own board and fails on demand.
#[derive(Debug)]
pub struct MockRemote {
    state: Mutex<MockState>,
    bulk: bool,
    hold: watch::Sender<bool>,
    waiting: Notify,
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRemote {
    /// A remote that mirrors [`board_fixture`]
    pub fn new() -> Self {
        Self::with_board(board_fixture())
    }

    pub fn with_board(board: BoardSnapshot) -> Self {
        let (hold, _) = watch::channel(false);
        Self {
            state: Mutex::new(MockState {
                board,
                ..MockState::default()
            }),
            bulk: false,
            hold,
            waiting: Notify::new(),
        }
    }

    /// Advertise and accept bulk writes
    pub fn with_bulk(mut self) -> Self {
        self.bulk = true;
        self
    }

    /// Fail the next `times` attempts with `error`
    pub fn fail_next(&self, times: usize, error: RemoteError) {
        let mut state = self.state();
        state.fail_next.extend(std::iter::repeat_n(error, times));
    }

    /// Let `successes` more writes land, then fail the next attempt once
    pub fn fail_after(&self, successes: usize, error: RemoteError) {
        let mut state = self.state();
        let at = state.calls.len() + successes;
        state.fail_after = Some((at, error));
    }

    /// Park every write until [`MockRemote::release`] is called
    pub fn hold(&self) {
        self.hold.send_replace(true);
    }

    pub fn release(&self) {
        self.hold.send_replace(false);
    }

    /// Wait until a write is parked by [`MockRemote::hold`]
    pub async fn wait_for_pending(&self) {
        self.waiting.notified().await;
    }

    /// Successful writes, in order
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Every attempt, including the failed ones
    pub fn attempts(&self) -> usize {
        self.state().attempts
    }

    /// The remote's view of the board
    pub fn board(&self) -> BoardSnapshot {
        self.state().board.clone()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn write(
        &self,
        call: String,
        apply: impl FnOnce(&mut BoardSnapshot) -> Result<(), RemoteError>,
    ) -> Result<(), RemoteError> {
        let mut hold = self.hold.subscribe();
        loop {
            let held = *hold.borrow_and_update();
            if !held {
                break;
            }
            self.waiting.notify_one();
            if hold.changed().await.is_err() {
                break;
            }
        }

        let mut state = self.state();
        state.attempts += 1;
        if let Some(error) = state.fail_next.pop_front() {
            return Err(error);
        }
        let calls = state.calls.len();
        if let Some((at, error)) = state.fail_after.take() {
            if at == calls {
                return Err(error);
            }
            state.fail_after = Some((at, error));
        }

        apply(&mut state.board)?;
        state.calls.push(call);
        Ok(())
    }
}

fn column_mut<'a>(
    board: &'a mut BoardSnapshot,
    id: &ColumnId,
) -> Result<&'a mut Column, RemoteError> {
    board
        .columns
        .iter_mut()
        .find(|c| &c.id == id)
        .ok_or_else(|| RemoteError::NotFound(format!("column {id}")))
}

fn item_mut<'a>(board: &'a mut BoardSnapshot, id: &ItemId) -> Result<&'a mut Item, RemoteError> {
    board
        .items
        .iter_mut()
        .find(|i| &i.id == id)
        .ok_or_else(|| RemoteError::NotFound(format!("item {id}")))
}

fn apply_column_patch(board: &mut BoardSnapshot, patch: &ColumnPatch) -> Result<(), RemoteError> {
    let column = column_mut(board, &patch.id)?;
    if let Some(position) = patch.position {
        column.position = position;
    }
    if let Some(is_ruler) = patch.is_ruler {
        column.is_ruler = is_ruler;
    }
    Ok(())
}

fn apply_item_patch(board: &mut BoardSnapshot, patch: &ItemPatch) -> Result<(), RemoteError> {
    let item = item_mut(board, &patch.id)?;
    if let Some(column_id) = &patch.column_id {
        item.column_id = column_id.clone();
    }
    if let Some(position) = patch.position {
        item.position = position;
    }
    if let Some(status) = patch.status {
        item.status = status;
    }
    Ok(())
}

#[async_trait]
impl RemoteBoardService for MockRemote {
    async fn update_column_position(
        &self,
        column_id: &ColumnId,
        position: usize,
    ) -> Result<(), RemoteError> {
        self.write(
            format!("update_column_position {column_id} {position}"),
            |board| {
                column_mut(board, column_id)?.position = position;
                Ok(())
            },
        )
        .await
    }

    async fn update_column_ruler(
        &self,
        column_id: &ColumnId,
        is_ruler: bool,
    ) -> Result<(), RemoteError> {
        self.write(
            format!("update_column_ruler {column_id} {is_ruler}"),
            |board| {
                column_mut(board, column_id)?.is_ruler = is_ruler;
                Ok(())
            },
        )
        .await
    }

    async fn update_item_placement(
        &self,
        item_id: &ItemId,
        column_id: Option<&ColumnId>,
        position: usize,
    ) -> Result<(), RemoteError> {
        let column = column_id.map_or_else(|| "-".to_string(), |c| c.to_string());
        self.write(
            format!("update_item_placement {item_id} {column} {position}"),
            |board| {
                let item = item_mut(board, item_id)?;
                if let Some(column_id) = column_id {
                    item.column_id = column_id.clone();
                }
                item.position = position;
                Ok(())
            },
        )
        .await
    }

    async fn update_item_status(
        &self,
        item_id: &ItemId,
        status: ItemStatus,
    ) -> Result<(), RemoteError> {
        self.write(format!("update_item_status {item_id} {status}"), |board| {
            item_mut(board, item_id)?.status = status;
            Ok(())
        })
        .await
    }

    async fn insert_column(&self, column: &Column) -> Result<(), RemoteError> {
        self.write(format!("insert_column {}", column.id), |board| {
            board.columns.push(column.clone());
            Ok(())
        })
        .await
    }

    async fn delete_column(&self, column_id: &ColumnId) -> Result<(), RemoteError> {
        self.write(format!("delete_column {column_id}"), |board| {
            board.columns.retain(|c| &c.id != column_id);
            Ok(())
        })
        .await
    }

    async fn insert_item(&self, item: &Item) -> Result<(), RemoteError> {
        self.write(format!("insert_item {}", item.id), |board| {
            board.items.push(item.clone());
            Ok(())
        })
        .await
    }

    async fn delete_item(&self, item_id: &ItemId) -> Result<(), RemoteError> {
        self.write(format!("delete_item {item_id}"), |board| {
            board.items.retain(|i| &i.id != item_id);
            Ok(())
        })
        .await
    }

    fn supports_bulk(&self) -> bool {
        self.bulk
    }

    async fn bulk_update_columns(&self, patches: &[ColumnPatch]) -> Result<(), RemoteError> {
        let body = serde_json::to_string(patches).unwrap_or_default();
        self.write(format!("bulk_update_columns {body}"), |board| {
            patches.iter().try_for_each(|p| apply_column_patch(board, p))
        })
        .await
    }

    async fn bulk_update_items(&self, patches: &[ItemPatch]) -> Result<(), RemoteError> {
        let body = serde_json::to_string(patches).unwrap_or_default();
        self.write(format!("bulk_update_items {body}"), |board| {
            patches.iter().try_for_each(|p| apply_item_patch(board, p))
        })
        .await
    }
}
