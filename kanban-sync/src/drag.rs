//! Drag-and-drop session controller
//!
//! Turns a pointer gesture into exactly one mutation. A session moves through
//! `Idle -> Dragging -> Resolving` and then either commits through the
//! [`MutationPipeline`] or aborts. The controller is back in `Idle` as soon as
//! the change has been applied locally; the remote write settles afterwards.

use crate::column::ReorderColumn;
use crate::error::{Result, SyncError};
use crate::item::MoveItem;
use crate::mutation::{EntityKey, Mutation};
use crate::pipeline::{MutationOutcome, MutationPipeline, PendingMutation};
use crate::types::{BoardSnapshot, ColumnId, ItemId};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// What is being dragged, and what a drop target accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DragKind {
    Column,
    Item,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DragPhase {
    #[default]
    Idle,
    Dragging,
    Resolving,
    Committing,
    Aborted,
}

/// The drag currently in progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DragSession {
    pub active_id: String,
    pub active_type: DragKind,
    /// Column holding the dragged item; `None` for column drags
    pub origin_column_id: Option<ColumnId>,
    pub origin_position: usize,
}

/// Metadata the UI attaches to a drop target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropData {
    pub kind: DragKind,
    /// Drag kinds this target takes
    #[serde(default)]
    pub accepts: Vec<DragKind>,
}

/// The element the pointer was over when the drag ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropTarget {
    pub id: String,
    #[serde(default)]
    pub data: Option<DropData>,
}

impl DropTarget {
    /// An item card; accepts items
    pub fn item(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: Some(DropData {
                kind: DragKind::Item,
                accepts: vec![DragKind::Item],
            }),
        }
    }

    /// A column body; accepts both items and columns
    pub fn column(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: Some(DropData {
                kind: DragKind::Column,
                accepts: vec![DragKind::Column, DragKind::Item],
            }),
        }
    }

    /// A target without drop metadata
    pub fn bare(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: None,
        }
    }
}

/// How a drag ended
#[derive(Debug)]
pub enum DragOutcome {
    /// Cancelled or dropped outside a valid target; nothing changed
    Aborted,
    /// Dropped where it started
    NoOp,
    Committed(MutationOutcome),
}

enum Resolution {
    Abort,
    NoOp,
    Apply(Mutation),
}

#[derive(Debug, Default)]
struct DragState {
    phase: DragPhase,
    session: Option<DragSession>,
    /// Bumped by every `start_drag`, so a resolved drop can tell whether its
    /// session is still the active one
    generation: u64,
}

/// Tracks one drag session at a time and commits drops through the pipeline
#[derive(Debug)]
pub struct DragController {
    pipeline: Arc<MutationPipeline>,
    state: Mutex<DragState>,
}

impl DragController {
    pub fn new(pipeline: Arc<MutationPipeline>) -> Self {
        Self {
            pipeline,
            state: Mutex::new(DragState::default()),
        }
    }

    pub fn pipeline(&self) -> &Arc<MutationPipeline> {
        &self.pipeline
    }

    pub fn phase(&self) -> DragPhase {
        self.state().phase
    }

    pub fn session(&self) -> Option<DragSession> {
        self.state().session.clone()
    }

    /// Begin dragging `active_id`.
    ///
    /// Fails if another drag is active, if the entity does not exist, or if a
    /// mutation touching it has not settled yet.
    pub fn start_drag(&self, active_id: impl Into<String>, active_type: DragKind) -> Result<()> {
        let active_id = active_id.into();
        let mut state = self.state();
        if let Some(session) = &state.session {
            return Err(SyncError::DragInProgress {
                active_id: session.active_id.clone(),
            });
        }

        let board = self.pipeline.store().snapshot();
        let (key, origin_column_id, origin_position) = match active_type {
            DragKind::Column => {
                let column = board
                    .find_column(&ColumnId::from(active_id.as_str()))
                    .ok_or_else(|| SyncError::ColumnNotFound {
                        id: active_id.clone(),
                    })?;
                (EntityKey::Column(column.id.clone()), None, column.position)
            }
            DragKind::Item => {
                let item = board
                    .find_item(&ItemId::from(active_id.as_str()))
                    .ok_or_else(|| SyncError::ItemNotFound {
                        id: active_id.clone(),
                    })?;
                (
                    EntityKey::Item(item.id.clone()),
                    Some(item.column_id.clone()),
                    item.position,
                )
            }
        };

        if self.pipeline.is_updating(&key) {
            return Err(SyncError::EntityBusy {
                entity: key.to_string(),
            });
        }

        debug!(active_id = %active_id, ?active_type, "drag started");
        state.generation += 1;
        state.phase = DragPhase::Dragging;
        state.session = Some(DragSession {
            active_id,
            active_type,
            origin_column_id,
            origin_position,
        });
        Ok(())
    }

    /// Finish the drag over `over`, or outside any target when `None`.
    ///
    /// Resolves the drop into one mutation, applies it and waits for the
    /// remote write. Rejections and remote failures are returned as errors;
    /// in both cases the board ends up as it was before the drag.
    #[tracing::instrument(skip(self))]
    pub async fn end_drag(&self, over: Option<DropTarget>) -> Result<DragOutcome> {
        let (generation, session) = self.enter_resolving()?;

        let board = self.pipeline.store().snapshot();
        let mutation = match resolve(&session, over.as_ref(), &board) {
            Resolution::Abort => {
                debug!(active_id = %session.active_id, "drop outside a valid target");
                let mut state = self.state();
                if state.generation == generation {
                    abort(&mut state);
                }
                return Ok(DragOutcome::Aborted);
            }
            Resolution::NoOp => {
                let mut state = self.state();
                if state.generation == generation {
                    finish(&mut state);
                }
                return Ok(DragOutcome::NoOp);
            }
            Resolution::Apply(mutation) => mutation,
        };

        let Some(pending) = self.begin_resolved(generation, mutation)? else {
            return Ok(DragOutcome::Aborted);
        };
        if pending.is_noop() {
            return Ok(DragOutcome::NoOp);
        }
        pending.settle().await.map(DragOutcome::Committed)
    }

    /// Move the active session into `Resolving`
    fn enter_resolving(&self) -> Result<(u64, DragSession)> {
        let mut state = self.state();
        let Some(session) = state.session.clone() else {
            return Err(SyncError::NoActiveDrag);
        };
        state.phase = DragPhase::Resolving;
        Ok((state.generation, session))
    }

    /// Apply the resolved mutation, unless the session it was resolved for
    /// was cancelled or replaced in the meantime. The session lock is held
    /// across `begin` so a cancel cannot slip in between.
    fn begin_resolved(
        &self,
        generation: u64,
        mutation: Mutation,
    ) -> Result<Option<PendingMutation<'_>>> {
        let mut state = self.state();
        if state.generation != generation || state.session.is_none() {
            debug!(op = mutation.op_string(), "drag cancelled while resolving");
            return Ok(None);
        }
        state.phase = DragPhase::Committing;
        let pending = self.pipeline.begin(mutation);
        finish(&mut state);
        pending.map(Some)
    }

    /// Abandon the active drag without touching the board. Returns whether
    /// there was anything to cancel.
    pub fn cancel_drag(&self) -> bool {
        let cancellable = matches!(
            self.state().phase,
            DragPhase::Dragging | DragPhase::Resolving
        );
        if cancellable {
            abort(&mut self.state());
        }
        cancellable
    }

    fn state(&self) -> MutexGuard<'_, DragState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn abort(state: &mut DragState) {
    state.phase = DragPhase::Aborted;
    debug!(phase = ?state.phase, "drag aborted");
    state.session = None;
    state.phase = DragPhase::Idle;
}

fn finish(state: &mut DragState) {
    state.session = None;
    state.phase = DragPhase::Idle;
}

/// Only column targets restrict what may be dropped on them. Item cards
/// and untagged ids take any drag and are checked during resolution.
fn accepts(target: &DropTarget, kind: DragKind) -> bool {
    match &target.data {
        Some(data) if data.kind == DragKind::Column => data.accepts.contains(&kind),
        _ => true,
    }
}

fn resolve(session: &DragSession, over: Option<&DropTarget>, board: &BoardSnapshot) -> Resolution {
    let Some(target) = over else {
        return Resolution::Abort;
    };
    if !accepts(target, session.active_type) {
        return Resolution::Abort;
    }
    match session.active_type {
        DragKind::Item => resolve_item(session, target, board),
        DragKind::Column => resolve_column(session, target, board),
    }
}

fn resolve_item(session: &DragSession, target: &DropTarget, board: &BoardSnapshot) -> Resolution {
    let active = ItemId::from(session.active_id.as_str());
    let Some(item) = board.find_item(&active) else {
        return Resolution::Abort;
    };
    let hovered_kind = target.data.as_ref().map(|data| data.kind);

    let (column_id, index) = match hovered_kind {
        Some(DragKind::Item) => {
            let hovered_id = ItemId::from(target.id.as_str());
            if hovered_id == item.id {
                return Resolution::NoOp;
            }
            let Some(hovered) = board.find_item(&hovered_id) else {
                return Resolution::Abort;
            };
            let Some(index) = board.item_index(&hovered.id) else {
                return Resolution::Abort;
            };
            (hovered.column_id.clone(), Some(index))
        }
        Some(DragKind::Column) | None => {
            let column_id = ColumnId::from(target.id.as_str());
            if board.find_column(&column_id).is_none() {
                return Resolution::Abort;
            }
            (column_id, None)
        }
    };

    let same_column = column_id == item.column_id;
    let current = board.item_index(&item.id);
    let last = board.column_items(&item.column_id).len().saturating_sub(1);
    if same_column && index.or(Some(last)) == current {
        return Resolution::NoOp;
    }

    let mut mv = MoveItem::new(item.id.clone(), column_id);
    if let Some(index) = index {
        mv = mv.at_index(index);
    }
    Resolution::Apply(mv.into())
}

fn resolve_column(session: &DragSession, target: &DropTarget, board: &BoardSnapshot) -> Resolution {
    if matches!(&target.data, Some(data) if data.kind == DragKind::Item) {
        return Resolution::Abort;
    }
    let active = ColumnId::from(session.active_id.as_str());
    let over = ColumnId::from(target.id.as_str());
    let (Some(column), Some(hovered)) = (board.find_column(&active), board.find_column(&over))
    else {
        return Resolution::Abort;
    };
    if column.project_id != hovered.project_id {
        return Resolution::Abort;
    }
    if column.id == hovered.id {
        return Resolution::NoOp;
    }
    let Some(index) = board.column_index(&hovered.id) else {
        return Resolution::Abort;
    };
    Resolution::Apply(ReorderColumn::new(column.id.clone(), index).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BoardStore;
    use crate::test_support::{board_fixture, MockRemote};

    fn controller() -> (DragController, Arc<MockRemote>) {
        let remote = Arc::new(MockRemote::new());
        let store = Arc::new(BoardStore::with_board(board_fixture()));
        let pipeline = Arc::new(MutationPipeline::new(store, remote.clone()));
        (DragController::new(pipeline), remote)
    }

    fn column_order(board: &BoardSnapshot, column: &str) -> Vec<String> {
        board
            .column_items(&column.into())
            .iter()
            .map(|i| i.id.to_string())
            .collect()
    }

    #[test]
    fn test_start_drag_records_origin() {
        let (controller, _) = controller();
        controller.start_drag("b", DragKind::Item).unwrap();

        let session = controller.session().unwrap();
        assert_eq!(session.origin_column_id, Some("todo".into()));
        assert_eq!(session.origin_position, 1);
        assert_eq!(controller.phase(), DragPhase::Dragging);
    }

    #[test]
    fn test_second_drag_is_rejected() {
        let (controller, _) = controller();
        controller.start_drag("a", DragKind::Item).unwrap();

        let result = controller.start_drag("b", DragKind::Item);
        assert!(matches!(result, Err(SyncError::DragInProgress { .. })));
    }

    #[test]
    fn test_unknown_entity() {
        let (controller, _) = controller();
        assert!(matches!(
            controller.start_drag("nope", DragKind::Item),
            Err(SyncError::ItemNotFound { .. })
        ));
        assert!(matches!(
            controller.start_drag("nope", DragKind::Column),
            Err(SyncError::ColumnNotFound { .. })
        ));
        assert_eq!(controller.phase(), DragPhase::Idle);
    }

    #[tokio::test]
    async fn test_drop_over_item_in_same_column() {
        let (controller, _) = controller();
        controller.start_drag("a", DragKind::Item).unwrap();

        let outcome = controller
            .end_drag(Some(DropTarget::item("c")))
            .await
            .unwrap();

        assert!(matches!(outcome, DragOutcome::Committed(_)));
        let board = controller.pipeline().store().snapshot();
        assert_eq!(column_order(&board, "todo"), vec!["b", "c", "a"]);
        assert_eq!(controller.phase(), DragPhase::Idle);
    }

    #[tokio::test]
    async fn test_drop_over_item_in_other_column_inserts_before() {
        let (controller, _) = controller();
        controller.start_drag("a", DragKind::Item).unwrap();

        controller
            .end_drag(Some(DropTarget::item("e")))
            .await
            .unwrap();

        let board = controller.pipeline().store().snapshot();
        assert_eq!(column_order(&board, "done"), vec!["d", "a", "e"]);
        assert_eq!(column_order(&board, "todo"), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_item_card_without_accepts_list_takes_items() {
        let (controller, _) = controller();
        let target: DropTarget =
            serde_json::from_str(r#"{"id":"e","data":{"kind":"item"}}"#).unwrap();
        assert!(target.data.as_ref().unwrap().accepts.is_empty());
        controller.start_drag("a", DragKind::Item).unwrap();

        let outcome = controller.end_drag(Some(target)).await.unwrap();

        assert!(matches!(outcome, DragOutcome::Committed(_)));
        let board = controller.pipeline().store().snapshot();
        assert_eq!(column_order(&board, "done"), vec!["d", "a", "e"]);
    }

    #[tokio::test]
    async fn test_column_without_accepts_list_refuses_drop() {
        let (controller, remote) = controller();
        let target: DropTarget =
            serde_json::from_str(r#"{"id":"doing","data":{"kind":"column"}}"#).unwrap();
        controller.start_drag("a", DragKind::Item).unwrap();

        let outcome = controller.end_drag(Some(target)).await.unwrap();

        assert!(matches!(outcome, DragOutcome::Aborted));
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_drop_on_untagged_column_id_appends() {
        let (controller, _) = controller();
        controller.start_drag("b", DragKind::Item).unwrap();

        controller
            .end_drag(Some(DropTarget::bare("done")))
            .await
            .unwrap();

        let board = controller.pipeline().store().snapshot();
        assert_eq!(column_order(&board, "done"), vec!["d", "e", "b"]);
    }

    #[tokio::test]
    async fn test_drop_on_itself_is_noop() {
        let (controller, remote) = controller();
        controller.start_drag("b", DragKind::Item).unwrap();

        let outcome = controller
            .end_drag(Some(DropTarget::item("b")))
            .await
            .unwrap();

        assert!(matches!(outcome, DragOutcome::NoOp));
        assert!(remote.calls().is_empty());
        assert_eq!(controller.phase(), DragPhase::Idle);
    }

    #[tokio::test]
    async fn test_item_target_rejects_column_drag() {
        let (controller, _) = controller();
        let before = controller.pipeline().store().snapshot();
        controller.start_drag("todo", DragKind::Column).unwrap();

        let outcome = controller
            .end_drag(Some(DropTarget::item("d")))
            .await
            .unwrap();

        assert!(matches!(outcome, DragOutcome::Aborted));
        assert_eq!(*controller.pipeline().store().snapshot(), *before);
    }

    #[tokio::test]
    async fn test_column_drag_reorders_project() {
        let (controller, _) = controller();
        controller.start_drag("done", DragKind::Column).unwrap();

        controller
            .end_drag(Some(DropTarget::column("todo")))
            .await
            .unwrap();

        let board = controller.pipeline().store().snapshot();
        let order: Vec<String> = board
            .project_columns(&"p1".into())
            .iter()
            .map(|c| c.id.to_string())
            .collect();
        assert_eq!(order, vec!["done", "todo", "doing"]);
    }

    #[tokio::test]
    async fn test_column_drag_across_projects_aborts() {
        let (controller, _) = controller();
        controller.start_drag("todo", DragKind::Column).unwrap();

        let outcome = controller
            .end_drag(Some(DropTarget::column("other")))
            .await
            .unwrap();
        assert!(matches!(outcome, DragOutcome::Aborted));
    }

    #[tokio::test]
    async fn test_end_without_start() {
        let (controller, _) = controller();
        let result = controller.end_drag(None).await;
        assert!(matches!(result, Err(SyncError::NoActiveDrag)));
    }

    #[test]
    fn test_cancel_while_resolving_skips_the_drop() {
        let (controller, remote) = controller();
        let before = controller.pipeline().store().snapshot();
        controller.start_drag("a", DragKind::Item).unwrap();

        let (generation, _) = controller.enter_resolving().unwrap();
        assert_eq!(controller.phase(), DragPhase::Resolving);
        assert!(controller.cancel_drag());

        let pending = controller
            .begin_resolved(generation, MoveItem::new("a", "doing").into())
            .unwrap();
        assert!(pending.is_none());
        assert_eq!(*controller.pipeline().store().snapshot(), *before);
        assert!(controller.pipeline().updating().is_empty());
        assert!(remote.calls().is_empty());
        assert_eq!(controller.phase(), DragPhase::Idle);
    }

    #[test]
    fn test_resolved_drop_does_not_apply_to_a_newer_session() {
        let (controller, _) = controller();
        let before = controller.pipeline().store().snapshot();
        controller.start_drag("a", DragKind::Item).unwrap();
        let (generation, _) = controller.enter_resolving().unwrap();
        controller.cancel_drag();
        controller.start_drag("b", DragKind::Item).unwrap();

        let pending = controller
            .begin_resolved(generation, MoveItem::new("a", "doing").into())
            .unwrap();

        assert!(pending.is_none());
        assert_eq!(*controller.pipeline().store().snapshot(), *before);
        assert_eq!(controller.session().unwrap().active_id, "b");
    }

    #[test]
    fn test_cancel() {
        let (controller, _) = controller();
        assert!(!controller.cancel_drag());

        controller.start_drag("a", DragKind::Item).unwrap();
        assert!(controller.cancel_drag());
        assert_eq!(controller.phase(), DragPhase::Idle);
        assert!(controller.session().is_none());
    }
}
