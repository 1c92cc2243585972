//! Integration tests for remote failures and rollback

use kanban_sync::column::{AddColumn, DeleteColumn};
use kanban_sync::drag::{DragController, DragKind, DropTarget};
use kanban_sync::item::{AddItem, DeleteItem, MoveItem};
use kanban_sync::retry::Backoff;
use kanban_sync::test_support::{board_fixture, MockRemote};
use kanban_sync::{
    BoardStore, MutationPipeline, RemoteError, RetryConfig, RetryPolicy, SyncConfig, SyncError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn fast_config() -> SyncConfig {
    SyncConfig {
        retry: RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
            backoff: Backoff::Exponential,
            jitter: true,
        },
        ..SyncConfig::default()
    }
}

fn setup(remote: MockRemote) -> (Arc<BoardStore>, Arc<MockRemote>, Arc<MutationPipeline>) {
    let remote = Arc::new(remote);
    let store = Arc::new(BoardStore::with_board(board_fixture()));
    let pipeline = Arc::new(MutationPipeline::with_config(
        store.clone(),
        remote.clone(),
        &fast_config(),
    ));
    (store, remote, pipeline)
}

#[test_log::test(tokio::test)]
async fn test_failed_drag_restores_pre_drag_board() {
    let (store, remote, pipeline) = setup(MockRemote::new());
    remote.fail_next(3, RemoteError::Network("connection reset".into()));
    let before = store.snapshot();
    let drag = DragController::new(pipeline);

    drag.start_drag("b", DragKind::Item).unwrap();
    let result = drag.end_drag(Some(DropTarget::column("doing"))).await;

    assert!(matches!(result, Err(SyncError::TransientNetwork { .. })));
    assert_eq!(*store.snapshot(), *before);
    assert_eq!(remote.attempts(), 3);
    assert_eq!(remote.board(), *before);
}

#[tokio::test]
async fn test_failed_bulk_write_restores_board() {
    let (store, remote, pipeline) = setup(MockRemote::new().with_bulk());
    remote.fail_next(1, RemoteError::Constraint("unique position".into()));
    let before = store.snapshot();

    let result = pipeline.apply(MoveItem::new("a", "done").at_index(0)).await;

    assert!(matches!(result, Err(SyncError::TerminalRemote { .. })));
    assert_eq!(*store.snapshot(), *before);
    assert_eq!(remote.attempts(), 1);
}

#[tokio::test]
async fn test_partial_remote_write_is_compensated() {
    let (store, remote, pipeline) = setup(MockRemote::new());
    // Two of the three rows land before the rejection
    remote.fail_after(2, RemoteError::Unauthorized("session expired".into()));
    let before = store.snapshot();

    let result = pipeline.apply(MoveItem::new("a", "doing")).await;

    assert!(result.is_err());
    assert_eq!(*store.snapshot(), *before);
    assert_eq!(remote.board(), *before);
}

#[tokio::test]
async fn test_subscribers_see_apply_and_rollback() {
    let (store, remote, pipeline) = setup(MockRemote::new());
    remote.fail_next(1, RemoteError::NotFound("item a".into()));
    let seen = Arc::new(AtomicUsize::new(0));
    let _subscription = store.subscribe({
        let seen = seen.clone();
        move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }
    });

    let result = pipeline.apply(MoveItem::new("a", "doing")).await;

    assert!(result.is_err());
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_retry_then_success_commits() {
    let (store, remote, pipeline) = setup(MockRemote::new());
    remote.fail_next(2, RemoteError::Timeout);

    let outcome = pipeline
        .apply(MoveItem::new("c", "todo").at_index(0))
        .await
        .unwrap();

    assert_eq!(outcome.retries, 2);
    assert_eq!(remote.board(), *store.snapshot());
    assert!(pipeline.updating().is_empty());
}

#[tokio::test]
async fn test_failed_insert_and_delete_roll_back() {
    let (store, remote, pipeline) = setup(MockRemote::new());
    let before = store.snapshot();

    remote.fail_next(1, RemoteError::Rejected("read only".into()));
    let added = pipeline
        .apply(AddItem::new("todo", "New card").with_id("new").at_index(0))
        .await;
    assert!(added.is_err());
    assert_eq!(*store.snapshot(), *before);

    remote.fail_next(1, RemoteError::Rejected("read only".into()));
    let deleted = pipeline.apply(DeleteItem::new("b")).await;
    assert!(deleted.is_err());
    assert_eq!(*store.snapshot(), *before);
    assert_eq!(remote.board(), *before);
}

#[tokio::test]
async fn test_column_lifecycle_stays_in_sync() {
    let (store, remote, pipeline) = setup(MockRemote::new());

    pipeline
        .apply(AddColumn::new("p1", "Backlog").with_id("backlog").at_index(0))
        .await
        .unwrap();
    assert_eq!(
        store.snapshot().find_column(&"todo".into()).unwrap().position,
        1
    );

    let rejected = pipeline.apply(DeleteColumn::new("todo")).await;
    assert!(matches!(rejected, Err(SyncError::ColumnNotEmpty { count: 3, .. })));

    pipeline.apply(DeleteColumn::new("backlog")).await.unwrap();

    let board = store.snapshot();
    assert_eq!(*board, board_fixture());
    assert_eq!(remote.board(), *board);
}

#[tokio::test]
async fn test_policy_override_disables_retries() {
    let (store, remote, pipeline) = setup(MockRemote::new());
    let pipeline = Arc::try_unwrap(pipeline)
        .unwrap()
        .with_retry(RetryPolicy::no_retry());
    remote.fail_next(1, RemoteError::Timeout);

    let result = pipeline.apply(MoveItem::new("a", "doing")).await;

    assert!(matches!(result, Err(SyncError::TransientNetwork { .. })));
    assert_eq!(remote.attempts(), 1);
    assert_eq!(*store.snapshot(), board_fixture());
}

#[tokio::test]
async fn test_failed_move_leaves_remote_and_local_in_step() {
    let (store, remote, pipeline) = setup(MockRemote::new());
    let before = store.snapshot();

    let pending = pipeline.begin(MoveItem::new("a", "doing")).unwrap();
    // Planned against the optimistic todo column, so it has to wait
    let sibling = pipeline.apply(MoveItem::new("e", "todo")).await;
    assert!(matches!(sibling, Err(SyncError::EntityBusy { .. })));

    remote.fail_next(3, RemoteError::Timeout);
    assert!(pending.settle().await.is_err());

    assert_eq!(*store.snapshot(), *before);
    assert_eq!(remote.board(), *before);

    pipeline.apply(MoveItem::new("e", "todo")).await.unwrap();
    let local = store.snapshot();
    let mirrored = remote.board();
    assert_eq!(mirrored, *local);
    assert!(mirrored.check_column(&"todo".into()).is_ok());
    assert!(mirrored.check_column(&"done".into()).is_ok());
    assert!(pipeline.updating().is_empty());
}
