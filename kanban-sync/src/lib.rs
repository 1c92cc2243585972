//! Optimistic reordering and synchronization engine for kanban boards
//!
//! This crate keeps an in-memory board (projects, columns, items) consistent
//! while the user drags things around, and reconciles every change with a
//! remote data service. Changes show up locally at once; if the remote write
//! fails after retries, the board is put back exactly as it was.
//!
//! ## Overview
//!
//! - **Dense ordering** - Positions in every container are always `0..n-1`
//! - **Optimistic writes** - Apply locally, persist remotely, roll back on failure
//! - **One mutation per gesture** - A drag commits a single atomic change
//! - **Ruler automation** - Completed items move into the project's ruler column
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use kanban_sync::{BoardStore, MutationPipeline, RemoteBoardService};
//! use kanban_sync::drag::{DragController, DragKind, DropTarget};
//! use std::sync::Arc;
//!
//! # async fn example(remote: Arc<dyn RemoteBoardService>) -> kanban_sync::Result<()> {
//! let store = Arc::new(BoardStore::new());
//! let _subscription = store.subscribe(|board| println!("{} items", board.items.len()));
//!
//! let pipeline = Arc::new(MutationPipeline::new(store, remote));
//! let drag = DragController::new(pipeline);
//!
//! drag.start_drag("item-1", DragKind::Item)?;
//! drag.end_drag(Some(DropTarget::column("done"))).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Layers
//!
//! ```text
//! DragController ──► MutationPipeline ──► BoardStore ──► subscribers
//!                          │    ▲
//!                          │    └── RulerRule (follow-up moves)
//!                          ▼
//!              RetryPolicy ──► RemoteBoardService
//! ```

mod error;
pub mod types;

pub mod activity;
pub mod column;
pub mod config;
pub mod drag;
pub mod item;
pub mod mutation;
pub mod pipeline;
pub mod reindex;
pub mod remote;
pub mod retry;
pub mod ruler;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use activity::{ActivitySink, ChannelActivitySink, NullActivitySink, TracingActivitySink};
pub use config::SyncConfig;
pub use drag::{DragController, DragOutcome};
pub use error::{Result, SyncError};
pub use mutation::{EntityKey, Mutate, Mutation, MutationPlan};
pub use pipeline::{MutationOutcome, MutationPipeline, PendingMutation};
pub use remote::{RemoteBoardService, RemoteError};
pub use retry::{with_retry, RetryConfig, RetryPolicy};
pub use store::{BoardStore, Subscription};

// Re-export commonly used types
pub use types::{
    ActivityEvent, ActivityKind, BoardSnapshot, Column, ColumnId, Item, ItemId, ItemStatus,
    MutationId, ProjectId,
};
