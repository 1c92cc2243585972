//! Core types for the sync engine

mod board;
mod ids;
mod log;
mod snapshot;

// Re-export all types
pub use board::{Column, Item, ItemStatus};
pub use ids::{ActivityEventId, ColumnId, ItemId, MutationId, ProjectId};
pub use log::{ActivityEvent, ActivityKind};
pub use snapshot::BoardSnapshot;
