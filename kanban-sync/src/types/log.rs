//! Activity event types emitted after committed mutations

use super::ids::ActivityEventId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Kind of change recorded by the activity log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// An entity was created
    Insert,
    /// An entity changed in place (reorder within its container, status, ruler flag)
    Update,
    /// An item moved to a different column
    UpdateColumn,
    /// An entity was removed
    Delete,
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::UpdateColumn => "update_column",
            Self::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// A record handed to the activity-logging collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Unique ID for this event
    pub id: ActivityEventId,

    /// When the mutation committed
    pub timestamp: DateTime<Utc>,

    pub event_type: ActivityKind,

    /// The primary entity the mutation targeted
    pub entity_id: String,

    /// Canonical op string plus the mutation input
    pub payload: Value,

    /// Whether the automation rule originated the mutation
    pub automated: bool,
}

impl ActivityEvent {
    /// Create a new activity event stamped with the current time
    pub fn new(
        event_type: ActivityKind,
        entity_id: impl Into<String>,
        payload: Value,
        automated: bool,
    ) -> Self {
        Self {
            id: ActivityEventId::new(),
            timestamp: Utc::now(),
            event_type,
            entity_id: entity_id.into(),
            payload,
            automated,
        }
    }
}
