//! Activity sinks - where committed mutations are reported
//!
//! Recording is fire-and-forget: a sink must not block, and a failing sink
//! never rolls back or delays the mutation that produced the event.

use crate::types::ActivityEvent;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Failure to hand an event to the activity log
#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("activity receiver has been dropped")]
    Closed,

    #[error("activity sink failed: {0}")]
    Other(String),
}

/// Receives one event per committed mutation
pub trait ActivitySink: Send + Sync {
    fn record(&self, event: &ActivityEvent) -> Result<(), ActivityError>;
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullActivitySink;

impl ActivitySink for NullActivitySink {
    fn record(&self, _event: &ActivityEvent) -> Result<(), ActivityError> {
        Ok(())
    }
}

/// Writes events to the tracing log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingActivitySink;

impl ActivitySink for TracingActivitySink {
    fn record(&self, event: &ActivityEvent) -> Result<(), ActivityError> {
        info!(
            event_type = %event.event_type,
            entity_id = %event.entity_id,
            automated = event.automated,
            payload = %event.payload,
            "activity"
        );
        Ok(())
    }
}

/// Forwards events over an unbounded channel to an async consumer
#[derive(Debug, Clone)]
pub struct ChannelActivitySink {
    sender: mpsc::UnboundedSender<ActivityEvent>,
}

impl ChannelActivitySink {
    /// Create a sink and the receiver that drains it
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ActivityEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ActivitySink for ChannelActivitySink {
    fn record(&self, event: &ActivityEvent) -> Result<(), ActivityError> {
        self.sender
            .send(event.clone())
            .map_err(|_| ActivityError::Closed)
    }
}

/// Hand `event` to `sink`, logging and swallowing any failure
pub(crate) fn emit(sink: &dyn ActivitySink, event: ActivityEvent) {
    if let Err(error) = sink.record(&event) {
        warn!(
            %error,
            event_type = %event.event_type,
            entity_id = %event.entity_id,
            "dropping activity event"
        );
    }
}
