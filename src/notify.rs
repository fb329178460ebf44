//! Notification sink interface.
//!
//! The eventing subsystem is an external collaborator; the engine only knows
//! how to hand it vertex events. Sink failures are logged by callers, never
//! escalated into migration failures.

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::model::Vertex;

/// What happened to the vertex an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    /// The vertex was removed.
    Delete,
    /// The vertex was mutated.
    Update,
}

/// A vertex lifecycle event with a best-effort snapshot of related vertices.
#[derive(Debug, Clone, Serialize)]
pub struct VertexEvent {
    /// Delete or update.
    pub kind: EventKind,
    /// The vertex the event is about, captured at emission time.
    pub vertex: Vertex,
    /// Related vertices; may be partial when fetching some of them failed.
    pub related: Vec<Vertex>,
}

/// Failure to publish an event.
#[derive(Debug, Error)]
#[error("notification sink failure: {0}")]
pub struct NotifyError(pub String);

/// Destination for vertex events.
pub trait NotificationSink {
    /// Publishes one event.
    fn publish(&mut self, event: VertexEvent) -> Result<(), NotifyError>;
}

/// Sink that emits events as structured log lines.
#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn publish(&mut self, event: VertexEvent) -> Result<(), NotifyError> {
        info!(
            kind = ?event.kind,
            vertex = event.vertex.id,
            node_type = %event.vertex.node_type,
            related = event.related.len(),
            "notify.vertex_event"
        );
        Ok(())
    }
}

/// Sink that queues events until the surrounding transaction commits.
///
/// The orchestrator hands migrations a buffered sink, flushes it into the
/// real sink after a successful commit, and simply drops it on rollback.
#[derive(Debug, Default)]
pub struct BufferedSink {
    events: Vec<VertexEvent>,
}

impl BufferedSink {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drains the queued events in publication order.
    pub fn drain(&mut self) -> Vec<VertexEvent> {
        std::mem::take(&mut self.events)
    }

    /// Publishes every queued event into `sink`, stopping at the first
    /// failure and returning it.
    pub fn flush_into(&mut self, sink: &mut dyn NotificationSink) -> Result<(), NotifyError> {
        for event in self.drain() {
            sink.publish(event)?;
        }
        Ok(())
    }
}

impl NotificationSink for BufferedSink {
    fn publish(&mut self, event: VertexEvent) -> Result<(), NotifyError> {
        self.events.push(event);
        Ok(())
    }
}
