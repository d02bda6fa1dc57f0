//! Event types for the Tally event system
//!
//! Provides shared event definitions and the EventBus used to push
//! ingestion and archive progress to SSE clients.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Tally event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TallyEvent {
    /// A submission was merged into a survey's results table
    SubmissionRecorded {
        survey_id: String,
        /// Data rows in the table after the merge
        row_count: usize,
        /// Whether the table was rewritten under a widened header
        migrated: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Archive assembly progress, 0..=100, non-decreasing per archive
    ArchiveProgress { survey_id: String, percent: u8 },

    /// Archive assembly finished
    ArchiveCompleted {
        survey_id: String,
        file_name: String,
        bytes: usize,
        attachment_count: usize,
    },
}

impl TallyEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            TallyEvent::SubmissionRecorded { .. } => "SubmissionRecorded",
            TallyEvent::ArchiveProgress { .. } => "ArchiveProgress",
            TallyEvent::ArchiveCompleted { .. } => "ArchiveCompleted",
        }
    }

    pub fn survey_id(&self) -> &str {
        match self {
            TallyEvent::SubmissionRecorded { survey_id, .. }
            | TallyEvent::ArchiveProgress { survey_id, .. }
            | TallyEvent::ArchiveCompleted { survey_id, .. } => survey_id,
        }
    }
}

/// Broadcast channel for TallyEvents
///
/// Cheap to clone; all clones share one channel.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<TallyEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use tally_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<TallyEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: TallyEvent,
    ) -> Result<usize, broadcast::error::SendError<TallyEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: TallyEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
