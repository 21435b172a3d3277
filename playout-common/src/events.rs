//! Event types for the playout event system
//!
//! Provides the externally visible event definitions and the EventBus used to
//! deliver them to UI and other listeners.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Playout event types
///
/// Events are broadcast via EventBus and can be serialized for transmission
/// to remote listeners. Every event names the output channel it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayoutEvent {
    /// A rundown item became the playing item, or the playing slot was cleared
    ///
    /// `item` is `None` when the channel was emptied (clear, shutdown).
    ItemLoaded {
        channel: String,
        item: Option<RundownItemInfo>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// An item was removed from the rundown
    ItemRemoved {
        channel: String,
        item: RundownItemInfo,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A media file was submitted to the end of the rundown
    ItemSubmitted {
        channel: String,
        item: RundownItemInfo,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Position of the playing item, relayed from the playback device
    PlaybackPosition {
        channel: String,
        item_id: Uuid,
        elapsed_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The playing item ended and nothing was staged to follow it
    PlaybackStopped {
        channel: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PlayoutEvent {
    /// Output channel the event originated from
    pub fn channel(&self) -> &str {
        match self {
            PlayoutEvent::ItemLoaded { channel, .. }
            | PlayoutEvent::ItemRemoved { channel, .. }
            | PlayoutEvent::ItemSubmitted { channel, .. }
            | PlayoutEvent::PlaybackPosition { channel, .. }
            | PlayoutEvent::PlaybackStopped { channel, .. } => channel,
        }
    }
}

/// Kind of input a rundown item wraps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RundownItemKind {
    File,
    Live,
}

/// Snapshot of a rundown item for event payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RundownItemInfo {
    pub item_id: Uuid,
    pub name: String,
    pub kind: RundownItemKind,
    pub auto_start: bool,
    pub disabled: bool,
}

/// Central event distribution bus for playout events
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayoutEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PlayoutEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PlayoutEvent,
    ) -> Result<usize, broadcast::error::SendError<PlayoutEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PlayoutEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
