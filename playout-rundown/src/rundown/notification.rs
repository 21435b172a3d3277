//! Internal scheduler notifications
//!
//! Everything that can change the scheduler's view of the rundown from outside
//! the control thread arrives here: device reports for prepared inputs and
//! item-level changes (flag toggles, removal requests). Each notification is
//! tagged with the originating item's id, so the scheduler never registers
//! per-item callbacks and never has to unsubscribe them.
//!
//! Device reports also carry the prepare cycle of the input that produced
//! them. A report still queued when its item is unloaded and prepared again
//! belongs to the old cycle and is ignored.
//!
//! These are internal; listeners outside the scheduler see
//! `playout_common::PlayoutEvent` instead.

use super::item::ItemId;
use std::time::Duration;
use tokio::sync::mpsc;

/// Item property whose change can affect which item plays next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemProperty {
    AutoStart,
    Disabled,
    Looping,
}

/// Notification payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Playback position of a prepared input
    Position { elapsed: Duration },

    /// A file input reached its end
    Stopped,

    /// An item flag changed
    PropertyChanged(ItemProperty),

    /// The item asked to be taken out of its rundown
    RemoveRequested,
}

/// Notification tagged with the item it concerns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemNotification {
    pub item_id: ItemId,
    /// Prepare cycle of the reporting input; `None` when not tied to one
    pub cycle: Option<u64>,
    pub notification: Notification,
}

impl ItemNotification {
    pub fn new(item_id: ItemId, notification: Notification) -> Self {
        Self {
            item_id,
            cycle: None,
            notification,
        }
    }

    /// Report from the input opened in prepare cycle `cycle`
    pub fn from_input(item_id: ItemId, cycle: u64, notification: Notification) -> Self {
        Self {
            item_id,
            cycle: Some(cycle),
            notification,
        }
    }
}

/// Sending half of a scheduler's inbound queue
///
/// Unbounded so that senders (device threads included) never block.
#[derive(Debug, Clone)]
pub struct NotificationSender {
    tx: mpsc::UnboundedSender<ItemNotification>,
}

impl NotificationSender {
    /// Queue a notification; `false` once the scheduler has shut down
    pub fn send(&self, notification: ItemNotification) -> bool {
        self.tx.send(notification).is_ok()
    }
}

/// Create a scheduler inbound queue
pub fn channel() -> (NotificationSender, mpsc::UnboundedReceiver<ItemNotification>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (NotificationSender { tx }, rx)
}
