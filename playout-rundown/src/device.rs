//! Playback device collaborator interface
//!
//! The decode/render engine is external. A rundown reaches it only through
//! these traits: the device opens an input for a source, loads or preloads it
//! on the output, and reports position and end-of-stream through the
//! [`InputEvents`] sink it was handed when the input was opened.
//!
//! Devices call into [`InputEvents`] from their own (possibly real-time)
//! threads. Reporting never blocks: it is a single non-blocking channel send.

use crate::rundown::notification::{ItemNotification, Notification, NotificationSender};
use crate::rundown::ItemId;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a playback device
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Device refused the request (format, resources, state)
    #[error("Device rejected request: {0}")]
    Rejected(String),

    /// The source could not be opened
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),
}

/// What a device should open
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InputSource {
    /// Seekable media file
    File { path: PathBuf },

    /// Live input (capture card, network source) identified by name
    Live { name: String },
}

/// An opened input on the playback device
///
/// Dropping the last handle releases the input on the device.
pub trait PlayerInput: Send + Sync {
    /// Start or resume playback
    fn play(&self);

    /// Pause playback, keeping position
    fn pause(&self);

    /// Seek to an offset from the start; `false` if the input cannot seek there
    fn seek(&self, offset: Duration) -> bool;

    /// Whether the input is currently playing
    fn is_playing(&self) -> bool;

    /// Whether a file input reached its end
    fn is_end_of_stream(&self) -> bool {
        false
    }

    /// Restart from the beginning instead of stopping at end of stream
    fn set_looping(&self, _looping: bool) {}

    /// Current looping setting
    fn is_looping(&self) -> bool {
        false
    }
}

/// Output-side playback device
///
/// Shared by whoever configured the channel. Schedulers hold it weakly.
pub trait PlaybackDevice: Send + Sync {
    /// Open an input for `source`
    ///
    /// The device reports the input's position and end of stream through `events`.
    fn open_input(
        &self,
        source: &InputSource,
        audio_channel_count: u16,
        events: InputEvents,
    ) -> Result<Arc<dyn PlayerInput>, DeviceError>;

    /// Make `input` the one routed to the output
    fn load(&self, input: &Arc<dyn PlayerInput>) -> Result<(), DeviceError>;

    /// Stage `input` to follow the current one
    fn preload(&self, input: &Arc<dyn PlayerInput>) -> Result<(), DeviceError>;

    /// Drop everything loaded or staged
    fn clear(&self);
}

/// Notification sink handed to the device for one input
///
/// Tagged with the owning item's id and the prepare cycle that opened the
/// input. Once the item unloads the sink is detached and further reports are
/// dropped; reports already queued are discarded by the scheduler because
/// their cycle no longer matches.
#[derive(Clone)]
pub struct InputEvents {
    item_id: ItemId,
    cycle: u64,
    sink: Option<NotificationSender>,
    attached: Arc<AtomicBool>,
    forward_stop: bool,
}

impl InputEvents {
    pub(crate) fn new(
        item_id: ItemId,
        cycle: u64,
        sink: Option<NotificationSender>,
        forward_stop: bool,
    ) -> Self {
        Self {
            item_id,
            cycle,
            sink,
            attached: Arc::new(AtomicBool::new(true)),
            forward_stop,
        }
    }

    /// Sink that reports nowhere, for inputs opened outside a rundown
    pub fn disconnected(item_id: ItemId) -> Self {
        Self::new(item_id, 0, None, false)
    }

    /// Item this input belongs to
    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    /// Prepare cycle of the item that opened this input
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Whether reports are still delivered
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// Report elapsed time since the start of the input
    pub fn position(&self, elapsed: Duration) {
        self.post(Notification::Position { elapsed });
    }

    /// Report that the input reached its end and stopped
    ///
    /// Live inputs have no end; their stop reports are not forwarded.
    pub fn stopped(&self) {
        if self.forward_stop {
            self.post(Notification::Stopped);
        }
    }

    pub(crate) fn detach(&self) {
        self.attached.store(false, Ordering::Release);
    }

    fn post(&self, notification: Notification) {
        if !self.is_attached() {
            return;
        }
        if let Some(sink) = &self.sink {
            sink.send(ItemNotification::from_input(self.item_id, self.cycle, notification));
        }
    }
}

impl std::fmt::Debug for InputEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputEvents")
            .field("item_id", &self.item_id)
            .field("cycle", &self.cycle)
            .field("attached", &self.is_attached())
            .field("forward_stop", &self.forward_stop)
            .finish()
    }
}
