//! Rundown items
//!
//! A rundown item wraps one playable input, either a media file or a live
//! source, and owns that input's lifecycle:
//!
//! - constructed detached (no input)
//! - `prepare` opens the input on the device (fails if already prepared)
//! - `play` / `pause` / `seek` drive the open input
//! - `unload` detaches the input's notifications and releases it
//!
//! `prepared` is true exactly while an input handle is held. Both transitions
//! happen under the input lock, so concurrent `prepare`/`unload` calls see
//! exactly one success per cycle. Each successful `prepare` starts a new
//! numbered cycle, and device reports carry the number of the cycle whose
//! input produced them.

use super::notification::{ItemNotification, ItemProperty, Notification, NotificationSender};
use crate::device::{InputEvents, InputSource, PlaybackDevice, PlayerInput};
use crate::error::{Error, Result};
use crate::media::MediaFile;
use parking_lot::Mutex;
use playout_common::events::{RundownItemInfo, RundownItemKind};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Stable identity of a rundown item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Variant-specific part of a rundown item
#[derive(Debug)]
pub enum ItemKind {
    /// Seekable clip; may loop at end of stream
    File { media: MediaFile, looping: AtomicBool },

    /// Live passthrough; runs until unloaded
    Live { name: String },
}

struct PreparedInput {
    handle: Arc<dyn PlayerInput>,
    events: InputEvents,
    cycle: u64,
}

/// One entry of a rundown
pub struct RundownItem {
    id: ItemId,
    kind: ItemKind,
    auto_start: AtomicBool,
    disabled: AtomicBool,
    prepared: AtomicBool,
    /// Last prepare cycle number handed out
    cycles: AtomicU64,
    input: Mutex<Option<PreparedInput>>,
    /// Scheduler queue this item reports to while it belongs to a rundown
    notifier: Mutex<Option<NotificationSender>>,
}

impl RundownItem {
    /// New file item for `media`
    pub fn file(media: MediaFile) -> Self {
        Self::with_kind(ItemKind::File {
            media,
            looping: AtomicBool::new(false),
        })
    }

    /// New live item for the named input
    pub fn live(name: impl Into<String>) -> Self {
        Self::with_kind(ItemKind::Live { name: name.into() })
    }

    fn with_kind(kind: ItemKind) -> Self {
        Self {
            id: ItemId::new(),
            kind,
            auto_start: AtomicBool::new(false),
            disabled: AtomicBool::new(false),
            prepared: AtomicBool::new(false),
            cycles: AtomicU64::new(0),
            input: Mutex::new(None),
            notifier: Mutex::new(None),
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn kind(&self) -> &ItemKind {
        &self.kind
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, ItemKind::File { .. })
    }

    /// Display name
    pub fn name(&self) -> &str {
        match &self.kind {
            ItemKind::File { media, .. } => &media.name,
            ItemKind::Live { name } => name,
        }
    }

    /// Thumbnail image, file items only
    pub fn thumbnail(&self) -> Option<&Path> {
        match &self.kind {
            ItemKind::File { media, .. } => media.thumbnail.as_deref(),
            ItemKind::Live { .. } => None,
        }
    }

    /// Media descriptor, file items only
    pub fn media(&self) -> Option<&MediaFile> {
        match &self.kind {
            ItemKind::File { media, .. } => Some(media),
            ItemKind::Live { .. } => None,
        }
    }

    /// Clip duration, file items only
    pub fn duration(&self) -> Option<Duration> {
        self.media().map(|m| m.duration)
    }

    pub fn can_seek(&self) -> bool {
        self.is_file()
    }

    pub fn is_auto_start(&self) -> bool {
        self.auto_start.load(Ordering::Acquire)
    }

    pub fn set_auto_start(&self, auto_start: bool) {
        if self.auto_start.swap(auto_start, Ordering::AcqRel) != auto_start {
            self.notify(Notification::PropertyChanged(ItemProperty::AutoStart));
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    pub fn set_disabled(&self, disabled: bool) {
        if self.disabled.swap(disabled, Ordering::AcqRel) != disabled {
            self.notify(Notification::PropertyChanged(ItemProperty::Disabled));
        }
    }

    /// Eligible to follow the playing item automatically
    pub fn is_auto_playable(&self) -> bool {
        self.is_auto_start() && !self.is_disabled()
    }

    pub fn is_looping(&self) -> bool {
        match &self.kind {
            ItemKind::File { looping, .. } => looping.load(Ordering::Acquire),
            ItemKind::Live { .. } => false,
        }
    }

    /// Loop the clip at end of stream instead of stopping
    ///
    /// Applied to the open input immediately when prepared.
    pub fn set_looping(&self, value: bool) -> Result<()> {
        let ItemKind::File { looping, .. } = &self.kind else {
            return Err(Error::Unsupported(format!("looping live item {}", self.name())));
        };
        if looping.swap(value, Ordering::AcqRel) == value {
            return Ok(());
        }
        if let Some(prepared) = self.input.lock().as_ref() {
            prepared.handle.set_looping(value);
        }
        self.notify(Notification::PropertyChanged(ItemProperty::Looping));
        Ok(())
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared.load(Ordering::Acquire)
    }

    /// Open the underlying input on `device`
    ///
    /// Returns `Ok(false)` without side effects when already prepared. A device
    /// failure rolls the prepared flag back and is returned as an error.
    pub fn prepare(&self, device: &dyn PlaybackDevice, audio_channel_count: u16) -> Result<bool> {
        let mut slot = self.input.lock();
        if self.prepared.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }

        let cycle = self.cycles.fetch_add(1, Ordering::AcqRel) + 1;
        let events = InputEvents::new(self.id, cycle, self.notifier.lock().clone(), self.is_file());
        match device.open_input(&self.source(), audio_channel_count, events.clone()) {
            Ok(handle) => {
                if self.is_file() {
                    handle.set_looping(self.is_looping());
                }
                *slot = Some(PreparedInput { handle, events, cycle });
                debug!("Prepared {} ({}), cycle {}", self.name(), self.id, cycle);
                Ok(true)
            }
            Err(e) => {
                self.prepared.store(false, Ordering::Release);
                warn!("Failed to prepare {} ({}): {}", self.name(), self.id, e);
                Err(e.into())
            }
        }
    }

    /// Detach notifications and release the input
    ///
    /// Returns `false` without side effects when not prepared.
    pub fn unload(&self) -> bool {
        let mut slot = self.input.lock();
        if !self.prepared.swap(false, Ordering::AcqRel) {
            return false;
        }
        if let Some(prepared) = slot.take() {
            prepared.events.detach();
            drop(prepared.handle);
        }
        debug!("Unloaded {} ({})", self.name(), self.id);
        true
    }

    /// Start playback; the item must be prepared
    pub fn play(&self) -> Result<()> {
        match self.input.lock().as_ref() {
            Some(prepared) => {
                prepared.handle.play();
                Ok(())
            }
            None => Err(Error::NotPrepared(self.id)),
        }
    }

    /// Pause playback; no-op when not prepared
    pub fn pause(&self) {
        if let Some(prepared) = self.input.lock().as_ref() {
            prepared.handle.pause();
        }
    }

    /// Seek within the clip
    ///
    /// `Ok(false)` when not prepared or the device refused the offset.
    pub fn seek(&self, offset: Duration) -> Result<bool> {
        if !self.can_seek() {
            return Err(Error::Unsupported(format!("seeking live item {}", self.name())));
        }
        Ok(self
            .input
            .lock()
            .as_ref()
            .map(|prepared| prepared.handle.seek(offset))
            .unwrap_or(false))
    }

    pub fn is_playing(&self) -> bool {
        self.input
            .lock()
            .as_ref()
            .map(|prepared| prepared.handle.is_playing())
            .unwrap_or(false)
    }

    /// End of stream reached; `true` for an unprepared file item, `false` for live items
    pub fn is_end_of_stream(&self) -> bool {
        if !self.is_file() {
            return false;
        }
        self.input
            .lock()
            .as_ref()
            .map(|prepared| prepared.handle.is_end_of_stream())
            .unwrap_or(true)
    }

    /// Ask the owning rundown to remove this item
    ///
    /// Returns `false` when the item does not belong to a rundown.
    pub fn request_removal(&self) -> bool {
        self.notify(Notification::RemoveRequested)
    }

    /// Release everything the item holds
    pub fn dispose(&self) {
        self.unload();
    }

    /// Snapshot for event payloads
    pub fn info(&self) -> RundownItemInfo {
        RundownItemInfo {
            item_id: self.id.as_uuid(),
            name: self.name().to_string(),
            kind: if self.is_file() {
                RundownItemKind::File
            } else {
                RundownItemKind::Live
            },
            auto_start: self.is_auto_start(),
            disabled: self.is_disabled(),
        }
    }

    /// Prepare cycle of the open input, `None` when not prepared
    pub fn input_cycle(&self) -> Option<u64> {
        self.input.lock().as_ref().map(|prepared| prepared.cycle)
    }

    pub(crate) fn input_handle(&self) -> Option<Arc<dyn PlayerInput>> {
        self.input.lock().as_ref().map(|prepared| Arc::clone(&prepared.handle))
    }

    pub(crate) fn attach(&self, notifier: NotificationSender) {
        *self.notifier.lock() = Some(notifier);
    }

    pub(crate) fn detach(&self) {
        *self.notifier.lock() = None;
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.notifier.lock().is_some()
    }

    fn source(&self) -> InputSource {
        match &self.kind {
            ItemKind::File { media, .. } => InputSource::File {
                path: media.path.clone(),
            },
            ItemKind::Live { name } => InputSource::Live { name: name.clone() },
        }
    }

    fn notify(&self, notification: Notification) -> bool {
        match self.notifier.lock().as_ref() {
            Some(notifier) => notifier.send(ItemNotification::new(self.id, notification)),
            None => false,
        }
    }
}

impl Drop for RundownItem {
    fn drop(&mut self) {
        if self.unload() {
            warn!("Rundown item {} dropped while prepared", self.id);
        }
    }
}

impl std::fmt::Debug for RundownItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RundownItem")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("file", &self.is_file())
            .field("auto_start", &self.is_auto_start())
            .field("disabled", &self.is_disabled())
            .field("prepared", &self.is_prepared())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rundown::notification;
    use crate::testing::{DeviceCall, RecordingDevice};

    fn clip(name: &str) -> RundownItem {
        RundownItem::file(MediaFile::new(format!("/media/{}.mxf", name), Duration::from_secs(10)))
    }

    #[test]
    fn test_prepare_is_exclusive_per_cycle() {
        let device = RecordingDevice::new();
        let item = clip("a");

        assert!(item.prepare(device.as_ref(), 2).unwrap());
        assert!(!item.prepare(device.as_ref(), 2).unwrap());
        assert!(item.is_prepared());
        assert_eq!(device.count(|c| matches!(c, DeviceCall::Open { .. })), 1);

        assert!(item.unload());
        assert!(!item.unload());
        assert!(!item.is_prepared());
        assert_eq!(device.count(|c| matches!(c, DeviceCall::Release(_))), 1);
    }

    #[test]
    fn test_prepare_failure_rolls_back() {
        let device = RecordingDevice::new();
        device.refuse_source("/media/broken.mxf");
        let item = clip("broken");

        assert!(matches!(item.prepare(device.as_ref(), 2), Err(Error::Device(_))));
        assert!(!item.is_prepared());
        assert!(item.input_handle().is_none());
        assert!(!item.unload());
    }

    #[test]
    fn test_play_requires_prepare() {
        let device = RecordingDevice::new();
        let item = clip("a");

        assert!(matches!(item.play(), Err(Error::NotPrepared(id)) if id == item.id()));
        // Pause on an unprepared item is a no-op
        item.pause();

        item.prepare(device.as_ref(), 2).unwrap();
        item.play().unwrap();
        assert!(item.is_playing());
        item.pause();
        assert!(!item.is_playing());
    }

    #[test]
    fn test_seek_support_by_variant() {
        let device = RecordingDevice::new();
        let file = clip("a");
        let live = RundownItem::live("CAM 1");

        assert!(!file.seek(Duration::from_secs(1)).unwrap());
        file.prepare(device.as_ref(), 2).unwrap();
        assert!(file.seek(Duration::from_secs(1)).unwrap());

        assert!(matches!(live.seek(Duration::from_secs(1)), Err(Error::Unsupported(_))));
        assert!(!live.can_seek());
    }

    #[test]
    fn test_looping_pushed_to_input() {
        let device = RecordingDevice::new();
        let item = clip("a");
        item.set_looping(true).unwrap();
        item.prepare(device.as_ref(), 2).unwrap();
        assert!(item.input_handle().unwrap().is_looping());

        item.set_looping(false).unwrap();
        assert!(!item.input_handle().unwrap().is_looping());

        assert!(RundownItem::live("CAM 1").set_looping(true).is_err());
    }

    #[test]
    fn test_flag_changes_notify_only_when_attached_and_changed() {
        let (tx, mut rx) = notification::channel();
        let item = clip("a");

        item.set_auto_start(true);
        assert!(rx.try_recv().is_err());

        item.attach(tx);
        item.set_auto_start(true);
        assert!(rx.try_recv().is_err(), "unchanged value must not notify");

        item.set_disabled(true);
        let n = rx.try_recv().unwrap();
        assert_eq!(n.item_id, item.id());
        assert_eq!(n.notification, Notification::PropertyChanged(ItemProperty::Disabled));

        assert!(item.request_removal());
        assert_eq!(rx.try_recv().unwrap().notification, Notification::RemoveRequested);

        item.detach();
        assert!(!item.request_removal());
    }

    #[test]
    fn test_unload_detaches_device_reports() {
        let (tx, mut rx) = notification::channel();
        let device = RecordingDevice::new();
        let item = clip("a");
        item.attach(tx);
        item.prepare(device.as_ref(), 2).unwrap();

        let events = device.events_for(item.id()).unwrap();
        events.position(Duration::from_secs(1));
        assert!(rx.try_recv().is_ok());

        item.unload();
        events.position(Duration::from_secs(2));
        events.stopped();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_each_prepare_starts_new_cycle() {
        let device = RecordingDevice::new();
        let item = clip("a");
        assert_eq!(item.input_cycle(), None);

        item.prepare(device.as_ref(), 2).unwrap();
        let first = item.input_cycle().unwrap();
        assert_eq!(device.events_for(item.id()).unwrap().cycle(), first);

        item.unload();
        assert_eq!(item.input_cycle(), None);
        item.prepare(device.as_ref(), 2).unwrap();
        let second = item.input_cycle().unwrap();
        assert!(second > first);
        assert_eq!(device.events_for(item.id()).unwrap().cycle(), second);
    }

    #[test]
    fn test_end_of_stream_defaults() {
        let device = RecordingDevice::new();
        let file = clip("a");
        assert!(file.is_end_of_stream());
        file.prepare(device.as_ref(), 2).unwrap();
        assert!(!file.is_end_of_stream());

        assert!(!RundownItem::live("CAM 1").is_end_of_stream());
    }

    #[test]
    fn test_drop_releases_input() {
        let device = RecordingDevice::new();
        let item = clip("a");
        let id = item.id();
        item.prepare(device.as_ref(), 2).unwrap();
        drop(item);

        assert_eq!(device.open_input_count(), 0);
        assert!(device.calls().contains(&DeviceCall::Release(id)));
    }

    #[test]
    fn test_info_snapshot() {
        let item = RundownItem::live("CAM 2");
        item.set_auto_start(true);
        let info = item.info();
        assert_eq!(info.name, "CAM 2");
        assert_eq!(info.kind, RundownItemKind::Live);
        assert!(info.auto_start);
        assert!(!info.disabled);
        assert_eq!(info.item_id, item.id().as_uuid());
    }
}
