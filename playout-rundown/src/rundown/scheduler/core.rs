//! Core scheduler - lifecycle and slot transitions
//!
//! **Responsibilities:**
//! - RundownScheduler struct definition and initialization
//! - Lifecycle control (start, initialize, shutdown)
//! - Playing-slot transitions (load, release, promotion support)
//! - Next-slot bookkeeping (recompute, re-staging)
//! - Transport (play, pause, seek) and status accessors
//!
//! The rundown sequence, the playing item and the next item live together in
//! one `RundownState` behind a single async mutex. Every operation and every
//! notification handler takes that lock, so nothing ever observes a
//! half-updated queue.

use crate::device::PlaybackDevice;
use crate::error::{Error, Result};
use crate::rundown::item::{ItemId, RundownItem};
use crate::rundown::lookahead::find_next_auto_play;
use crate::rundown::notification::{self, ItemNotification, NotificationSender};
use playout_common::config::ChannelConfig;
use playout_common::events::{EventBus, PlayoutEvent};
use playout_common::time::now;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Capacity of the per-channel event bus
const EVENT_BUS_CAPACITY: usize = 256;

/// Per-channel scheduling policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Wrap to the start of the rundown when looking for the next item
    pub looping: bool,
    /// Mark file items disabled when they leave the playing slot
    pub disable_after_unload: bool,
    /// Set auto-start on items as they are added
    pub add_items_with_autoplay: bool,
    /// Remaining play time below which the next item is staged
    pub preload_lead: Duration,
    /// Audio channel count requested when inputs are opened
    pub audio_channel_count: u16,
}

impl From<&ChannelConfig> for SchedulerSettings {
    fn from(config: &ChannelConfig) -> Self {
        Self {
            looping: config.looping,
            disable_after_unload: config.disable_after_unload,
            add_items_with_autoplay: config.add_items_with_autoplay,
            preload_lead: config.preload_lead(),
            audio_channel_count: config.audio_channel_count,
        }
    }
}

/// Everything guarded by the scheduler lock
pub(super) struct RundownState {
    pub(super) items: Vec<Arc<RundownItem>>,
    pub(super) playing: Option<Arc<RundownItem>>,
    pub(super) next: Option<Arc<RundownItem>>,
    pub(super) settings: SchedulerSettings,
}

impl RundownState {
    pub(super) fn position_of(&self, item_id: ItemId) -> Option<usize> {
        self.items.iter().position(|i| i.id() == item_id)
    }

    pub(super) fn is_playing_item(&self, item: &Arc<RundownItem>) -> bool {
        self.playing.as_ref().is_some_and(|p| Arc::ptr_eq(p, item))
    }
}

/// Scheduler for one output channel
///
/// Owns the rundown and the playing/next slots. Shares the playback device
/// without owning it.
pub struct RundownScheduler {
    pub(super) channel: Arc<str>,
    pub(super) device: Weak<dyn PlaybackDevice>,
    pub(super) state: Arc<Mutex<RundownState>>,
    pub(super) events: EventBus,

    /// Inbound notification queue, sending half (cloned into every item)
    pub(super) notifier: NotificationSender,

    /// Inbound notification queue, receiving half
    /// Taken by the worker on start
    pub(super) notification_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<ItemNotification>>>>,

    pub(super) worker: Arc<parking_lot::Mutex<Option<JoinHandle<()>>>>,
}

impl RundownScheduler {
    /// Create a scheduler for `config` driving `device`
    ///
    /// Only a weak reference to the device is kept.
    pub fn new(config: &ChannelConfig, device: &Arc<dyn PlaybackDevice>) -> Self {
        let (notifier, rx) = notification::channel();
        info!("Creating rundown scheduler for channel {}", config.name);
        Self {
            channel: Arc::from(config.name.as_str()),
            device: Arc::downgrade(device),
            state: Arc::new(Mutex::new(RundownState {
                items: Vec::new(),
                playing: None,
                next: None,
                settings: SchedulerSettings::from(config),
            })),
            events: EventBus::new(EVENT_BUS_CAPACITY),
            notifier,
            notification_rx: Arc::new(Mutex::new(Some(rx))),
            worker: Arc::new(parking_lot::Mutex::new(None)),
        }
    }

    /// Clone the inner handles for the worker task
    pub(super) fn clone_handles(&self) -> Self {
        Self {
            channel: Arc::clone(&self.channel),
            device: Weak::clone(&self.device),
            state: Arc::clone(&self.state),
            events: self.events.clone(),
            notifier: self.notifier.clone(),
            notification_rx: Arc::clone(&self.notification_rx),
            worker: Arc::clone(&self.worker),
        }
    }

    /// Start the notification worker
    ///
    /// Device and item notifications are only acted on once the worker runs.
    /// Calling `start` again is a no-op.
    pub async fn start(&self) {
        let rx = match self.notification_rx.lock().await.take() {
            Some(rx) => rx,
            None => {
                debug!("Channel {}: notification worker already started", self.channel);
                return;
            }
        };

        let this = self.clone_handles();
        let handle = tokio::spawn(async move {
            this.notification_worker(rx).await;
        });
        *self.worker.lock() = Some(handle);
        info!("Channel {}: scheduler started", self.channel);
    }

    /// Whether the notification worker is running
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }

    pub fn channel_name(&self) -> &str {
        &self.channel
    }

    /// Sender for the inbound notification queue
    pub fn notifier(&self) -> NotificationSender {
        self.notifier.clone()
    }

    /// Subscribe to events emitted by this channel
    pub fn subscribe(&self) -> broadcast::Receiver<PlayoutEvent> {
        self.events.subscribe()
    }

    /// Unload whatever is playing; the rundown is kept
    ///
    /// Used when the channel's output is re-initialised.
    pub async fn initialize(&self) {
        let mut state = self.state.lock().await;
        self.release_playing(&mut state);
        info!("Channel {}: initialized", self.channel);
    }

    /// Release every item and stop the notification worker
    ///
    /// After shutdown no item of this rundown holds a device input.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        self.release_playing(&mut state);
        self.set_next(&mut state, None);
        while let Some(first) = state.items.first().map(|i| i.id()) {
            self.remove_locked(&mut state, first);
        }
        self.set_next(&mut state, None);
        drop(state);

        self.stop_worker();
        info!("Channel {}: scheduler shut down", self.channel);
    }

    fn stop_worker(&self) {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            worker.abort();
        }
    }

    /// Apply new channel settings in place
    pub async fn apply_config(&self, config: &ChannelConfig) {
        let mut state = self.state.lock().await;
        state.settings = SchedulerSettings::from(config);
        self.recompute_next(&mut state);
    }

    pub async fn settings(&self) -> SchedulerSettings {
        self.state.lock().await.settings.clone()
    }

    pub async fn set_looping(&self, looping: bool) {
        let mut state = self.state.lock().await;
        if state.settings.looping != looping {
            state.settings.looping = looping;
            self.recompute_next(&mut state);
        }
    }

    pub async fn is_looping(&self) -> bool {
        self.state.lock().await.settings.looping
    }

    pub async fn set_disable_after_unload(&self, disable: bool) {
        self.state.lock().await.settings.disable_after_unload = disable;
    }

    pub async fn disable_after_unload(&self) -> bool {
        self.state.lock().await.settings.disable_after_unload
    }

    pub async fn set_add_items_with_autoplay(&self, autoplay: bool) {
        self.state.lock().await.settings.add_items_with_autoplay = autoplay;
    }

    pub async fn add_items_with_autoplay(&self) -> bool {
        self.state.lock().await.settings.add_items_with_autoplay
    }

    /// Make a rundown member the playing item
    ///
    /// The previous playing item is paused and unloaded. The new item is
    /// prepared, loaded on the device and started when it has auto-start set.
    /// Loading the item that is already playing does nothing.
    pub async fn load(&self, item_id: ItemId) -> Result<()> {
        let mut state = self.state.lock().await;
        let position = state.position_of(item_id).ok_or(Error::UnknownItem(item_id))?;
        let item = Arc::clone(&state.items[position]);
        self.replace_playing(&mut state, Some(item))
    }

    /// Play the playing item; `false` when nothing is loaded
    pub async fn play(&self) -> Result<bool> {
        let state = self.state.lock().await;
        match &state.playing {
            Some(item) => {
                item.play()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn pause(&self) {
        if let Some(item) = &self.state.lock().await.playing {
            item.pause();
        }
    }

    /// Seek the playing item
    ///
    /// `Ok(false)` when nothing is loaded; `Error::Unsupported` for live items.
    pub async fn seek(&self, offset: Duration) -> Result<bool> {
        match &self.state.lock().await.playing {
            Some(item) => item.seek(offset),
            None => Ok(false),
        }
    }

    pub async fn is_playing(&self) -> bool {
        self.state
            .lock()
            .await
            .playing
            .as_ref()
            .is_some_and(|item| item.is_playing())
    }

    /// End of stream of the playing file; `true` when no file is playing
    pub async fn is_end_of_stream(&self) -> bool {
        match &self.state.lock().await.playing {
            Some(item) if item.is_file() => item.is_end_of_stream(),
            _ => true,
        }
    }

    pub async fn playing_item(&self) -> Option<Arc<RundownItem>> {
        self.state.lock().await.playing.clone()
    }

    /// Item that will follow the playing one automatically
    pub async fn next_item(&self) -> Option<Arc<RundownItem>> {
        self.state.lock().await.next.clone()
    }

    pub(super) fn device(&self) -> Result<Arc<dyn PlaybackDevice>> {
        self.device.upgrade().ok_or(Error::DeviceUnavailable)
    }

    /// Swap the playing item
    ///
    /// The previous item is released (with the disable-after-unload policy);
    /// the new one is prepared, loaded and auto-started. A failure to start
    /// leaves the playing slot empty and is returned to the caller.
    pub(super) fn replace_playing(
        &self,
        state: &mut RundownState,
        item: Option<Arc<RundownItem>>,
    ) -> Result<()> {
        if same_item(state.playing.as_ref(), item.as_ref()) {
            return Ok(());
        }

        let disable = state.settings.disable_after_unload;
        if let Some(previous) = std::mem::replace(&mut state.playing, item.clone()) {
            self.release(&previous, disable);
        }

        let mut result = Ok(());
        if let Some(item) = item {
            result = self.start_item(state, &item);
            if let Err(e) = &result {
                warn!("Channel {}: failed to load {}: {}", self.channel, item.name(), e);
                state.playing = None;
                item.unload();
            }
        }

        self.emit_loaded(state.playing.as_ref());
        self.recompute_next(state);
        result
    }

    /// Empty the playing slot without the disable-after-unload policy
    pub(super) fn release_playing(&self, state: &mut RundownState) {
        if let Some(previous) = state.playing.take() {
            self.release(&previous, false);
            self.emit_loaded(None);
            self.recompute_next(state);
        }
    }

    /// Take an item out of the playing slot's control
    pub(super) fn release(&self, item: &Arc<RundownItem>, disable: bool) {
        debug!("Channel {}: releasing {}", self.channel, item.name());
        if disable && item.is_file() {
            item.set_disabled(true);
        }
        item.pause();
        item.unload();
    }

    fn start_item(&self, state: &RundownState, item: &Arc<RundownItem>) -> Result<()> {
        let device = self.device()?;
        item.prepare(device.as_ref(), state.settings.audio_channel_count)?;
        let input = item.input_handle().ok_or(Error::NotPrepared(item.id()))?;
        device.load(&input)?;
        info!("Channel {}: loaded {}", self.channel, item.name());
        if item.is_auto_start() {
            item.play()?;
        }
        Ok(())
    }

    /// Recompute the next item from the current rundown
    pub(super) fn recompute_next(&self, state: &mut RundownState) {
        let candidate =
            find_next_auto_play(&state.items, state.playing.as_ref(), state.settings.looping);
        self.set_next(state, candidate);
    }

    /// Record a new next item
    ///
    /// The previous next item is unloaded first, so at most one item is ever
    /// prepared ahead. It is left alone when it has meanwhile become the
    /// playing item.
    pub(super) fn set_next(&self, state: &mut RundownState, candidate: Option<Arc<RundownItem>>) {
        if same_item(state.next.as_ref(), candidate.as_ref()) {
            return;
        }
        if let Some(previous) = std::mem::replace(&mut state.next, candidate) {
            if !state.is_playing_item(&previous) && previous.unload() {
                debug!("Channel {}: released staged {}", self.channel, previous.name());
            }
        }
        debug!(
            "Channel {}: next item is {:?}",
            self.channel,
            state.next.as_ref().map(|n| n.name().to_string())
        );
    }

    pub(super) fn emit_loaded(&self, item: Option<&Arc<RundownItem>>) {
        self.events.emit_lossy(PlayoutEvent::ItemLoaded {
            channel: self.channel.to_string(),
            item: item.map(|i| i.info()),
            timestamp: now(),
        });
    }
}

impl Drop for RundownScheduler {
    /// Items keep the inbound queue open, so the worker never sees it close
    /// on its own; stop it with the last user handle.
    fn drop(&mut self) {
        self.stop_worker();
    }
}

fn same_item(a: Option<&Arc<RundownItem>>, b: Option<&Arc<RundownItem>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaFile;
    use crate::testing::{DeviceCall, RecordingDevice};

    fn scheduler(device: &Arc<RecordingDevice>) -> RundownScheduler {
        let device: Arc<dyn PlaybackDevice> = device.clone();
        RundownScheduler::new(&ChannelConfig::named("test"), &device)
    }

    fn clip(name: &str) -> MediaFile {
        MediaFile::new(format!("/media/{}.mxf", name), Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_load_prepares_loads_and_auto_starts() {
        let device = RecordingDevice::new();
        let scheduler = scheduler(&device);
        let a = scheduler.add_file_item(clip("a"), 0).await.unwrap();
        a.set_auto_start(true);

        scheduler.load(a.id()).await.unwrap();

        assert!(a.is_prepared());
        assert!(scheduler.is_playing().await);
        let calls = device.calls();
        assert!(matches!(calls[0], DeviceCall::Open { item, .. } if item == a.id()));
        assert_eq!(calls[1], DeviceCall::Load(a.id()));
        assert_eq!(calls[2], DeviceCall::Play(a.id()));
    }

    #[tokio::test]
    async fn test_load_without_auto_start_waits_for_play() {
        let device = RecordingDevice::new();
        let scheduler = scheduler(&device);
        let a = scheduler.add_file_item(clip("a"), 0).await.unwrap();

        scheduler.load(a.id()).await.unwrap();
        assert!(!scheduler.is_playing().await);

        assert!(scheduler.play().await.unwrap());
        assert!(scheduler.is_playing().await);
        scheduler.pause().await;
        assert!(!scheduler.is_playing().await);
    }

    #[tokio::test]
    async fn test_load_unknown_item_rejected() {
        let device = RecordingDevice::new();
        let scheduler = scheduler(&device);
        let stray = RundownItem::file(clip("stray"));

        let result = scheduler.load(stray.id()).await;
        assert!(matches!(result, Err(Error::UnknownItem(id)) if id == stray.id()));
        assert!(device.calls().is_empty());
    }

    #[tokio::test]
    async fn test_load_replaces_previous_item() {
        let device = RecordingDevice::new();
        let scheduler = scheduler(&device);
        let a = scheduler.add_file_item(clip("a"), 0).await.unwrap();
        let b = scheduler.add_file_item(clip("b"), 1).await.unwrap();

        scheduler.load(a.id()).await.unwrap();
        scheduler.load(b.id()).await.unwrap();

        assert!(!a.is_prepared());
        assert!(b.is_prepared());
        assert!(!a.is_disabled());
        let pause = device.position_of(&DeviceCall::Pause(a.id())).unwrap();
        let release = device.position_of(&DeviceCall::Release(a.id())).unwrap();
        let load_b = device.position_of(&DeviceCall::Load(b.id())).unwrap();
        assert!(pause < release && release < load_b);
    }

    #[tokio::test]
    async fn test_disable_after_unload_marks_previous_item() {
        let device = RecordingDevice::new();
        let scheduler = scheduler(&device);
        scheduler.set_disable_after_unload(true).await;
        let a = scheduler.add_file_item(clip("a"), 0).await.unwrap();
        let b = scheduler.add_file_item(clip("b"), 1).await.unwrap();

        scheduler.load(a.id()).await.unwrap();
        scheduler.load(b.id()).await.unwrap();

        assert!(a.is_disabled());
        assert!(!b.is_disabled());
    }

    #[tokio::test]
    async fn test_load_failure_leaves_slot_empty() {
        let device = RecordingDevice::new();
        device.refuse_loads(true);
        let scheduler = scheduler(&device);
        let a = scheduler.add_file_item(clip("a"), 0).await.unwrap();

        assert!(matches!(scheduler.load(a.id()).await, Err(Error::Device(_))));
        assert!(scheduler.playing_item().await.is_none());
        assert!(!a.is_prepared());
    }

    #[tokio::test]
    async fn test_device_dropped() {
        let device = RecordingDevice::new();
        let scheduler = scheduler(&device);
        let a = scheduler.add_file_item(clip("a"), 0).await.unwrap();
        drop(device);

        assert!(matches!(scheduler.load(a.id()).await, Err(Error::DeviceUnavailable)));
    }

    #[tokio::test]
    async fn test_seek_and_end_of_stream() {
        let device = RecordingDevice::new();
        let scheduler = scheduler(&device);
        assert!(!scheduler.seek(Duration::from_secs(1)).await.unwrap());
        assert!(scheduler.is_end_of_stream().await);

        let live = scheduler.add_live_item("CAM 1", 0).await.unwrap();
        scheduler.load(live.id()).await.unwrap();
        assert!(matches!(scheduler.seek(Duration::from_secs(1)).await, Err(Error::Unsupported(_))));
        assert!(scheduler.is_end_of_stream().await);

        let a = scheduler.add_file_item(clip("a"), 1).await.unwrap();
        scheduler.load(a.id()).await.unwrap();
        assert!(!scheduler.is_end_of_stream().await);
        assert!(scheduler.seek(Duration::from_secs(3)).await.unwrap());
        assert!(device.calls().contains(&DeviceCall::Seek(a.id(), Duration::from_secs(3))));
    }

    #[tokio::test]
    async fn test_initialize_unloads_playing_keeps_rundown() {
        let device = RecordingDevice::new();
        let scheduler = scheduler(&device);
        let a = scheduler.add_file_item(clip("a"), 0).await.unwrap();
        scheduler.load(a.id()).await.unwrap();

        scheduler.initialize().await;

        assert!(scheduler.playing_item().await.is_none());
        assert!(!a.is_prepared());
        assert_eq!(scheduler.len().await, 1);
    }

    #[tokio::test]
    async fn test_shutdown_releases_everything() {
        let device = RecordingDevice::new();
        let scheduler = scheduler(&device);
        scheduler.start().await;
        assert!(scheduler.is_running());

        let a = scheduler.add_file_item(clip("a"), 0).await.unwrap();
        let b = scheduler.add_file_item(clip("b"), 1).await.unwrap();
        b.set_auto_start(true);
        scheduler.load(a.id()).await.unwrap();
        assert!(a.is_prepared());

        scheduler.shutdown().await;

        assert!(scheduler.is_empty().await);
        assert!(scheduler.playing_item().await.is_none());
        assert!(scheduler.next_item().await.is_none());
        assert_eq!(device.open_input_count(), 0);
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_drop_stops_worker() {
        let device = RecordingDevice::new();
        let scheduler = scheduler(&device);
        scheduler.start().await;
        scheduler.add_file_item(clip("a"), 0).await.unwrap();
        let worker = Arc::clone(&scheduler.worker);
        let mut events = scheduler.subscribe();

        drop(scheduler);

        // The bus closes once the worker's handles are gone
        assert!(matches!(events.recv().await, Err(broadcast::error::RecvError::Closed)));
        assert!(worker.lock().is_none());
    }

    #[tokio::test]
    async fn test_apply_config_updates_settings() {
        let device = RecordingDevice::new();
        let scheduler = scheduler(&device);
        let mut config = ChannelConfig::named("test");
        config.looping = true;
        config.preload_lead_ms = 500;

        scheduler.apply_config(&config).await;

        let settings = scheduler.settings().await;
        assert!(settings.looping);
        assert_eq!(settings.preload_lead, Duration::from_millis(500));
        assert!(scheduler.is_looping().await);
    }
}
