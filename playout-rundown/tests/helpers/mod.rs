//! Test helpers for playout-rundown integration tests
//!
//! Provides a scheduler wired to a [`RecordingDevice`] plus shorthands for
//! building rundowns and injecting device reports.

#![allow(dead_code)]

use playout_common::config::ChannelConfig;
use playout_rundown::rundown::{ItemNotification, Notification};
use playout_rundown::testing::{DeviceCall, RecordingDevice};
use playout_rundown::{ItemId, MediaFile, PlaybackDevice, RundownItem, RundownScheduler};
use std::sync::Arc;
use std::time::Duration;

/// Clip length used by [`TestRundown::file`]
pub const CLIP_LENGTH: Duration = Duration::from_secs(10);

pub struct TestRundown {
    pub device: Arc<RecordingDevice>,
    pub scheduler: RundownScheduler,
}

impl TestRundown {
    pub fn new() -> Self {
        Self::with_config(ChannelConfig::named("test"))
    }

    pub fn with_config(config: ChannelConfig) -> Self {
        let device = RecordingDevice::new();
        let shared: Arc<dyn PlaybackDevice> = device.clone();
        let scheduler = RundownScheduler::new(&config, &shared);
        Self { device, scheduler }
    }

    /// Append a 10 second clip
    pub async fn file(&self, name: &str, auto_start: bool) -> Arc<RundownItem> {
        let index = self.scheduler.len().await;
        let item = self
            .scheduler
            .add_file_item(clip(name), index)
            .await
            .expect("append is always in range");
        self.scheduler
            .set_auto_start(item.id(), auto_start)
            .await
            .expect("item was just added");
        item
    }

    /// Report a playback position for `item`
    pub async fn position(&self, item: &RundownItem, millis: u64) {
        let elapsed = Duration::from_millis(millis);
        self.scheduler
            .handle_notification(ItemNotification::new(item.id(), Notification::Position { elapsed }))
            .await;
    }

    /// Report end of stream for `item`
    pub async fn stopped(&self, item: &RundownItem) {
        self.scheduler
            .handle_notification(ItemNotification::new(item.id(), Notification::Stopped))
            .await;
    }

    pub async fn playing_name(&self) -> Option<String> {
        self.scheduler.playing_item().await.map(|i| i.name().to_string())
    }

    pub async fn next_name(&self) -> Option<String> {
        self.scheduler.next_item().await.map(|i| i.name().to_string())
    }

    pub async fn names(&self) -> Vec<String> {
        self.scheduler
            .rundown()
            .await
            .iter()
            .map(|i| i.name().to_string())
            .collect()
    }

    /// Device calls of one kind for `item`
    pub fn opens(&self, item: ItemId) -> usize {
        self.device
            .count(|c| matches!(c, DeviceCall::Open { item: opened, .. } if *opened == item))
    }

    pub fn plays(&self, item: ItemId) -> usize {
        self.device.count(|c| *c == DeviceCall::Play(item))
    }

    pub fn releases(&self, item: ItemId) -> usize {
        self.device.count(|c| *c == DeviceCall::Release(item))
    }
}

pub fn clip(name: &str) -> MediaFile {
    MediaFile::new(format!("/media/{}.mxf", name), CLIP_LENGTH)
}
