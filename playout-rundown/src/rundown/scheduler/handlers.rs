//! Notification handlers
//!
//! **Responsibilities:**
//! - Draining the inbound notification queue
//! - Preloading the next item as the playing clip nears its end
//! - Advancing to the next item when the playing item stops
//! - Reacting to item property changes and removal requests
//!
//! Devices and items only ever post into the queue; all state changes happen
//! here, one notification at a time, under the scheduler lock. Device reports
//! are acted on only when they come from the playing item's current input.

use super::core::{RundownScheduler, RundownState};
use crate::error::{Error, Result};
use crate::rundown::item::{ItemId, RundownItem};
use crate::rundown::lookahead::should_preload;
use crate::rundown::notification::{ItemNotification, Notification};
use playout_common::events::PlayoutEvent;
use playout_common::time::{duration_to_millis, now};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

impl RundownScheduler {
    /// Worker loop; runs until the scheduler is shut down
    pub(super) async fn notification_worker(self, mut rx: mpsc::UnboundedReceiver<ItemNotification>) {
        info!("Channel {}: notification worker started", self.channel);
        while let Some(notification) = rx.recv().await {
            self.handle_notification(notification).await;
        }
        info!("Channel {}: notification worker stopped", self.channel);
    }

    /// Act on one notification
    ///
    /// Called by the worker for every queued notification. Exposed so that
    /// callers driving the scheduler without a worker can feed it directly.
    pub async fn handle_notification(&self, notification: ItemNotification) {
        let item_id = notification.item_id;
        let cycle = notification.cycle;
        match notification.notification {
            Notification::Position { elapsed } => self.on_position(item_id, cycle, elapsed).await,
            Notification::Stopped => self.on_stopped(item_id, cycle).await,
            Notification::PropertyChanged(property) => {
                trace!("Channel {}: {:?} changed on {}", self.channel, property, item_id);
                let mut state = self.state.lock().await;
                self.recompute_next(&mut state);
            }
            Notification::RemoveRequested => {
                if !self.remove_item(item_id).await {
                    debug!("Channel {}: removal of unknown item {} ignored", self.channel, item_id);
                }
            }
        }
    }

    async fn on_position(&self, item_id: ItemId, cycle: Option<u64>, elapsed: Duration) {
        let state = self.state.lock().await;
        let Some(playing) = playing_input(&state, item_id, cycle) else {
            trace!("Channel {}: position from non-playing input of {} ignored", self.channel, item_id);
            return;
        };

        self.events.emit_lossy(PlayoutEvent::PlaybackPosition {
            channel: self.channel.to_string(),
            item_id: item_id.as_uuid(),
            elapsed_ms: duration_to_millis(elapsed),
            timestamp: now(),
        });

        // Live items have no end to preload against
        let Some(duration) = playing.duration() else {
            return;
        };
        let Some(next) = state.next.as_ref() else {
            return;
        };
        if should_preload(duration, elapsed, state.settings.preload_lead) {
            self.stage(next, state.settings.audio_channel_count);
        }
    }

    /// Prepare `next` and hand it to the device as the follow-up input
    ///
    /// Only the first call per prepare cycle reaches the device. Failures are
    /// logged and leave the item unprepared so that promotion retries it.
    fn stage(&self, next: &Arc<RundownItem>, audio_channel_count: u16) {
        let device = match self.device() {
            Ok(device) => device,
            Err(e) => {
                warn!("Channel {}: cannot preload {}: {}", self.channel, next.name(), e);
                return;
            }
        };

        match next.prepare(device.as_ref(), audio_channel_count) {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                warn!("Channel {}: skipping preload of {}: {}", self.channel, next.name(), e);
                return;
            }
        }

        let staged = next
            .input_handle()
            .ok_or(Error::NotPrepared(next.id()))
            .and_then(|input| device.preload(&input).map_err(Error::from));
        match staged {
            Ok(()) => info!("Channel {}: preloaded {}", self.channel, next.name()),
            Err(e) => {
                warn!("Channel {}: preload of {} failed: {}", self.channel, next.name(), e);
                next.unload();
            }
        }
    }

    async fn on_stopped(&self, item_id: ItemId, cycle: Option<u64>) {
        let mut state = self.state.lock().await;
        if playing_input(&state, item_id, cycle).is_none() {
            warn!("Channel {}: stop from non-playing input of {} rejected", self.channel, item_id);
            return;
        }

        match state.next.take() {
            Some(next) => self.promote(&mut state, next),
            None => {
                info!("Channel {}: end of rundown", self.channel);
                if let Err(e) = self.replace_playing(&mut state, None) {
                    warn!("Channel {}: failed to empty playing slot: {}", self.channel, e);
                }
                self.emit_stopped();
            }
        }
    }

    /// Make the staged next item the playing one
    ///
    /// The item starts exactly once; a staged input is already on the device
    /// and is not loaded again.
    fn promote(&self, state: &mut RundownState, next: Arc<RundownItem>) {
        let disable = state.settings.disable_after_unload;
        if let Some(previous) = state.playing.replace(Arc::clone(&next)) {
            self.release(&previous, disable);
        }

        match self.start_promoted(&next, state.settings.audio_channel_count) {
            Ok(()) => {
                info!("Channel {}: advanced to {}", self.channel, next.name());
                self.emit_loaded(Some(&next));
                self.recompute_next(state);
            }
            Err(e) => {
                error!("Channel {}: failed to advance to {}: {}", self.channel, next.name(), e);
                state.playing = None;
                next.unload();
                self.emit_loaded(None);
                self.recompute_next(state);
                self.emit_stopped();
            }
        }
    }

    fn start_promoted(&self, next: &Arc<RundownItem>, audio_channel_count: u16) -> Result<()> {
        if !next.is_prepared() {
            let device = self.device()?;
            next.prepare(device.as_ref(), audio_channel_count)?;
            let input = next.input_handle().ok_or(Error::NotPrepared(next.id()))?;
            device.load(&input)?;
        }
        next.play()
    }

    fn emit_stopped(&self) {
        self.events.emit_lossy(PlayoutEvent::PlaybackStopped {
            channel: self.channel.to_string(),
            timestamp: now(),
        });
    }
}

/// Playing item, when it is `item_id` and `cycle` names its current input
///
/// Reports injected without a cycle are matched on the item alone.
fn playing_input(state: &RundownState, item_id: ItemId, cycle: Option<u64>) -> Option<&Arc<RundownItem>> {
    state
        .playing
        .as_ref()
        .filter(|p| p.id() == item_id)
        .filter(|p| cycle.is_none() || p.input_cycle() == cycle)
}
