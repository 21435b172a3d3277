//! Rundown mutations
//!
//! **Responsibilities:**
//! - Adding file and live items at a position, and appending submitted files
//! - Reordering and removal (single, disabled sweep, clear)
//! - Read-only rundown queries
//!
//! Every mutation recomputes the next item before releasing the lock.

use super::core::{RundownScheduler, RundownState};
use crate::error::{Error, Result};
use crate::media::MediaFile;
use crate::rundown::item::{ItemId, RundownItem};
use playout_common::events::PlayoutEvent;
use playout_common::time::now;
use std::sync::Arc;
use tracing::{debug, info, warn};

impl RundownScheduler {
    /// Insert a file item at `index`
    ///
    /// `index` may equal the rundown length (append). With
    /// add-items-with-autoplay active the item gets auto-start set.
    pub async fn add_file_item(&self, media: MediaFile, index: usize) -> Result<Arc<RundownItem>> {
        self.insert_item(RundownItem::file(media), index).await
    }

    /// Insert a live item at `index`
    pub async fn add_live_item(&self, name: impl Into<String>, index: usize) -> Result<Arc<RundownItem>> {
        self.insert_item(RundownItem::live(name), index).await
    }

    /// Append a file item handed over from outside the operator view
    ///
    /// The autoplay policy is not applied.
    pub async fn submit(&self, media: MediaFile) -> Arc<RundownItem> {
        let item = Arc::new(RundownItem::file(media));
        let mut state = self.state.lock().await;
        item.attach(self.notifier.clone());
        state.items.push(Arc::clone(&item));
        info!("Channel {}: submitted {}", self.channel, item.name());

        self.events.emit_lossy(PlayoutEvent::ItemSubmitted {
            channel: self.channel.to_string(),
            item: item.info(),
            timestamp: now(),
        });
        self.recompute_next(&mut state);
        item
    }

    async fn insert_item(&self, item: RundownItem, index: usize) -> Result<Arc<RundownItem>> {
        let mut state = self.state.lock().await;
        let len = state.items.len();
        if index > len {
            return Err(Error::InvalidIndex { index, len });
        }

        // Not attached yet, so this does not notify
        if state.settings.add_items_with_autoplay {
            item.set_auto_start(true);
        }
        let item = Arc::new(item);
        item.attach(self.notifier.clone());
        state.items.insert(index, Arc::clone(&item));
        info!("Channel {}: added {} at {}", self.channel, item.name(), index);

        self.recompute_next(&mut state);
        Ok(item)
    }

    /// Move the item at `source` so that it ends up at `destination`
    pub async fn move_item(&self, source: usize, destination: usize) -> Result<()> {
        let mut state = self.state.lock().await;
        let len = state.items.len();
        if source >= len {
            return Err(Error::InvalidIndex { index: source, len });
        }
        if destination >= len {
            return Err(Error::InvalidIndex { index: destination, len });
        }

        let item = state.items.remove(source);
        debug!("Channel {}: moving {} from {} to {}", self.channel, item.name(), source, destination);
        state.items.insert(destination, item);
        self.recompute_next(&mut state);
        Ok(())
    }

    /// Remove an item from the rundown
    ///
    /// A playing item keeps playing after removal; any other item is disposed.
    /// Returns `false` when the item is not a member.
    pub async fn remove_item(&self, item_id: ItemId) -> bool {
        let mut state = self.state.lock().await;
        let removed = self.remove_locked(&mut state, item_id).is_some();
        if removed {
            self.recompute_next(&mut state);
        }
        removed
    }

    /// Remove every disabled item; returns how many were removed
    pub async fn delete_disabled(&self) -> usize {
        let mut state = self.state.lock().await;
        let mut removed = 0;
        while let Some(id) = state.items.iter().find(|i| i.is_disabled()).map(|i| i.id()) {
            if self.remove_locked(&mut state, id).is_none() {
                warn!("Channel {}: disabled item {} vanished during sweep", self.channel, id);
                break;
            }
            removed += 1;
        }
        if removed > 0 {
            info!("Channel {}: deleted {} disabled item(s)", self.channel, removed);
            self.recompute_next(&mut state);
        }
        removed
    }

    /// Empty the rundown and the device
    ///
    /// The playing item is released without the disable-after-unload policy.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        self.release_playing(&mut state);
        self.set_next(&mut state, None);
        while let Some(first) = state.items.first().map(|i| i.id()) {
            self.remove_locked(&mut state, first);
        }
        self.set_next(&mut state, None);

        match self.device() {
            Ok(device) => device.clear(),
            Err(e) => debug!("Channel {}: nothing to clear on device: {}", self.channel, e),
        }
        info!("Channel {}: rundown cleared", self.channel);
    }

    /// Set auto-start on a rundown member
    pub async fn set_auto_start(&self, item_id: ItemId, auto_start: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        let item = Self::member(&state, item_id)?;
        item.set_auto_start(auto_start);
        self.recompute_next(&mut state);
        Ok(())
    }

    /// Enable or disable a rundown member
    pub async fn set_disabled(&self, item_id: ItemId, disabled: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        let item = Self::member(&state, item_id)?;
        item.set_disabled(disabled);
        self.recompute_next(&mut state);
        Ok(())
    }

    /// Snapshot of the rundown in order
    pub async fn rundown(&self) -> Vec<Arc<RundownItem>> {
        self.state.lock().await.items.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.items.is_empty()
    }

    pub async fn item_at(&self, index: usize) -> Option<Arc<RundownItem>> {
        self.state.lock().await.items.get(index).cloned()
    }

    pub async fn find_item(&self, item_id: ItemId) -> Option<Arc<RundownItem>> {
        Self::member(&*self.state.lock().await, item_id).ok()
    }

    /// Take an item out of the sequence without recomputing the next item
    pub(super) fn remove_locked(&self, state: &mut RundownState, item_id: ItemId) -> Option<Arc<RundownItem>> {
        let position = state.position_of(item_id)?;
        let item = state.items.remove(position);
        item.detach();
        if !state.is_playing_item(&item) {
            item.dispose();
        }
        info!("Channel {}: removed {}", self.channel, item.name());

        self.events.emit_lossy(PlayoutEvent::ItemRemoved {
            channel: self.channel.to_string(),
            item: item.info(),
            timestamp: now(),
        });
        Some(item)
    }

    fn member(state: &RundownState, item_id: ItemId) -> Result<Arc<RundownItem>> {
        state
            .position_of(item_id)
            .map(|position| Arc::clone(&state.items[position]))
            .ok_or(Error::UnknownItem(item_id))
    }
}
