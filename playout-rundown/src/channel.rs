//! Output channel registry
//!
//! **Responsibilities:**
//! - Own one playback device and one rundown scheduler per configured channel
//! - Reconcile the running channels with a new channel configuration
//! - Shut every channel down together
//!
//! Devices are created through a [`DeviceFactory`] so the registry does not
//! care whether it drives real outputs or simulated ones.

use crate::device::PlaybackDevice;
use crate::error::{Error, Result};
use crate::rundown::RundownScheduler;
use playout_common::config::{ChannelConfig, TomlConfig};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Creates the playback device for a channel
pub trait DeviceFactory: Send + Sync {
    fn create(&self, config: &ChannelConfig) -> Arc<dyn PlaybackDevice>;
}

impl<F> DeviceFactory for F
where
    F: Fn(&ChannelConfig) -> Arc<dyn PlaybackDevice> + Send + Sync,
{
    fn create(&self, config: &ChannelConfig) -> Arc<dyn PlaybackDevice> {
        self(config)
    }
}

/// One entry of a channel reconfiguration
#[derive(Debug, Clone)]
pub struct ChannelUpdate {
    pub config: ChannelConfig,
    /// Re-initialise the channel's output (unloads its playing item)
    pub needs_reinitialization: bool,
}

impl ChannelUpdate {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            needs_reinitialization: false,
        }
    }

    pub fn reinitialize(mut self) -> Self {
        self.needs_reinitialization = true;
        self
    }
}

struct Channel {
    /// Strong owner; schedulers only hold it weakly
    _device: Arc<dyn PlaybackDevice>,
    scheduler: Arc<RundownScheduler>,
}

/// Running output channels by name
pub struct ChannelRegistry {
    factory: Box<dyn DeviceFactory>,
    channels: BTreeMap<String, Channel>,
}

impl ChannelRegistry {
    pub fn new(factory: impl DeviceFactory + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            channels: BTreeMap::new(),
        }
    }

    /// Create and start every channel named in `config`
    pub async fn from_config(config: &TomlConfig, factory: impl DeviceFactory + 'static) -> Self {
        let mut registry = Self::new(factory);
        registry
            .update_channels(config.channels.iter().cloned().map(ChannelUpdate::new).collect())
            .await;
        registry
    }

    /// Reconcile running channels with `updates`
    ///
    /// Channels no longer listed are shut down, listed ones that already run
    /// get the new settings (and are re-initialised when flagged), and new
    /// ones are created and started.
    pub async fn update_channels(&mut self, updates: Vec<ChannelUpdate>) {
        let removed: Vec<String> = self
            .channels
            .keys()
            .filter(|name| !updates.iter().any(|u| &u.config.name == *name))
            .cloned()
            .collect();
        for name in removed {
            if let Some(channel) = self.channels.remove(&name) {
                info!("Removing channel {}", name);
                channel.scheduler.shutdown().await;
            }
        }

        for update in updates {
            match self.channels.get(&update.config.name) {
                Some(channel) => {
                    channel.scheduler.apply_config(&update.config).await;
                    if update.needs_reinitialization {
                        channel.scheduler.initialize().await;
                    }
                }
                None => {
                    let device = self.factory.create(&update.config);
                    let scheduler = Arc::new(RundownScheduler::new(&update.config, &device));
                    scheduler.start().await;
                    info!("Added channel {}", update.config.name);
                    self.channels.insert(
                        update.config.name.clone(),
                        Channel {
                            _device: device,
                            scheduler,
                        },
                    );
                }
            }
        }
    }

    /// Scheduler of the named channel
    pub fn channel(&self, name: &str) -> Result<Arc<RundownScheduler>> {
        self.channels
            .get(name)
            .map(|channel| Arc::clone(&channel.scheduler))
            .ok_or_else(|| Error::UnknownChannel(name.to_string()))
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.keys().cloned().collect()
    }

    /// Shut down every channel; the registry is empty afterwards
    pub async fn shutdown(&mut self) {
        if self.channels.is_empty() {
            warn!("Channel registry shut down with no channels");
        }
        for (name, channel) in std::mem::take(&mut self.channels) {
            channel.scheduler.shutdown().await;
            info!("Channel {} stopped", name);
        }
    }
}
