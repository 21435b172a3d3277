//! # Playout Rundown Library (playout-rundown)
//!
//! Rundown scheduling for a single broadcast output channel.
//!
//! **Purpose:** Keep an ordered rundown of file clips and live sources, decide
//! what plays next, and stage the following item on the playback device
//! shortly before the current one ends so that playout is seamless.
//!
//! **Architecture:** The playback device is an external collaborator reached
//! through the [`device`] traits. Device notifications (position, stop) and
//! item notifications (property changes, removal requests) arrive on one
//! inbound channel per scheduler, drained by a single tokio worker.

pub mod channel;
pub mod device;
pub mod error;
pub mod media;
pub mod rundown;
pub mod sim;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use channel::{ChannelRegistry, ChannelUpdate};
pub use device::{DeviceError, InputEvents, InputSource, PlaybackDevice, PlayerInput};
pub use error::{Error, Result};
pub use media::MediaFile;
pub use rundown::{ItemId, RundownItem, RundownScheduler};
