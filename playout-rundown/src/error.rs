//! Error types for playout-rundown
//!
//! Errors raised by rundown operations, using thiserror for propagation.

use crate::device::DeviceError;
use crate::rundown::ItemId;
use thiserror::Error;

/// Main error type for playout-rundown
#[derive(Error, Debug)]
pub enum Error {
    /// Insertion or move index outside the rundown
    #[error("Invalid index {index} for rundown of length {len}")]
    InvalidIndex { index: usize, len: usize },

    /// Item is not a member of this rundown
    #[error("Item not in rundown: {0}")]
    UnknownItem(ItemId),

    /// Operation requires a prepared item
    #[error("Item not prepared: {0}")]
    NotPrepared(ItemId),

    /// Operation not supported by the item variant
    #[error("Not supported: {0}")]
    Unsupported(String),

    /// Playback device refused a request
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// Playback device has been dropped
    #[error("Playback device is no longer available")]
    DeviceUnavailable,

    /// No channel with the given name is configured
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),
}

/// Convenience Result type using playout-rundown Error
pub type Result<T> = std::result::Result<T, Error>;
