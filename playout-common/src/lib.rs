//! # Playout Common Library
//!
//! Shared code for playout components including:
//! - Event types (PlayoutEvent enum) and the broadcast EventBus
//! - Bootstrap configuration loading and resolution
//! - Error types
//! - Duration helpers

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use events::{EventBus, PlayoutEvent};
