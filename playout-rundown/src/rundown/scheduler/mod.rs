//! Rundown scheduler
//!
//! **Module Structure:**
//! - `core.rs`: Scheduler struct, lifecycle, playing/next slot transitions, transport
//! - `queue.rs`: Rundown mutations (add, submit, move, remove, delete disabled, clear)
//! - `handlers.rs`: Notification worker (position, stop, property change, removal request)

mod core;
mod handlers;
mod queue;

pub use self::core::{RundownScheduler, SchedulerSettings};
