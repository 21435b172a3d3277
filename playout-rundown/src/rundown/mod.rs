//! Rundown items and the rundown scheduler

pub mod item;
pub mod lookahead;
pub mod notification;
pub mod scheduler;

pub use item::{ItemId, ItemKind, RundownItem};
pub use notification::{ItemNotification, ItemProperty, Notification, NotificationSender};
pub use scheduler::{RundownScheduler, SchedulerSettings};
