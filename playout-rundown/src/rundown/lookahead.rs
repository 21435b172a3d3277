//! Lookahead rules
//!
//! Pure decisions the scheduler makes while holding its lock: which item
//! follows the playing one, and whether a position report is late enough to
//! stage that item on the device.

use super::item::RundownItem;
use std::sync::Arc;
use std::time::Duration;

/// Find the item that should follow `playing` automatically
///
/// Scans forward from the playing item for the first item that has auto-start
/// set and is not disabled. When nothing qualifies and `looping` is set, the
/// scan wraps to the start of the rundown, never selecting the playing item
/// itself. Without a playing item there is no forward position to scan from,
/// so only the wrapped scan can produce a candidate.
pub fn find_next_auto_play(
    items: &[Arc<RundownItem>],
    playing: Option<&Arc<RundownItem>>,
    looping: bool,
) -> Option<Arc<RundownItem>> {
    let position = playing.and_then(|p| items.iter().position(|i| Arc::ptr_eq(i, p)));

    if let Some(position) = position {
        if let Some(found) = items[position + 1..].iter().find(|i| i.is_auto_playable()) {
            return Some(Arc::clone(found));
        }
    }

    if !looping {
        return None;
    }

    items
        .iter()
        .find(|i| playing.map_or(true, |p| !Arc::ptr_eq(i, p)) && i.is_auto_playable())
        .cloned()
}

/// Whether the successor should be staged now
///
/// True once the remaining play time of the current clip has dropped below
/// `lead`. Elapsed times past the end count as zero remaining.
pub fn should_preload(duration: Duration, elapsed: Duration, lead: Duration) -> bool {
    duration.saturating_sub(elapsed) < lead
}
