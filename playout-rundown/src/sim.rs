//! Simulated playback device
//!
//! Plays nothing but keeps time: each playing input advances by one tick per
//! tick period on the tokio runtime, reports its position, and at the end of
//! a file either wraps (looping) or stops and reports end of stream. Used by
//! the command-line player and by end-to-end tests.

use crate::device::{DeviceError, InputEvents, InputSource, PlaybackDevice, PlayerInput};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Default interval between position reports
pub const DEFAULT_TICK: Duration = Duration::from_millis(40);

const MIN_TICK: Duration = Duration::from_millis(1);

/// Device that simulates playback timing
pub struct SimulatedDevice {
    runtime: Handle,
    tick: Duration,
    files: Mutex<HashMap<PathBuf, Duration>>,
    live: Mutex<HashSet<String>>,
    inputs: Mutex<Vec<Weak<SimulatedInput>>>,
    slots: Arc<OutputSlots>,
}

/// Inputs routed to the output and staged behind it
///
/// Shared with every input so that a staged input that starts playing takes
/// over the output.
#[derive(Default)]
struct OutputSlots {
    current: Mutex<Option<Weak<SimulatedInput>>>,
    staged: Mutex<Option<Weak<SimulatedInput>>>,
}

impl OutputSlots {
    fn set_current(&self, input: Weak<SimulatedInput>) {
        let mut staged = self.staged.lock();
        if staged.as_ref().is_some_and(|s| s.ptr_eq(&input)) {
            *staged = None;
        }
        *self.current.lock() = Some(input);
    }

    /// Route `input` to the output if it is the staged one
    fn promote_staged(&self, input: &Weak<SimulatedInput>) -> bool {
        let mut staged = self.staged.lock();
        if !staged.as_ref().is_some_and(|s| s.ptr_eq(input)) {
            return false;
        }
        *self.current.lock() = staged.take();
        true
    }
}

impl SimulatedDevice {
    /// Create a device ticking every `tick` on the current tokio runtime
    ///
    /// Must be called from within a runtime. Ticks shorter than a
    /// millisecond are raised to one millisecond.
    pub fn new(tick: Duration) -> Arc<Self> {
        Arc::new(Self {
            runtime: Handle::current(),
            tick: tick.max(MIN_TICK),
            files: Mutex::new(HashMap::new()),
            live: Mutex::new(HashSet::new()),
            inputs: Mutex::new(Vec::new()),
            slots: Arc::new(OutputSlots::default()),
        })
    }

    /// Make a media file available with the given play length
    pub fn register_file(&self, path: impl Into<PathBuf>, duration: Duration) {
        self.files.lock().insert(path.into(), duration);
    }

    /// Make a live input available
    pub fn register_live(&self, name: impl Into<String>) {
        self.live.lock().insert(name.into());
    }

    /// Whether `input` is the one routed to the output
    pub fn is_current(&self, input: &Arc<dyn PlayerInput>) -> bool {
        Self::matches(&self.slots.current.lock(), input)
    }

    /// Whether `input` is staged to follow the current one
    pub fn is_staged(&self, input: &Arc<dyn PlayerInput>) -> bool {
        Self::matches(&self.slots.staged.lock(), input)
    }

    fn file_duration(&self, path: &Path) -> Option<Duration> {
        self.files.lock().get(path).copied()
    }

    fn find(&self, input: &Arc<dyn PlayerInput>) -> Option<Weak<SimulatedInput>> {
        let target = Arc::as_ptr(input) as *const ();
        let mut inputs = self.inputs.lock();
        inputs.retain(|weak| weak.strong_count() > 0);
        inputs
            .iter()
            .find(|weak| weak.as_ptr() as *const () == target)
            .cloned()
    }

    fn matches(slot: &Option<Weak<SimulatedInput>>, input: &Arc<dyn PlayerInput>) -> bool {
        slot.as_ref()
            .is_some_and(|weak| weak.strong_count() > 0 && weak.as_ptr() as *const () == Arc::as_ptr(input) as *const ())
    }
}

impl PlaybackDevice for SimulatedDevice {
    fn open_input(
        &self,
        source: &InputSource,
        _audio_channel_count: u16,
        events: InputEvents,
    ) -> Result<Arc<dyn PlayerInput>, DeviceError> {
        let duration = match source {
            InputSource::File { path } => Some(
                self.file_duration(path)
                    .ok_or_else(|| DeviceError::SourceUnavailable(path.display().to_string()))?,
            ),
            InputSource::Live { name } => {
                if !self.live.lock().contains(name) {
                    return Err(DeviceError::SourceUnavailable(name.clone()));
                }
                None
            }
        };

        let input = Arc::new_cyclic(|this| SimulatedInput {
            this: this.clone(),
            slots: Arc::clone(&self.slots),
            runtime: self.runtime.clone(),
            tick: self.tick,
            duration,
            events,
            position: Mutex::new(Duration::ZERO),
            playing: AtomicBool::new(false),
            looping: AtomicBool::new(false),
            end_of_stream: AtomicBool::new(false),
            ticker: Mutex::new(None),
        });
        self.inputs.lock().push(Arc::downgrade(&input));
        debug!("Opened simulated input for {:?}", source);
        Ok(input)
    }

    fn load(&self, input: &Arc<dyn PlayerInput>) -> Result<(), DeviceError> {
        let found = self
            .find(input)
            .ok_or_else(|| DeviceError::Rejected("input not opened on this device".to_string()))?;
        self.slots.set_current(found);
        Ok(())
    }

    fn preload(&self, input: &Arc<dyn PlayerInput>) -> Result<(), DeviceError> {
        let found = self
            .find(input)
            .ok_or_else(|| DeviceError::Rejected("input not opened on this device".to_string()))?;
        *self.slots.staged.lock() = Some(found);
        Ok(())
    }

    fn clear(&self) {
        *self.slots.current.lock() = None;
        *self.slots.staged.lock() = None;
        debug!("Simulated device cleared");
    }
}

struct SimulatedInput {
    this: Weak<SimulatedInput>,
    slots: Arc<OutputSlots>,
    runtime: Handle,
    tick: Duration,
    /// `None` for live inputs
    duration: Option<Duration>,
    events: InputEvents,
    position: Mutex<Duration>,
    playing: AtomicBool,
    looping: AtomicBool,
    end_of_stream: AtomicBool,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedInput {
    /// Advance one tick; `false` once the ticker should stop
    fn advance(&self) -> bool {
        if !self.playing.load(Ordering::Acquire) {
            return false;
        }

        let mut position = self.position.lock();
        *position += self.tick;
        let Some(duration) = self.duration else {
            self.events.position(*position);
            return true;
        };

        if *position < duration {
            self.events.position(*position);
            return true;
        }

        if self.looping.load(Ordering::Acquire) {
            *position = Duration::ZERO;
            self.events.position(*position);
            return true;
        }

        *position = duration;
        self.playing.store(false, Ordering::Release);
        self.end_of_stream.store(true, Ordering::Release);
        drop(position);
        trace!("Simulated input for {} reached end of stream", self.events.item_id());
        self.events.position(duration);
        self.events.stopped();
        false
    }

    fn stop_ticker(&self) {
        if let Some(ticker) = self.ticker.lock().take() {
            ticker.abort();
        }
    }
}

async fn run_ticker(input: Weak<SimulatedInput>, tick: Duration) {
    let mut interval = tokio::time::interval(tick);
    // First tick completes immediately
    interval.tick().await;
    loop {
        interval.tick().await;
        let Some(input) = input.upgrade() else {
            break;
        };
        if !input.advance() {
            break;
        }
    }
}

impl PlayerInput for SimulatedInput {
    fn play(&self) {
        if self.playing.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.end_of_stream.swap(false, Ordering::AcqRel) {
            *self.position.lock() = Duration::ZERO;
        }
        if self.slots.promote_staged(&self.this) {
            trace!("Staged input for {} took over the output", self.events.item_id());
        }
        self.stop_ticker();
        let handle = self.runtime.spawn(run_ticker(self.this.clone(), self.tick));
        *self.ticker.lock() = Some(handle);
    }

    fn pause(&self) {
        self.playing.store(false, Ordering::Release);
        self.stop_ticker();
    }

    fn seek(&self, offset: Duration) -> bool {
        match self.duration {
            Some(duration) if offset < duration => {
                *self.position.lock() = offset;
                self.end_of_stream.store(false, Ordering::Release);
                true
            }
            _ => false,
        }
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    fn is_end_of_stream(&self) -> bool {
        self.end_of_stream.load(Ordering::Acquire)
    }

    fn set_looping(&self, looping: bool) {
        self.looping.store(looping, Ordering::Release);
    }

    fn is_looping(&self) -> bool {
        self.looping.load(Ordering::Acquire)
    }
}

impl Drop for SimulatedInput {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rundown::notification::{self, Notification};
    use crate::rundown::ItemId;

    fn file_input(device: &SimulatedDevice, path: &str) -> (Arc<dyn PlayerInput>, tokio::sync::mpsc::UnboundedReceiver<notification::ItemNotification>) {
        let (tx, rx) = notification::channel();
        let events = InputEvents::new(ItemId::new(), 1, Some(tx), true);
        let input = device
            .open_input(&InputSource::File { path: path.into() }, 2, events)
            .unwrap();
        (input, rx)
    }

    #[tokio::test]
    async fn test_unknown_sources_refused() {
        let device = SimulatedDevice::new(DEFAULT_TICK);
        let missing = device.open_input(
            &InputSource::File { path: "/media/missing.mxf".into() },
            2,
            InputEvents::disconnected(ItemId::new()),
        );
        assert!(matches!(missing, Err(DeviceError::SourceUnavailable(_))));

        let live = device.open_input(
            &InputSource::Live { name: "CAM 9".into() },
            2,
            InputEvents::disconnected(ItemId::new()),
        );
        assert!(live.is_err());

        device.register_live("CAM 9");
        assert!(device
            .open_input(&InputSource::Live { name: "CAM 9".into() }, 2, InputEvents::disconnected(ItemId::new()))
            .is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_file_plays_to_end() {
        let device = SimulatedDevice::new(Duration::from_millis(100));
        device.register_file("/media/a.mxf", Duration::from_millis(500));
        let (input, mut rx) = file_input(&device, "/media/a.mxf");

        input.play();
        let mut positions = Vec::new();
        loop {
            match rx.recv().await.unwrap().notification {
                Notification::Position { elapsed } => positions.push(elapsed.as_millis()),
                Notification::Stopped => break,
                other => panic!("unexpected {:?}", other),
            }
        }

        assert_eq!(positions, vec![100, 200, 300, 400, 500]);
        assert!(input.is_end_of_stream());
        assert!(!input.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_looping_file_wraps() {
        let device = SimulatedDevice::new(Duration::from_millis(100));
        device.register_file("/media/a.mxf", Duration::from_millis(200));
        let (input, mut rx) = file_input(&device, "/media/a.mxf");
        input.set_looping(true);

        input.play();
        let mut positions = Vec::new();
        while positions.len() < 4 {
            if let Notification::Position { elapsed } = rx.recv().await.unwrap().notification {
                positions.push(elapsed.as_millis());
            }
        }

        assert_eq!(positions, vec![100, 0, 100, 0]);
        assert!(input.is_playing());
        input.pause();
    }

    #[tokio::test]
    async fn test_load_and_preload_slots() {
        let device = SimulatedDevice::new(DEFAULT_TICK);
        device.register_file("/media/a.mxf", Duration::from_secs(5));
        device.register_file("/media/b.mxf", Duration::from_secs(5));
        let (a, _rx_a) = file_input(&device, "/media/a.mxf");
        let (b, _rx_b) = file_input(&device, "/media/b.mxf");

        device.load(&a).unwrap();
        device.preload(&b).unwrap();
        assert!(device.is_current(&a));
        assert!(device.is_staged(&b));

        device.load(&b).unwrap();
        assert!(device.is_current(&b));
        assert!(!device.is_staged(&b));

        device.clear();
        assert!(!device.is_current(&b));
    }

    #[tokio::test]
    async fn test_staged_input_takes_over_on_play() {
        let device = SimulatedDevice::new(DEFAULT_TICK);
        device.register_file("/media/a.mxf", Duration::from_secs(5));
        device.register_file("/media/b.mxf", Duration::from_secs(5));
        let (a, _rx_a) = file_input(&device, "/media/a.mxf");
        let (b, _rx_b) = file_input(&device, "/media/b.mxf");
        device.load(&a).unwrap();
        device.preload(&b).unwrap();

        b.play();

        assert!(device.is_current(&b));
        assert!(!device.is_staged(&b));
        assert!(!device.is_current(&a));
        b.pause();
    }

    #[tokio::test]
    async fn test_seek_bounds() {
        let device = SimulatedDevice::new(DEFAULT_TICK);
        device.register_file("/media/a.mxf", Duration::from_secs(5));
        let (input, _rx) = file_input(&device, "/media/a.mxf");

        assert!(input.seek(Duration::from_secs(2)));
        assert!(!input.seek(Duration::from_secs(60)));
    }
}
