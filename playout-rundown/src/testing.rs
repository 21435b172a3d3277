//! Recording playback device
//!
//! A [`PlaybackDevice`] that plays nothing and records every call it receives,
//! in order. Tests use it to check call sequences and to inject device
//! reports through the [`InputEvents`] sink of any opened input.

use crate::device::{DeviceError, InputEvents, InputSource, PlaybackDevice, PlayerInput};
use crate::rundown::ItemId;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// One recorded device interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    Open { item: ItemId, source: InputSource },
    Load(ItemId),
    Preload(ItemId),
    Clear,
    Play(ItemId),
    Pause(ItemId),
    Seek(ItemId, Duration),
    Release(ItemId),
}

type CallLog = Arc<Mutex<Vec<DeviceCall>>>;

/// Device that records calls instead of playing
#[derive(Default)]
pub struct RecordingDevice {
    calls: CallLog,
    inputs: Mutex<HashMap<ItemId, Weak<RecordedInput>>>,
    events: Mutex<HashMap<ItemId, InputEvents>>,
    refused: Mutex<HashSet<InputSource>>,
    refuse_loads: AtomicBool,
}

impl RecordingDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All calls so far, oldest first
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.lock().clone()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Number of recorded calls matching `predicate`
    pub fn count(&self, predicate: impl Fn(&DeviceCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| predicate(c)).count()
    }

    /// Position of the first call equal to `call`
    pub fn position_of(&self, call: &DeviceCall) -> Option<usize> {
        self.calls.lock().iter().position(|c| c == call)
    }

    /// Report sink of the most recent input opened for `item`
    pub fn events_for(&self, item: ItemId) -> Option<InputEvents> {
        self.events.lock().get(&item).cloned()
    }

    /// Inputs opened and not yet released
    pub fn open_input_count(&self) -> usize {
        self.inputs
            .lock()
            .values()
            .filter(|input| input.strong_count() > 0)
            .count()
    }

    /// Make `open_input` fail for a file path
    pub fn refuse_source(&self, path: &str) {
        self.refused.lock().insert(InputSource::File { path: path.into() });
    }

    /// Make `load` and `preload` fail
    pub fn refuse_loads(&self, refuse: bool) {
        self.refuse_loads.store(refuse, Ordering::Release);
    }

    /// Simulate a device-side end of stream for `item`
    pub fn finish(&self, item: ItemId) {
        if let Some(input) = self.inputs.lock().get(&item).and_then(Weak::upgrade) {
            input.playing.store(false, Ordering::Release);
            input.end_of_stream.store(true, Ordering::Release);
        }
        if let Some(events) = self.events_for(item) {
            events.stopped();
        }
    }

    fn record(&self, call: DeviceCall) {
        self.calls.lock().push(call);
    }

    fn item_of(input: &Arc<dyn PlayerInput>, inputs: &HashMap<ItemId, Weak<RecordedInput>>) -> Option<ItemId> {
        let target = Arc::as_ptr(input) as *const ();
        inputs.iter().find_map(|(item, weak)| {
            (weak.as_ptr() as *const () == target).then_some(*item)
        })
    }
}

impl PlaybackDevice for RecordingDevice {
    fn open_input(
        &self,
        source: &InputSource,
        _audio_channel_count: u16,
        events: InputEvents,
    ) -> Result<Arc<dyn PlayerInput>, DeviceError> {
        let item = events.item_id();
        self.record(DeviceCall::Open {
            item,
            source: source.clone(),
        });
        if self.refused.lock().contains(source) {
            return Err(DeviceError::SourceUnavailable(format!("{:?}", source)));
        }

        let input = Arc::new(RecordedInput {
            item,
            calls: Arc::clone(&self.calls),
            playing: AtomicBool::new(false),
            looping: AtomicBool::new(false),
            end_of_stream: AtomicBool::new(false),
        });
        self.inputs.lock().insert(item, Arc::downgrade(&input));
        self.events.lock().insert(item, events);
        Ok(input)
    }

    fn load(&self, input: &Arc<dyn PlayerInput>) -> Result<(), DeviceError> {
        if self.refuse_loads.load(Ordering::Acquire) {
            return Err(DeviceError::Rejected("load refused".to_string()));
        }
        if let Some(item) = Self::item_of(input, &self.inputs.lock()) {
            self.record(DeviceCall::Load(item));
        }
        Ok(())
    }

    fn preload(&self, input: &Arc<dyn PlayerInput>) -> Result<(), DeviceError> {
        if self.refuse_loads.load(Ordering::Acquire) {
            return Err(DeviceError::Rejected("preload refused".to_string()));
        }
        if let Some(item) = Self::item_of(input, &self.inputs.lock()) {
            self.record(DeviceCall::Preload(item));
        }
        Ok(())
    }

    fn clear(&self) {
        self.record(DeviceCall::Clear);
    }
}

struct RecordedInput {
    item: ItemId,
    calls: CallLog,
    playing: AtomicBool,
    looping: AtomicBool,
    end_of_stream: AtomicBool,
}

impl PlayerInput for RecordedInput {
    fn play(&self) {
        self.playing.store(true, Ordering::Release);
        self.calls.lock().push(DeviceCall::Play(self.item));
    }

    fn pause(&self) {
        self.playing.store(false, Ordering::Release);
        self.calls.lock().push(DeviceCall::Pause(self.item));
    }

    fn seek(&self, offset: Duration) -> bool {
        self.end_of_stream.store(false, Ordering::Release);
        self.calls.lock().push(DeviceCall::Seek(self.item, offset));
        true
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

impl Drop for RecordedInput {
    fn drop(&mut self) {
        self.calls.lock().push(DeviceCall::Release(self.item));
    }
}
