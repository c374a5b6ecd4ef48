//! Test infrastructure for voice-playback-rs integration tests.
//!
//! Provides a recording playback device, a recording ducking controller
//! and helper functions for testing the engine without real audio
//! hardware.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::mpsc;

// Re-export key types from the main crate
pub use voice_playback_rs::ducking::{DuckingAction, DuckingControl};
pub use voice_playback_rs::error::{Error, Result};
pub use voice_playback_rs::event::{Event, EventBus, Subscriber};
pub use voice_playback_rs::options::{AudioOptions, SampleFormat, StreamCategory};
pub use voice_playback_rs::player::{self, PlayerAction, PlayerState, SharedPlayer};
pub use voice_playback_rs::sink::{request_channel, BufferRequest, BufferRequests, PlaybackSink};

/// Call log of a [RecordingSink], shared with the test body.
#[derive(Default)]
pub struct SinkLog {
    pub policies: Vec<StreamCategory>,
    pub prepares: usize,
    pub pauses: usize,
    pub unprepares: usize,
    pub reconfigured_rates: Vec<u32>,
    pub writes: Vec<Bytes>,
    pub fail_policy: bool,
    pub fail_prepare: bool,
    pub fail_write: bool,
}

/// Playback device stand-in that records every call it receives.
///
/// Tests drive buffer requests themselves instead of running a paced
/// request loop, so delivery is fully deterministic.
#[derive(Clone, Default)]
pub struct RecordingSink {
    log: Arc<Mutex<SinkLog>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> std::sync::MutexGuard<'_, SinkLog> {
        self.log.lock().unwrap()
    }

    /// Makes apply_stream_policy() fail until cleared.
    pub fn fail_policy(&self, fail: bool) {
        self.log().fail_policy = fail;
    }

    /// Makes prepare() fail until cleared.
    pub fn fail_prepare(&self, fail: bool) {
        self.log().fail_prepare = fail;
    }

    /// Makes write() fail until cleared.
    pub fn fail_write(&self, fail: bool) {
        self.log().fail_write = fail;
    }

    /// Lengths of the chunks written so far.
    pub fn write_lens(&self) -> Vec<usize> {
        self.log().writes.iter().map(|chunk| chunk.len()).collect()
    }

    /// All written audio flattened into one buffer.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.log()
            .writes
            .iter()
            .flat_map(|chunk| chunk.iter().copied())
            .collect()
    }
}

#[async_trait]
impl PlaybackSink for RecordingSink {
    async fn apply_stream_policy(&mut self, category: StreamCategory) -> Result<()> {
        let mut log = self.log();
        if log.fail_policy {
            return Err(Error::Device("policy refused".to_string()));
        }
        log.policies.push(category);
        Ok(())
    }

    async fn prepare(&mut self) -> Result<()> {
        let mut log = self.log();
        if log.fail_prepare {
            return Err(Error::Device("refusing to prepare".to_string()));
        }
        log.prepares += 1;
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        self.log().pauses += 1;
        Ok(())
    }

    async fn unprepare(&mut self) -> Result<()> {
        self.log().unprepares += 1;
        Ok(())
    }

    async fn write(&mut self, chunk: Bytes) -> Result<()> {
        let mut log = self.log();
        if log.fail_write {
            return Err(Error::Device("write refused".to_string()));
        }
        log.writes.push(chunk);
        Ok(())
    }

    async fn reconfigure(&mut self, options: &AudioOptions) -> Result<()> {
        self.log().reconfigured_rates.push(options.sample_rate);
        Ok(())
    }
}

/// Call log of a [RecordingDucking], shared with the test body.
#[derive(Default)]
pub struct DuckingLog {
    pub activations: Vec<(Duration, f64)>,
    pub deactivations: usize,
    pub fail_activate: bool,
}

/// Ducking controller stand-in that records activations.
#[derive(Clone, Default)]
pub struct RecordingDucking {
    log: Arc<Mutex<DuckingLog>>,
}

impl RecordingDucking {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> std::sync::MutexGuard<'_, DuckingLog> {
        self.log.lock().unwrap()
    }

    /// Makes activate() fail until cleared.
    pub fn fail_activate(&self, fail: bool) {
        self.log().fail_activate = fail;
    }

    pub fn activations(&self) -> usize {
        self.log().activations.len()
    }

    pub fn deactivations(&self) -> usize {
        self.log().deactivations
    }
}

#[async_trait]
impl DuckingControl for RecordingDucking {
    async fn activate(&mut self, duration: Duration, ratio: f64) -> Result<()> {
        let mut log = self.log();
        if log.fail_activate {
            return Err(Error::Ducking("no competing stream".to_string()));
        }
        log.activations.push((duration, ratio));
        Ok(())
    }

    async fn deactivate(&mut self) -> Result<()> {
        self.log().deactivations += 1;
        Ok(())
    }
}

/// A fully wired engine plus handles to drive and observe it.
pub struct TestEngine {
    pub bus: EventBus,
    pub player: SharedPlayer,
    pub sink: RecordingSink,
    pub ducking: RecordingDucking,
    pub requests_tx: mpsc::Sender<BufferRequest>,
    requests_rx: Option<BufferRequests>,
}

impl TestEngine {
    /// Creates an engine with a device already attached, in
    /// [PlayerState::Stopped].
    pub async fn attached() -> Self {
        Self::attached_with_options(AudioOptions::default()).await
    }

    pub async fn attached_with_options(options: AudioOptions) -> Self {
        let mut engine = Self::detached_with_options(options).await;
        engine.attach().await.expect("Failed to attach test sink");
        engine
    }

    /// Creates an engine with no device attached, in
    /// [PlayerState::Unavailable].
    pub async fn detached() -> Self {
        Self::detached_with_options(AudioOptions::default()).await
    }

    pub async fn detached_with_options(options: AudioOptions) -> Self {
        let bus = EventBus::new();
        let ducking = RecordingDucking::new();

        let player = player::init(&bus, options, Box::new(ducking.clone()))
            .await
            .expect("Failed to init test player");

        let (requests_tx, requests_rx) = request_channel();

        Self {
            bus,
            player,
            sink: RecordingSink::new(),
            ducking,
            requests_tx,
            requests_rx: Some(requests_rx),
        }
    }

    /// Attaches the recording sink, handing its request channel over to
    /// the engine.
    pub async fn attach(&mut self) -> Result<()> {
        let requests = self.requests_rx.take().expect("Sink was already attached");
        player::attach_sink(&self.player, Box::new(self.sink.clone()), requests).await
    }

    pub fn subscribe(&self) -> Subscriber {
        self.bus.subscribe()
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> PlayerState {
        self.player.read().await.state()
    }

    /// Delivers one device buffer request directly to the engine.
    pub async fn request(&self, len: usize) {
        self.player
            .write()
            .await
            .handle_buffer_request(BufferRequest { len })
            .await;
    }

    /// Runs one watchdog tick directly.
    pub async fn tick(&self) {
        self.player.write().await.check_exhaustion().await;
    }
}

/// Collects all events from a subscriber within a timeout period.
/// Returns events in the order they were received.
pub async fn collect_events(subscriber: &mut Subscriber, timeout: Duration) -> Vec<Event> {
    let mut events = Vec::new();
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        match subscriber.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Empty) => {
                if tokio::time::Instant::now() >= deadline {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Err(TryRecvError::Lagged(n)) => {
                eprintln!("Warning: subscriber lagged, missed {n} events");
            }
            Err(TryRecvError::Closed) => break,
        }
    }

    events
}

/// Waits for a specific type of event within a timeout.
pub async fn wait_for_event<F>(
    subscriber: &mut Subscriber,
    timeout: Duration,
    matches: F,
) -> Option<Event>
where
    F: Fn(&Event) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        match subscriber.try_recv() {
            Ok(event) if matches(&event) => return Some(event),
            Ok(_) => continue,
            Err(TryRecvError::Empty) => {
                if tokio::time::Instant::now() >= deadline {
                    return None;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Closed) => return None,
        }
    }
}

/// Filters player lifecycle events.
pub fn filter_player_events(events: &[Event]) -> Vec<&PlayerAction> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Player(action) => Some(action),
            _ => None,
        })
        .collect()
}

/// Filters ducking events.
pub fn filter_ducking_events(events: &[Event]) -> Vec<&DuckingAction> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Ducking(action) => Some(action),
            _ => None,
        })
        .collect()
}

/// Extracts the state transitions from a list of events, in order.
pub fn extract_transitions(events: &[Event]) -> Vec<(PlayerState, PlayerState)> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Player(PlayerAction::StateChanged { previous, current }) => {
                Some((*previous, *current))
            }
            _ => None,
        })
        .collect()
}

/// Asserts that a specific event type was received.
#[macro_export]
macro_rules! assert_event_received {
    ($events:expr, $pattern:pat) => {
        assert!(
            $events.iter().any(|e| matches!(e, $pattern)),
            "Expected event matching {} not found in {:?}",
            stringify!($pattern),
            $events
        );
    };
}

/// Asserts that a specific event type was NOT received.
#[macro_export]
macro_rules! assert_event_not_received {
    ($events:expr, $pattern:pat) => {
        assert!(
            !$events.iter().any(|e| matches!(e, $pattern)),
            "Unexpected event matching {} found in {:?}",
            stringify!($pattern),
            $events
        );
    };
}
