//! The playback state machine.
//!
//! [SpeechPlayer] owns the chunk queue, the playback device and the
//! ducking controller, and is the only place lifecycle state changes.
//! Everything that wants to mutate it (API calls, buffer requests from
//! the device, the watchdog) goes through one [SharedPlayer] lock, so
//! transitions, queue mutation and cursor advancement are serialized.

use crate::{
    chunks::ChunkQueue,
    ducking::{DuckingAction, DuckingControl},
    error::{Error, Result},
    event::{Event, EventBus},
    options::AudioOptions,
    sink::{BufferRequest, BufferRequests, PlaybackSink},
    watchdog,
};
use bytes::Bytes;
use std::sync::Arc;
use tokio::{sync::RwLock, task::JoinHandle};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PlayerState {
    /// No playback device attached, or the engine was destroyed
    Unavailable,

    /// The playback device is pulling audio
    Playing,

    /// Playback suspended, queued audio is retained
    Paused,

    /// Idle with an empty queue, ready for a new play cycle
    Stopped,

    /// The stream was fully drained by the playback device
    Finished,
}

#[derive(Clone, Debug)]
pub enum PlayerAction {
    /// The engine moved between two distinct lifecycle states
    StateChanged {
        previous: PlayerState,
        current: PlayerState,
    },

    /// Playback advanced, position counts bytes written to the device
    PlaybackProgress { position: u64 },
}

pub struct SpeechPlayer {
    /// Send state change notifications to the rest of the app
    bus: EventBus,

    options: AudioOptions,
    state: PlayerState,
    queue: ChunkQueue,
    sink: Option<Box<dyn PlaybackSink>>,
    ducking: Box<dyn DuckingControl>,

    /// Whether the competing stream is currently ducked
    ducked: bool,

    /// A device write failed this cycle, which counts as exhaustion
    write_failed: bool,

    /// Handles of the watchdog and buffer request loops
    tasks: Vec<JoinHandle<()>>,
}

impl SpeechPlayer {
    /// Creates a new [SpeechPlayer] without spawning any loops. Most
    /// callers want [init] instead.
    pub fn create(bus: EventBus, options: AudioOptions, ducking: Box<dyn DuckingControl>) -> Self {
        Self {
            bus,
            options,
            state: PlayerState::Unavailable,
            queue: ChunkQueue::new(),
            sink: None,
            ducking,
            ducked: false,
            write_failed: false,
            tasks: Vec::new(),
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn options(&self) -> &AudioOptions {
        &self.options
    }

    /// Playback position in seconds, derived from bytes handed to the
    /// device this cycle.
    pub fn position_secs(&self) -> f64 {
        self.queue.consumed() as f64 / self.options.byte_rate() as f64
    }

    /// Bytes enqueued but not yet pulled by the device.
    pub fn queued_bytes(&self) -> u64 {
        self.queue.pending()
    }

    /// Changes state, emitting exactly one notification per transition.
    /// Setting the current state again is a no-op.
    fn set_state(&mut self, next: PlayerState) {
        if self.state == next {
            return;
        }

        let previous = std::mem::replace(&mut self.state, next);
        debug!("Player state: {:?} -> {:?}", previous, next);

        self.bus.send(Event::Player(PlayerAction::StateChanged {
            previous,
            current: next,
        }));
    }

    async fn activate_ducking(&mut self) {
        if self.ducked {
            return;
        }

        let duration = self.options.ducking_duration();
        let ratio = self.options.ducking_ratio;

        match self.ducking.activate(duration, ratio).await {
            Ok(()) => {
                self.ducked = true;
                self.bus
                    .send(Event::Ducking(DuckingAction::StateChanged { active: true }));
            }
            // Ducking is best-effort, play un-ducked rather than fail
            Err(e) => warn!("Audio ducking activation failed, playing un-ducked: {e}"),
        }
    }

    async fn deactivate_ducking(&mut self) {
        if !self.ducked {
            return;
        }

        self.ducked = false;

        if let Err(e) = self.ducking.deactivate().await {
            warn!("Audio ducking deactivation failed: {e}");
        }

        self.bus
            .send(Event::Ducking(DuckingAction::StateChanged { active: false }));
    }

    /// Activates ducking and prepares the device, rolling ducking back if
    /// the device refuses to start.
    async fn enter_playing(&mut self) -> Result<()> {
        self.activate_ducking().await;

        let result = if let Some(sink) = self.sink.as_mut() {
            sink.prepare().await
        } else {
            Err(Error::DeviceUnavailable)
        };

        if let Err(e) = result {
            error!("Failed to prepare playback device: {e}");
            self.deactivate_ducking().await;
            return Err(e);
        }

        self.set_state(PlayerState::Playing);
        Ok(())
    }

    /// Plays one complete audio payload. Replaces whatever the queue held
    /// before and closes it, so playback finishes once the payload drains.
    pub async fn play(&mut self, payload: Bytes) -> Result<()> {
        if payload.is_empty() {
            error!("Rejecting empty audio payload");
            return Err(Error::EmptyPayload);
        }

        match self.state {
            PlayerState::Unavailable => {
                error!("Cannot play, no playback device is attached");
                Err(Error::DeviceUnavailable)
            }
            PlayerState::Playing => {
                debug!("Ignoring play() while already playing");
                Ok(())
            }
            PlayerState::Paused => {
                warn!(
                    "play() while paused resumes the current audio, dropping {} byte payload",
                    payload.len()
                );
                self.enter_playing().await
            }
            PlayerState::Stopped | PlayerState::Finished => {
                info!("Starting playback of {} byte payload", payload.len());
                self.queue.load(payload);
                self.write_failed = false;
                self.enter_playing().await
            }
        }
    }

    /// Starts playback in streaming mode with whatever chunks are already
    /// enqueued, possibly none. Chunks keep arriving via [Self::append_chunk]
    /// until [Self::end_stream].
    pub async fn play_stream(&mut self) -> Result<()> {
        match self.state {
            PlayerState::Unavailable => {
                error!("Cannot play, no playback device is attached");
                Err(Error::DeviceUnavailable)
            }
            PlayerState::Playing => {
                debug!("Ignoring play_stream() while already playing");
                Ok(())
            }
            PlayerState::Paused => self.enter_playing().await,
            PlayerState::Stopped | PlayerState::Finished => {
                // Progress counts bytes per play cycle, a finished
                // cycle's cursor must not carry over into the new one
                if self.state == PlayerState::Finished {
                    self.queue.clear();
                }

                info!(
                    "Starting streaming playback with {} bytes pre-buffered",
                    self.queue.pending()
                );
                self.queue.reopen();
                self.write_failed = false;
                self.enter_playing().await
            }
        }
    }

    /// Appends a chunk to the tail of the queue. Valid at any time while
    /// the stream is open; appended audio reaches the very next buffer
    /// request without another play call.
    pub fn append_chunk(&mut self, chunk: Bytes) -> Result<()> {
        if chunk.is_empty() {
            trace!("Ignoring empty audio chunk");
            return Ok(());
        }

        if self.queue.is_closed() {
            error!("Rejecting {} byte chunk, stream is closed", chunk.len());
            return Err(Error::StreamClosed);
        }

        trace!("Appending {} byte chunk", chunk.len());
        self.queue.append(chunk);
        Ok(())
    }

    /// Signals that no more chunks will arrive. Once the queue drains
    /// after this, the watchdog finishes playback.
    pub fn end_stream(&mut self) {
        if self.queue.is_closed() {
            debug!("Ignoring end_stream(), stream is already closed");
            return;
        }

        debug!(
            "Audio stream closed with {} bytes still queued",
            self.queue.pending()
        );
        self.queue.close();
    }

    /// Suspends playback. Safe to call in any state; only does something
    /// while playing.
    pub async fn pause(&mut self) {
        if self.state != PlayerState::Playing {
            debug!("Ignoring pause() in state {:?}", self.state);
            return;
        }

        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.pause().await {
                warn!("Failed to pause playback device: {e}");
            }
        }

        self.deactivate_ducking().await;
        self.set_state(PlayerState::Paused);
    }

    /// Stops playback and clears all queued audio. Safe to call in any
    /// state and idempotent: stopping while stopped emits nothing.
    pub async fn stop(&mut self) {
        match self.state {
            PlayerState::Playing | PlayerState::Paused => {
                if let Some(sink) = self.sink.as_mut() {
                    if let Err(e) = sink.pause().await {
                        warn!("Failed to pause playback device: {e}");
                    }
                    if let Err(e) = sink.unprepare().await {
                        warn!("Failed to release playback device buffers: {e}");
                    }
                }

                self.deactivate_ducking().await;
                self.reset_queue();
                self.set_state(PlayerState::Stopped);
            }
            PlayerState::Finished => {
                // Device was already released when playback finished
                self.reset_queue();
                self.set_state(PlayerState::Stopped);
            }
            PlayerState::Stopped | PlayerState::Unavailable => {
                debug!("Ignoring stop() in state {:?}", self.state);
            }
        }
    }

    fn reset_queue(&mut self) {
        self.queue.clear();
        self.write_failed = false;
    }

    /// Replaces the audio options. Only allowed while not playing; the
    /// device is re-initialized when the sample rate changed.
    pub async fn update_options(&mut self, options: AudioOptions) -> Result<()> {
        options.validate()?;

        if matches!(self.state, PlayerState::Playing | PlayerState::Paused) {
            return Err(Error::InvalidState(self.state));
        }

        let sample_rate_changed = options.sample_rate != self.options.sample_rate;
        self.options = options;

        if sample_rate_changed {
            if let Some(sink) = self.sink.as_mut() {
                info!(
                    "Sample rate changed to {} Hz, re-initializing playback device",
                    self.options.sample_rate
                );
                sink.reconfigure(&self.options).await?;
            }
        }

        Ok(())
    }

    /// Tears the engine down: stops playback and ducking, cancels the
    /// watchdog and request loops, then releases the playback device.
    pub async fn destroy(&mut self) {
        info!("Destroying playback engine");

        self.stop().await;

        for task in self.tasks.drain(..) {
            task.abort();
        }

        // Dropped only after playback and ducking have wound down
        self.sink = None;
        self.reset_queue();
        self.set_state(PlayerState::Unavailable);
    }

    /// Answers one buffer request from the playback device. Requests that
    /// were in flight when playback stopped are discarded here, which is
    /// what makes stop() effective against a racing device callback.
    pub async fn handle_buffer_request(&mut self, request: BufferRequest) {
        if self.state != PlayerState::Playing {
            trace!(
                "Discarding buffer request for {} bytes in state {:?}",
                request.len,
                self.state
            );
            return;
        }

        if self.write_failed {
            return;
        }

        let chunk = self.queue.read(request.len);
        if chunk.is_empty() {
            // Streaming mode simply has nothing materialized yet
            return;
        }

        let result = match self.sink.as_mut() {
            Some(sink) => sink.write(chunk).await,
            None => return,
        };

        match result {
            Ok(()) => {
                self.bus.send(Event::Player(PlayerAction::PlaybackProgress {
                    position: self.queue.consumed(),
                }));
            }
            Err(e) => {
                // The device is the source of truth for consumption, a
                // failed write ends the cycle instead of being retried
                warn!("Playback device write failed, forcing end of stream: {e}");
                self.write_failed = true;
            }
        }
    }

    /// One watchdog tick: finishes playback once the stream is exhausted
    /// or a write failed. Never fires on an open streaming queue that is
    /// only transiently empty.
    pub async fn check_exhaustion(&mut self) {
        if self.state != PlayerState::Playing {
            return;
        }

        if self.write_failed || self.queue.is_exhausted() {
            self.finish().await;
        }
    }

    async fn finish(&mut self) {
        info!(
            "Playback finished after {} bytes ({:.2}s)",
            self.queue.consumed(),
            self.position_secs()
        );

        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.unprepare().await {
                warn!("Failed to release playback device buffers: {e}");
            }
        }

        self.deactivate_ducking().await;
        self.set_state(PlayerState::Finished);
    }
}

/// Type alias for the shared playback engine
pub type SharedPlayer = Arc<RwLock<SpeechPlayer>>;

/// Creates the shared engine. The engine starts out
/// [PlayerState::Unavailable] until a device is attached via
/// [attach_sink], which also spawns the loops serving it.
pub async fn init(
    bus: &EventBus,
    options: AudioOptions,
    ducking: Box<dyn DuckingControl>,
) -> Result<SharedPlayer> {
    options.validate()?;

    Ok(Arc::new(RwLock::new(SpeechPlayer::create(
        bus.clone(),
        options,
        ducking,
    ))))
}

/// Attaches a playback device, wiring its buffer requests into the
/// engine and spawning a fresh request loop and exhaustion watchdog for
/// it. On the first successful attach the engine leaves
/// [PlayerState::Unavailable]; a failed attach leaves it there, so play
/// calls keep failing fast until a re-attach succeeds. Re-attach is
/// allowed in any non-playing state, including after destroy().
pub async fn attach_sink(
    player: &SharedPlayer,
    mut sink: Box<dyn PlaybackSink>,
    requests: BufferRequests,
) -> Result<()> {
    let mut locked = player.write().await;

    if matches!(locked.state, PlayerState::Playing | PlayerState::Paused) {
        return Err(Error::InvalidState(locked.state));
    }

    sink.apply_stream_policy(locked.options.stream_category)
        .await?;

    // Loops from a previous attachment serve a device that is gone
    for task in locked.tasks.drain(..) {
        task.abort();
    }

    locked.sink = Some(sink);

    let requests_loop = handle_buffer_requests_loop(player.clone(), requests);
    let watchdog = watchdog::check_exhaustion_loop(player.clone());
    locked.tasks.push(requests_loop);
    locked.tasks.push(watchdog);

    if locked.state == PlayerState::Unavailable {
        locked.set_state(PlayerState::Stopped);
    }

    Ok(())
}

/// Marshals device buffer requests onto the engine lock, one at a time
/// and in order.
fn handle_buffer_requests_loop(
    player: SharedPlayer,
    mut requests: BufferRequests,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(request) = requests.recv().await {
            let mut player = player.write().await;
            player.handle_buffer_request(request).await;
        }

        debug!("Buffer request channel closed");
    })
}
