//! Playback device contract.
//!
//! Device adapters pull audio: they emit [BufferRequest]s on their own
//! cadence and the engine answers each request with at most the requested
//! number of bytes. Requests cross over an mpsc channel so device-side
//! tasks never touch engine state directly.

use crate::error::Result;
use crate::options::{AudioOptions, StreamCategory};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Capacity of the buffer request channel between a sink and the engine
pub const REQUEST_CHANNEL_CAPACITY: usize = 32;

/// A pull signal from the playback device: it can accept `len` more bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BufferRequest {
    pub len: usize,
}

/// Receiving half of a sink's buffer request channel.
pub type BufferRequests = mpsc::Receiver<BufferRequest>;

/// Creates the request channel a sink hands to the engine at attach time.
pub fn request_channel() -> (mpsc::Sender<BufferRequest>, BufferRequests) {
    mpsc::channel(REQUEST_CHANNEL_CAPACITY)
}

/// Lifecycle operations of a playback device.
///
/// Implementations are constructed with the audio layout they output and
/// are expected to only consume audio between `prepare` and
/// `pause`/`unprepare`.
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Applies the output routing category before playback starts.
    async fn apply_stream_policy(&mut self, category: StreamCategory) -> Result<()>;

    /// Starts (or resumes) pulling audio from the engine.
    async fn prepare(&mut self) -> Result<()>;

    /// Suspends pulling without dropping device resources.
    async fn pause(&mut self) -> Result<()>;

    /// Stops pulling and releases device buffers.
    async fn unprepare(&mut self) -> Result<()>;

    /// Hands the device one span of audio, at most as long as it asked for.
    async fn write(&mut self, chunk: Bytes) -> Result<()>;

    /// Re-initializes the device for a changed audio layout.
    async fn reconfigure(&mut self, options: &AudioOptions) -> Result<()>;
}
