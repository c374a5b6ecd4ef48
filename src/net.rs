//! Streaming WAV playback sink.
//!
//! Serves the engine's audio over TCP: every connection gets an infinite
//! WAV header followed by the raw PCM the engine writes. A pacing task
//! turns wall-clock time into buffer requests at the configured byte
//! rate, so the engine is pulled just like a real output device would.

use crate::constants::SINK_REQUEST_PERIOD;
use crate::error::{Error, Result};
use crate::options::{AudioOptions, StreamCategory};
use crate::sink::{self, BufferRequest, BufferRequests, PlaybackSink};
use async_trait::async_trait;
use bytes::Bytes;
use hound::{SampleFormat, WavSpec};
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

pub struct WavStreamSink {
    options: AudioOptions,
    local_addr: SocketAddr,
    audio_tx: watch::Sender<Bytes>,
    spec_tx: watch::Sender<WavSpec>,
    requests_tx: mpsc::Sender<BufferRequest>,

    /// Pacing task handle, present while the sink is prepared
    pacer: Option<JoinHandle<()>>,
}

impl WavStreamSink {
    /// Binds the listener and returns the sink together with the request
    /// channel to hand to the engine.
    pub async fn start(addr: &str, options: &AudioOptions) -> Result<(Self, BufferRequests)> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let (audio_tx, audio_rx) = watch::channel(Bytes::new());
        let (spec_tx, spec_rx) = watch::channel(wav_spec(options));
        let (requests_tx, requests_rx) = sink::request_channel();

        accept_loop(listener, audio_rx, spec_rx);

        info!("Streaming WAV audio on {}", local_addr);

        let sink = Self {
            options: options.clone(),
            local_addr,
            audio_tx,
            spec_tx,
            requests_tx,
            pacer: None,
        };

        Ok((sink, requests_rx))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn stop_pacing(&mut self) {
        if let Some(pacer) = self.pacer.take() {
            pacer.abort();
        }
    }
}

impl Drop for WavStreamSink {
    fn drop(&mut self) {
        self.stop_pacing();
    }
}

#[async_trait]
impl PlaybackSink for WavStreamSink {
    async fn apply_stream_policy(&mut self, category: StreamCategory) -> Result<()> {
        // A TCP listener has no routing policy, the category is informational
        debug!("WAV sink serving a {:?} stream", category);
        Ok(())
    }

    async fn prepare(&mut self) -> Result<()> {
        if self.pacer.is_none() {
            self.pacer = Some(pace_requests(
                self.options.clone(),
                self.requests_tx.clone(),
            ));
        }
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        self.stop_pacing();
        Ok(())
    }

    async fn unprepare(&mut self) -> Result<()> {
        self.stop_pacing();
        Ok(())
    }

    async fn write(&mut self, chunk: Bytes) -> Result<()> {
        self.audio_tx
            .send(chunk)
            .map_err(|_| Error::Device("audio fan-out channel closed".to_string()))
    }

    async fn reconfigure(&mut self, options: &AudioOptions) -> Result<()> {
        // Connected clients keep the header they already received, new
        // connections pick up the updated spec
        self.options = options.clone();
        let _ = self.spec_tx.send(wav_spec(options));
        Ok(())
    }
}

fn wav_spec(options: &AudioOptions) -> WavSpec {
    WavSpec {
        channels: options.channels,
        sample_rate: options.sample_rate,
        bits_per_sample: options.sample_format.bits_per_sample(),
        sample_format: SampleFormat::Int,
    }
}

/// Emits buffer requests sized so that requested bytes track wall-clock
/// time at the configured byte rate.
fn pace_requests(options: AudioOptions, requests: mpsc::Sender<BufferRequest>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let byte_rate = options.byte_rate() as f64;
        let start_time = std::time::Instant::now();
        let mut requested_bytes: u64 = 0;

        loop {
            let expected_bytes =
                ((start_time.elapsed() + SINK_REQUEST_PERIOD).as_secs_f64() * byte_rate) as u64;
            let len = (expected_bytes - requested_bytes) as usize;

            if len > 0 {
                if requests.send(BufferRequest { len }).await.is_err() {
                    // Engine side dropped the channel
                    break;
                }
                requested_bytes += len as u64;
            }

            tokio::time::sleep(SINK_REQUEST_PERIOD).await;
        }
    })
}

fn accept_loop(
    listener: TcpListener,
    audio_rx: watch::Receiver<Bytes>,
    spec_rx: watch::Receiver<WavSpec>,
) {
    tokio::spawn(async move {
        loop {
            let result = accept(&listener, &audio_rx, &spec_rx).await;

            match result {
                Ok(addr) => info!("Accepted listener connection from {}", addr),
                Err(e) => warn!("Failed to accept listener connection: {}", e),
            }
        }
    });
}

async fn accept(
    listener: &TcpListener,
    audio_rx: &watch::Receiver<Bytes>,
    spec_rx: &watch::Receiver<WavSpec>,
) -> Result<SocketAddr> {
    let (mut stream, addr) = listener.accept().await?;

    let mut audio_rx = audio_rx.clone();
    let spec = *spec_rx.borrow();

    // Spawn a new task to handle the connection
    tokio::spawn(async move {
        // The infinite WAV header lets players treat the stream as a wav file
        let header = spec.into_header_for_infinite_file();
        if let Err(e) = stream.write_all(&header[..]).await {
            warn!("Failed to write wav header: {}", e);
            return;
        }

        loop {
            if audio_rx.changed().await.is_err() {
                // Sink is gone
                break;
            }

            let chunk = audio_rx.borrow_and_update().clone();

            if let Err(e) = stream.write_all(&chunk).await {
                debug!("Listener connection closed: {}", e);
                break;
            }
        }
    });

    Ok(addr)
}
