use anyhow::Result;
use log::{debug, info};
use std::time::Duration;
use voice_playback_rs::{
    config,
    ducking::GainDucking,
    event::{self, EventBus},
    net::WavStreamSink,
    player::{self, PlayerState},
    tone,
};

#[tokio::main]
async fn main() -> Result<()> {
    pretty_env_logger::init();

    let config = config::load_or_default().await;

    let bus = EventBus::new();
    event::debug(&bus);

    // Stand-in for the host's competing audio stream: follow the ducking
    // gain and log it
    let (ducking, mut gain) = GainDucking::new();
    tokio::spawn(async move {
        while gain.changed().await.is_ok() {
            let value = *gain.borrow_and_update();
            debug!("Competing stream gain: {:.2}", value);
        }
    });

    let player = player::init(&bus, config.audio.clone(), Box::new(ducking)).await?;

    let (sink, requests) = WavStreamSink::start(&config.listen_addr, &config.audio).await?;
    info!("Connect a player, e.g: mpv tcp://{}", sink.local_addr());
    player::attach_sink(&player, Box::new(sink), requests).await?;

    player.write().await.play_stream().await?;

    // Feed the engine in small increments like a TTS stream would
    let chunk_period = Duration::from_millis(200);
    let chunk_count = config.tone_secs * 5;
    let mut phase = 0.0;

    for i in 0..chunk_count {
        let chunk = tone::chunk(&config.audio, config.tone_hz, &mut phase, chunk_period);
        player.write().await.append_chunk(chunk)?;

        // Briefly pause and resume halfway through
        if i == chunk_count / 2 {
            player.write().await.pause().await;
            tokio::time::sleep(Duration::from_millis(500)).await;
            player.write().await.play_stream().await?;
        }

        tokio::time::sleep(chunk_period).await;
    }

    player.write().await.end_stream();

    // Let the device drain the tail of the stream
    loop {
        if player.read().await.state() == PlayerState::Finished {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    player.write().await.destroy().await;

    Ok(())
}
