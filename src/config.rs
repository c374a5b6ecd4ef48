use crate::options::AudioOptions;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::fs::read_to_string;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Address the streaming WAV sink listens on
    pub listen_addr: String,

    /// Frequency of the demo tone in Hz
    pub tone_hz: f64,

    /// How many seconds of demo tone to stream
    pub tone_secs: u64,

    #[serde(flatten)]
    pub audio: AudioOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:7878".to_string(),
            tone_hz: 440.0,
            tone_secs: 10,
            audio: AudioOptions::default(),
        }
    }
}

pub async fn load() -> Result<Config> {
    let config = read_to_string("Config.toml").await?;
    let config: Config = toml::from_str(&config)?;

    config.audio.validate()?;

    Ok(config)
}

/// Loads Config.toml, falling back to defaults if it is missing or invalid.
pub async fn load_or_default() -> Config {
    match load().await {
        Ok(config) => config,
        Err(e) => {
            info!("Error while reading config: {:?}", e);
            info!("Falling back to default config.");
            Config::default()
        }
    }
}
