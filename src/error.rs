//! Error types for the playback engine.

use crate::player::PlayerState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid audio options: {0}")]
    InvalidOptions(String),

    #[error("Audio payload is empty")]
    EmptyPayload,

    #[error("Audio stream is already closed")]
    StreamClosed,

    #[error("No playback device is available")]
    DeviceUnavailable,

    #[error("Operation not valid in state {0:?}")]
    InvalidState(PlayerState),

    #[error("Playback device error: {0}")]
    Device(String),

    #[error("Audio ducking error: {0}")]
    Ducking(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
