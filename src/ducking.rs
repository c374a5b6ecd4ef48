//! Ducking of competing audio while speech plays.
//!
//! The engine only knows the [DuckingControl] contract; what actually gets
//! attenuated (a platform stream, a host mixer channel) is up to the
//! implementation. [GainDucking] is the in-crate implementation driving a
//! shared gain value over a watch channel.

use crate::constants::DUCKING_FADE_STEP;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Clone, Debug)]
pub enum DuckingAction {
    /// Attenuation of the competing stream was switched on or off
    StateChanged { active: bool },
}

/// Contract for attenuating a competing audio stream.
///
/// Activation is best-effort from the engine's point of view: a failed
/// activate is logged and playback proceeds un-ducked.
#[async_trait]
pub trait DuckingControl: Send + Sync {
    /// Requests attenuation to `ratio` of the original volume, fading
    /// over `duration`.
    async fn activate(&mut self, duration: Duration, ratio: f64) -> Result<()>;

    /// Restores the competing stream to its original volume.
    async fn deactivate(&mut self) -> Result<()>;
}

/// Ducking controller backed by a shared gain value.
///
/// The host application multiplies its competing output by the value on
/// the receiver side of the gain channel; activation fades the gain
/// towards the ducking ratio and deactivation fades it back to 1.0.
pub struct GainDucking {
    gain: watch::Sender<f64>,
    fade: Option<JoinHandle<()>>,
    fade_duration: Duration,
}

impl GainDucking {
    pub fn new() -> (Self, watch::Receiver<f64>) {
        let (gain, rx) = watch::channel(1.0);

        let ducking = Self {
            gain,
            fade: None,
            fade_duration: Duration::ZERO,
        };

        (ducking, rx)
    }

    fn fade_towards(&mut self, target: f64, duration: Duration) -> Result<()> {
        if let Some(fade) = self.fade.take() {
            fade.abort();
        }

        if self.gain.is_closed() {
            return Err(Error::Ducking(
                "no audio stream is listening for gain changes".to_string(),
            ));
        }

        let current = *self.gain.borrow();
        let steps = (duration.as_millis() / DUCKING_FADE_STEP.as_millis()).max(1) as u32;

        if duration.is_zero() || steps <= 1 {
            let _ = self.gain.send(target);
            return Ok(());
        }

        let delta = (target - current) / steps as f64;
        let gain = self.gain.clone();

        // Slowly fade the gain towards the target value
        self.fade = Some(tokio::spawn(async move {
            let mut value = current;

            for _ in 0..steps - 1 {
                value += delta;

                if gain.send(value.clamp(0.0, 1.0)).is_err() {
                    return;
                }

                tokio::time::sleep(DUCKING_FADE_STEP).await;
            }

            let _ = gain.send(target);
        }));

        Ok(())
    }
}

#[async_trait]
impl DuckingControl for GainDucking {
    async fn activate(&mut self, duration: Duration, ratio: f64) -> Result<()> {
        debug!("Ducking competing audio to {ratio} over {duration:?}");
        self.fade_duration = duration;
        self.fade_towards(ratio, duration)
    }

    async fn deactivate(&mut self) -> Result<()> {
        debug!("Restoring competing audio volume");
        self.fade_towards(1.0, self.fade_duration)
    }
}
