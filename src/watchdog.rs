//! Periodic exhaustion detection.
//!
//! The event-driven path cannot observe "the device drained everything
//! and nothing more is coming", so a timer polls for it.

use crate::constants::WATCHDOG_PERIOD;
use crate::player::SharedPlayer;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Polls the engine for stream exhaustion every [WATCHDOG_PERIOD].
pub fn check_exhaustion_loop(player: SharedPlayer) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            sleep(WATCHDOG_PERIOD).await;

            let mut player = player.write().await;
            player.check_exhaustion().await;
        }
    })
}
