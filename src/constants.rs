use std::time::Duration;

// Define some defaults for the audio parameters
pub const DEFAULT_SAMPLE_RATE: u32 = 24000; // common TTS output rate
pub const DEFAULT_CHANNELS: u16 = 1; // mono speech

/// How often the watchdog polls for stream exhaustion
pub const WATCHDOG_PERIOD: Duration = Duration::from_millis(100);

/// Cadence of buffer requests paced by the streaming WAV sink
pub const SINK_REQUEST_PERIOD: Duration = Duration::from_millis(50);

/// Step length used when fading the ducking gain
pub const DUCKING_FADE_STEP: Duration = Duration::from_millis(10);
