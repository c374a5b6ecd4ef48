//! Sine tone PCM generator for the demo binary.

use crate::options::{AudioOptions, SampleFormat};
use byteorder::{LittleEndian, WriteBytesExt};
use bytes::Bytes;
use std::time::Duration;

const AMPLITUDE: f64 = 0.5; // 50% amplitude

/// Generates `duration` worth of tone at `f` Hz as raw PCM matching
/// `options`. The phase is carried between calls so consecutive chunks
/// join without clicks.
pub fn chunk(options: &AudioOptions, f: f64, phase: &mut f64, duration: Duration) -> Bytes {
    let frames = (options.sample_rate as f64 * duration.as_secs_f64()) as usize;
    let mut data = Vec::with_capacity(frames * options.frame_size());

    for _ in 0..frames {
        let sample = sine_wave(*phase);

        for _ in 0..options.channels {
            write_sample(&mut data, sample, options.sample_format);
        }

        // Increment the phase by the frequency divided by the sample rate
        *phase += f / options.sample_rate as f64;

        // Wrap the phase around 1.0 to avoid overflow
        *phase %= 1.0;
    }

    Bytes::from(data)
}

fn write_sample(data: &mut Vec<u8>, sample: i16, format: SampleFormat) {
    match format {
        SampleFormat::U8 => data.push(((sample >> 8) + 128) as u8),
        SampleFormat::S16Le => {
            WriteBytesExt::write_i16::<LittleEndian>(data, sample).unwrap();
        }
        SampleFormat::S24Le => {
            WriteBytesExt::write_i24::<LittleEndian>(data, (sample as i32) << 8).unwrap();
        }
        SampleFormat::S32Le => {
            WriteBytesExt::write_i32::<LittleEndian>(data, (sample as i32) << 16).unwrap();
        }
    }
}

// Define a helper function to generate a sine wave sample given a phase
fn sine_wave(phase: f64) -> i16 {
    // Convert the phase to radians and take the sine
    let sample = (phase * std::f64::consts::PI * 2.0).sin();
    // Scale the sample by the amplitude and the maximum value of i16
    let amplitude = i16::MAX as f64 * AMPLITUDE;
    // Cast the sample to i16 and return it
    (sample * amplitude) as i16
}
