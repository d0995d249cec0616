//! Audio output for rendered streams.
//!
//! This module turns the engine's float PCM into something audible:
//! - Float to 16-bit integer conversion
//! - WAV export of a single song or a batch of songs in parallel
//! - Real-time playback through rodio (`playback` feature)

pub mod export;
#[cfg(feature = "playback")]
pub mod playback;

pub use export::{export_batch, export_to_wav, render_to_wav, BatchJob};

/// Converts a float sample to 16-bit PCM, clamping to [-1.0, 1.0] first.
#[inline]
pub fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}

/// Converts a buffer of float samples to 16-bit PCM.
///
/// # Returns
///
/// Number of samples converted, the shorter of the two lengths
pub fn convert_to_i16(input: &[f32], output: &mut [i16]) -> usize {
    let n = input.len().min(output.len());
    for (dst, src) in output.iter_mut().zip(input) {
        *dst = to_i16(*src);
    }
    n
}
