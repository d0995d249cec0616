//! Real-time playback through rodio.
//!
//! The engine stays behind an `Arc<Mutex<_>>` so the caller can keep
//! changing channels while the audio thread pulls samples from the stream.

use crate::engine::Engine;
use crate::handle::Handle;
use anyhow::{anyhow, Context, Result};
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Frames rendered per lock of the engine.
/// Smaller = lower latency but more locking.
const BUFFER_SIZE: usize = 256;

/// Audio source that pulls samples from one engine stream.
/// Ends when the stream has stopped and faded out, or its handle is closed.
struct StreamSource {
    engine: Arc<Mutex<Engine>>,
    stream: Handle,
    buffer: Vec<f32>,
    /// Readable samples in `buffer`.
    len: usize,
    /// Current position in the buffer.
    pos: usize,
    channels: u16,
    sample_rate: u32,
}

impl StreamSource {
    fn new(engine: Arc<Mutex<Engine>>, stream: Handle, channels: u16, sample_rate: u32) -> Self {
        Self {
            engine,
            stream,
            buffer: vec![0.0; BUFFER_SIZE * channels as usize],
            len: 0,
            pos: 0,
            channels,
            sample_rate,
        }
    }
}

impl Iterator for StreamSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.pos >= self.len {
            let frames = {
                let mut engine = self.engine.lock().ok()?;
                engine.render(self.stream, &mut self.buffer, BUFFER_SIZE).ok()?
            };
            if frames == 0 {
                return None;
            }
            self.len = frames * self.channels as usize;
            self.pos = 0;
        }

        let sample = self.buffer[self.pos];
        self.pos += 1;
        Some(sample)
    }
}

impl Source for StreamSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

/// A stream playing on the default audio device.
pub struct Player {
    sink: Sink,
    /// Audio output stream (must be kept alive).
    _output: OutputStream,
    _output_handle: OutputStreamHandle,
}

impl Player {
    /// Blocks until the stream has finished playing.
    pub fn wait(&self) {
        self.sink.sleep_until_end();
    }

    /// Returns true once every sample has been played.
    pub fn is_finished(&self) -> bool {
        self.sink.empty()
    }

    pub fn pause(&self) {
        self.sink.pause();
    }

    pub fn resume(&self) {
        self.sink.play();
    }

    /// Stops output immediately. The stream itself is left as it is.
    pub fn stop(&self) {
        self.sink.stop();
    }
}

/// Starts playing `stream` on the default output device.
///
/// # Errors
///
/// Returns error if the handle is not a stream or no output device can be
/// opened.
pub fn play(engine: Arc<Mutex<Engine>>, stream: Handle) -> Result<Player> {
    let (channels, sample_rate) = {
        let engine = engine.lock().map_err(|_| anyhow!("Engine lock poisoned"))?;
        let settings = engine.stream(stream)?.settings();
        (settings.channels(), settings.sample_rate)
    };

    let (output, output_handle) = OutputStream::try_default().context("Failed to open audio output device")?;
    let sink = Sink::try_new(&output_handle).context("Failed to create audio sink")?;
    sink.append(StreamSource::new(engine, stream, channels, sample_rate));

    tracing::debug!(%stream, channels, sample_rate, "Started playback");
    Ok(Player {
        sink,
        _output: output,
        _output_handle: output_handle,
    })
}
