//! tinymidi - a MIDI to PCM synthesis engine.
//!
//! This library loads SoundFont 2 banks and Standard MIDI Files and renders
//! them to interleaved `f32` PCM. Soundfonts and streams are owned by an
//! [`Engine`] and addressed through generation-checked [`Handle`]s, or used
//! directly as [`Soundfont`] and [`Stream`] values.

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod handle;
pub mod midi;
pub mod reader;
pub mod soundfont;
pub mod stream;
pub mod synth;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::{PlayerConfig, StreamSettings};
pub use engine::Engine;
pub use error::{Error, Result};
pub use handle::Handle;
pub use midi::MidiFile;
pub use reader::StreamReader;
pub use soundfont::{Preset, Soundfont};
pub use stream::Stream;
