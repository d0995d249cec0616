//! Handle-based engine facade.
//!
//! The [`Engine`] owns every soundfont and stream and hands out [`Handle`]s
//! to them. All operations validate their handle first; an unknown, closed
//! or wrong-kind handle yields [`Error::InvalidHandle`] and changes nothing.
//!
//! # Example
//!
//! ```no_run
//! use tinymidi::{Engine, StreamSettings};
//!
//! let mut engine = Engine::new();
//! let sf = engine.load_soundfont(&std::fs::read("bank.sf2")?)?;
//! let song = engine.open_stream(&std::fs::read("song.mid")?, sf, StreamSettings::default())?;
//!
//! let mut buf = vec![0.0f32; 4096 * 2];
//! while engine.render(song, &mut buf, 4096)? > 0 {
//!     // hand `buf` to the audio device
//! }
//! engine.close(song)?;
//! engine.close(sf)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::config::StreamSettings;
use crate::error::{Error, Result};
use crate::handle::{Handle, HandleTable};
use crate::soundfont::Soundfont;
use crate::stream::Stream;
use std::sync::Arc;

/// An object owned by the engine.
enum Entry {
    Soundfont(Arc<Soundfont>),
    Stream(Box<Stream>),
}

/// Owner of all soundfonts and streams, addressed by handle.
#[derive(Default)]
pub struct Engine {
    table: HandleTable<Entry>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, entry: Entry) -> Result<Handle> {
        self.table.insert(entry).ok_or(Error::OutOfMemory)
    }

    /// Parses a SoundFont 2 bank and registers it.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidFile`] if the bank is malformed
    /// - [`Error::OutOfMemory`] if the sample data or a handle cannot be allocated
    pub fn load_soundfont(&mut self, bytes: &[u8]) -> Result<Handle> {
        let soundfont = Soundfont::parse(bytes)?;
        let handle = self.insert(Entry::Soundfont(Arc::new(soundfont)))?;
        tracing::debug!(%handle, "Registered soundfont");
        Ok(handle)
    }

    /// Parses a MIDI file and opens a stream playing it through `soundfont`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidHandle`] if `soundfont` is not a live soundfont handle
    /// - [`Error::InvalidFile`] if the MIDI data is malformed
    /// - [`Error::InvalidSampleRate`] if `settings.sample_rate` is zero
    /// - [`Error::OutOfMemory`] if no handle is available
    pub fn open_stream(&mut self, midi: &[u8], soundfont: Handle, settings: StreamSettings) -> Result<Handle> {
        let soundfont = match self.table.get(soundfont) {
            Some(Entry::Soundfont(sf)) => Arc::clone(sf),
            _ => return Err(Error::InvalidHandle(soundfont)),
        };
        let stream = Stream::open(midi, soundfont, settings)?;
        let handle = self.insert(Entry::Stream(Box::new(stream)))?;
        tracing::debug!(%handle, "Registered stream");
        Ok(handle)
    }

    /// Closes a soundfont or stream handle.
    ///
    /// A soundfont's data stays alive while streams opened on it are open.
    pub fn close(&mut self, handle: Handle) -> Result<()> {
        match self.table.remove(handle) {
            Some(_) => {
                tracing::debug!(%handle, "Closed handle");
                Ok(())
            }
            None => Err(Error::InvalidHandle(handle)),
        }
    }

    /// Number of live handles.
    pub fn handle_count(&self) -> usize {
        self.table.len()
    }

    /// Resolves a stream handle.
    pub fn stream(&self, handle: Handle) -> Result<&Stream> {
        match self.table.get(handle) {
            Some(Entry::Stream(stream)) => Ok(stream.as_ref()),
            _ => Err(Error::InvalidHandle(handle)),
        }
    }

    /// Resolves a stream handle for mutation.
    pub fn stream_mut(&mut self, handle: Handle) -> Result<&mut Stream> {
        match self.table.get_mut(handle) {
            Some(Entry::Stream(stream)) => Ok(stream.as_mut()),
            _ => Err(Error::InvalidHandle(handle)),
        }
    }

    /// Resolves a soundfont handle, or the soundfont a stream plays through.
    pub fn soundfont(&self, handle: Handle) -> Result<&Arc<Soundfont>> {
        match self.table.get(handle) {
            Some(Entry::Soundfont(sf)) => Ok(sf),
            Some(Entry::Stream(stream)) => Ok(stream.soundfont()),
            None => Err(Error::InvalidHandle(handle)),
        }
    }

    /// Renders interleaved PCM from a stream. See [`Stream::render`].
    pub fn render(&mut self, stream: Handle, out: &mut [f32], frame_limit: usize) -> Result<usize> {
        Ok(self.stream_mut(stream)?.render(out, frame_limit))
    }

    pub fn midi_stop(&mut self, stream: Handle) -> Result<()> {
        self.stream_mut(stream)?.midi_stop();
        Ok(())
    }

    pub fn is_stopped(&self, stream: Handle) -> Result<bool> {
        Ok(self.stream(stream)?.is_stopped())
    }

    pub fn millisecond_length(&self, stream: Handle) -> Result<f64> {
        Ok(self.stream(stream)?.millisecond_length())
    }

    pub fn millisecond_position(&self, stream: Handle) -> Result<f64> {
        Ok(self.stream(stream)?.millisecond_position())
    }

    /// Voices still sounding. Reaches 0 once a stopped song has faded out.
    pub fn active_voice_count(&self, stream: Handle) -> Result<usize> {
        Ok(self.stream(stream)?.active_voice_count())
    }

    pub fn set_global_gain(&mut self, stream: Handle, gain: f32) -> Result<()> {
        self.stream_mut(stream)?.set_global_gain(gain);
        Ok(())
    }

    /// Starts a note on a stream, independent of its song.
    pub fn note_on(&mut self, stream: Handle, channel: u8, key: u8, velocity: u8) -> Result<()> {
        self.stream_mut(stream)?.note_on(channel, key, velocity)
    }

    pub fn note_off(&mut self, stream: Handle, channel: u8, key: u8) -> Result<()> {
        self.stream_mut(stream)?.note_off(channel, key)
    }

    pub fn set_channel_preset_index(&mut self, stream: Handle, channel: u8, preset_index: usize) -> Result<()> {
        self.stream_mut(stream)?
            .set_channel_preset_index(channel, preset_index)
    }

    pub fn set_channel_preset_number(
        &mut self,
        stream: Handle,
        channel: u8,
        preset_number: u16,
        midi_drums: bool,
    ) -> Result<()> {
        self.stream_mut(stream)?
            .set_channel_preset_number(channel, preset_number, midi_drums)
    }

    pub fn set_channel_bank(&mut self, stream: Handle, channel: u8, bank: u16) -> Result<()> {
        self.stream_mut(stream)?.set_channel_bank(channel, bank)
    }

    pub fn set_channel_bank_preset(
        &mut self,
        stream: Handle,
        channel: u8,
        bank: u16,
        preset_number: u16,
    ) -> Result<()> {
        self.stream_mut(stream)?
            .set_channel_bank_preset(channel, bank, preset_number)
    }

    pub fn set_channel_pan(&mut self, stream: Handle, channel: u8, pan: f32) -> Result<()> {
        self.stream_mut(stream)?.set_channel_pan(channel, pan)
    }

    pub fn set_channel_volume(&mut self, stream: Handle, channel: u8, volume: f32) -> Result<()> {
        self.stream_mut(stream)?.set_channel_volume(channel, volume)
    }

    pub fn set_channel_pitch_wheel(&mut self, stream: Handle, channel: u8, pitch_wheel: u16) -> Result<()> {
        self.stream_mut(stream)?
            .set_channel_pitch_wheel(channel, pitch_wheel)
    }

    pub fn set_channel_pitch_range(&mut self, stream: Handle, channel: u8, pitch_range: f32) -> Result<()> {
        self.stream_mut(stream)?
            .set_channel_pitch_range(channel, pitch_range)
    }

    pub fn set_channel_tuning(&mut self, stream: Handle, channel: u8, tuning: f32) -> Result<()> {
        self.stream_mut(stream)?.set_channel_tuning(channel, tuning)
    }

    pub fn channel_midi_control(&mut self, stream: Handle, channel: u8, controller: u8, value: u8) -> Result<()> {
        self.stream_mut(stream)?
            .channel_midi_control(channel, controller, value)
    }

    pub fn channel_preset_index(&self, stream: Handle, channel: u8) -> Result<usize> {
        self.stream(stream)?.channel_preset_index(channel)
    }

    pub fn channel_preset_bank(&self, stream: Handle, channel: u8) -> Result<u16> {
        self.stream(stream)?.channel_preset_bank(channel)
    }

    pub fn channel_preset_number(&self, stream: Handle, channel: u8) -> Result<u16> {
        self.stream(stream)?.channel_preset_number(channel)
    }

    pub fn channel_pan(&self, stream: Handle, channel: u8) -> Result<f32> {
        self.stream(stream)?.channel_pan(channel)
    }

    pub fn channel_volume(&self, stream: Handle, channel: u8) -> Result<f32> {
        self.stream(stream)?.channel_volume(channel)
    }

    pub fn channel_pitch_wheel(&self, stream: Handle, channel: u8) -> Result<u16> {
        self.stream(stream)?.channel_pitch_wheel(channel)
    }

    pub fn channel_pitch_range(&self, stream: Handle, channel: u8) -> Result<f32> {
        self.stream(stream)?.channel_pitch_range(channel)
    }

    pub fn channel_tuning(&self, stream: Handle, channel: u8) -> Result<f32> {
        self.stream(stream)?.channel_tuning(channel)
    }

    pub fn channel_controller(&self, stream: Handle, channel: u8, controller: u8) -> Result<u8> {
        self.stream(stream)?.channel_controller(channel, controller)
    }

    /// Looks up a preset index by bank and program in a soundfont, or in
    /// the soundfont of a stream.
    pub fn preset_index(&self, handle: Handle, bank: u16, program: u16) -> Result<usize> {
        self.soundfont(handle)?.preset_index(bank, program)
    }

    pub fn preset_count(&self, handle: Handle) -> Result<usize> {
        Ok(self.soundfont(handle)?.preset_count())
    }

    pub fn preset_name(&self, handle: Handle, preset_index: usize) -> Result<&str> {
        self.soundfont(handle)?.preset_name(preset_index)
    }

    pub fn bank_preset_name(&self, handle: Handle, bank: u16, program: u16) -> Result<&str> {
        self.soundfont(handle)?.bank_preset_name(bank, program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{single_note_song, soundfont_bytes, TestPreset};

    fn two_presets() -> Vec<u8> {
        soundfont_bytes(&[
            TestPreset::new("Grand Piano", 0, 0),
            TestPreset::new("Bright Piano", 0, 1),
        ])
    }

    fn settings() -> StreamSettings {
        StreamSettings {
            max_voices: 8,
            ..StreamSettings::default()
        }
    }

    #[test]
    fn test_two_preset_bank() {
        let mut engine = Engine::new();
        let sf = engine.load_soundfont(&two_presets()).unwrap();
        assert_eq!(engine.preset_count(sf), Ok(2));
        assert_eq!(engine.preset_index(sf, 0, 1), Ok(1));
        assert_eq!(engine.preset_index(sf, 0, 5), Err(Error::NoSuchPreset));
        assert_eq!(engine.preset_name(sf, 0), Ok("Grand Piano"));
        assert_eq!(engine.bank_preset_name(sf, 0, 1), Ok("Bright Piano"));
        assert_eq!(engine.bank_preset_name(sf, 2, 1), Err(Error::NoSuchPreset));
    }

    #[test]
    fn test_preset_queries_accept_stream_handles() {
        let mut engine = Engine::new();
        let sf = engine.load_soundfont(&two_presets()).unwrap();
        let song = engine.open_stream(&single_note_song(960), sf, settings()).unwrap();
        assert_eq!(engine.preset_count(song), Ok(2));
        assert_eq!(engine.preset_index(song, 0, 1), Ok(1));
        assert_eq!(engine.preset_name(song, 1), Ok("Bright Piano"));
    }

    #[test]
    fn test_render_until_silent() {
        let mut engine = Engine::new();
        let sf = engine.load_soundfont(&two_presets()).unwrap();
        let song = engine.open_stream(&single_note_song(960), sf, settings()).unwrap();

        let mut buf = vec![0.0f32; 4096 * 2];
        let mut total = 0;
        loop {
            let n = engine.render(song, &mut buf, 4096).unwrap();
            assert!(n <= 4096);
            if n == 0 {
                break;
            }
            total += n;
        }
        assert!(total >= 44100);
        assert_eq!(engine.is_stopped(song), Ok(true));
        assert_eq!(engine.active_voice_count(song), Ok(0));
    }

    #[test]
    fn test_double_close() {
        let mut engine = Engine::new();
        let sf = engine.load_soundfont(&two_presets()).unwrap();
        let song = engine.open_stream(&single_note_song(960), sf, settings()).unwrap();

        assert_eq!(engine.close(song), Ok(()));
        assert_eq!(engine.close(song), Err(Error::InvalidHandle(song)));
        assert_eq!(engine.close(sf), Ok(()));
        assert_eq!(engine.close(sf), Err(Error::InvalidHandle(sf)));
        assert_eq!(engine.handle_count(), 0);
    }

    #[test]
    fn test_stream_outlives_closed_soundfont() {
        let mut engine = Engine::new();
        let sf = engine.load_soundfont(&two_presets()).unwrap();
        let song = engine.open_stream(&single_note_song(960), sf, settings()).unwrap();
        engine.close(sf).unwrap();

        assert_eq!(engine.preset_count(sf), Err(Error::InvalidHandle(sf)));
        assert_eq!(engine.preset_count(song), Ok(2));
        let mut buf = vec![0.0f32; 256 * 2];
        assert_eq!(engine.render(song, &mut buf, 256), Ok(256));
        assert!(engine
            .open_stream(&single_note_song(960), sf, settings())
            .is_err());
    }

    #[test]
    fn test_wrong_kind_of_handle() {
        let mut engine = Engine::new();
        let sf = engine.load_soundfont(&two_presets()).unwrap();
        let song = engine.open_stream(&single_note_song(960), sf, settings()).unwrap();

        let mut buf = vec![0.0f32; 64];
        assert_eq!(engine.render(sf, &mut buf, 32), Err(Error::InvalidHandle(sf)));
        assert_eq!(engine.set_channel_volume(sf, 0, 0.5), Err(Error::InvalidHandle(sf)));
        assert_eq!(
            engine
                .open_stream(&single_note_song(960), song, settings())
                .err(),
            Some(Error::InvalidHandle(song))
        );
        assert!(buf.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_unknown_handle_has_no_side_effects() {
        let mut engine = Engine::new();
        let sf = engine.load_soundfont(&two_presets()).unwrap();
        let song = engine.open_stream(&single_note_song(960), sf, settings()).unwrap();
        engine.set_channel_volume(song, 0, 0.25).unwrap();

        let bogus = Handle::from_raw(0x7FFF_FFFF);
        assert_eq!(engine.set_channel_volume(bogus, 0, 1.0), Err(Error::InvalidHandle(bogus)));
        assert_eq!(engine.close(bogus), Err(Error::InvalidHandle(bogus)));
        assert_eq!(engine.channel_volume(song, 0), Ok(0.25));
        assert_eq!(engine.handle_count(), 2);
    }

    #[test]
    fn test_stale_handle_after_slot_reuse() {
        let mut engine = Engine::new();
        let first = engine.load_soundfont(&two_presets()).unwrap();
        engine.close(first).unwrap();
        let second = engine.load_soundfont(&two_presets()).unwrap();

        assert_ne!(first, second);
        assert_eq!(engine.preset_count(first), Err(Error::InvalidHandle(first)));
        assert_eq!(engine.preset_count(second), Ok(2));
    }

    #[test]
    fn test_failed_load_registers_nothing() {
        let mut engine = Engine::new();
        assert!(matches!(engine.load_soundfont(b"junk"), Err(Error::InvalidFile(_))));
        let sf = engine.load_soundfont(&two_presets()).unwrap();
        assert!(matches!(
            engine.open_stream(b"junk", sf, settings()),
            Err(Error::InvalidFile(_))
        ));
        assert_eq!(engine.handle_count(), 1);
    }

    #[test]
    fn test_channel_controls_through_handles() {
        let mut engine = Engine::new();
        let sf = engine.load_soundfont(&two_presets()).unwrap();
        let song = engine.open_stream(&single_note_song(960), sf, settings()).unwrap();

        engine.set_channel_volume(song, 2, 0.75).unwrap();
        assert_eq!(engine.channel_volume(song, 2), Ok(0.75));
        engine.set_channel_bank_preset(song, 2, 0, 1).unwrap();
        assert_eq!(engine.channel_preset_number(song, 2), Ok(1));
        engine.channel_midi_control(song, 2, 10, 0).unwrap();
        assert_eq!(engine.channel_controller(song, 2, 10), Ok(0));
        assert!(engine.channel_pan(song, 2).unwrap() < 0.01);
        engine.set_global_gain(song, 0.5).unwrap();
        engine.midi_stop(song).unwrap();
        assert_eq!(engine.is_stopped(song), Ok(true));
    }

    #[test]
    fn test_notes_through_handles() {
        let mut engine = Engine::new();
        let sf = engine.load_soundfont(&two_presets()).unwrap();
        let song = engine.open_stream(&single_note_song(960), sf, settings()).unwrap();

        engine.note_on(song, 1, 64, 100).unwrap();
        assert_eq!(engine.active_voice_count(song), Ok(1));
        engine.note_off(song, 1, 64).unwrap();
        // Releasing voices still count until they fade
        assert_eq!(engine.active_voice_count(song), Ok(1));

        assert_eq!(engine.note_on(song, 16, 64, 100), Err(Error::InvalidChannel(16)));
        assert_eq!(engine.note_on(sf, 1, 64, 100), Err(Error::InvalidHandle(sf)));
        assert_eq!(engine.note_off(sf, 1, 64), Err(Error::InvalidHandle(sf)));
    }
}
