//! A playing MIDI song: channels, voices and sequencer rendered to PCM.
//!
//! A [`Stream`] owns everything needed to turn one MIDI file into audio. It
//! shares its [`Soundfont`] with other streams through an `Arc`, so streams
//! on one bank can render on different threads.

use crate::config::StreamSettings;
use crate::error::{Error, Result};
use crate::midi::{MidiEvent, MidiFile, Sequencer};
use crate::soundfont::Soundfont;
use crate::synth::{Channel, ControlChange, VoiceAllocator, CHANNEL_COUNT, DRUM_CHANNEL};
use std::sync::Arc;

/// Bank holding the General MIDI percussion kits.
pub const DRUM_BANK: u16 = 128;

/// Resolves a program number to a preset index.
///
/// With `midi_drums` the percussion banks are searched first: bank
/// `128 | bank`, then 128, then the standard kit (128, 0). Both paths then
/// try `bank` itself and finally bank 0.
///
/// # Errors
///
/// Returns [`Error::NoSuchPreset`] if no candidate exists.
pub fn find_preset_number(
    soundfont: &Soundfont,
    bank: u16,
    program: u16,
    midi_drums: bool,
) -> Result<usize> {
    let drums = || {
        soundfont
            .preset_index(DRUM_BANK | bank, program)
            .or_else(|_| soundfont.preset_index(DRUM_BANK, program))
            .or_else(|_| soundfont.preset_index(DRUM_BANK, 0))
    };
    let melodic = || {
        soundfont
            .preset_index(bank, program)
            .or_else(|_| soundfont.preset_index(0, program))
    };
    if midi_drums {
        drums().or_else(|_| melodic())
    } else {
        melodic()
    }
}

/// Applies one sequenced MIDI event to the channel and voice state.
pub(crate) fn apply_event(
    soundfont: &Soundfont,
    channels: &mut [Channel],
    voices: &mut VoiceAllocator,
    event: &MidiEvent,
) {
    match *event {
        MidiEvent::NoteOn {
            channel,
            key,
            velocity,
        } => {
            if let Some(ch) = channels.get(channel as usize) {
                voices.note_on(soundfont, channel, ch, key, velocity);
            }
        }
        MidiEvent::NoteOff { channel, key } => voices.note_off(channel, key),
        MidiEvent::Controller {
            channel,
            controller,
            value,
        } => {
            if let Some(ch) = channels.get_mut(channel as usize) {
                let change = ch.control(controller, value);
                apply_control_change(voices, channel, ch, change);
            }
        }
        MidiEvent::ProgramChange { channel, program } => {
            if let Some(ch) = channels.get_mut(channel as usize) {
                let drums = channel == DRUM_CHANNEL;
                match find_preset_number(soundfont, ch.bank, program as u16, drums) {
                    Ok(index) => ch.preset_index = index,
                    Err(_) => tracing::debug!(channel, program, bank = ch.bank, "No preset for program change"),
                }
            }
        }
        MidiEvent::PitchBend { channel, value } => {
            if let Some(ch) = channels.get_mut(channel as usize) {
                ch.set_pitch_wheel(value);
                voices.retune_channel(channel, ch.pitch_offset());
            }
        }
    }
}

fn apply_control_change(voices: &mut VoiceAllocator, index: u8, channel: &Channel, change: ControlChange) {
    match change {
        ControlChange::Updated => {}
        ControlChange::Retune => voices.retune_channel(index, channel.pitch_offset()),
        ControlChange::AllNotesOff => voices.release_channel(index),
        ControlChange::AllSoundOff => voices.kill_channel(index),
    }
}

/// One MIDI song rendering through a soundfont.
#[derive(Debug)]
pub struct Stream {
    soundfont: Arc<Soundfont>,
    channels: Vec<Channel>,
    voices: VoiceAllocator,
    sequencer: Sequencer,
    settings: StreamSettings,
    global_gain: f32,
}

impl Stream {
    /// Parses a MIDI file and prepares it for playback.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidFile`] if the MIDI data cannot be parsed
    /// - [`Error::InvalidSampleRate`] if the sample rate is zero
    pub fn open(midi: &[u8], soundfont: Arc<Soundfont>, settings: StreamSettings) -> Result<Self> {
        let midi = MidiFile::parse(midi)?;
        Self::new(&midi, soundfont, settings)
    }

    /// Creates a stream for an already parsed song.
    pub fn new(midi: &MidiFile, soundfont: Arc<Soundfont>, settings: StreamSettings) -> Result<Self> {
        if settings.sample_rate == 0 {
            return Err(Error::InvalidSampleRate(settings.sample_rate));
        }

        let mut channels = vec![Channel::new(); CHANNEL_COUNT];
        if let Ok(index) = soundfont.preset_index(DRUM_BANK, 0) {
            let drums = &mut channels[DRUM_CHANNEL as usize];
            drums.preset_index = index;
            drums.bank = DRUM_BANK;
        }

        tracing::debug!(
            events = midi.events().len(),
            seconds = midi.length(),
            sample_rate = settings.sample_rate,
            stereo = settings.stereo,
            looping = settings.looping,
            "Opened stream"
        );

        Ok(Self {
            voices: VoiceAllocator::new(settings.max_voices, settings.sample_rate),
            sequencer: Sequencer::new(midi, settings.sample_rate, settings.looping),
            soundfont,
            channels,
            settings,
            global_gain: 1.0,
        })
    }

    pub fn soundfont(&self) -> &Arc<Soundfont> {
        &self.soundfont
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    /// Renders interleaved PCM into `out`.
    ///
    /// # Arguments
    ///
    /// * `out` - Destination buffer, one sample per output channel per frame
    /// * `frame_limit` - Maximum number of frames to render
    ///
    /// # Returns
    ///
    /// The number of frames written, at most
    /// `min(frame_limit, out.len() / frame_size)`. Zero means the song has
    /// stopped and every voice has faded out.
    pub fn render(&mut self, out: &mut [f32], frame_limit: usize) -> usize {
        let width = self.settings.frame_size();
        self.voices.reclaim();

        let mut written = 0;
        for frame in out.chunks_exact_mut(width).take(frame_limit) {
            if self.sequencer.is_stopped() && self.voices.active_count() == 0 {
                break;
            }

            let ended = self.sequencer.advance(1, |event| {
                apply_event(&self.soundfont, &mut self.channels, &mut self.voices, event)
            });
            if ended {
                self.voices.all_stop();
            }

            self.mix_frame(frame);
            self.voices.step_all();
            written += 1;
        }
        written
    }

    fn mix_frame(&self, frame: &mut [f32]) {
        let samples = self.soundfont.samples();
        let mut left = 0.0f32;
        let mut right = 0.0f32;

        for voice in self.voices.voices() {
            let channel = &self.channels[voice.channel() as usize];
            let value = voice.output(samples) * channel.volume() * self.global_gain;
            if self.settings.stereo {
                // Equal-power pan around the center
                let pan = (channel.pan() - 0.5 + voice.pan()).clamp(-0.5, 0.5);
                left += value * (0.5 - pan).sqrt();
                right += value * (0.5 + pan).sqrt();
            } else {
                left += value;
            }
        }

        frame[0] = left.clamp(-1.0, 1.0);
        if let Some(r) = frame.get_mut(1) {
            *r = right.clamp(-1.0, 1.0);
        }
    }

    /// Stops the song. Sounding notes are released and fade out.
    pub fn midi_stop(&mut self) {
        self.sequencer.stop();
        self.voices.all_stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.sequencer.is_stopped()
    }

    pub fn millisecond_length(&self) -> f64 {
        self.sequencer.millisecond_length()
    }

    pub fn millisecond_position(&self) -> f64 {
        self.sequencer.millisecond_position()
    }

    pub fn active_voice_count(&self) -> usize {
        self.voices.active_count()
    }

    pub fn global_gain(&self) -> f32 {
        self.global_gain
    }

    pub fn set_global_gain(&mut self, gain: f32) {
        self.global_gain = gain;
    }

    fn channel(&self, channel: u8) -> Result<&Channel> {
        self.channels
            .get(channel as usize)
            .ok_or(Error::InvalidChannel(channel))
    }

    fn channel_mut(&mut self, channel: u8) -> Result<&mut Channel> {
        self.channels
            .get_mut(channel as usize)
            .ok_or(Error::InvalidChannel(channel))
    }

    fn retune(&mut self, channel: u8) -> Result<()> {
        let offset = self.channel(channel)?.pitch_offset();
        self.voices.retune_channel(channel, offset);
        Ok(())
    }

    /// Starts a note outside of the song's own events. Key and velocity are
    /// masked to 7 bits.
    pub fn note_on(&mut self, channel: u8, key: u8, velocity: u8) -> Result<()> {
        let ch = self.channels.get(channel as usize).ok_or(Error::InvalidChannel(channel))?;
        self.voices
            .note_on(&self.soundfont, channel, ch, key & 0x7F, velocity & 0x7F);
        Ok(())
    }

    /// Releases the oldest held note on `key`.
    pub fn note_off(&mut self, channel: u8, key: u8) -> Result<()> {
        self.channel(channel)?;
        self.voices.note_off(channel, key & 0x7F);
        Ok(())
    }

    /// Selects a preset by its index in the soundfont.
    pub fn set_channel_preset_index(&mut self, channel: u8, preset_index: usize) -> Result<()> {
        let preset_count = self.soundfont.preset_count();
        let ch = self.channel_mut(channel)?;
        if preset_index >= preset_count {
            return Err(Error::NoSuchPreset);
        }
        ch.preset_index = preset_index;
        Ok(())
    }

    /// Selects a preset by program number in the channel's current bank.
    /// See [`find_preset_number`] for the search order.
    pub fn set_channel_preset_number(&mut self, channel: u8, preset_number: u16, midi_drums: bool) -> Result<()> {
        let bank = self.channel(channel)?.bank;
        let index = find_preset_number(&self.soundfont, bank, preset_number, midi_drums)?;
        self.channel_mut(channel)?.preset_index = index;
        Ok(())
    }

    /// Sets the bank used by later program changes.
    pub fn set_channel_bank(&mut self, channel: u8, bank: u16) -> Result<()> {
        self.channel_mut(channel)?.bank = bank;
        Ok(())
    }

    /// Selects the preset with exactly this bank and program.
    pub fn set_channel_bank_preset(&mut self, channel: u8, bank: u16, preset_number: u16) -> Result<()> {
        self.channel(channel)?;
        let index = self.soundfont.preset_index(bank, preset_number)?;
        let ch = self.channel_mut(channel)?;
        ch.bank = bank;
        ch.preset_index = index;
        Ok(())
    }

    pub fn set_channel_pan(&mut self, channel: u8, pan: f32) -> Result<()> {
        self.channel_mut(channel)?.pan = pan;
        Ok(())
    }

    pub fn set_channel_volume(&mut self, channel: u8, volume: f32) -> Result<()> {
        self.channel_mut(channel)?.volume = volume;
        Ok(())
    }

    pub fn set_channel_pitch_wheel(&mut self, channel: u8, pitch_wheel: u16) -> Result<()> {
        self.channel_mut(channel)?.set_pitch_wheel(pitch_wheel);
        self.retune(channel)
    }

    pub fn set_channel_pitch_range(&mut self, channel: u8, pitch_range: f32) -> Result<()> {
        self.channel_mut(channel)?.pitch_range = pitch_range;
        self.retune(channel)
    }

    pub fn set_channel_tuning(&mut self, channel: u8, tuning: f32) -> Result<()> {
        self.channel_mut(channel)?.tuning = tuning;
        self.retune(channel)
    }

    /// Feeds a MIDI controller message to a channel.
    pub fn channel_midi_control(&mut self, channel: u8, controller: u8, value: u8) -> Result<()> {
        let ch = self
            .channels
            .get_mut(channel as usize)
            .ok_or(Error::InvalidChannel(channel))?;
        let change = ch.control(controller, value);
        apply_control_change(&mut self.voices, channel, ch, change);
        Ok(())
    }

    pub fn channel_preset_index(&self, channel: u8) -> Result<usize> {
        Ok(self.channel(channel)?.preset_index())
    }

    pub fn channel_preset_bank(&self, channel: u8) -> Result<u16> {
        Ok(self.channel(channel)?.bank())
    }

    /// Program number of the channel's current preset.
    pub fn channel_preset_number(&self, channel: u8) -> Result<u16> {
        let index = self.channel(channel)?.preset_index();
        self.soundfont
            .preset(index)
            .map(|p| p.program())
            .ok_or(Error::NoSuchPreset)
    }

    pub fn channel_pan(&self, channel: u8) -> Result<f32> {
        Ok(self.channel(channel)?.pan())
    }

    pub fn channel_volume(&self, channel: u8) -> Result<f32> {
        Ok(self.channel(channel)?.volume())
    }

    pub fn channel_pitch_wheel(&self, channel: u8) -> Result<u16> {
        Ok(self.channel(channel)?.pitch_wheel())
    }

    pub fn channel_pitch_range(&self, channel: u8) -> Result<f32> {
        Ok(self.channel(channel)?.pitch_range())
    }

    pub fn channel_tuning(&self, channel: u8) -> Result<f32> {
        Ok(self.channel(channel)?.tuning())
    }

    pub fn channel_controller(&self, channel: u8, controller: u8) -> Result<u8> {
        Ok(self.channel(channel)?.controller(controller))
    }
}
