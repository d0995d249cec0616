//! Voice pool with an optional polyphony cap.
//!
//! When the cap is reached a new note steals a voice: finished voices are
//! reclaimed first, then the oldest voice already in its release stage, and
//! finally the quietest voice (oldest first on ties). Voices that have not
//! produced a frame yet are never taken by the quietest rule, so a chord
//! wider than the cap keeps its first notes and drops the rest.

use super::channel::Channel;
use super::voice::Voice;
use crate::soundfont::Soundfont;

/// Bounded set of voices for one stream.
#[derive(Debug, Clone)]
pub struct VoiceAllocator {
    voices: Vec<Voice>,
    /// Maximum simultaneous voices, 0 for unlimited.
    max_voices: usize,
    next_age: u64,
    sample_rate: u32,
}

impl VoiceAllocator {
    /// Creates an empty pool rendering at `sample_rate`.
    pub fn new(max_voices: usize, sample_rate: u32) -> Self {
        Self {
            voices: Vec::with_capacity(max_voices),
            max_voices,
            next_age: 0,
            sample_rate,
        }
    }

    pub fn max_voices(&self) -> usize {
        self.max_voices
    }

    /// Starts one voice per zone of the channel's preset that matches key
    /// and velocity. A velocity of 0 is treated as note-off.
    pub fn note_on(
        &mut self,
        soundfont: &Soundfont,
        channel_index: u8,
        channel: &Channel,
        key: u8,
        velocity: u8,
    ) {
        if velocity == 0 {
            self.note_off(channel_index, key);
            return;
        }
        let Some(preset) = soundfont.preset(channel.preset_index()) else {
            return;
        };

        self.reclaim();
        let age = self.next_age;
        self.next_age += 1;
        let offset = channel.pitch_offset();

        for zone in preset.zones().iter().filter(|z| z.matches(key, velocity)) {
            if self.max_voices > 0 && self.voices.len() >= self.max_voices && !self.steal() {
                tracing::trace!(channel = channel_index, key, "No voice available, dropping note");
                break;
            }
            self.voices.push(Voice::new(
                channel_index,
                key,
                velocity,
                zone,
                age,
                self.sample_rate,
                offset,
            ));
        }
    }

    /// Releases the voices of the oldest held note on `key`.
    pub fn note_off(&mut self, channel_index: u8, key: u8) {
        let held = |v: &&mut Voice| v.channel() == channel_index && v.key() == key && !v.is_releasing();
        let Some(oldest) = self.voices.iter_mut().filter(held).map(|v| v.age()).min() else {
            return;
        };
        for voice in self.voices.iter_mut().filter(held) {
            if voice.age() == oldest {
                voice.release();
            }
        }
    }

    /// Releases every voice.
    pub fn all_stop(&mut self) {
        self.voices.iter_mut().for_each(Voice::release);
    }

    pub fn release_channel(&mut self, channel_index: u8) {
        self.voices
            .iter_mut()
            .filter(|v| v.channel() == channel_index)
            .for_each(|v| v.release());
    }

    pub fn kill_channel(&mut self, channel_index: u8) {
        self.voices
            .iter_mut()
            .filter(|v| v.channel() == channel_index)
            .for_each(|v| v.kill());
    }

    /// Applies a new channel pitch offset to the channel's voices.
    pub fn retune_channel(&mut self, channel_index: u8, offset: f32) {
        self.voices
            .iter_mut()
            .filter(|v| v.channel() == channel_index)
            .for_each(|v| v.retune(offset));
    }

    /// Number of voices still producing sound.
    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| !v.is_finished()).count()
    }

    /// Drops finished voices from the pool.
    pub fn reclaim(&mut self) {
        self.voices.retain(|v| !v.is_finished());
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    /// Advances every voice by one frame.
    pub fn step_all(&mut self) {
        self.voices.iter_mut().for_each(Voice::advance);
    }

    /// Frees one slot. Returns false if no voice may be taken.
    fn steal(&mut self) -> bool {
        let releasing = self
            .voices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_releasing())
            .min_by_key(|(_, v)| v.age())
            .map(|(i, _)| i);

        let victim = releasing.or_else(|| {
            self.voices
                .iter()
                .enumerate()
                .filter(|(_, v)| v.has_sounded())
                .min_by(|(_, a), (_, b)| {
                    a.loudness()
                        .total_cmp(&b.loudness())
                        .then(a.age().cmp(&b.age()))
                })
                .map(|(i, _)| i)
        });

        match victim {
            Some(index) => {
                let voice = self.voices.swap_remove(index);
                tracing::trace!(
                    channel = voice.channel(),
                    key = voice.key(),
                    releasing = voice.is_releasing(),
                    "Stealing voice"
                );
                true
            }
            None => false,
        }
    }
}
