//! A single sounding sample.

use super::envelope::Envelope;
use crate::soundfont::{LoopMode, Zone};

/// One playing zone of a note: a sample cursor with its own envelope.
#[derive(Debug, Clone)]
pub struct Voice {
    channel: u8,
    key: u8,
    age: u64,
    zone: Zone,
    /// Read position in the sample pool, in samples.
    position: f64,
    /// Pitch of the note relative to the sample root, before channel offsets.
    base_semitones: f32,
    /// Sample rate divided by output rate.
    rate_ratio: f64,
    /// Pool samples consumed per output frame.
    pitch_ratio: f64,
    gain: f32,
    envelope: Envelope,
    /// Set once the voice has produced its first frame.
    sounded: bool,
}

impl Voice {
    /// Starts a voice for `zone` at the beginning of its sample.
    ///
    /// # Arguments
    ///
    /// * `channel` - MIDI channel the note was played on
    /// * `key` - MIDI key number
    /// * `velocity` - Note-on velocity (1-127)
    /// * `zone` - The preset zone that matched key and velocity
    /// * `age` - Allocation counter, lower is older
    /// * `output_rate` - Stream sample rate in Hz
    /// * `channel_offset` - Channel tuning plus pitch wheel, in semitones
    pub fn new(
        channel: u8,
        key: u8,
        velocity: u8,
        zone: &Zone,
        age: u64,
        output_rate: u32,
        channel_offset: f32,
    ) -> Self {
        let base_semitones = (key as f32 - zone.root_key as f32) * zone.key_tracking / 100.0
            + zone.tune / 100.0;
        let rate_ratio = zone.sample.sample_rate.max(1) as f64 / output_rate.max(1) as f64;
        let gain = velocity.min(127) as f32 / 127.0 * 10f32.powf(-zone.attenuation / 20.0);

        let mut voice = Self {
            channel,
            key,
            age,
            zone: *zone,
            position: zone.sample.start as f64,
            base_semitones,
            rate_ratio,
            pitch_ratio: rate_ratio,
            gain,
            envelope: Envelope::new(&zone.envelope, output_rate as f32),
            sounded: false,
        };
        voice.retune(channel_offset);
        voice
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn key(&self) -> u8 {
        self.key
    }

    pub fn age(&self) -> u64 {
        self.age
    }

    /// Zone pan offset (-0.5 - 0.5).
    pub fn pan(&self) -> f32 {
        self.zone.pan
    }

    /// Recomputes the playback rate for a new channel pitch offset.
    pub fn retune(&mut self, channel_offset: f32) {
        let semitones = (self.base_semitones + channel_offset) as f64;
        self.pitch_ratio = 2f64.powf(semitones / 12.0) * self.rate_ratio;
    }

    fn is_looping(&self) -> bool {
        match self.zone.sample.loop_mode {
            LoopMode::None => false,
            LoopMode::Continuous => true,
            LoopMode::UntilRelease => !self.envelope.is_releasing(),
        }
    }

    /// Current output value: the interpolated sample scaled by envelope and
    /// velocity gain.
    pub fn output(&self, samples: &[f32]) -> f32 {
        if self.envelope.is_finished() {
            return 0.0;
        }
        let region = &self.zone.sample;
        let index = self.position as usize;
        let frac = (self.position - index as f64) as f32;

        let next = index + 1;
        let next = if self.is_looping() && next >= region.loop_end as usize {
            region.loop_start as usize
        } else {
            next
        };
        let s0 = samples.get(index).copied().unwrap_or(0.0);
        let s1 = if next < region.end as usize {
            samples.get(next).copied().unwrap_or(0.0)
        } else {
            0.0
        };

        (s0 + (s1 - s0) * frac) * self.envelope.level() * self.gain
    }

    /// Moves the voice one output frame forward.
    pub fn advance(&mut self) {
        if self.envelope.is_finished() {
            return;
        }
        self.sounded = true;
        self.envelope.step();
        self.position += self.pitch_ratio;

        let region = &self.zone.sample;
        if self.is_looping() {
            let loop_start = region.loop_start as f64;
            let loop_end = region.loop_end as f64;
            let length = loop_end - loop_start;
            if self.position >= loop_end && length > 0.0 {
                self.position = loop_start + (self.position - loop_start) % length;
            }
        } else if self.position >= region.end as f64 {
            // One-shot sample ran out
            self.envelope.kill();
        }
    }

    /// Enters the release stage of the envelope.
    pub fn release(&mut self) {
        self.envelope.release();
    }

    /// Silences the voice at once.
    pub fn kill(&mut self) {
        self.envelope.kill();
    }

    pub fn is_releasing(&self) -> bool {
        self.envelope.is_releasing()
    }

    pub fn is_finished(&self) -> bool {
        self.envelope.is_finished()
    }

    /// Returns true once at least one frame of the voice has been mixed.
    pub fn has_sounded(&self) -> bool {
        self.sounded
    }

    /// Approximate loudness used to rank voices for stealing.
    pub fn loudness(&self) -> f32 {
        self.envelope.level() * self.gain
    }
}
