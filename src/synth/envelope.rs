//! Linear ADSR volume envelope.
//!
//! Stages run Attack → Decay → Sustain → Release → Finished. Release can be
//! entered from any earlier stage and always starts from the current level,
//! so releasing during the attack does not click.

use crate::soundfont::EnvelopeParams;

/// Stage of a voice's amplitude envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    /// Ramping from 0 to full level.
    Attack,
    /// Ramping from full level down to the sustain level.
    Decay,
    /// Holding the sustain level while the key is down.
    Sustain,
    /// Ramping from the current level to 0 after note-off.
    Release,
    /// Silent; the voice can be reclaimed.
    Finished,
}

/// Per-voice envelope state, advanced one frame at a time.
#[derive(Debug, Clone)]
pub struct Envelope {
    stage: EnvelopeStage,
    level: f32,
    attack_step: f32,
    decay_step: f32,
    sustain: f32,
    release_frames: f32,
    release_step: f32,
}

/// Converts a duration to a frame count, never less than one frame.
fn frames(seconds: f32, sample_rate: f32) -> f32 {
    (seconds * sample_rate).max(1.0)
}

impl Envelope {
    /// Creates an envelope at the start of its attack.
    pub fn new(params: &EnvelopeParams, sample_rate: f32) -> Self {
        let sustain = params.sustain.clamp(0.0, 1.0);
        Self {
            stage: EnvelopeStage::Attack,
            level: 0.0,
            attack_step: 1.0 / frames(params.attack, sample_rate),
            decay_step: (1.0 - sustain) / frames(params.decay, sample_rate),
            sustain,
            release_frames: frames(params.release, sample_rate),
            release_step: 0.0,
        }
    }

    /// Current stage.
    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    /// Current amplitude (0.0 - 1.0).
    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn is_releasing(&self) -> bool {
        self.stage == EnvelopeStage::Release
    }

    pub fn is_finished(&self) -> bool {
        self.stage == EnvelopeStage::Finished
    }

    /// Enters the release stage. No effect if already releasing or done.
    pub fn release(&mut self) {
        if matches!(self.stage, EnvelopeStage::Release | EnvelopeStage::Finished) {
            return;
        }
        self.stage = EnvelopeStage::Release;
        self.release_step = self.level / self.release_frames;
    }

    /// Silences the envelope immediately.
    pub fn kill(&mut self) {
        self.stage = EnvelopeStage::Finished;
        self.level = 0.0;
    }

    /// Advances the envelope by one frame.
    pub fn step(&mut self) {
        match self.stage {
            EnvelopeStage::Attack => {
                self.level += self.attack_step;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = EnvelopeStage::Decay;
                }
            }
            EnvelopeStage::Decay => {
                self.level -= self.decay_step;
                if self.level <= self.sustain {
                    self.level = self.sustain;
                    // A silent sustain means the note has decayed out
                    self.stage = if self.sustain <= 0.0 {
                        EnvelopeStage::Finished
                    } else {
                        EnvelopeStage::Sustain
                    };
                }
            }
            EnvelopeStage::Sustain | EnvelopeStage::Finished => {}
            EnvelopeStage::Release => {
                self.level -= self.release_step;
                if self.level <= 0.0 {
                    self.level = 0.0;
                    self.stage = EnvelopeStage::Finished;
                }
            }
        }
    }
}
