//! SoundFont 2 banks.
//!
//! A [`Soundfont`] is parsed once from the raw bytes of an `.sf2` file and is
//! immutable afterwards, so any number of streams can share it through an
//! `Arc` and read it from different threads.
//!
//! The SF2 preset/instrument/sample hierarchy is flattened at load time:
//! each [`Preset`] owns a list of [`Zone`]s that already combine the preset
//! and instrument generators, so note-on only has to match key and velocity.

mod parser;
mod riff;

use crate::error::{Error, Result};
use std::collections::HashMap;

/// How a sample behaves once playback reaches its loop end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    /// Play the sample once.
    None,
    /// Loop for as long as the voice sounds.
    Continuous,
    /// Loop until the note is released, then play through to the end.
    UntilRelease,
}

/// Volume envelope parameters for one zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeParams {
    /// Attack time in seconds.
    pub attack: f32,
    /// Decay time in seconds.
    pub decay: f32,
    /// Sustain level (0.0 - 1.0, linear amplitude).
    pub sustain: f32,
    /// Release time in seconds.
    pub release: f32,
}

impl Default for EnvelopeParams {
    fn default() -> Self {
        Self {
            attack: 0.001,
            decay: 0.001,
            sustain: 1.0,
            release: 0.001,
        }
    }
}

/// A region of the shared sample pool, in sample indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRegion {
    /// First sample (inclusive).
    pub start: u32,
    /// Last sample (exclusive).
    pub end: u32,
    /// Loop start (inclusive).
    pub loop_start: u32,
    /// Loop end (exclusive).
    pub loop_end: u32,
    /// Loop behavior.
    pub loop_mode: LoopMode,
    /// Rate the sample was recorded at, in Hz.
    pub sample_rate: u32,
}

/// A key/velocity range of a preset mapped to a sample region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Zone {
    /// Lowest key (inclusive).
    pub key_lo: u8,
    /// Highest key (inclusive).
    pub key_hi: u8,
    /// Lowest velocity (inclusive).
    pub vel_lo: u8,
    /// Highest velocity (inclusive).
    pub vel_hi: u8,
    /// The sample data this zone plays.
    pub sample: SampleRegion,
    /// Key at which the sample plays at its recorded pitch.
    pub root_key: u8,
    /// Additional tuning in cents.
    pub tune: f32,
    /// Pitch change per key in cents (100 = chromatic).
    pub key_tracking: f32,
    /// Attenuation in decibels (non-negative).
    pub attenuation: f32,
    /// Pan offset (-0.5 = left, 0.5 = right).
    pub pan: f32,
    /// Volume envelope.
    pub envelope: EnvelopeParams,
}

impl Zone {
    /// Returns true if this zone sounds for the given key and velocity.
    pub fn matches(&self, key: u8, velocity: u8) -> bool {
        (self.key_lo..=self.key_hi).contains(&key) && (self.vel_lo..=self.vel_hi).contains(&velocity)
    }
}

/// A named instrument selectable by bank and program number.
#[derive(Debug, Clone, PartialEq)]
pub struct Preset {
    pub(crate) name: String,
    pub(crate) bank: u16,
    pub(crate) program: u16,
    pub(crate) zones: Vec<Zone>,
}

impl Preset {
    /// Preset name as stored in the bank.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bank number (128 is the General MIDI percussion bank).
    pub fn bank(&self) -> u16 {
        self.bank
    }

    /// Program number within the bank.
    pub fn program(&self) -> u16 {
        self.program
    }

    /// Flattened zones of this preset.
    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }
}

/// Bank of presets sharing one sample pool.
#[derive(Debug)]
pub struct Soundfont {
    presets: Vec<Preset>,
    samples: Vec<f32>,
    lookup: HashMap<(u16, u16), usize>,
}

impl Soundfont {
    /// Parses a SoundFont 2 file from memory.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidFile`] if the data is not a well-formed SF2 bank
    /// - [`Error::OutOfMemory`] if the sample pool cannot be allocated
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let (presets, samples) = parser::parse(bytes)?;

        // First occurrence wins when a bank contains duplicate numbers
        let mut lookup = HashMap::with_capacity(presets.len());
        for (index, preset) in presets.iter().enumerate() {
            lookup.entry((preset.bank, preset.program)).or_insert(index);
        }

        tracing::debug!(
            presets = presets.len(),
            samples = samples.len(),
            "Loaded soundfont"
        );

        Ok(Self {
            presets,
            samples,
            lookup,
        })
    }

    /// Number of presets declared in the bank.
    pub fn preset_count(&self) -> usize {
        self.presets.len()
    }

    /// All presets in file order.
    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }

    /// Returns the preset at `index`, if any.
    pub fn preset(&self, index: usize) -> Option<&Preset> {
        self.presets.get(index)
    }

    /// Returns the name of the preset at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchPreset`] if the index is out of bounds.
    pub fn preset_name(&self, index: usize) -> Result<&str> {
        self.preset(index)
            .map(Preset::name)
            .ok_or(Error::NoSuchPreset)
    }

    /// Looks up the index of the preset with the given bank and program.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchPreset`] if the bank has no such preset.
    pub fn preset_index(&self, bank: u16, program: u16) -> Result<usize> {
        self.lookup
            .get(&(bank, program))
            .copied()
            .ok_or(Error::NoSuchPreset)
    }

    /// Returns the name of the preset with the given bank and program.
    pub fn bank_preset_name(&self, bank: u16, program: u16) -> Result<&str> {
        let index = self.preset_index(bank, program)?;
        self.preset_name(index)
    }

    /// The shared sample pool, normalized to -1.0..1.0.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}
