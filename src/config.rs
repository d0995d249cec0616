//! Stream settings and player configuration.
//!
//! Both types are plain serde structs so the demo player can read them from
//! a JSON file. Missing fields fall back to their defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default output sample rate (44.1 kHz).
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Output format and playback options of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Maximum simultaneous voices, 0 for unlimited.
    pub max_voices: usize,
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved stereo output if true, mono otherwise.
    pub stereo: bool,
    /// Restart the song when it reaches the end.
    pub looping: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            max_voices: 0,
            sample_rate: DEFAULT_SAMPLE_RATE,
            stereo: true,
            looping: false,
        }
    }
}

impl StreamSettings {
    /// Number of interleaved output channels.
    pub fn channels(&self) -> u16 {
        if self.stereo {
            2
        } else {
            1
        }
    }

    /// Number of `f32` samples per output frame.
    pub fn frame_size(&self) -> usize {
        self.channels() as usize
    }
}

/// Settings for the demo player, usually loaded from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// SoundFont used when none is given on the command line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soundfont: Option<PathBuf>,
    /// Global output gain.
    pub gain: f32,
    /// Stream output settings.
    pub stream: StreamSettings,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            soundfont: None,
            gain: 1.0,
            stream: StreamSettings::default(),
        }
    }
}

impl PlayerConfig {
    /// Serializes the configuration to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parses a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not valid JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Writes the configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(path, json)
    }
}
