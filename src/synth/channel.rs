//! Per-channel MIDI state.
//!
//! A stream has [`CHANNEL_COUNT`] channels. Each one remembers the selected
//! preset, mix settings and pitch controls, and interprets MIDI controller
//! messages. Controller changes that affect sounding voices are reported back
//! as a [`ControlChange`] so the caller can update the voice pool.

/// Number of MIDI channels per stream.
pub const CHANNEL_COUNT: usize = 16;

/// The General MIDI percussion channel (channel 10, zero-based).
pub const DRUM_CHANNEL: u8 = 9;

/// Center position of the pitch wheel.
pub const PITCH_WHEEL_CENTER: u16 = 8192;

const MAX_14BIT: u16 = 16383;

/// Registered parameter numbers understood by data entry.
const RPN_PITCH_RANGE: u16 = 0;
const RPN_FINE_TUNING: u16 = 1;
const RPN_COARSE_TUNING: u16 = 2;

/// What the voice pool has to do after a controller message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlChange {
    /// Channel state changed; sounding voices are unaffected.
    Updated,
    /// Pitch of the channel changed; sounding voices must be retuned.
    Retune,
    /// Release every voice on the channel.
    AllNotesOff,
    /// Silence every voice on the channel immediately.
    AllSoundOff,
}

/// State of one MIDI channel.
#[derive(Debug, Clone)]
pub struct Channel {
    pub(crate) preset_index: usize,
    pub(crate) bank: u16,
    pub(crate) volume: f32,
    pub(crate) pan: f32,
    pub(crate) pitch_wheel: u16,
    pub(crate) pitch_range: f32,
    pub(crate) tuning: f32,
    controllers: [u8; 128],
    bank_msb: Option<u16>,
    midi_volume: u16,
    midi_expression: u16,
    midi_pan: u16,
    rpn: Option<u16>,
    data_entry: u16,
    coarse_tuning: f32,
    fine_tuning: f32,
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            preset_index: 0,
            bank: 0,
            volume: 1.0,
            pan: 0.5,
            pitch_wheel: PITCH_WHEEL_CENTER,
            pitch_range: 2.0,
            tuning: 0.0,
            controllers: [0; 128],
            bank_msb: None,
            midi_volume: MAX_14BIT,
            midi_expression: MAX_14BIT,
            midi_pan: PITCH_WHEEL_CENTER,
            rpn: None,
            data_entry: 0,
            coarse_tuning: 0.0,
            fine_tuning: 0.0,
        }
    }
}

fn set_msb(value: u16, msb: u8) -> u16 {
    (value & 0x7F) | ((msb as u16 & 0x7F) << 7)
}

fn set_lsb(value: u16, lsb: u8) -> u16 {
    (value & 0x3F80) | (lsb as u16 & 0x7F)
}

impl Channel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the selected preset in the soundfont.
    pub fn preset_index(&self) -> usize {
        self.preset_index
    }

    /// Bank used for the next program change.
    pub fn bank(&self) -> u16 {
        self.bank
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Stereo position (0.0 = left, 0.5 = center, 1.0 = right).
    pub fn pan(&self) -> f32 {
        self.pan
    }

    pub fn pitch_wheel(&self) -> u16 {
        self.pitch_wheel
    }

    /// Pitch wheel range in semitones.
    pub fn pitch_range(&self) -> f32 {
        self.pitch_range
    }

    /// Channel tuning in semitones.
    pub fn tuning(&self) -> f32 {
        self.tuning
    }

    /// Last raw value received for a controller (0 if never set).
    pub fn controller(&self, controller: u8) -> u8 {
        self.controllers[(controller & 0x7F) as usize]
    }

    pub fn set_pitch_wheel(&mut self, value: u16) {
        self.pitch_wheel = value.min(MAX_14BIT);
    }

    /// Total pitch offset of the channel in semitones: tuning plus the
    /// pitch wheel scaled by its range.
    pub fn pitch_offset(&self) -> f32 {
        let wheel = (self.pitch_wheel as f32 - PITCH_WHEEL_CENTER as f32) / PITCH_WHEEL_CENTER as f32;
        self.tuning + wheel * self.pitch_range
    }

    /// Applies a MIDI controller message.
    ///
    /// # Arguments
    ///
    /// * `controller` - Controller number (0-127)
    /// * `value` - Controller value (0-127)
    ///
    /// # Returns
    ///
    /// What the caller must do to the channel's sounding voices.
    pub fn control(&mut self, controller: u8, value: u8) -> ControlChange {
        let controller = controller & 0x7F;
        let value = value & 0x7F;
        self.controllers[controller as usize] = value;

        match controller {
            // Bank select MSB on its own selects the bank directly
            0 => {
                self.bank_msb = Some(value as u16);
                self.bank = value as u16;
            }
            32 => {
                self.bank = match self.bank_msb {
                    Some(msb) => (msb << 7) | value as u16,
                    None => value as u16,
                };
            }
            7 => {
                self.midi_volume = set_msb(self.midi_volume, value);
                self.update_volume();
            }
            39 => {
                self.midi_volume = set_lsb(self.midi_volume, value);
                self.update_volume();
            }
            11 => {
                self.midi_expression = set_msb(self.midi_expression, value);
                self.update_volume();
            }
            43 => {
                self.midi_expression = set_lsb(self.midi_expression, value);
                self.update_volume();
            }
            10 => {
                self.midi_pan = set_msb(self.midi_pan, value);
                self.update_pan();
            }
            42 => {
                self.midi_pan = set_lsb(self.midi_pan, value);
                self.update_pan();
            }
            101 => self.rpn = Some(set_msb(self.rpn.unwrap_or(0), value)),
            100 => self.rpn = Some(set_lsb(self.rpn.unwrap_or(0), value)),
            // Non-registered parameters are not supported, so data entry
            // is ignored until the next RPN select
            98 | 99 => self.rpn = None,
            6 => {
                self.data_entry = set_msb(self.data_entry, value);
                return self.apply_data_entry();
            }
            38 => {
                self.data_entry = set_lsb(self.data_entry, value);
                return self.apply_data_entry();
            }
            120 => return ControlChange::AllSoundOff,
            121 => {
                self.reset_controllers();
                return ControlChange::Retune;
            }
            123 => return ControlChange::AllNotesOff,
            _ => {}
        }
        ControlChange::Updated
    }

    fn update_volume(&mut self) {
        self.volume = (self.midi_volume as f32 / MAX_14BIT as f32)
            * (self.midi_expression as f32 / MAX_14BIT as f32);
    }

    fn update_pan(&mut self) {
        self.pan = self.midi_pan as f32 / MAX_14BIT as f32;
    }

    fn apply_data_entry(&mut self) -> ControlChange {
        let msb = (self.data_entry >> 7) as f32;
        let lsb = (self.data_entry & 0x7F) as f32;
        match self.rpn {
            Some(RPN_PITCH_RANGE) => self.pitch_range = msb + lsb / 100.0,
            Some(RPN_FINE_TUNING) => {
                self.fine_tuning =
                    (self.data_entry as f32 - PITCH_WHEEL_CENTER as f32) / PITCH_WHEEL_CENTER as f32;
                self.tuning = self.coarse_tuning + self.fine_tuning;
            }
            Some(RPN_COARSE_TUNING) => {
                self.coarse_tuning = msb - 64.0;
                self.tuning = self.coarse_tuning + self.fine_tuning;
            }
            _ => return ControlChange::Updated,
        }
        ControlChange::Retune
    }

    /// Restores mix and pitch controls to their power-on values. The
    /// selected preset and bank are kept.
    pub fn reset_controllers(&mut self) {
        *self = Self {
            preset_index: self.preset_index,
            bank: self.bank,
            ..Self::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let ch = Channel::new();
        assert_eq!(ch.volume(), 1.0);
        assert_eq!(ch.pan(), 0.5);
        assert_eq!(ch.pitch_wheel(), PITCH_WHEEL_CENTER);
        assert_eq!(ch.pitch_range(), 2.0);
        assert_eq!(ch.pitch_offset(), 0.0);
    }

    #[test]
    fn test_volume_and_expression() {
        let mut ch = Channel::new();
        // The fine byte is still at its default, so this is not quite zero
        assert_eq!(ch.control(7, 0), ControlChange::Updated);
        assert!(ch.volume() < 0.01);
        ch.control(7, 127);
        assert!((ch.volume() - 1.0).abs() < 1e-6);
        ch.control(11, 64);
        assert!(ch.volume() > 0.45 && ch.volume() < 0.55);
        assert_eq!(ch.controller(11), 64);
    }

    #[test]
    fn test_pan() {
        let mut ch = Channel::new();
        ch.control(10, 0);
        assert!(ch.pan() < 0.01);
        ch.control(10, 127);
        assert!(ch.pan() > 0.99);
    }

    #[test]
    fn test_bank_select() {
        let mut ch = Channel::new();
        ch.control(0, 1);
        assert_eq!(ch.bank(), 1);
        ch.control(32, 2);
        assert_eq!(ch.bank(), 130);
    }

    #[test]
    fn test_pitch_range_rpn() {
        let mut ch = Channel::new();
        ch.control(101, 0);
        ch.control(100, 0);
        assert_eq!(ch.control(6, 12), ControlChange::Retune);
        assert_eq!(ch.pitch_range(), 12.0);

        ch.set_pitch_wheel(16383);
        assert!((ch.pitch_offset() - 12.0).abs() < 0.01);
        ch.set_pitch_wheel(0);
        assert!((ch.pitch_offset() + 12.0).abs() < 1e-6);
    }

    #[test]
    fn test_coarse_tuning_rpn() {
        let mut ch = Channel::new();
        ch.control(101, 0);
        ch.control(100, 2);
        ch.control(6, 66);
        assert_eq!(ch.tuning(), 2.0);
    }

    #[test]
    fn test_data_entry_without_rpn_is_ignored() {
        let mut ch = Channel::new();
        assert_eq!(ch.control(6, 24), ControlChange::Updated);
        assert_eq!(ch.pitch_range(), 2.0);

        ch.control(101, 0);
        ch.control(100, 0);
        ch.control(99, 0);
        assert_eq!(ch.control(6, 24), ControlChange::Updated);
        assert_eq!(ch.pitch_range(), 2.0);
    }

    #[test]
    fn test_channel_mode_messages() {
        let mut ch = Channel::new();
        assert_eq!(ch.control(120, 0), ControlChange::AllSoundOff);
        assert_eq!(ch.control(123, 0), ControlChange::AllNotesOff);
    }

    #[test]
    fn test_reset_all_controllers_keeps_preset() {
        let mut ch = Channel::new();
        ch.preset_index = 3;
        ch.bank = 128;
        ch.control(7, 10);
        ch.set_pitch_wheel(0);
        assert_eq!(ch.control(121, 0), ControlChange::Retune);
        assert_eq!(ch.preset_index(), 3);
        assert_eq!(ch.bank(), 128);
        assert_eq!(ch.volume(), 1.0);
        assert_eq!(ch.pitch_wheel(), PITCH_WHEEL_CENTER);
    }
}
