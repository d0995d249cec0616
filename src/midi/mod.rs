//! Standard MIDI File loading.
//!
//! A [`MidiFile`] is the tempo-resolved form of an SMF: every channel event
//! the synthesizer understands, stamped with its time in seconds and sorted
//! in playback order. Tracks of format 0 and 1 files play in parallel and
//! are merged by time; tracks of format 2 files play one after another.
//!
//! [`sequencer::Sequencer`] walks this list in output frames.

pub mod sequencer;

pub use sequencer::Sequencer;

use crate::error::{Error, Result};
use midly::{Format, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};

/// Tempo assumed until the first tempo event (120 BPM).
pub const DEFAULT_TEMPO: u32 = 500_000;

/// A channel message the synthesizer acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { channel: u8, key: u8, velocity: u8 },
    NoteOff { channel: u8, key: u8 },
    Controller { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    /// Pitch wheel position (0 - 16383, center 8192).
    PitchBend { channel: u8, value: u16 },
}

impl MidiEvent {
    fn from_midly(channel: u8, message: MidiMessage) -> Option<Self> {
        Some(match message {
            MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => MidiEvent::NoteOff {
                channel,
                key: key.as_int(),
            },
            MidiMessage::NoteOn { key, vel } => MidiEvent::NoteOn {
                channel,
                key: key.as_int(),
                velocity: vel.as_int(),
            },
            MidiMessage::NoteOff { key, .. } => MidiEvent::NoteOff {
                channel,
                key: key.as_int(),
            },
            MidiMessage::Controller { controller, value } => MidiEvent::Controller {
                channel,
                controller: controller.as_int(),
                value: value.as_int(),
            },
            MidiMessage::ProgramChange { program } => MidiEvent::ProgramChange {
                channel,
                program: program.as_int(),
            },
            MidiMessage::PitchBend { bend } => MidiEvent::PitchBend {
                channel,
                value: bend.0.as_int(),
            },
            MidiMessage::Aftertouch { .. } | MidiMessage::ChannelAftertouch { .. } => return None,
        })
    }
}

/// An event with its absolute time from the start of the song.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedEvent {
    pub seconds: f64,
    pub event: MidiEvent,
}

/// Converts a tick count to seconds at a fixed tempo.
///
/// # Arguments
///
/// * `ticks` - Number of ticks
/// * `tempo` - Microseconds per beat
/// * `ticks_per_beat` - File resolution
///
/// # Returns
///
/// Duration in seconds
pub fn ticks_to_seconds(ticks: u64, tempo: u32, ticks_per_beat: u16) -> f64 {
    ticks as f64 * tempo as f64 / 1_000_000.0 / ticks_per_beat.max(1) as f64
}

/// A parsed, tempo-resolved MIDI song.
#[derive(Debug, Clone, Default)]
pub struct MidiFile {
    events: Vec<TimedEvent>,
    length: f64,
}

/// One SMF event placed on the song's tick timeline.
struct Placed<'a> {
    tick: u64,
    kind: TrackEventKind<'a>,
}

impl MidiFile {
    /// Parses a Standard MIDI File from memory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFile`] if the data is not a valid SMF or its
    /// time division is zero.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let smf = Smf::parse(bytes)?;

        // Duration of a tick span at a given tempo
        let span: Box<dyn Fn(u64, u32) -> f64> = match smf.header.timing {
            Timing::Metrical(tpb) => {
                let tpb = tpb.as_int();
                if tpb == 0 {
                    return Err(Error::invalid_file("zero ticks per beat"));
                }
                Box::new(move |ticks, tempo| ticks_to_seconds(ticks, tempo, tpb))
            }
            Timing::Timecode(fps, subframe) => {
                if subframe == 0 {
                    return Err(Error::invalid_file("zero ticks per frame"));
                }
                // Timecode timing ignores tempo events
                let ticks_per_second = fps.as_f32() as f64 * subframe as f64;
                Box::new(move |ticks, _| ticks as f64 / ticks_per_second)
            }
        };

        let mut placed = Vec::new();
        let mut track_start = 0u64;
        for track in &smf.tracks {
            let mut tick = match smf.header.format {
                Format::Sequential => track_start,
                Format::SingleTrack | Format::Parallel => 0,
            };
            for event in track {
                tick += event.delta.as_int() as u64;
                placed.push(Placed {
                    tick,
                    kind: event.kind,
                });
            }
            track_start = tick;
        }
        // Stable: equal ticks keep track order, then file order
        placed.sort_by_key(|p| p.tick);

        let mut events = Vec::new();
        let mut tempo = DEFAULT_TEMPO;
        let mut last_tick = 0u64;
        let mut seconds = 0.0f64;
        for p in &placed {
            seconds += span(p.tick - last_tick, tempo);
            last_tick = p.tick;
            match p.kind {
                TrackEventKind::Midi { channel, message } => {
                    if let Some(event) = MidiEvent::from_midly(channel.as_int(), message) {
                        events.push(TimedEvent { seconds, event });
                    }
                }
                TrackEventKind::Meta(MetaMessage::Tempo(t)) if t.as_int() > 0 => tempo = t.as_int(),
                _ => {}
            }
        }

        tracing::debug!(
            tracks = smf.tracks.len(),
            events = events.len(),
            seconds,
            "Parsed MIDI file"
        );

        Ok(Self {
            events,
            length: seconds,
        })
    }

    /// Channel events in playback order.
    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    /// Song length in seconds, up to the last event or end of track.
    pub fn length(&self) -> f64 {
        self.length
    }
}
