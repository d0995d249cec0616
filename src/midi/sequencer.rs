//! Frame-accurate playback cursor over a [`MidiFile`].

use super::{MidiEvent, MidiFile};

/// Converts seconds to the nearest frame index.
fn to_frame(seconds: f64, sample_rate: u32) -> u64 {
    (seconds * sample_rate as f64).round().max(0.0) as u64
}

/// Walks a song's events in output frames.
///
/// The song occupies frames `0..=end_frame`. Events are dispatched when the
/// cursor's window covers their frame, so an event is never dispatched
/// twice in one pass and never skipped.
#[derive(Debug, Clone)]
pub struct Sequencer {
    events: Vec<(u64, MidiEvent)>,
    next: usize,
    position: u64,
    end_frame: u64,
    length: f64,
    sample_rate: u32,
    looping: bool,
    stopped: bool,
}

impl Sequencer {
    /// Creates a cursor at the start of `midi`, timed at `sample_rate`.
    pub fn new(midi: &MidiFile, sample_rate: u32, looping: bool) -> Self {
        let events = midi
            .events()
            .iter()
            .map(|e| (to_frame(e.seconds, sample_rate), e.event))
            .collect();
        Self {
            events,
            next: 0,
            position: 0,
            end_frame: to_frame(midi.length(), sample_rate),
            length: midi.length(),
            sample_rate,
            looping,
            stopped: false,
        }
    }

    /// Moves the cursor forward by `frames`, calling `dispatch` for every
    /// event in the window in file order.
    ///
    /// # Returns
    ///
    /// True if this call ran off the end of a non-looping song. The cursor
    /// is stopped afterwards and further calls do nothing.
    pub fn advance<F>(&mut self, frames: u64, mut dispatch: F) -> bool
    where
        F: FnMut(&MidiEvent),
    {
        if self.stopped {
            return false;
        }

        let mut remaining = frames;
        loop {
            let window_end = self.position + remaining;
            while let Some((frame, event)) = self.events.get(self.next) {
                if *frame >= window_end {
                    break;
                }
                dispatch(event);
                self.next += 1;
            }

            if self.next < self.events.len() || window_end <= self.end_frame {
                self.position = window_end;
                return false;
            }

            // Song end crossed. An empty song has nothing to repeat.
            if self.looping && self.end_frame > 0 {
                remaining = window_end - (self.end_frame + 1);
                self.position = 0;
                self.next = 0;
            } else {
                self.position = self.end_frame;
                self.stopped = true;
                return true;
            }
        }
    }

    /// Stops the cursor. Already sounding notes are not affected.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Current position in frames.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Last frame of the song.
    pub fn end_frame(&self) -> u64 {
        self.end_frame
    }

    /// Song length in milliseconds.
    pub fn millisecond_length(&self) -> f64 {
        self.length * 1000.0
    }

    /// Cursor position in milliseconds.
    pub fn millisecond_position(&self) -> f64 {
        self.position as f64 * 1000.0 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{midi_bytes, single_note_song};

    const RATE: u32 = 1000;

    fn collect(seq: &mut Sequencer, frames: u64) -> (Vec<MidiEvent>, bool) {
        let mut out = Vec::new();
        let ended = seq.advance(frames, |e| out.push(*e));
        (out, ended)
    }

    #[test]
    fn test_events_dispatch_in_their_window() {
        let midi = MidiFile::parse(&single_note_song(960)).unwrap();
        let mut seq = Sequencer::new(&midi, RATE, false);
        assert_eq!(seq.end_frame(), 1000);

        let (events, ended) = collect(&mut seq, 1);
        assert_eq!(events.len(), 1);
        assert!(!ended);

        let (events, ended) = collect(&mut seq, 999);
        assert!(events.is_empty());
        assert!(!ended);
        assert_eq!(seq.position(), 1000);

        // The note-off sits on the last frame of the song
        let (events, ended) = collect(&mut seq, 1);
        assert_eq!(events, vec![MidiEvent::NoteOff { channel: 0, key: 60 }]);
        assert!(ended);
        assert!(seq.is_stopped());
        assert_eq!(seq.position(), 1000);

        let (events, ended) = collect(&mut seq, 100);
        assert!(events.is_empty());
        assert!(!ended);
    }

    #[test]
    fn test_large_window_dispatches_everything_once() {
        let midi = MidiFile::parse(&single_note_song(960)).unwrap();
        let mut seq = Sequencer::new(&midi, RATE, false);
        let (events, ended) = collect(&mut seq, 5000);
        assert_eq!(events.len(), 2);
        assert!(ended);
    }

    #[test]
    fn test_looping_rewinds_and_carries_overshoot() {
        let midi = MidiFile::parse(&single_note_song(960)).unwrap();
        let mut seq = Sequencer::new(&midi, RATE, true);

        let (events, ended) = collect(&mut seq, 1001);
        assert_eq!(events.len(), 2);
        assert!(!ended);
        assert_eq!(seq.position(), 0);

        // 10 frames past the end of the second pass
        let (events, ended) = collect(&mut seq, 1011);
        assert_eq!(events.len(), 3);
        assert!(!ended);
        assert!(!seq.is_stopped());
        assert_eq!(seq.position(), 10);
    }

    #[test]
    fn test_empty_song_stops_instead_of_looping() {
        let midi = MidiFile::parse(&midi_bytes(0, 480, &[vec![]])).unwrap();
        let mut seq = Sequencer::new(&midi, RATE, true);
        assert_eq!(seq.end_frame(), 0);
        let (_, ended) = collect(&mut seq, 1);
        assert!(ended);
        assert!(seq.is_stopped());
    }

    #[test]
    fn test_stop() {
        let midi = MidiFile::parse(&single_note_song(960)).unwrap();
        let mut seq = Sequencer::new(&midi, RATE, true);
        seq.stop();
        let (events, ended) = collect(&mut seq, 2000);
        assert!(events.is_empty());
        assert!(!ended);
    }

    #[test]
    fn test_milliseconds() {
        let midi = MidiFile::parse(&single_note_song(960)).unwrap();
        let mut seq = Sequencer::new(&midi, RATE, false);
        assert!((seq.millisecond_length() - 1000.0).abs() < 1e-6);
        collect(&mut seq, 250);
        assert!((seq.millisecond_position() - 250.0).abs() < 1e-6);
    }
}
