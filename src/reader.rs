//! Byte-stream view of a rendering [`Stream`].

use crate::stream::Stream;
use std::borrow::BorrowMut;
use std::io::{self, Read};

/// Frames rendered per refill.
pub const BLOCK_FRAMES: usize = 512;

/// Adapts a [`Stream`] to [`std::io::Read`].
///
/// Produces interleaved native-endian `f32` samples and reports end of file
/// once the song has stopped and every voice has faded out. Works with an
/// owned stream or a `&mut Stream`.
pub struct StreamReader<S> {
    stream: S,
    block: Vec<f32>,
    pending: Vec<u8>,
    offset: usize,
}

impl<S: BorrowMut<Stream>> StreamReader<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            block: Vec::new(),
            pending: Vec::new(),
            offset: 0,
        }
    }

    pub fn get_ref(&self) -> &Stream {
        self.stream.borrow()
    }

    /// Returns the wrapped stream. Bytes not yet read are discarded.
    pub fn into_inner(self) -> S {
        self.stream
    }

    fn refill(&mut self) -> usize {
        let stream = self.stream.borrow_mut();
        let width = stream.settings().frame_size();
        self.block.resize(BLOCK_FRAMES * width, 0.0);
        let frames = stream.render(&mut self.block, BLOCK_FRAMES);

        self.pending.clear();
        for sample in &self.block[..frames * width] {
            self.pending.extend_from_slice(&sample.to_ne_bytes());
        }
        self.offset = 0;
        frames
    }
}

impl<S: BorrowMut<Stream>> Read for StreamReader<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.offset >= self.pending.len() && self.refill() == 0 {
            return Ok(0);
        }

        let available = &self.pending[self.offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.offset += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamSettings;
    use crate::soundfont::Soundfont;
    use crate::test_support::{single_note_song, soundfont_bytes, TestPreset};
    use std::sync::Arc;

    fn stream(settings: StreamSettings) -> Stream {
        let sf = Soundfont::parse(&soundfont_bytes(&[TestPreset::new("Piano", 0, 0)])).unwrap();
        Stream::open(&single_note_song(960), Arc::new(sf), settings).unwrap()
    }

    #[test]
    fn test_reads_until_silent() {
        let mut reader = StreamReader::new(stream(StreamSettings::default()));
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).unwrap();

        assert_eq!(bytes.len() % 8, 0);
        assert!(bytes.len() >= 44100 * 8);
        assert!(reader.get_ref().is_stopped());
        assert_eq!(reader.read(&mut [0u8; 16]).unwrap(), 0);
    }

    fn mono() -> StreamSettings {
        StreamSettings {
            stereo: false,
            ..StreamSettings::default()
        }
    }

    #[test]
    fn test_odd_sized_reads() {
        let mut reader = StreamReader::new(stream(mono()));
        let mut small = [0u8; 3];
        let mut collected = Vec::new();
        while collected.len() < 3000 {
            let n = reader.read(&mut small).unwrap();
            assert!(n > 0 && n <= 3);
            collected.extend_from_slice(&small[..n]);
        }
        assert_eq!(collected.len(), 3000);

        let samples: Vec<f32> = collected
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert!(samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_short_read_at_block_boundary() {
        let block_bytes = BLOCK_FRAMES * 4;
        let mut reader = StreamReader::new(stream(mono()));
        let mut head = vec![0u8; block_bytes - 2];
        assert_eq!(reader.read(&mut head).unwrap(), block_bytes - 2);

        // Only the rest of the block is returned, the next read refills
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(reader.read(&mut buf).unwrap(), 8);
    }

    #[test]
    fn test_borrowed_stream() {
        let mut s = stream(StreamSettings::default());
        {
            let mut reader = StreamReader::new(&mut s);
            let mut buf = [0u8; 4096];
            reader.read_exact(&mut buf).unwrap();
        }
        assert!(s.millisecond_position() > 0.0);
    }
}
