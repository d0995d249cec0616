//! RIFF chunk walking and little-endian record reading.

use crate::error::{Error, Result};

/// A single RIFF chunk: four-character id plus its payload.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Chunk<'a> {
    pub id: [u8; 4],
    pub data: &'a [u8],
}

impl<'a> Chunk<'a> {
    /// For `RIFF` and `LIST` chunks, returns the form type and the nested
    /// chunk area.
    pub fn as_list(&self) -> Option<([u8; 4], &'a [u8])> {
        if (&self.id == b"LIST" || &self.id == b"RIFF") && self.data.len() >= 4 {
            let kind = [self.data[0], self.data[1], self.data[2], self.data[3]];
            Some((kind, &self.data[4..]))
        } else {
            None
        }
    }
}

/// Reads the outermost `RIFF` chunk of a file and returns its form type and
/// body.
pub(crate) fn read_riff(bytes: &[u8]) -> Result<([u8; 4], &[u8])> {
    let mut chunks = Chunks::new(bytes);
    let riff = chunks
        .next()
        .ok_or_else(|| Error::invalid_file("empty file"))??;
    if &riff.id != b"RIFF" {
        return Err(Error::invalid_file("not a RIFF file"));
    }
    riff.as_list()
        .ok_or_else(|| Error::invalid_file("truncated RIFF header"))
}

/// Iterator over consecutive chunks in a byte area.
///
/// Chunk payloads are padded to an even length. A chunk whose declared size
/// runs past the end of the area yields an error and ends iteration.
pub(crate) struct Chunks<'a> {
    data: &'a [u8],
    failed: bool,
}

impl<'a> Chunks<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            failed: false,
        }
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Result<Chunk<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.data.is_empty() {
            return None;
        }
        if self.data.len() < 8 {
            self.failed = true;
            return Some(Err(Error::invalid_file("truncated chunk header")));
        }

        let id = [self.data[0], self.data[1], self.data[2], self.data[3]];
        let size = u32::from_le_bytes([self.data[4], self.data[5], self.data[6], self.data[7]]) as usize;
        let body = &self.data[8..];
        if size > body.len() {
            self.failed = true;
            return Some(Err(Error::invalid_file(format!(
                "chunk '{}' overruns its container",
                String::from_utf8_lossy(&id)
            ))));
        }

        let padded = (size + (size & 1)).min(body.len());
        self.data = &body[padded..];
        Some(Ok(Chunk {
            id,
            data: &body[..size],
        }))
    }
}

/// Sequential reader over one fixed-size record.
pub(crate) struct RecordReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        // Records are produced by `records`, which guarantees their length.
        let mut out = [0u8; N];
        let start = self.pos.min(self.data.len());
        let end = (self.pos + N).min(self.data.len());
        out[..end - start].copy_from_slice(&self.data[start..end]);
        self.pos += N;
        out
    }

    pub fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    pub fn i8(&mut self) -> i8 {
        self.u8() as i8
    }

    pub fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    pub fn i16(&mut self) -> i16 {
        i16::from_le_bytes(self.take())
    }

    pub fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    /// Reads a fixed-width, NUL-padded ASCII name.
    pub fn name(&mut self, width: usize) -> String {
        let start = self.pos.min(self.data.len());
        let end = (self.pos + width).min(self.data.len());
        self.pos += width;
        let raw = &self.data[start..end];
        let len = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        String::from_utf8_lossy(&raw[..len]).trim_end().to_string()
    }

    pub fn skip(&mut self, count: usize) {
        self.pos += count;
    }
}

/// Splits a chunk into fixed-size records.
pub(crate) fn records<'a>(
    data: &'a [u8],
    size: usize,
    what: &str,
) -> Result<impl Iterator<Item = RecordReader<'a>>> {
    if data.len() % size != 0 {
        return Err(Error::invalid_file(format!(
            "'{}' chunk length {} is not a multiple of {}",
            what,
            data.len(),
            size
        )));
    }
    Ok(data.chunks_exact(size).map(RecordReader::new))
}
