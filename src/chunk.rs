//! Tagged-chunk scanning for the chunked container formats (ADT, WDT, WMO).
//!
//! Each chunk is an 8-byte preamble (four tag bytes stored reversed, then a
//! little-endian `u32` payload length) followed by the payload.

use std::fmt;

/// A four-character chunk tag in its human-readable order (e.g. `MVER`).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub const fn new(tag: &[u8; 4]) -> Self {
        Self(*tag)
    }

    fn from_stored(stored: [u8; 4]) -> Self {
        Self([stored[3], stored[2], stored[1], stored[0]])
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One chunk borrowed from the scanned buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawChunk<'a> {
    pub tag: FourCC,
    /// Offset of the chunk preamble in the scanned buffer.
    pub offset: usize,
    pub payload: &'a [u8],
}

impl RawChunk<'_> {
    pub const HEADER_SIZE: usize = 8;

    /// Offset of the first payload byte in the scanned buffer.
    pub fn data_offset(&self) -> usize {
        self.offset + Self::HEADER_SIZE
    }
}

/// Iterator over consecutive chunks. Stops silently at the first chunk whose
/// declared length overruns the scanned region.
#[derive(Debug, Clone)]
pub struct ChunkIter<'a> {
    buf: &'a [u8],
    cursor: usize,
    end: usize,
}

impl<'a> Iterator for ChunkIter<'a> {
    type Item = RawChunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.end.saturating_sub(self.cursor) < RawChunk::HEADER_SIZE {
            return None;
        }
        let at = self.cursor;
        let stored = [
            self.buf[at],
            self.buf[at + 1],
            self.buf[at + 2],
            self.buf[at + 3],
        ];
        let length = u32::from_le_bytes([
            self.buf[at + 4],
            self.buf[at + 5],
            self.buf[at + 6],
            self.buf[at + 7],
        ]) as usize;

        let data_start = at + RawChunk::HEADER_SIZE;
        let Some(data_end) = data_start.checked_add(length).filter(|end| *end <= self.end) else {
            self.cursor = self.end;
            return None;
        };

        self.cursor = data_end;
        Some(RawChunk {
            tag: FourCC::from_stored(stored),
            offset: at,
            payload: &self.buf[data_start..data_end],
        })
    }
}

/// Scan chunks from `start` to the end of `buf`.
pub fn scan_chunks(buf: &[u8], start: usize) -> ChunkIter<'_> {
    scan_chunks_in(buf, start, buf.len())
}

/// Scan chunks inside `buf[start..end]`; offsets stay relative to `buf`.
pub fn scan_chunks_in(buf: &[u8], start: usize, end: usize) -> ChunkIter<'_> {
    let end = end.min(buf.len());
    ChunkIter {
        buf,
        cursor: start.min(end),
        end,
    }
}

/// First chunk carrying `tag`, if any.
pub fn find_chunk<'a>(buf: &'a [u8], start: usize, tag: FourCC) -> Option<RawChunk<'a>> {
    scan_chunks(buf, start).find(|chunk| chunk.tag == tag)
}

#[cfg(test)]
pub(crate) fn encode_chunk(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 8);
    out.extend(tag.iter().rev());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out
}
