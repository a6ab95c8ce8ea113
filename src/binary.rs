//! Little-endian fixed-offset readers shared by every record decoder.

use crate::error::DecodeError;

// ─── Bounds-checked slices ────────────────────────────────────────────────────

/// Borrow `length` bytes at `offset`, failing with `RangeViolation` on overrun.
pub fn slice<'a>(
    buf: &'a [u8],
    offset: usize,
    length: usize,
    context: &'static str,
) -> Result<&'a [u8], DecodeError> {
    offset
        .checked_add(length)
        .filter(|end| *end <= buf.len())
        .map(|end| &buf[offset..end])
        .ok_or(DecodeError::RangeViolation {
            context,
            offset,
            length,
            buffer_len: buf.len(),
        })
}

fn fixed<const N: usize>(
    buf: &[u8],
    offset: usize,
    context: &'static str,
) -> Result<[u8; N], DecodeError> {
    let bytes = slice(buf, offset, N, context)?;
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

pub fn read_u8(buf: &[u8], offset: usize, context: &'static str) -> Result<u8, DecodeError> {
    Ok(fixed::<1>(buf, offset, context)?[0])
}

pub fn read_i8(buf: &[u8], offset: usize, context: &'static str) -> Result<i8, DecodeError> {
    Ok(i8::from_le_bytes(fixed(buf, offset, context)?))
}

pub fn read_u16(buf: &[u8], offset: usize, context: &'static str) -> Result<u16, DecodeError> {
    Ok(u16::from_le_bytes(fixed(buf, offset, context)?))
}

pub fn read_i16(buf: &[u8], offset: usize, context: &'static str) -> Result<i16, DecodeError> {
    Ok(i16::from_le_bytes(fixed(buf, offset, context)?))
}

pub fn read_u32(buf: &[u8], offset: usize, context: &'static str) -> Result<u32, DecodeError> {
    Ok(u32::from_le_bytes(fixed(buf, offset, context)?))
}

pub fn read_i32(buf: &[u8], offset: usize, context: &'static str) -> Result<i32, DecodeError> {
    Ok(i32::from_le_bytes(fixed(buf, offset, context)?))
}

pub fn read_f32(buf: &[u8], offset: usize, context: &'static str) -> Result<f32, DecodeError> {
    Ok(f32::from_le_bytes(fixed(buf, offset, context)?))
}

pub fn read_vec3(buf: &[u8], offset: usize, context: &'static str) -> Result<[f32; 3], DecodeError> {
    Ok([
        read_f32(buf, offset, context)?,
        read_f32(buf, offset + 4, context)?,
        read_f32(buf, offset + 8, context)?,
    ])
}

/// Check a four-byte signature at `offset`.
pub fn expect_magic(
    buf: &[u8],
    offset: usize,
    expected: &[u8; 4],
    context: &'static str,
) -> Result<(), DecodeError> {
    let found: [u8; 4] = fixed(buf, offset, context)?;
    if &found != expected {
        return Err(DecodeError::MagicMismatch {
            context,
            expected: String::from_utf8_lossy(expected).into_owned(),
            found: String::from_utf8_lossy(&found).into_owned(),
        });
    }
    Ok(())
}

// ─── Array descriptors ────────────────────────────────────────────────────────

/// A `(count, offset)` pair locating a homogeneous array inside a buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArrayRef {
    pub count: u32,
    pub offset: u32,
}

impl ArrayRef {
    pub const SIZE: usize = 8;

    /// Read the descriptor stored at `at`.
    pub fn read(buf: &[u8], at: usize, context: &'static str) -> Result<Self, DecodeError> {
        Ok(Self {
            count: read_u32(buf, at, context)?,
            offset: read_u32(buf, at + 4, context)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Borrow the raw bytes of `count` elements of `stride` bytes each.
    pub fn bytes<'a>(
        &self,
        buf: &'a [u8],
        stride: usize,
        context: &'static str,
    ) -> Result<&'a [u8], DecodeError> {
        if self.is_empty() {
            return Ok(&[]);
        }
        let length = (self.count as usize).checked_mul(stride).ok_or(
            DecodeError::RangeViolation {
                context,
                offset: self.offset as usize,
                length: usize::MAX,
                buffer_len: buf.len(),
            },
        )?;
        slice(buf, self.offset as usize, length, context)
    }

    /// Decode every element with `decode`, which receives one `stride`-sized record.
    pub fn decode<'a, T>(
        &self,
        buf: &'a [u8],
        stride: usize,
        context: &'static str,
        mut decode: impl FnMut(&'a [u8]) -> Result<T, DecodeError>,
    ) -> Result<Vec<T>, DecodeError> {
        self.bytes(buf, stride, context)?
            .chunks_exact(stride)
            .map(&mut decode)
            .collect()
    }

    pub fn read_u16s(&self, buf: &[u8], context: &'static str) -> Result<Vec<u16>, DecodeError> {
        Ok(self
            .bytes(buf, 2, context)?
            .chunks_exact(2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
            .collect())
    }

    pub fn read_u32s(&self, buf: &[u8], context: &'static str) -> Result<Vec<u32>, DecodeError> {
        Ok(self
            .bytes(buf, 4, context)?
            .chunks_exact(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }
}

// ─── Strings ─────────────────────────────────────────────────────────────────

/// Decode a fixed-length byte string, trimming at the first NUL.
pub fn trimmed_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Read a NUL-terminated string starting at `offset`, or `None` when out of range.
pub fn cstring_at(buf: &[u8], offset: usize) -> Option<String> {
    let tail = buf.get(offset..)?;
    Some(trimmed_string(tail))
}

/// Split a block of NUL-separated names into `(offset, name)` pairs.
pub fn split_names(block: &[u8]) -> Vec<(usize, String)> {
    let mut names = Vec::new();
    let mut start = 0;
    for (index, byte) in block.iter().enumerate() {
        if *byte == 0 {
            if index > start {
                names.push((start, String::from_utf8_lossy(&block[start..index]).into_owned()));
            }
            start = index + 1;
        }
    }
    if start < block.len() {
        names.push((start, String::from_utf8_lossy(&block[start..]).into_owned()));
    }
    names
}
