//! Animation sequences and the buffers their keyframes live in.

use std::collections::HashMap;

use crate::{binary, error::DecodeError};

/// Keyframe data of this sequence is stored inside the model file.
pub const SEQUENCE_EMBEDDED: u32 = 0x20;
/// Sequence is an alias of another and has no keyframes of its own.
pub const SEQUENCE_ALIAS: u32 = 0x40;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct M2Sequence {
    pub id: u16,
    pub variation: u16,
    pub duration_ms: u32,
    pub move_speed: f32,
    pub flags: u32,
    pub frequency: i16,
    pub replay: (u32, u32),
    pub blend_time: u32,
    pub bounds_radius: f32,
    pub variation_next: i16,
    pub alias_next: u16,
}

impl M2Sequence {
    pub const SIZE: usize = 64;

    pub fn parse(record: &[u8]) -> Result<Self, DecodeError> {
        const CTX: &str = "m2 sequence";
        Ok(Self {
            id: binary::read_u16(record, 0, CTX)?,
            variation: binary::read_u16(record, 2, CTX)?,
            duration_ms: binary::read_u32(record, 4, CTX)?,
            move_speed: binary::read_f32(record, 8, CTX)?,
            flags: binary::read_u32(record, 12, CTX)?,
            frequency: binary::read_i16(record, 16, CTX)?,
            replay: (
                binary::read_u32(record, 20, CTX)?,
                binary::read_u32(record, 24, CTX)?,
            ),
            blend_time: binary::read_u32(record, 28, CTX)?,
            bounds_radius: binary::read_f32(record, 56, CTX)?,
            variation_next: binary::read_i16(record, 60, CTX)?,
            alias_next: binary::read_u16(record, 62, CTX)?,
        })
    }

    pub fn is_embedded(&self) -> bool {
        self.flags & SEQUENCE_EMBEDDED != 0
    }

    pub fn is_alias(&self) -> bool {
        self.flags & SEQUENCE_ALIAS != 0
    }

    /// Virtual path of the external keyframe file for this sequence.
    ///
    /// `model_path` may carry the `.m2` extension or not.
    pub fn anim_file_path(&self, model_path: &str) -> String {
        let stem = strip_model_extension(model_path);
        format!("{stem}{:04}-{:02}.anim", self.id, self.variation)
    }
}

fn strip_model_extension(path: &str) -> &str {
    let lower = path.to_ascii_lowercase();
    if lower.ends_with(".m2") {
        &path[..path.len() - 3]
    } else if lower.ends_with(".mdx") {
        &path[..path.len() - 4]
    } else {
        path
    }
}

/// Resolves which buffer holds the keyframes of a given sequence index.
#[derive(Debug, Clone)]
pub struct AnimationSources<'a> {
    model: &'a [u8],
    embedded: Vec<bool>,
    external: HashMap<usize, &'a [u8]>,
}

impl<'a> AnimationSources<'a> {
    /// Every sequence reads from the model buffer.
    pub fn model_only(model: &'a [u8]) -> Self {
        Self {
            model,
            embedded: Vec::new(),
            external: HashMap::new(),
        }
    }

    /// Sequences without the embedded flag read from external buffers
    /// registered with [`Self::with_external`].
    pub fn for_sequences(model: &'a [u8], sequences: &[M2Sequence]) -> Self {
        Self {
            model,
            embedded: sequences.iter().map(M2Sequence::is_embedded).collect(),
            external: HashMap::new(),
        }
    }

    pub fn with_external(mut self, sequence_index: usize, bytes: &'a [u8]) -> Self {
        self.external.insert(sequence_index, bytes);
        self
    }

    pub fn model(&self) -> &'a [u8] {
        self.model
    }

    /// Buffer for `sequence_index`, `None` when its external file is missing.
    pub fn buffer_for(&self, sequence_index: usize) -> Option<&'a [u8]> {
        match self.embedded.get(sequence_index) {
            Some(false) => self.external.get(&sequence_index).copied(),
            _ => Some(self.model),
        }
    }
}

#[cfg(test)]
pub(crate) fn sequence_bytes(id: u16, variation: u16, duration_ms: u32, flags: u32) -> Vec<u8> {
    let mut record = vec![0u8; M2Sequence::SIZE];
    record[0..2].copy_from_slice(&id.to_le_bytes());
    record[2..4].copy_from_slice(&variation.to_le_bytes());
    record[4..8].copy_from_slice(&duration_ms.to_le_bytes());
    record[12..16].copy_from_slice(&flags.to_le_bytes());
    record[60..62].copy_from_slice(&(-1i16).to_le_bytes());
    record
}
