//! Bones and their animation tracks.
//!
//! A track stores one `(count, offset)` descriptor per sequence for
//! timestamps and another for values. Each sequence decodes on its own: a
//! bad inner descriptor drops that sequence from the track and nothing else.

use std::collections::BTreeMap;

use log::{debug, warn};

use super::animation::AnimationSources;
use crate::{
    binary::{self, ArrayRef},
    error::DecodeError,
};

// ─── Quaternion compression ───────────────────────────────────────────────────

/// Expand one 16-bit quaternion component into `[-1, 1]`.
pub fn decompress_component(value: i16) -> f32 {
    let value = value as f32;
    if value < 0.0 {
        (value + 32768.0) / 32767.0
    } else {
        (value - 32767.0) / 32767.0
    }
}

/// Inverse of [`decompress_component`] for values in `[-1, 1]`.
#[cfg(test)]
pub(crate) fn compress_component(value: f32) -> i16 {
    if value > 0.0 {
        (value * 32767.0 - 32768.0).round() as i16
    } else {
        (value * 32767.0 + 32767.0).round() as i16
    }
}

/// Expand a stored `(x, y, z, w)` quaternion.
pub fn decompress_quaternion(packed: [i16; 4]) -> [f32; 4] {
    packed.map(decompress_component)
}

// ─── Tracks ──────────────────────────────────────────────────────────────────

/// Keyframes of one track for one sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyframes<T> {
    pub timestamps_ms: Vec<u32>,
    pub values: Vec<T>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationTrack<T> {
    pub interpolation: u16,
    /// Set when the track runs on a global loop rather than per sequence.
    pub global_sequence: Option<u16>,
    /// Sequence index -> keyframes. Sequences that failed to decode are absent.
    pub sequences: BTreeMap<usize, Keyframes<T>>,
}

impl<T> Default for AnimationTrack<T> {
    fn default() -> Self {
        Self {
            interpolation: 0,
            global_sequence: None,
            sequences: BTreeMap::new(),
        }
    }
}

impl<T> AnimationTrack<T> {
    pub const HEADER_SIZE: usize = 20;

    pub fn is_animated(&self) -> bool {
        !self.sequences.is_empty()
    }

    pub fn keyframes(&self, sequence_index: usize) -> Option<&Keyframes<T>> {
        self.sequences.get(&sequence_index)
    }
}

fn parse_track<T>(
    record: &[u8],
    at: usize,
    sources: &AnimationSources<'_>,
    value_size: usize,
    decode_value: impl Fn(&[u8]) -> Result<T, DecodeError>,
) -> Result<AnimationTrack<T>, DecodeError> {
    const CTX: &str = "bone track";
    let model = sources.model();
    let interpolation = binary::read_u16(record, at, CTX)?;
    let global_sequence = binary::read_i16(record, at + 2, CTX)?;
    let global_sequence = u16::try_from(global_sequence).ok();
    let timestamps = ArrayRef::read(record, at + 4, CTX)?;
    let values = ArrayRef::read(record, at + 12, CTX)?;

    let outer_timestamps = timestamps.decode(model, ArrayRef::SIZE, "track timestamps", |b| {
        ArrayRef::read(b, 0, "track timestamps")
    })?;
    let outer_values = values.decode(model, ArrayRef::SIZE, "track values", |b| {
        ArrayRef::read(b, 0, "track values")
    })?;

    let mut sequences = BTreeMap::new();
    for (index, (times, vals)) in outer_timestamps.iter().zip(&outer_values).enumerate() {
        if times.is_empty() && vals.is_empty() {
            continue;
        }
        let buffer = if global_sequence.is_some() {
            Some(model)
        } else {
            sources.buffer_for(index)
        };
        let Some(buffer) = buffer else {
            debug!("sequence {index} keyframes not loaded, skipping");
            continue;
        };

        let decoded = times
            .read_u32s(buffer, "track keyframe times")
            .and_then(|timestamps_ms| {
                let values = vals.decode(buffer, value_size, "track keyframe values", &decode_value)?;
                if values.len() != timestamps_ms.len() {
                    return Err(DecodeError::InvalidFormat {
                        context: "bone track",
                        detail: format!(
                            "{} timestamps but {} values",
                            timestamps_ms.len(),
                            values.len()
                        ),
                    });
                }
                Ok(Keyframes {
                    timestamps_ms,
                    values,
                })
            });

        match decoded {
            Ok(keyframes) => {
                sequences.insert(index, keyframes);
            }
            Err(err) => warn!("skipping sequence {index}: {err}"),
        }
    }

    Ok(AnimationTrack {
        interpolation,
        global_sequence,
        sequences,
    })
}

fn read_vec3_value(bytes: &[u8]) -> Result<[f32; 3], DecodeError> {
    binary::read_vec3(bytes, 0, "track vec3")
}

fn read_quaternion_value(bytes: &[u8]) -> Result<[f32; 4], DecodeError> {
    let component = |index: usize| binary::read_i16(bytes, index * 2, "track quaternion");
    Ok(decompress_quaternion([
        component(0)?,
        component(1)?,
        component(2)?,
        component(3)?,
    ]))
}

// ─── Bones ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct M2Bone {
    pub key_bone_id: i32,
    pub flags: u32,
    pub parent: Option<usize>,
    pub submesh_id: u16,
    pub name_crc: u32,
    pub translation: AnimationTrack<[f32; 3]>,
    /// Decompressed `(x, y, z, w)` rotations in source space.
    pub rotation: AnimationTrack<[f32; 4]>,
    pub scale: AnimationTrack<[f32; 3]>,
    pub pivot: [f32; 3],
}

impl M2Bone {
    pub const SIZE: usize = 88;
}

pub(super) fn parse_bones(
    buf: &[u8],
    array: ArrayRef,
    sources: &AnimationSources<'_>,
) -> Result<Vec<M2Bone>, DecodeError> {
    array.decode(buf, M2Bone::SIZE, "m2 bones", |record| {
        const CTX: &str = "m2 bone";
        let parent = binary::read_i16(record, 8, CTX)?;
        Ok(M2Bone {
            key_bone_id: binary::read_i32(record, 0, CTX)?,
            flags: binary::read_u32(record, 4, CTX)?,
            parent: usize::try_from(parent).ok(),
            submesh_id: binary::read_u16(record, 10, CTX)?,
            name_crc: binary::read_u32(record, 12, CTX)?,
            translation: parse_track(record, 16, sources, 12, read_vec3_value)?,
            rotation: parse_track(record, 36, sources, 8, read_quaternion_value)?,
            scale: parse_track(record, 56, sources, 12, read_vec3_value)?,
            pivot: binary::read_vec3(record, 76, CTX)?,
        })
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::m2::{M2File, test_support::M2Builder};
    use proptest::prelude::*;

    #[test]
    fn given_boundary_components_when_decompressing_then_range_ends_are_hit() {
        assert_eq!(decompress_component(-32768), 0.0);
        assert_eq!(decompress_component(-1), 1.0);
        assert_eq!(decompress_component(0), -1.0);
        assert_eq!(decompress_component(32767), 0.0);
    }

    #[test]
    fn given_identity_rotation_when_decompressing_then_w_is_one() {
        let q = decompress_quaternion([32767, 32767, 32767, -1]);

        assert_eq!(q, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn given_bone_with_translation_keys_when_parsing_then_keyframes_are_per_sequence() {
        let mut builder = M2Builder::new();
        let keys: RawKeys = vec![
            (vec![0, 500], vec3_bytes(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]])),
            (vec![], vec![]),
        ];
        let translation = track_header(&mut builder, 1, &keys);
        let record = bone_record(-1, [10.0, 20.0, 30.0], [translation, empty_track(), empty_track()]);
        builder.array(0x2C, 1, &record);

        let model = M2File::parse(&builder.buf).expect("header");
        let bones = model
            .bones(&AnimationSources::model_only(&builder.buf))
            .expect("bones");

        assert_eq!(bones.len(), 1);
        assert_eq!(bones[0].parent, None);
        assert_eq!(bones[0].pivot, [10.0, 20.0, 30.0]);
        let keyframes = bones[0].translation.keyframes(0).expect("sequence 0");
        assert_eq!(keyframes.timestamps_ms, vec![0, 500]);
        assert_eq!(keyframes.values[1], [4.0, 5.0, 6.0]);
        assert!(bones[0].translation.keyframes(1).is_none());
        assert!(!bones[0].rotation.is_animated());
    }

    #[test]
    fn given_one_corrupt_inner_array_when_parsing_then_only_that_sequence_is_skipped() {
        let mut builder = M2Builder::new();
        let keys: RawKeys = vec![
            (vec![0], vec3_bytes(&[[1.0, 1.0, 1.0]])),
            (vec![0], vec3_bytes(&[[2.0, 2.0, 2.0]])),
        ];
        let header = track_header(&mut builder, 1, &keys);
        // Point the second sequence's value array far past the buffer end.
        let outer_values =
            u32::from_le_bytes([header[16], header[17], header[18], header[19]]) as usize;
        let bad = outer_values + ArrayRef::SIZE + 4;
        builder.buf[bad..bad + 4].copy_from_slice(&0x00FF_FFFFu32.to_le_bytes());
        let record = bone_record(-1, [0.0; 3], [header, empty_track(), empty_track()]);
        builder.array(0x2C, 1, &record);

        let model = M2File::parse(&builder.buf).expect("header");
        let bones = model
            .bones(&AnimationSources::model_only(&builder.buf))
            .expect("bones survive");

        assert!(bones[0].translation.keyframes(0).is_some());
        assert!(bones[0].translation.keyframes(1).is_none());
    }

    #[test]
    fn given_child_bone_when_parsing_then_parent_index_is_kept() {
        let mut builder = M2Builder::new();
        let mut records = bone_record(-1, [0.0; 3], [empty_track(), empty_track(), empty_track()]);
        records.extend(bone_record(0, [1.0, 0.0, 0.0], [empty_track(), empty_track(), empty_track()]));
        builder.array(0x2C, 2, &records);

        let model = M2File::parse(&builder.buf).expect("header");
        let bones = model
            .bones(&AnimationSources::model_only(&builder.buf))
            .expect("bones");

        assert_eq!(bones[1].parent, Some(0));
    }

    proptest! {
        #[test]
        fn given_any_component_except_zero_alias_when_round_tripping_then_value_is_recovered(
            value in -32767i16..=32767,
        ) {
            prop_assert_eq!(compress_component(decompress_component(value)), value);
        }
    }
}
