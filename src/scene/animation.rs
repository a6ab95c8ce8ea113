//! Animation clips reconstructed from per-sequence bone tracks.

use std::collections::HashSet;

use log::debug;
use nalgebra::{Quaternion, UnitQuaternion, Vector3};

use super::Skeleton;
use crate::m2::{AnimationTrack, M2Bone, M2Sequence, bone::Keyframes, convert_axis};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelPath {
    Translation,
    Rotation,
    Scale,
}

impl ChannelPath {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelPath::Translation => "translation",
            ChannelPath::Rotation => "rotation",
            ChannelPath::Scale => "scale",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Step,
    Linear,
}

impl Interpolation {
    /// Source interpolation 0 holds values; every curve type is sampled linearly.
    pub fn from_source(value: u16) -> Self {
        if value == 0 {
            Interpolation::Step
        } else {
            Interpolation::Linear
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Interpolation::Step => "STEP",
            Interpolation::Linear => "LINEAR",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelValues {
    Vec3(Vec<[f32; 3]>),
    Vec4(Vec<[f32; 4]>),
}

impl ChannelValues {
    pub fn len(&self) -> usize {
        match self {
            ChannelValues::Vec3(values) => values.len(),
            ChannelValues::Vec4(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub joint: usize,
    pub path: ChannelPath,
    pub interpolation: Interpolation,
    /// Strictly increasing keyframe times in seconds.
    pub times: Vec<f32>,
    pub values: ChannelValues,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    pub sequence_id: u16,
    pub duration: f32,
    pub channels: Vec<Channel>,
}

const ANIMATION_NAMES: [&str; 51] = [
    "Stand",
    "Death",
    "Spell",
    "Stop",
    "Walk",
    "Run",
    "Dead",
    "Rise",
    "StandWound",
    "CombatWound",
    "CombatCritical",
    "ShuffleLeft",
    "ShuffleRight",
    "Walkbackwards",
    "Stun",
    "HandsClosed",
    "AttackUnarmed",
    "Attack1H",
    "Attack2H",
    "Attack2HL",
    "ParryUnarmed",
    "Parry1H",
    "Parry2H",
    "Parry2HL",
    "ShieldBlock",
    "ReadyUnarmed",
    "Ready1H",
    "Ready2H",
    "Ready2HL",
    "ReadyBow",
    "Dodge",
    "SpellPrecast",
    "SpellCast",
    "SpellCastArea",
    "NPCWelcome",
    "NPCGoodbye",
    "Block",
    "JumpStart",
    "Jump",
    "JumpEnd",
    "Fall",
    "SwimIdle",
    "Swim",
    "SwimLeft",
    "SwimRight",
    "SwimBackwards",
    "AttackBow",
    "FireBow",
    "ReadyRifle",
    "AttackRifle",
    "Loot",
];

/// Display name of an animation id.
pub fn animation_name(id: u16) -> String {
    ANIMATION_NAMES
        .get(id as usize)
        .map(|name| name.to_string())
        .unwrap_or_else(|| format!("Anim{id}"))
}

/// Select the sequences that become clips: base variations only unless
/// `include_variations` is set.
pub fn retained_sequences(sequences: &[M2Sequence], include_variations: bool) -> Vec<usize> {
    sequences
        .iter()
        .enumerate()
        .filter(|(_, sequence)| include_variations || sequence.variation == 0)
        .map(|(index, _)| index)
        .collect()
}

/// Build one clip per retained sequence. Sequences without any keyframes on
/// any joint produce no clip.
pub fn build_clips(
    bones: &[M2Bone],
    sequences: &[M2Sequence],
    skeleton: &Skeleton,
    include_variations: bool,
) -> Vec<AnimationClip> {
    let mut used_names = HashSet::new();
    let mut clips = Vec::new();

    for index in retained_sequences(sequences, include_variations) {
        let sequence = &sequences[index];
        let channels = build_channels(bones, skeleton, index);
        if channels.is_empty() {
            debug!("sequence {index} (id {}) has no keyframes", sequence.id);
            continue;
        }

        let mut name = animation_name(sequence.id);
        if sequence.variation > 0 {
            name = format!("{name}_{}", sequence.variation);
        }
        if !used_names.insert(name.clone()) {
            name = format!("{name}_{index}");
            used_names.insert(name.clone());
        }

        let last_key = channels
            .iter()
            .filter_map(|channel| channel.times.last().copied())
            .fold(0.0f32, f32::max);
        clips.push(AnimationClip {
            name,
            sequence_id: sequence.id,
            duration: (sequence.duration_ms as f32 / 1000.0).max(last_key),
            channels,
        });
    }
    clips
}

fn build_channels(bones: &[M2Bone], skeleton: &Skeleton, sequence: usize) -> Vec<Channel> {
    let mut channels = Vec::new();
    for (joint, bone) in bones.iter().enumerate() {
        let rest = skeleton
            .joints
            .get(joint)
            .map(|joint| joint.rest_translation)
            .unwrap_or_else(Vector3::zeros);

        if let Some((interpolation, times, values)) = sample(&bone.translation, sequence, |v| {
            let converted = Vector3::from(convert_axis(*v)) + rest;
            [converted.x, converted.y, converted.z]
        }) {
            channels.push(Channel {
                joint,
                path: ChannelPath::Translation,
                interpolation,
                times,
                values: ChannelValues::Vec3(values),
            });
        }

        if let Some((interpolation, times, values)) =
            sample(&bone.rotation, sequence, convert_rotation)
        {
            channels.push(Channel {
                joint,
                path: ChannelPath::Rotation,
                interpolation,
                times,
                values: ChannelValues::Vec4(values),
            });
        }

        if let Some((interpolation, times, values)) =
            sample(&bone.scale, sequence, |v| [v[0], v[2], v[1]])
        {
            channels.push(Channel {
                joint,
                path: ChannelPath::Scale,
                interpolation,
                times,
                values: ChannelValues::Vec3(values),
            });
        }
    }
    channels
}

/// Convert a source `(x, y, z, w)` rotation: the vector part follows the axis
/// conversion, `w` is kept, then the result is normalized.
pub fn convert_rotation(q: &[f32; 4]) -> [f32; 4] {
    let [x, y, z] = convert_axis([q[0], q[1], q[2]]);
    let raw = Quaternion::new(q[3], x, y, z);
    if raw.norm() <= f32::EPSILON {
        return [0.0, 0.0, 0.0, 1.0];
    }
    let unit = UnitQuaternion::from_quaternion(raw);
    [unit.i, unit.j, unit.k, unit.w]
}

type Sampled<U> = (Interpolation, Vec<f32>, Vec<U>);

fn sample<T, U>(
    track: &AnimationTrack<T>,
    sequence: usize,
    convert: impl Fn(&T) -> U,
) -> Option<Sampled<U>> {
    if track.global_sequence.is_some() {
        return None;
    }
    let Keyframes {
        timestamps_ms,
        values,
    } = track.keyframes(sequence)?;

    let mut times = Vec::with_capacity(timestamps_ms.len());
    let mut converted = Vec::with_capacity(values.len());
    for (time, value) in timestamps_ms.iter().zip(values) {
        let seconds = *time as f32 / 1000.0;
        if times.last().is_some_and(|last| seconds <= *last) {
            continue;
        }
        times.push(seconds);
        converted.push(convert(value));
    }

    if times.is_empty() {
        return None;
    }
    Some((Interpolation::from_source(track.interpolation), times, converted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        m2::animation::sequence_bytes,
        scene::skeleton::{build_skeleton, rest_bone},
    };
    use std::collections::BTreeMap;

    fn track<T>(interpolation: u16, keys: Vec<(usize, Vec<u32>, Vec<T>)>) -> AnimationTrack<T> {
        AnimationTrack {
            interpolation,
            global_sequence: None,
            sequences: keys
                .into_iter()
                .map(|(index, timestamps_ms, values)| {
                    (
                        index,
                        Keyframes {
                            timestamps_ms,
                            values,
                        },
                    )
                })
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn sequence(id: u16, variation: u16, duration: u32) -> M2Sequence {
        M2Sequence::parse(&sequence_bytes(id, variation, duration, 0x20)).expect("sequence")
    }

    #[test]
    fn given_translation_keys_when_building_clip_then_rest_offset_is_added() {
        let mut root = rest_bone(None, [10.0, 20.0, 30.0]);
        root.translation = track(1, vec![(0, vec![0, 1000], vec![[0.0; 3], [1.0, 2.0, 3.0]])]);
        let bones = vec![root];
        let skeleton = build_skeleton(&bones);

        let clips = build_clips(&bones, &[sequence(0, 0, 1000)], &skeleton, false);

        assert_eq!(clips.len(), 1);
        assert_eq!(clips[0].name, "Stand");
        let channel = &clips[0].channels[0];
        assert_eq!(channel.path, ChannelPath::Translation);
        assert_eq!(channel.times, vec![0.0, 1.0]);
        assert_eq!(
            channel.values,
            ChannelValues::Vec3(vec![[10.0, 30.0, -20.0], [11.0, 33.0, -22.0]])
        );
    }

    #[test]
    fn given_variations_when_retaining_by_default_then_only_base_variation_is_kept() {
        let sequences = [sequence(4, 0, 10), sequence(4, 1, 10), sequence(5, 0, 10)];

        assert_eq!(retained_sequences(&sequences, false), vec![0, 2]);
        assert_eq!(retained_sequences(&sequences, true), vec![0, 1, 2]);
    }

    #[test]
    fn given_rotation_about_source_z_when_converting_then_it_turns_about_output_y() {
        let half = std::f32::consts::FRAC_1_SQRT_2;

        let converted = convert_rotation(&[0.0, 0.0, half, half]);

        assert!((converted[1] - half).abs() < 1e-6);
        assert!((converted[3] - half).abs() < 1e-6);
        assert!(converted[0].abs() < 1e-6 && converted[2].abs() < 1e-6);
    }

    #[test]
    fn given_step_track_with_repeated_time_when_sampling_then_duplicates_are_dropped() {
        let mut bone = rest_bone(None, [0.0; 3]);
        bone.scale = track(0, vec![(0, vec![0, 0, 500], vec![[1.0; 3], [2.0; 3], [3.0; 3]])]);
        let bones = vec![bone];
        let skeleton = build_skeleton(&bones);

        let clips = build_clips(&bones, &[sequence(1, 0, 500)], &skeleton, false);

        let channel = &clips[0].channels[0];
        assert_eq!(channel.interpolation, Interpolation::Step);
        assert_eq!(channel.times, vec![0.0, 0.5]);
        assert_eq!(channel.values.len(), 2);
    }

    #[test]
    fn given_sequence_without_keys_when_building_then_no_clip_is_emitted() {
        let bones = vec![rest_bone(None, [0.0; 3])];
        let skeleton = build_skeleton(&bones);

        assert!(build_clips(&bones, &[sequence(0, 0, 100)], &skeleton, false).is_empty());
    }

    #[test]
    fn given_unknown_id_when_naming_then_numeric_fallback_is_used() {
        assert_eq!(animation_name(4), "Walk");
        assert_eq!(animation_name(400), "Anim400");
    }
}
