use log::warn;
use nalgebra::{Matrix4, Translation3, Vector3};

use crate::m2::{M2Bone, convert_axis};

#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    pub name: String,
    pub parent: Option<usize>,
    /// Rest translation relative to the parent, in output space.
    pub rest_translation: Vector3<f32>,
    pub inverse_bind: Matrix4<f32>,
}

/// Flat joint arena; parents are indices into `joints`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Skeleton {
    pub joints: Vec<Joint>,
}

impl Skeleton {
    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    pub fn roots(&self) -> Vec<usize> {
        (0..self.joints.len())
            .filter(|index| self.joints[*index].parent.is_none())
            .collect()
    }

    pub fn children(&self, joint: usize) -> Vec<usize> {
        (0..self.joints.len())
            .filter(|index| self.joints[*index].parent == Some(joint))
            .collect()
    }
}

/// Drop parent links that point outside the arena or close a cycle.
///
/// Every parent walk is bounded by the bone count, so malformed data cannot
/// loop forever; the offending link is cut and the bone becomes a root.
pub fn sanitize_parents(parents: &[Option<usize>]) -> Vec<Option<usize>> {
    let count = parents.len();
    let mut sanitized: Vec<Option<usize>> = parents
        .iter()
        .enumerate()
        .map(|(index, parent)| match parent {
            Some(parent) if *parent >= count => {
                warn!("bone {index} references missing parent {parent}");
                None
            }
            Some(parent) if *parent == index => {
                warn!("bone {index} is its own parent");
                None
            }
            other => *other,
        })
        .collect();

    for index in 0..count {
        let mut cursor = sanitized[index];
        let mut steps = 0;
        while let Some(parent) = cursor {
            steps += 1;
            if steps > count {
                warn!("bone {index} is part of a parent cycle, detaching it");
                sanitized[index] = None;
                break;
            }
            cursor = sanitized[parent];
        }
    }
    sanitized
}

/// World matrix per joint from local matrices and sanitized parents.
pub fn compute_world_matrices(
    locals: &[Matrix4<f32>],
    parents: &[Option<usize>],
) -> Vec<Matrix4<f32>> {
    let mut worlds = vec![Matrix4::<f32>::identity(); locals.len()];
    let mut resolved = vec![false; locals.len()];

    for index in 0..locals.len() {
        let mut chain = vec![index];
        let mut cursor = parents[index];
        while let Some(parent) = cursor {
            if resolved[parent] || chain.len() > locals.len() {
                break;
            }
            chain.push(parent);
            cursor = parents[parent];
        }

        for joint in chain.into_iter().rev() {
            if resolved[joint] {
                continue;
            }
            worlds[joint] = match parents[joint] {
                Some(parent) => worlds[parent] * locals[joint],
                None => locals[joint],
            };
            resolved[joint] = true;
        }
    }
    worlds
}

/// Build the rest skeleton from decoded bones.
///
/// Rest rotations are identity, so each joint's rest translation is its pivot
/// relative to its parent's pivot, converted to output space. Inverse bind
/// matrices are the inverses of the accumulated rest world matrices.
pub fn build_skeleton(bones: &[M2Bone]) -> Skeleton {
    let parents = sanitize_parents(&bones.iter().map(|bone| bone.parent).collect::<Vec<_>>());

    let rest: Vec<Vector3<f32>> = bones
        .iter()
        .zip(&parents)
        .map(|(bone, parent)| {
            let pivot = Vector3::from(bone.pivot);
            let relative = match parent {
                Some(parent) => pivot - Vector3::from(bones[*parent].pivot),
                None => pivot,
            };
            Vector3::from(convert_axis(relative.into()))
        })
        .collect();

    let locals: Vec<Matrix4<f32>> = rest
        .iter()
        .map(|translation| Translation3::from(*translation).to_homogeneous())
        .collect();
    let worlds = compute_world_matrices(&locals, &parents);

    let joints = bones
        .iter()
        .enumerate()
        .map(|(index, bone)| Joint {
            name: joint_name(index, bone),
            parent: parents[index],
            rest_translation: rest[index],
            inverse_bind: worlds[index].try_inverse().unwrap_or_else(|| {
                warn!("bone {index} bind matrix is not invertible");
                Matrix4::identity()
            }),
        })
        .collect();

    Skeleton { joints }
}

fn joint_name(index: usize, bone: &M2Bone) -> String {
    if bone.key_bone_id >= 0 {
        format!("bone_{index}_key{}", bone.key_bone_id)
    } else {
        format!("bone_{index}")
    }
}

#[cfg(test)]
pub(crate) fn rest_bone(parent: Option<usize>, pivot: [f32; 3]) -> M2Bone {
    use crate::m2::AnimationTrack;

    M2Bone {
        key_bone_id: -1,
        flags: 0,
        parent,
        submesh_id: 0,
        name_crc: 0,
        translation: AnimationTrack::default(),
        rotation: AnimationTrack::default(),
        scale: AnimationTrack::default(),
        pivot,
    }
}
