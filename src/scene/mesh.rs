//! Submesh selection and vertex deduplication for model meshes.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::debug;

use super::{VertexStreams, skinning::normalize_influences};
use crate::{
    error::DecodeError,
    m2::{M2Skin, M2Submesh, M2Vertex, convert_axis},
};

/// How included submeshes are split into index buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Grouping {
    /// One body buffer and one hair buffer (hairstyle geosets 1..=99).
    #[default]
    BodyAndHair,
    /// One buffer per resolved texture index.
    PerTexture,
}

/// Key of one index buffer produced by [`assemble_mesh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrimitiveClass {
    Body,
    Hair,
    Texture(Option<u16>),
}

#[derive(Debug, Clone, Default)]
pub struct MeshOptions {
    /// Submesh ids to include; `None` includes every base-level submesh.
    pub geoset_filter: Option<HashSet<u16>>,
    pub grouping: Grouping,
    /// Emit joint/weight streams for this many joints.
    pub joint_count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssembledMesh {
    pub vertices: VertexStreams,
    /// Non-empty index buffers in deterministic order.
    pub groups: Vec<(PrimitiveClass, Vec<u32>)>,
    /// Output vertex index -> global model vertex index.
    pub source_indices: Vec<u32>,
}

impl AssembledMesh {
    pub fn unique_vertex_count(&self) -> usize {
        self.source_indices.len()
    }
}

fn is_included(submesh: &M2Submesh, options: &MeshOptions) -> bool {
    submesh.level == 0
        && options
            .geoset_filter
            .as_ref()
            .is_none_or(|filter| filter.contains(&submesh.id))
}

/// Walk the included submeshes and build one shared, deduplicated vertex list
/// plus the grouped index buffers referencing it.
///
/// # Arguments
///
/// * `vertices` - Global model vertices.
/// * `skin` - Decoded skin partition.
/// * `texture_combos` - Texture combo table used for per-texture grouping.
/// * `options` - Submesh filter, grouping and skinning options.
///
/// # Errors
///
/// Returns `RangeViolation` when a submesh references indices or vertices
/// outside the decoded arrays.
pub fn assemble_mesh(
    vertices: &[M2Vertex],
    skin: &M2Skin,
    texture_combos: &[u16],
    options: &MeshOptions,
) -> Result<AssembledMesh, DecodeError> {
    let textures = match options.grouping {
        Grouping::PerTexture => skin.submesh_textures(texture_combos),
        Grouping::BodyAndHair => HashMap::new(),
    };

    let mut remap: HashMap<u32, u32> = HashMap::new();
    let mut source_indices = Vec::new();
    let mut groups: BTreeMap<PrimitiveClass, Vec<u32>> = BTreeMap::new();

    for (submesh_index, submesh) in skin.submeshes.iter().enumerate() {
        if !is_included(submesh, options) {
            continue;
        }
        let class = match options.grouping {
            Grouping::BodyAndHair if submesh.is_hair() => PrimitiveClass::Hair,
            Grouping::BodyAndHair => PrimitiveClass::Body,
            Grouping::PerTexture => {
                PrimitiveClass::Texture(textures.get(&submesh_index).copied().flatten())
            }
        };

        let globals = skin.submesh_global_indices(submesh)?;
        let target = groups.entry(class).or_default();
        for global in globals {
            if global as usize >= vertices.len() {
                return Err(DecodeError::RangeViolation {
                    context: "model vertices",
                    offset: global as usize,
                    length: 1,
                    buffer_len: vertices.len(),
                });
            }
            let output = *remap.entry(global).or_insert_with(|| {
                source_indices.push(global);
                (source_indices.len() - 1) as u32
            });
            target.push(output);
        }
    }

    groups.retain(|_, indices| !indices.is_empty());
    debug!(
        "assembled {} unique vertices into {} groups",
        source_indices.len(),
        groups.len()
    );

    Ok(AssembledMesh {
        vertices: build_streams(vertices, &source_indices, options.joint_count),
        groups: groups.into_iter().collect(),
        source_indices,
    })
}

fn build_streams(
    vertices: &[M2Vertex],
    source_indices: &[u32],
    joint_count: Option<usize>,
) -> VertexStreams {
    let selected: Vec<&M2Vertex> = source_indices
        .iter()
        .map(|index| &vertices[*index as usize])
        .collect();
    let mut streams = VertexStreams {
        positions: selected.iter().map(|v| convert_axis(v.position)).collect(),
        normals: selected.iter().map(|v| convert_axis(v.normal)).collect(),
        uvs: selected.iter().map(|v| v.uv).collect(),
        joints: None,
        weights: None,
    };

    if let Some(joint_count) = joint_count.filter(|count| *count > 0) {
        let (joints, weights): (Vec<_>, Vec<_>) = selected
            .iter()
            .map(|v| normalize_influences(v.bone_indices, v.bone_weights, joint_count))
            .unzip();
        streams.joints = Some(joints);
        streams.weights = Some(weights);
    }
    streams
}
