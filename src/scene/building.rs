//! Building scenes assembled from WMO groups, plus their collision meshes.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use serde::{Deserialize, Serialize};

use super::{EmbeddedImage, IndexWidth, Material, Primitive, SceneModel, VertexStreams};
use crate::{
    error::{DecodeError, ExtractError},
    m2::convert_axis,
    wmo::WmoGroup,
};

pub const BUILDING_COLOR: [f32; 4] = [0.7, 0.6, 0.5, 1.0];

/// Collision geometry in output space: flat `xyz` triples and triangle indices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollisionMesh {
    pub verts: Vec<f32>,
    pub tris: Vec<u32>,
}

impl CollisionMesh {
    pub fn is_empty(&self) -> bool {
        self.tris.is_empty()
    }
}

fn geometry_groups(groups: &[WmoGroup]) -> impl Iterator<Item = &WmoGroup> {
    groups.iter().filter(|group| group.has_geometry())
}

/// Material ids referenced by rendered triangles, in ascending order.
pub fn rendered_materials(groups: &[WmoGroup]) -> BTreeSet<u8> {
    geometry_groups(groups)
        .flat_map(|group| {
            (0..group.triangles.len())
                .map(|triangle| group.info(triangle))
                .filter(|info| info.is_rendered())
                .map(|info| info.material)
        })
        .collect()
}

fn check_triangle(group: &WmoGroup, triangle: &[u16; 3]) -> Result<(), DecodeError> {
    match triangle
        .iter()
        .find(|index| **index as usize >= group.positions.len())
    {
        Some(index) => Err(DecodeError::RangeViolation {
            context: "wmo group vertices",
            offset: *index as usize,
            length: 1,
            buffer_len: group.positions.len(),
        }),
        None => Ok(()),
    }
}

/// Concatenate every group with geometry into one vertex list and emit one
/// primitive per material id. Invisible triangles are dropped.
///
/// # Arguments
///
/// * `name` - Scene name.
/// * `groups` - Decoded group files in group order.
/// * `textures` - Embedded image per material id; missing ids get a flat colour.
pub fn build_building(
    name: &str,
    groups: &[WmoGroup],
    mut textures: BTreeMap<u8, EmbeddedImage>,
) -> Result<SceneModel, ExtractError> {
    let mut vertices = VertexStreams::default();
    let mut by_material: BTreeMap<u8, Vec<u32>> = BTreeMap::new();

    for group in geometry_groups(groups) {
        let base = vertices.len() as u32;
        let count = group.positions.len();
        vertices
            .positions
            .extend(group.positions.iter().map(|p| convert_axis(*p)));
        if group.normals.len() == count {
            vertices
                .normals
                .extend(group.normals.iter().map(|n| convert_axis(*n)));
        } else {
            vertices.normals.extend(std::iter::repeat_n([0.0; 3], count));
        }
        if group.uvs.len() == count {
            vertices.uvs.extend_from_slice(&group.uvs);
        } else {
            vertices.uvs.extend(std::iter::repeat_n([0.0; 2], count));
        }

        for (index, triangle) in group.triangles.iter().enumerate() {
            let info = group.info(index);
            if !info.is_rendered() {
                continue;
            }
            check_triangle(group, triangle).map_err(|err| ExtractError::decode(name, err))?;
            by_material
                .entry(info.material)
                .or_default()
                .extend(triangle.iter().map(|v| base + *v as u32));
        }
    }

    if vertices.is_empty() || by_material.is_empty() {
        return Err(ExtractError::EmptyModel {
            name: name.to_string(),
        });
    }

    let mut images = Vec::new();
    let mut materials = Vec::new();
    let mut primitives = Vec::new();
    for (material_id, indices) in by_material {
        let material = match textures.remove(&material_id) {
            Some(image) => {
                images.push(image);
                Material::textured(format!("material_{material_id}"), images.len() - 1, 0.8)
            }
            None => Material::flat(format!("material_{material_id}"), BUILDING_COLOR, 0.8),
        };
        materials.push(material);
        primitives.push(Primitive {
            name: format!("material_{material_id}"),
            indices,
            material: materials.len() - 1,
        });
    }
    debug!(
        "{name}: {} vertices in {} material primitives",
        vertices.len(),
        primitives.len()
    );

    Ok(SceneModel {
        name: name.to_string(),
        index_width: IndexWidth::for_vertex_count(vertices.len()),
        vertices,
        primitives,
        materials,
        images,
        skeleton: None,
        animations: Vec::new(),
    })
}

fn round3(value: f32) -> f32 {
    (value * 1000.0).round() / 1000.0
}

/// Collision mesh of all groups: every triangle without the no-collide flag,
/// including invisible ones. Vertices are rounded to three decimals.
pub fn extract_collision(groups: &[WmoGroup]) -> CollisionMesh {
    let mut mesh = CollisionMesh::default();
    let mut base = 0u32;

    for group in geometry_groups(groups) {
        mesh.verts.extend(
            group
                .positions
                .iter()
                .flat_map(|p| convert_axis(*p).map(round3)),
        );
        for (index, triangle) in group.triangles.iter().enumerate() {
            if !group.info(index).collides() || check_triangle(group, triangle).is_err() {
                continue;
            }
            mesh.tris.extend(triangle.iter().map(|v| base + *v as u32));
        }
        base += group.positions.len() as u32;
    }

    if mesh.tris.is_empty() {
        return CollisionMesh::default();
    }
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wmo::TriangleInfo;

    fn group(triangles: Vec<[u16; 3]>, info: Vec<(u8, u8)>) -> WmoGroup {
        WmoGroup {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 2.0, 3.0], [0.1234, 0.0, 0.0], [0.0, 0.0, 1.0]],
            normals: Vec::new(),
            uvs: Vec::new(),
            triangles,
            triangle_info: info
                .into_iter()
                .map(|(flags, material)| TriangleInfo { flags, material })
                .collect(),
        }
    }

    #[test]
    fn given_two_groups_when_building_then_second_group_indices_are_offset() {
        let groups = vec![
            group(vec![[0, 1, 2]], vec![(0, 1)]),
            group(vec![[0, 1, 3]], vec![(0, 1)]),
        ];

        let scene = build_building("abbey", &groups, BTreeMap::new()).expect("scene");

        assert_eq!(scene.vertices.len(), 8);
        assert_eq!(scene.primitives.len(), 1);
        assert_eq!(scene.primitives[0].indices, vec![0, 1, 2, 4, 5, 7]);
        assert_eq!(scene.materials[0].base_color, BUILDING_COLOR);
        assert_eq!(scene.vertices.normals[0], [0.0; 3]);
    }

    #[test]
    fn given_invisible_and_multiple_materials_when_building_then_primitives_are_sorted() {
        let groups = vec![group(
            vec![[0, 1, 2], [1, 2, 3], [0, 2, 3]],
            vec![(0, 3), (0, 0xFF), (0, 0)],
        )];
        let image = EmbeddedImage {
            bytes: vec![1, 2, 3],
            mime_type: "image/png",
        };

        let scene = build_building("house", &groups, BTreeMap::from([(3, image)])).expect("scene");

        assert_eq!(scene.primitives.len(), 2);
        assert_eq!(scene.primitives[0].name, "material_0");
        assert_eq!(scene.materials[1].image, Some(0));
        assert_eq!(rendered_materials(&groups), BTreeSet::from([0, 3]));
    }

    #[test]
    fn given_only_invisible_triangles_when_building_then_model_is_empty() {
        let groups = vec![group(vec![[0, 1, 2]], vec![(0, 0xFF)])];

        assert!(matches!(
            build_building("wall", &groups, BTreeMap::new()),
            Err(ExtractError::EmptyModel { .. })
        ));
    }

    #[test]
    fn given_no_collide_flag_when_extracting_collision_then_triangle_is_excluded() {
        let groups = vec![group(vec![[0, 1, 2], [1, 2, 3]], vec![(0x04, 0), (0, 0xFF)])];

        let collision = extract_collision(&groups);

        assert_eq!(collision.tris, vec![1, 2, 3]);
        assert_eq!(&collision.verts[3..6], &[1.0, 3.0, -2.0]);
        assert_eq!(collision.verts[6], 0.123);
    }

    #[test]
    fn given_all_triangles_non_colliding_when_extracting_then_collision_is_empty() {
        let groups = vec![group(vec![[0, 1, 2]], vec![(0x04, 0)])];

        assert!(extract_collision(&groups).is_empty());
    }
}
