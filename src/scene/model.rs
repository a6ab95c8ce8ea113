//! Model scenes: a character with body/hair split, skeleton and clips, or a
//! static doodad split per texture.

use std::collections::{BTreeMap, HashSet};

use log::{debug, info};

use super::{
    EmbeddedImage, IndexWidth, Material, Primitive, SceneModel,
    animation::build_clips,
    mesh::{Grouping, MeshOptions, PrimitiveClass, assemble_mesh},
    skeleton::build_skeleton,
};
use crate::{
    error::{DecodeError, ExtractError},
    m2::{M2Bone, M2Sequence, M2Skin, M2Vertex},
};

pub const BODY_COLOR: [f32; 4] = [0.76, 0.60, 0.47, 1.0];
pub const HAIR_COLOR: [f32; 4] = [0.20, 0.12, 0.06, 1.0];
pub const UNTEXTURED_COLOR: [f32; 4] = [0.5, 0.5, 0.5, 1.0];

/// Decoded model records shared by both scene builders.
#[derive(Debug, Clone, Copy)]
pub struct ModelParts<'a> {
    pub name: &'a str,
    pub vertices: &'a [M2Vertex],
    pub skin: &'a M2Skin,
}

/// Inputs for a skinned, animated character.
#[derive(Debug, Clone, Default)]
pub struct CharacterOptions {
    pub geoset_filter: Option<HashSet<u16>>,
    pub body_texture: Option<EmbeddedImage>,
    pub include_variations: bool,
}

fn empty_model(name: &str) -> ExtractError {
    ExtractError::EmptyModel {
        name: name.to_string(),
    }
}

fn wrap(name: &str, source: DecodeError) -> ExtractError {
    ExtractError::decode(name, source)
}

/// Build a character scene: body and hair primitives sharing one vertex
/// list, a skeleton when bones are present and one clip per sequence.
///
/// # Arguments
///
/// * `parts` - Vertices and skin partition of the model.
/// * `bones` - Decoded bones, possibly empty.
/// * `sequences` - Sequence table matching the bone tracks.
/// * `options` - Geoset filter, body texture and clip selection.
///
/// # Returns
///
/// A scene whose material 0 is the body and material 1 the flat hair colour.
pub fn build_character(
    parts: ModelParts<'_>,
    bones: &[M2Bone],
    sequences: &[M2Sequence],
    options: CharacterOptions,
) -> Result<SceneModel, ExtractError> {
    let mesh = assemble_mesh(
        parts.vertices,
        parts.skin,
        &[],
        &MeshOptions {
            geoset_filter: options.geoset_filter,
            grouping: Grouping::BodyAndHair,
            joint_count: (!bones.is_empty()).then_some(bones.len()),
        },
    )
    .map_err(|err| wrap(parts.name, err))?;
    if mesh.groups.is_empty() {
        return Err(empty_model(parts.name));
    }

    let mut images = Vec::new();
    let body = match options.body_texture {
        Some(image) => {
            images.push(image);
            Material::textured("body", 0, 0.8)
        }
        None => Material::flat("body", BODY_COLOR, 0.8),
    };
    let materials = vec![body, Material::flat("hair", HAIR_COLOR, 0.9)];

    let primitives = mesh
        .groups
        .into_iter()
        .map(|(class, indices)| match class {
            PrimitiveClass::Hair => Primitive {
                name: "hair".to_string(),
                indices,
                material: 1,
            },
            _ => Primitive {
                name: "body".to_string(),
                indices,
                material: 0,
            },
        })
        .collect();

    let (skeleton, animations) = if bones.is_empty() {
        (None, Vec::new())
    } else {
        let skeleton = build_skeleton(bones);
        let clips = build_clips(bones, sequences, &skeleton, options.include_variations);
        (Some(skeleton), clips)
    };

    let scene = SceneModel {
        name: parts.name.to_string(),
        index_width: IndexWidth::for_vertex_count(mesh.vertices.len()),
        vertices: mesh.vertices,
        primitives,
        materials,
        images,
        skeleton,
        animations,
    };
    info!(
        "{}: {} vertices, {} triangles, {} joints, {} clips",
        scene.name,
        scene.vertices.len(),
        scene.triangle_count(),
        scene.skeleton.as_ref().map_or(0, |s| s.len()),
        scene.animations.len()
    );
    Ok(scene)
}

/// Build a static doodad scene with one primitive per resolved texture.
///
/// `textures` maps a model texture index to its embedded image. Groups whose
/// texture is missing or failed to decode get a flat grey material.
pub fn build_doodad(
    parts: ModelParts<'_>,
    texture_combos: &[u16],
    textures: BTreeMap<u16, EmbeddedImage>,
) -> Result<SceneModel, ExtractError> {
    let mesh = assemble_mesh(
        parts.vertices,
        parts.skin,
        texture_combos,
        &MeshOptions {
            grouping: Grouping::PerTexture,
            ..MeshOptions::default()
        },
    )
    .map_err(|err| wrap(parts.name, err))?;
    if mesh.groups.is_empty() {
        return Err(empty_model(parts.name));
    }

    let mut textures = textures;
    let mut images = Vec::new();
    let mut materials = Vec::new();
    let mut primitives = Vec::new();

    for (class, indices) in mesh.groups {
        let texture = match class {
            PrimitiveClass::Texture(texture) => texture,
            _ => None,
        };
        let image = texture.and_then(|index| textures.remove(&index).map(|image| (index, image)));
        let (name, material) = match image {
            Some((index, image)) => {
                images.push(image);
                let mut material =
                    Material::textured(format!("texture_{index}"), images.len() - 1, 0.8);
                material.alpha_cutoff = Some(0.5);
                (format!("texture_{index}"), material)
            }
            None => {
                debug!("{}: group {class:?} has no texture", parts.name);
                let name = "untextured".to_string();
                (name.clone(), Material::flat(name, UNTEXTURED_COLOR, 0.8))
            }
        };
        materials.push(material);
        primitives.push(Primitive {
            name,
            indices,
            material: materials.len() - 1,
        });
    }

    Ok(SceneModel {
        name: parts.name.to_string(),
        index_width: IndexWidth::for_vertex_count(mesh.vertices.len()),
        vertices: mesh.vertices,
        primitives,
        materials,
        images,
        skeleton: None,
        animations: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::m2::skin::test_support::skin_bytes;
    use crate::scene::skeleton::rest_bone;

    fn vertices(count: usize) -> Vec<M2Vertex> {
        (0..count)
            .map(|i| M2Vertex {
                position: [i as f32, 1.0, 2.0],
                bone_weights: [255, 0, 0, 0],
                bone_indices: [0, 0, 0, 0],
                normal: [0.0, 0.0, 1.0],
                uv: [0.0, 0.0],
                uv2: [0.0, 0.0],
            })
            .collect()
    }

    fn png() -> EmbeddedImage {
        EmbeddedImage {
            bytes: vec![0x89, b'P', b'N', b'G'],
            mime_type: "image/png",
        }
    }

    #[test]
    fn given_body_and_hair_when_building_character_then_hair_material_is_flat() {
        let skin = M2Skin::parse(&skin_bytes(
            &[0, 1, 2, 3],
            &[0, 1, 2, 1, 2, 3],
            &[(0, 0, 3), (5, 3, 3)],
            &[],
        ))
        .expect("skin");
        let verts = vertices(4);
        let parts = ModelParts {
            name: "HumanMale",
            vertices: &verts,
            skin: &skin,
        };
        let options = CharacterOptions {
            body_texture: Some(png()),
            ..CharacterOptions::default()
        };

        let scene = build_character(parts, &[], &[], options).expect("scene");

        assert_eq!(scene.primitives.len(), 2);
        assert_eq!(scene.primitives[0].material, 0);
        assert_eq!(scene.primitives[1].name, "hair");
        let hair = &scene.materials[scene.primitives[1].material];
        assert_eq!(hair.image, None);
        assert_eq!(hair.base_color, HAIR_COLOR);
        assert_eq!(scene.materials[0].image, Some(0));
        assert!(scene.skeleton.is_none());
    }

    #[test]
    fn given_bones_when_building_character_then_skin_streams_and_skeleton_exist() {
        let skin = M2Skin::parse(&skin_bytes(&[0, 1, 2], &[0, 1, 2], &[(0, 0, 3)], &[]))
            .expect("skin");
        let verts = vertices(3);
        let parts = ModelParts {
            name: "Wolf",
            vertices: &verts,
            skin: &skin,
        };
        let bones = vec![rest_bone(None, [0.0; 3]), rest_bone(Some(0), [0.0, 0.0, 1.0])];

        let scene =
            build_character(parts, &bones, &[], CharacterOptions::default()).expect("scene");

        assert_eq!(scene.skeleton.as_ref().map(|s| s.len()), Some(2));
        assert_eq!(scene.vertices.joints.as_ref().map(Vec::len), Some(3));
        assert_eq!(scene.materials[0].base_color, BODY_COLOR);
    }

    #[test]
    fn given_filter_matching_nothing_when_building_character_then_model_is_empty() {
        let skin = M2Skin::parse(&skin_bytes(&[0, 1, 2], &[0, 1, 2], &[(0, 0, 3)], &[]))
            .expect("skin");
        let verts = vertices(3);
        let parts = ModelParts {
            name: "Empty",
            vertices: &verts,
            skin: &skin,
        };
        let options = CharacterOptions {
            geoset_filter: Some(HashSet::from([999])),
            ..CharacterOptions::default()
        };

        assert!(matches!(
            build_character(parts, &[], &[], options),
            Err(ExtractError::EmptyModel { .. })
        ));
    }

    #[test]
    fn given_textured_and_missing_groups_when_building_doodad_then_materials_follow_images() {
        let skin = M2Skin::parse(&skin_bytes(
            &[0, 1, 2, 3, 4, 5],
            &[0, 1, 2, 3, 4, 5],
            &[(0, 0, 3), (0, 3, 3)],
            &[(0, 0), (1, 1)],
        ))
        .expect("skin");
        let verts = vertices(6);
        let parts = ModelParts {
            name: "tree.m2",
            vertices: &verts,
            skin: &skin,
        };

        let scene = build_doodad(parts, &[0, 1], BTreeMap::from([(0, png())])).expect("scene");

        assert_eq!(scene.primitives.len(), 2);
        assert_eq!(scene.images.len(), 1);
        assert_eq!(scene.materials[0].alpha_cutoff, Some(0.5));
        assert_eq!(scene.materials[1].base_color, UNTEXTURED_COLOR);
        assert_eq!(scene.index_width, IndexWidth::U16);
    }
}
