//! Serialize a [`SceneModel`] into a binary glTF 2.0 container.

use std::borrow::Cow;

use gltf::binary::{Glb, Header};
use serde_json::{Map, Value, json};

use crate::{
    error::ExtractError,
    scene::{ChannelValues, IndexWidth, SceneModel, Skeleton},
};

// ─── Constants ───────────────────────────────────────────────────────────────

const UNSIGNED_SHORT: u32 = 5123;
const UNSIGNED_INT: u32 = 5125;
const FLOAT: u32 = 5126;

const ARRAY_BUFFER: u32 = 34962;
const ELEMENT_ARRAY_BUFFER: u32 = 34963;

const LINEAR: u32 = 9729;
const LINEAR_MIPMAP_LINEAR: u32 = 9987;
const REPEAT: u32 = 10497;

const GENERATOR: &str = concat!("wow2gltf ", env!("CARGO_PKG_VERSION"));

// ─── Buffer builder ──────────────────────────────────────────────────────────

/// One growing binary buffer with its views and accessors.
#[derive(Default)]
struct BinBuilder {
    bin: Vec<u8>,
    views: Vec<Value>,
    accessors: Vec<Value>,
}

impl BinBuilder {
    fn pad(&mut self) {
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }
    }

    fn push_view(&mut self, bytes: &[u8], target: Option<u32>) -> usize {
        self.pad();
        let mut view = json!({
            "buffer": 0,
            "byteOffset": self.bin.len(),
            "byteLength": bytes.len(),
        });
        if let Some(target) = target {
            view["target"] = json!(target);
        }
        self.bin.extend_from_slice(bytes);
        self.views.push(view);
        self.views.len() - 1
    }

    fn push_accessor(&mut self, accessor: Value) -> usize {
        self.accessors.push(accessor);
        self.accessors.len() - 1
    }

    fn floats<const N: usize>(
        &mut self,
        values: &[[f32; N]],
        kind: &str,
        target: Option<u32>,
        bounds: Option<([f32; N], [f32; N])>,
    ) -> usize {
        let bytes: Vec<u8> = values
            .iter()
            .flat_map(|value| value.iter().flat_map(|c| c.to_le_bytes()))
            .collect();
        let view = self.push_view(&bytes, target);
        let mut accessor = json!({
            "bufferView": view,
            "componentType": FLOAT,
            "count": values.len(),
            "type": kind,
        });
        if let Some((min, max)) = bounds {
            accessor["min"] = json!(min.to_vec());
            accessor["max"] = json!(max.to_vec());
        }
        self.push_accessor(accessor)
    }

    fn scalars(&mut self, values: &[f32]) -> usize {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let view = self.push_view(&bytes, None);
        let min = values.iter().copied().fold(f32::INFINITY, f32::min);
        let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        self.push_accessor(json!({
            "bufferView": view,
            "componentType": FLOAT,
            "count": values.len(),
            "type": "SCALAR",
            "min": [min],
            "max": [max],
        }))
    }

    fn joints(&mut self, joints: &[[u16; 4]]) -> usize {
        let bytes: Vec<u8> = joints
            .iter()
            .flat_map(|joint| joint.iter().flat_map(|j| j.to_le_bytes()))
            .collect();
        let view = self.push_view(&bytes, Some(ARRAY_BUFFER));
        self.push_accessor(json!({
            "bufferView": view,
            "componentType": UNSIGNED_SHORT,
            "count": joints.len(),
            "type": "VEC4",
        }))
    }

    fn indices(&mut self, indices: &[u32], width: IndexWidth) -> usize {
        let (bytes, component): (Vec<u8>, u32) = match width {
            IndexWidth::U16 => (
                indices
                    .iter()
                    .flat_map(|i| (*i as u16).to_le_bytes())
                    .collect(),
                UNSIGNED_SHORT,
            ),
            IndexWidth::U32 => (
                indices.iter().flat_map(|i| i.to_le_bytes()).collect(),
                UNSIGNED_INT,
            ),
        };
        let view = self.push_view(&bytes, Some(ELEMENT_ARRAY_BUFFER));
        let min = indices.iter().copied().min().unwrap_or(0);
        let max = indices.iter().copied().max().unwrap_or(0);
        self.push_accessor(json!({
            "bufferView": view,
            "componentType": component,
            "count": indices.len(),
            "type": "SCALAR",
            "min": [min],
            "max": [max],
        }))
    }

    fn matrices(&mut self, skeleton: &Skeleton) -> usize {
        let bytes: Vec<u8> = skeleton
            .joints
            .iter()
            .flat_map(|joint| joint.inverse_bind.as_slice().to_vec())
            .flat_map(|c| c.to_le_bytes())
            .collect();
        let view = self.push_view(&bytes, None);
        self.push_accessor(json!({
            "bufferView": view,
            "componentType": FLOAT,
            "count": skeleton.len(),
            "type": "MAT4",
        }))
    }
}

// ─── Document assembly ───────────────────────────────────────────────────────

fn insert_nonempty(root: &mut Map<String, Value>, key: &str, values: Vec<Value>) {
    if !values.is_empty() {
        root.insert(key.to_string(), Value::Array(values));
    }
}

/// Node of joint `j` is `1 + j`; node 0 carries the mesh.
fn joint_node(joint: usize) -> usize {
    joint + 1
}

fn mesh_json(scene: &SceneModel, builder: &mut BinBuilder) -> Value {
    let vertices = &scene.vertices;
    let mut attributes = Map::new();
    let position = builder.floats(
        &vertices.positions,
        "VEC3",
        Some(ARRAY_BUFFER),
        vertices.bounds(),
    );
    attributes.insert("POSITION".into(), json!(position));
    if vertices.normals.len() == vertices.len() {
        let normal = builder.floats(&vertices.normals, "VEC3", Some(ARRAY_BUFFER), None);
        attributes.insert("NORMAL".into(), json!(normal));
    }
    if vertices.uvs.len() == vertices.len() {
        let uv = builder.floats(&vertices.uvs, "VEC2", Some(ARRAY_BUFFER), None);
        attributes.insert("TEXCOORD_0".into(), json!(uv));
    }
    if scene.skeleton.as_ref().is_some_and(|s| !s.is_empty()) {
        if let (Some(joints), Some(weights)) = (&vertices.joints, &vertices.weights) {
            let joints = builder.joints(joints);
            let weights = builder.floats(weights, "VEC4", Some(ARRAY_BUFFER), None);
            attributes.insert("JOINTS_0".into(), json!(joints));
            attributes.insert("WEIGHTS_0".into(), json!(weights));
        }
    }

    let primitives: Vec<Value> = scene
        .primitives
        .iter()
        .filter(|primitive| !primitive.indices.is_empty())
        .map(|primitive| {
            let indices = builder.indices(&primitive.indices, scene.index_width);
            json!({
                "attributes": attributes,
                "indices": indices,
                "material": primitive.material,
                "mode": 4,
            })
        })
        .collect();

    json!({ "name": scene.name, "primitives": primitives })
}

fn material_json(scene: &SceneModel) -> Vec<Value> {
    scene
        .materials
        .iter()
        .map(|material| {
            let mut pbr = json!({
                "baseColorFactor": material.base_color,
                "metallicFactor": material.metallic,
                "roughnessFactor": material.roughness,
            });
            if let Some(image) = material.image {
                pbr["baseColorTexture"] = json!({ "index": image });
            }
            let mut value = json!({
                "name": material.name,
                "pbrMetallicRoughness": pbr,
                "doubleSided": material.double_sided,
            });
            if let Some(cutoff) = material.alpha_cutoff {
                value["alphaMode"] = json!("MASK");
                value["alphaCutoff"] = json!(cutoff);
            }
            value
        })
        .collect()
}

fn animation_json(scene: &SceneModel, builder: &mut BinBuilder) -> Vec<Value> {
    scene
        .animations
        .iter()
        .filter(|clip| !clip.channels.is_empty())
        .map(|clip| {
            let mut samplers = Vec::new();
            let mut channels = Vec::new();
            for channel in &clip.channels {
                let input = builder.scalars(&channel.times);
                let output = match &channel.values {
                    ChannelValues::Vec3(values) => builder.floats(values, "VEC3", None, None),
                    ChannelValues::Vec4(values) => builder.floats(values, "VEC4", None, None),
                };
                samplers.push(json!({
                    "input": input,
                    "output": output,
                    "interpolation": channel.interpolation.as_str(),
                }));
                channels.push(json!({
                    "sampler": samplers.len() - 1,
                    "target": {
                        "node": joint_node(channel.joint),
                        "path": channel.path.as_str(),
                    },
                }));
            }
            json!({ "name": clip.name, "samplers": samplers, "channels": channels })
        })
        .collect()
}

/// Build the glTF document and its binary chunk.
fn build_document(scene: &SceneModel) -> (Value, Vec<u8>) {
    let mut builder = BinBuilder::default();
    let mesh = mesh_json(scene, &mut builder);

    let mut mesh_node = json!({ "name": scene.name, "mesh": 0 });
    let mut nodes = Vec::new();
    let mut scene_nodes = vec![0];
    let mut skins = Vec::new();

    if let Some(skeleton) = scene.skeleton.as_ref().filter(|s| !s.is_empty()) {
        let inverse_binds = builder.matrices(skeleton);
        let roots = skeleton.roots();
        let mut skin = json!({
            "inverseBindMatrices": inverse_binds,
            "joints": (0..skeleton.len()).map(joint_node).collect::<Vec<_>>(),
        });
        if let Some(root) = roots.first() {
            skin["skeleton"] = json!(joint_node(*root));
        }
        skins.push(skin);
        mesh_node["skin"] = json!(0);
        scene_nodes.extend(roots.iter().map(|root| joint_node(*root)));
        nodes.push(mesh_node);

        for (index, joint) in skeleton.joints.iter().enumerate() {
            let mut node = json!({
                "name": joint.name,
                "translation": [
                    joint.rest_translation.x,
                    joint.rest_translation.y,
                    joint.rest_translation.z,
                ],
            });
            let children = skeleton.children(index);
            if !children.is_empty() {
                node["children"] = json!(children.into_iter().map(joint_node).collect::<Vec<_>>());
            }
            nodes.push(node);
        }
    } else {
        nodes.push(mesh_node);
    }

    let animations = animation_json(scene, &mut builder);

    let images: Vec<Value> = scene
        .images
        .iter()
        .map(|image| {
            let view = builder.push_view(&image.bytes, None);
            json!({ "bufferView": view, "mimeType": image.mime_type })
        })
        .collect();
    let textures: Vec<Value> = (0..images.len())
        .map(|index| json!({ "sampler": 0, "source": index }))
        .collect();
    builder.pad();

    let mut root = Map::new();
    root.insert(
        "asset".into(),
        json!({ "version": "2.0", "generator": GENERATOR }),
    );
    root.insert("scene".into(), json!(0));
    root.insert(
        "scenes".into(),
        json!([{ "name": scene.name, "nodes": scene_nodes }]),
    );
    root.insert("nodes".into(), Value::Array(nodes));
    root.insert("meshes".into(), json!([mesh]));
    insert_nonempty(&mut root, "materials", material_json(scene));
    if !images.is_empty() {
        root.insert(
            "samplers".into(),
            json!([{
                "magFilter": LINEAR,
                "minFilter": LINEAR_MIPMAP_LINEAR,
                "wrapS": REPEAT,
                "wrapT": REPEAT,
            }]),
        );
    }
    insert_nonempty(&mut root, "textures", textures);
    insert_nonempty(&mut root, "images", images);
    insert_nonempty(&mut root, "skins", skins);
    insert_nonempty(&mut root, "animations", animations);

    let BinBuilder {
        bin,
        views,
        accessors,
    } = builder;
    root.insert("accessors".into(), Value::Array(accessors));
    root.insert("bufferViews".into(), Value::Array(views));
    root.insert("buffers".into(), json!([{ "byteLength": bin.len() }]));

    (Value::Object(root), bin)
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(4) * 4
}

/// Encode a scene as a GLB byte vector.
///
/// # Arguments
///
/// * `scene` - Assembled scene; primitives without indices are skipped.
///
/// # Returns
///
/// The complete container, ready to be written to disk.
pub fn encode_glb(scene: &SceneModel) -> Result<Vec<u8>, ExtractError> {
    let (document, bin) = build_document(scene);
    let json_bytes = serde_json::to_vec(&document)?;

    let length = 12 + 8 + padded_len(json_bytes.len()) + 8 + padded_len(bin.len());
    let glb = Glb {
        header: Header {
            magic: *b"glTF",
            version: 2,
            length: length as u32,
        },
        json: Cow::Owned(json_bytes),
        bin: Some(Cow::Owned(bin)),
    };

    let mut out = Vec::with_capacity(length);
    glb.to_writer(&mut out)
        .map_err(|err| ExtractError::Gltf(err.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        scene::{
            Channel, ChannelPath, EmbeddedImage, Interpolation, Material, Primitive,
            VertexStreams,
            animation::AnimationClip,
            skeleton::{build_skeleton, rest_bone},
        },
    };

    fn triangle_scene() -> SceneModel {
        SceneModel {
            name: "triangle".to_string(),
            vertices: VertexStreams {
                positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 2.0, -1.0]],
                normals: vec![[0.0, 0.0, 1.0]; 3],
                uvs: vec![[0.0, 0.0]; 3],
                joints: None,
                weights: None,
            },
            index_width: IndexWidth::U16,
            primitives: vec![Primitive {
                name: "body".to_string(),
                indices: vec![0, 1, 2],
                material: 0,
            }],
            materials: vec![Material::flat("body", [0.5, 0.5, 0.5, 1.0], 0.8)],
            images: Vec::new(),
            skeleton: None,
            animations: Vec::new(),
        }
    }

    fn document_of(bytes: &[u8]) -> Value {
        let glb = Glb::from_slice(bytes).expect("glb");
        serde_json::from_slice(&glb.json).expect("json")
    }

    #[test]
    fn given_static_scene_when_encoding_then_gltf_reader_loads_positions() {
        let bytes = encode_glb(&triangle_scene()).expect("encode");

        let (document, buffers, _) = gltf::import_slice(&bytes).expect("import");
        let mesh = document.meshes().next().expect("mesh");
        let primitive = mesh.primitives().next().expect("primitive");
        let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));
        let positions: Vec<[f32; 3]> = reader.read_positions().expect("positions").collect();
        let indices: Vec<u32> = reader
            .read_indices()
            .expect("indices")
            .into_u32()
            .collect();

        assert_eq!(positions[2], [0.0, 2.0, -1.0]);
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(document.skins().next().is_none());
    }

    #[test]
    fn given_scene_when_encoding_then_position_and_index_bounds_are_present() {
        let json = document_of(&encode_glb(&triangle_scene()).expect("encode"));

        let position = json["meshes"][0]["primitives"][0]["attributes"]["POSITION"]
            .as_u64()
            .expect("position") as usize;
        assert_eq!(json["accessors"][position]["min"], json!([0.0, 0.0, -1.0]));
        assert_eq!(json["accessors"][position]["max"], json!([1.0, 2.0, 0.0]));
        let indices = json["meshes"][0]["primitives"][0]["indices"]
            .as_u64()
            .expect("indices") as usize;
        assert_eq!(json["accessors"][indices]["componentType"], UNSIGNED_SHORT);
        assert_eq!(json["accessors"][indices]["max"], json!([2]));
        assert!(json.get("skins").is_none());
        assert!(json.get("samplers").is_none());
    }

    #[test]
    fn given_wide_index_scene_when_encoding_then_indices_are_u32() {
        let mut scene = triangle_scene();
        scene.index_width = IndexWidth::U32;

        let json = document_of(&encode_glb(&scene).expect("encode"));

        assert_eq!(json["accessors"][3]["componentType"], UNSIGNED_INT);
    }

    #[test]
    fn given_textured_mask_material_when_encoding_then_sampler_and_image_are_linked() {
        let mut scene = triangle_scene();
        scene.images.push(EmbeddedImage {
            bytes: vec![0x89, b'P', b'N', b'G', 1],
            mime_type: "image/png",
        });
        let mut material = Material::textured("leaf", 0, 0.8);
        material.alpha_cutoff = Some(0.5);
        scene.materials = vec![material];

        let json = document_of(&encode_glb(&scene).expect("encode"));

        assert_eq!(json["materials"][0]["alphaMode"], "MASK");
        assert_eq!(json["materials"][0]["alphaCutoff"], 0.5);
        assert_eq!(
            json["materials"][0]["pbrMetallicRoughness"]["baseColorTexture"]["index"],
            0
        );
        assert_eq!(json["samplers"][0]["minFilter"], LINEAR_MIPMAP_LINEAR);
        assert_eq!(json["samplers"][0]["wrapS"], REPEAT);
        assert_eq!(json["textures"][0]["source"], 0);
        assert_eq!(json["images"][0]["mimeType"], "image/png");
    }

    #[test]
    fn given_skinned_animated_scene_when_encoding_then_skin_and_channels_target_joint_nodes() {
        let mut scene = triangle_scene();
        scene.vertices.joints = Some(vec![[0, 0, 0, 0], [1, 0, 0, 0], [1, 0, 0, 0]]);
        scene.vertices.weights = Some(vec![[1.0, 0.0, 0.0, 0.0]; 3]);
        scene.skeleton = Some(build_skeleton(&[
            rest_bone(None, [10.0, 20.0, 30.0]),
            rest_bone(Some(0), [10.0, 20.0, 35.0]),
        ]));
        scene.animations = vec![AnimationClip {
            name: "Stand".to_string(),
            sequence_id: 0,
            duration: 1.0,
            channels: vec![Channel {
                joint: 1,
                path: ChannelPath::Rotation,
                interpolation: Interpolation::Linear,
                times: vec![0.0, 1.0],
                values: ChannelValues::Vec4(vec![[0.0, 0.0, 0.0, 1.0]; 2]),
            }],
        }];

        let bytes = encode_glb(&scene).expect("encode");
        let (document, _, _) = gltf::import_slice(&bytes).expect("import");
        let json = document_of(&bytes);

        let skin = document.skins().next().expect("skin");
        let joints: Vec<usize> = skin.joints().map(|node| node.index()).collect();
        assert_eq!(joints, vec![1, 2]);
        assert_eq!(json["nodes"][1]["translation"], json!([10.0, 30.0, -20.0]));
        assert_eq!(json["nodes"][1]["children"], json!([2]));
        let animation = document.animations().next().expect("animation");
        let channel = animation.channels().next().expect("channel");
        assert_eq!(channel.target().node().index(), 2);
        assert_eq!(json["animations"][0]["samplers"][0]["interpolation"], "LINEAR");
    }
}
