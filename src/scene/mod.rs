//! Format-independent scene model produced by reconstruction and consumed
//! by the container writer.

pub mod animation;
pub mod building;
pub mod mesh;
pub mod model;
pub mod skeleton;
pub mod skinning;

pub use animation::{AnimationClip, Channel, ChannelPath, ChannelValues, Interpolation};
pub use skeleton::{Joint, Skeleton};

/// Width of every index buffer of a model, decided once from its vertex count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexWidth {
    U16,
    U32,
}

impl IndexWidth {
    pub fn for_vertex_count(count: usize) -> Self {
        if count <= u16::MAX as usize {
            IndexWidth::U16
        } else {
            IndexWidth::U32
        }
    }
}

/// Per-vertex attribute streams in output space. Optional streams are either
/// absent or exactly as long as `positions`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexStreams {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub joints: Option<Vec<[u16; 4]>>,
    pub weights: Option<Vec<[f32; 4]>>,
}

impl VertexStreams {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Component-wise `(min, max)` of the positions.
    pub fn bounds(&self) -> Option<([f32; 3], [f32; 3])> {
        let first = *self.positions.first()?;
        Some(self.positions.iter().fold((first, first), |(lo, hi), p| {
            (
                [lo[0].min(p[0]), lo[1].min(p[1]), lo[2].min(p[2])],
                [hi[0].max(p[0]), hi[1].max(p[1]), hi[2].max(p[2])],
            )
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedImage {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub base_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    /// Index into [`SceneModel::images`].
    pub image: Option<usize>,
    /// Alpha cutoff when the material is rendered as a mask.
    pub alpha_cutoff: Option<f32>,
    pub double_sided: bool,
}

impl Material {
    pub fn flat(name: impl Into<String>, base_color: [f32; 4], roughness: f32) -> Self {
        Self {
            name: name.into(),
            base_color,
            metallic: 0.0,
            roughness,
            image: None,
            alpha_cutoff: None,
            double_sided: true,
        }
    }

    pub fn textured(name: impl Into<String>, image: usize, roughness: f32) -> Self {
        Self {
            image: Some(image),
            ..Self::flat(name, [1.0, 1.0, 1.0, 1.0], roughness)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Primitive {
    pub name: String,
    pub indices: Vec<u32>,
    /// Index into [`SceneModel::materials`].
    pub material: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneModel {
    pub name: String,
    pub vertices: VertexStreams,
    pub index_width: IndexWidth,
    pub primitives: Vec<Primitive>,
    pub materials: Vec<Material>,
    pub images: Vec<EmbeddedImage>,
    pub skeleton: Option<Skeleton>,
    pub animations: Vec<AnimationClip>,
}

impl SceneModel {
    pub fn triangle_count(&self) -> usize {
        self.primitives.iter().map(|p| p.indices.len() / 3).sum()
    }
}
