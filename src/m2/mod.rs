//! M2 model decoding (version 264 layout).

pub mod animation;
pub mod bone;
pub mod skin;
pub mod texture;
pub mod vertex;

use crate::{
    binary::{self, ArrayRef},
    error::DecodeError,
};

pub use animation::{AnimationSources, M2Sequence};
pub use bone::{AnimationTrack, M2Bone, decompress_quaternion};
pub use skin::{M2Batch, M2Skin, M2Submesh};
pub use texture::{M2Texture, TextureSlot};
pub use vertex::M2Vertex;

pub const M2_MAGIC: &[u8; 4] = b"MD20";

const HEADER_SIZE: usize = 0x88;

/// Convert a source-space vector (Z up) into the output space (Y up).
pub fn convert_axis(v: [f32; 3]) -> [f32; 3] {
    [v[0], v[2], -v[1]]
}

/// Array descriptors read from the fixed model header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct M2Header {
    pub version: u32,
    pub name: ArrayRef,
    pub global_loops: ArrayRef,
    pub sequences: ArrayRef,
    pub sequence_lookup: ArrayRef,
    pub bones: ArrayRef,
    pub key_bone_lookup: ArrayRef,
    pub vertices: ArrayRef,
    pub skin_profile_count: u32,
    pub textures: ArrayRef,
    pub texture_combos: ArrayRef,
}

impl M2Header {
    pub fn parse(buf: &[u8]) -> Result<Self, DecodeError> {
        binary::expect_magic(buf, 0, M2_MAGIC, "m2 header")?;
        binary::slice(buf, 0, HEADER_SIZE, "m2 header")?;
        Ok(Self {
            version: binary::read_u32(buf, 0x04, "m2 header")?,
            name: ArrayRef::read(buf, 0x08, "m2 header")?,
            global_loops: ArrayRef::read(buf, 0x14, "m2 header")?,
            sequences: ArrayRef::read(buf, 0x1C, "m2 header")?,
            sequence_lookup: ArrayRef::read(buf, 0x24, "m2 header")?,
            bones: ArrayRef::read(buf, 0x2C, "m2 header")?,
            key_bone_lookup: ArrayRef::read(buf, 0x34, "m2 header")?,
            vertices: ArrayRef::read(buf, 0x3C, "m2 header")?,
            skin_profile_count: binary::read_u32(buf, 0x44, "m2 header")?,
            textures: ArrayRef::read(buf, 0x50, "m2 header")?,
            texture_combos: ArrayRef::read(buf, 0x80, "m2 header")?,
        })
    }
}

/// A validated model buffer with typed accessors for each record array.
#[derive(Debug, Clone)]
pub struct M2File<'a> {
    buf: &'a [u8],
    pub header: M2Header,
}

impl<'a> M2File<'a> {
    pub fn parse(buf: &'a [u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            buf,
            header: M2Header::parse(buf)?,
        })
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.buf
    }

    /// Embedded model name, empty when absent.
    pub fn name(&self) -> Result<String, DecodeError> {
        let raw = self.header.name.bytes(self.buf, 1, "m2 name")?;
        Ok(binary::trimmed_string(raw))
    }

    pub fn vertices(&self) -> Result<Vec<M2Vertex>, DecodeError> {
        self.header
            .vertices
            .decode(self.buf, M2Vertex::SIZE, "m2 vertices", M2Vertex::parse)
    }

    pub fn textures(&self) -> Result<Vec<M2Texture>, DecodeError> {
        texture::parse_textures(self.buf, self.header.textures)
    }

    pub fn texture_combos(&self) -> Result<Vec<u16>, DecodeError> {
        self.header
            .texture_combos
            .read_u16s(self.buf, "m2 texture combos")
    }

    pub fn global_loops(&self) -> Result<Vec<u32>, DecodeError> {
        self.header.global_loops.read_u32s(self.buf, "m2 global loops")
    }

    pub fn sequences(&self) -> Result<Vec<M2Sequence>, DecodeError> {
        self.header
            .sequences
            .decode(self.buf, M2Sequence::SIZE, "m2 sequences", M2Sequence::parse)
    }

    /// Decode bones with their tracks. `sources` supplies the buffer holding
    /// each sequence's keyframes.
    pub fn bones(&self, sources: &AnimationSources<'_>) -> Result<Vec<M2Bone>, DecodeError> {
        bone::parse_bones(self.buf, self.header.bones, sources)
    }
}
