//! `.skin` partition files: vertex remap, triangle list, submeshes, batches.

use std::collections::HashMap;

use crate::{
    binary::{self, ArrayRef},
    error::DecodeError,
};

pub const SKIN_MAGIC: &[u8; 4] = b"SKIN";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct M2Submesh {
    pub id: u16,
    pub level: u16,
    pub vertex_start: u16,
    pub vertex_count: u16,
    pub index_start: u16,
    pub index_count: u16,
    pub bone_count: u16,
    pub bone_combo_index: u16,
    pub bone_influences: u16,
    pub center_bone_index: u16,
    pub center_position: [f32; 3],
}

impl M2Submesh {
    pub const SIZE: usize = 48;

    fn parse(record: &[u8]) -> Result<Self, DecodeError> {
        const CTX: &str = "skin submesh";
        let field = |index: usize| binary::read_u16(record, index * 2, CTX);
        Ok(Self {
            id: field(0)?,
            level: field(1)?,
            vertex_start: field(2)?,
            vertex_count: field(3)?,
            index_start: field(4)?,
            index_count: field(5)?,
            bone_count: field(6)?,
            bone_combo_index: field(7)?,
            bone_influences: field(8)?,
            center_bone_index: field(9)?,
            center_position: binary::read_vec3(record, 20, CTX)?,
        })
    }

    /// Geosets 1..=99 are hairstyles.
    pub fn is_hair(&self) -> bool {
        (1..=99).contains(&self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct M2Batch {
    pub flags: u8,
    pub priority_plane: i8,
    pub shader_id: u16,
    pub submesh_index: u16,
    pub geoset_index: u16,
    pub color_index: u16,
    pub material_index: u16,
    pub material_layer: u16,
    pub texture_count: u16,
    pub texture_combo_index: u16,
}

impl M2Batch {
    pub const SIZE: usize = 24;

    fn parse(record: &[u8]) -> Result<Self, DecodeError> {
        const CTX: &str = "skin batch";
        let field = |offset: usize| binary::read_u16(record, offset, CTX);
        Ok(Self {
            flags: binary::read_u8(record, 0, CTX)?,
            priority_plane: binary::read_i8(record, 1, CTX)?,
            shader_id: field(2)?,
            submesh_index: field(4)?,
            geoset_index: field(6)?,
            color_index: field(8)?,
            material_index: field(10)?,
            material_layer: field(12)?,
            texture_count: field(14)?,
            texture_combo_index: field(16)?,
        })
    }
}

/// Decoded skin partition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct M2Skin {
    /// Local vertex index -> global model vertex index.
    pub vertex_lookup: Vec<u16>,
    /// Triangle list of local vertex indices.
    pub indices: Vec<u16>,
    pub submeshes: Vec<M2Submesh>,
    pub batches: Vec<M2Batch>,
}

impl M2Skin {
    pub fn parse(buf: &[u8]) -> Result<Self, DecodeError> {
        binary::expect_magic(buf, 0, SKIN_MAGIC, "skin header")?;
        let vertex_lookup = ArrayRef::read(buf, 0x04, "skin header")?;
        let indices = ArrayRef::read(buf, 0x0C, "skin header")?;
        let submeshes = ArrayRef::read(buf, 0x1C, "skin header")?;
        let batches = ArrayRef::read(buf, 0x24, "skin header")?;

        Ok(Self {
            vertex_lookup: vertex_lookup.read_u16s(buf, "skin vertex lookup")?,
            indices: indices.read_u16s(buf, "skin indices")?,
            submeshes: submeshes.decode(buf, M2Submesh::SIZE, "skin submeshes", M2Submesh::parse)?,
            batches: batches.decode(buf, M2Batch::SIZE, "skin batches", M2Batch::parse)?,
        })
    }

    /// Resolve submesh index -> texture index through the combo table.
    ///
    /// Batches whose combo index is outside the table map to `None`. When
    /// several batches target one submesh the last one wins.
    pub fn submesh_textures(&self, texture_combos: &[u16]) -> HashMap<usize, Option<u16>> {
        self.batches
            .iter()
            .map(|batch| {
                let texture = texture_combos
                    .get(batch.texture_combo_index as usize)
                    .copied();
                (batch.submesh_index as usize, texture)
            })
            .collect()
    }

    /// Global vertex indices of one submesh's triangles, in triangle order.
    pub fn submesh_global_indices(&self, submesh: &M2Submesh) -> Result<Vec<u32>, DecodeError> {
        let start = submesh.index_start as usize;
        let count = submesh.index_count as usize;
        let Some(local) = self.indices.get(start..start + count) else {
            return Err(DecodeError::RangeViolation {
                context: "skin submesh indices",
                offset: start,
                length: count,
                buffer_len: self.indices.len(),
            });
        };

        local
            .iter()
            .map(|local_index| {
                self.vertex_lookup
                    .get(*local_index as usize)
                    .map(|global| *global as u32)
                    .ok_or(DecodeError::RangeViolation {
                        context: "skin vertex lookup",
                        offset: *local_index as usize,
                        length: 1,
                        buffer_len: self.vertex_lookup.len(),
                    })
            })
            .collect()
    }
}
