//! WMO (world map object) root and group decoding, version 17.

use log::debug;

use crate::{
    binary,
    chunk::{FourCC, RawChunk, find_chunk, scan_chunks},
    error::DecodeError,
};

const MOHD: FourCC = FourCC::new(b"MOHD");
const MOTX: FourCC = FourCC::new(b"MOTX");
const MOMT: FourCC = FourCC::new(b"MOMT");
const MOGI: FourCC = FourCC::new(b"MOGI");
const MOGP: FourCC = FourCC::new(b"MOGP");
const MOVT: FourCC = FourCC::new(b"MOVT");
const MONR: FourCC = FourCC::new(b"MONR");
const MOTV: FourCC = FourCC::new(b"MOTV");
const MOVI: FourCC = FourCC::new(b"MOVI");
const MOPY: FourCC = FourCC::new(b"MOPY");

/// Size of the fixed group header preceding the group sub-chunks.
pub const GROUP_HEADER_SIZE: usize = 68;

/// Triangle flag marking geometry that does not collide.
pub const TRIANGLE_NO_COLLIDE: u8 = 0x04;

/// Material id of triangles that are never rendered.
pub const INVISIBLE_MATERIAL: u8 = 0xFF;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WmoHeader {
    pub texture_count: u32,
    pub group_count: u32,
    pub portal_count: u32,
    pub light_count: u32,
    pub model_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WmoMaterial {
    pub flags: u32,
    pub shader: u32,
    pub blend_mode: u32,
    pub texture1_offset: u32,
    pub texture2_offset: u32,
    /// Texture path resolved from the name block, empty when unresolved.
    pub texture_path: String,
}

impl WmoMaterial {
    pub const SIZE: usize = 64;
}

#[derive(Debug, Clone, PartialEq)]
pub struct WmoGroupInfo {
    pub flags: u32,
    pub bounds_min: [f32; 3],
    pub bounds_max: [f32; 3],
    pub name_offset: i32,
}

impl WmoGroupInfo {
    pub const SIZE: usize = 32;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WmoRoot {
    pub header: WmoHeader,
    pub textures: Vec<String>,
    pub materials: Vec<WmoMaterial>,
    pub groups: Vec<WmoGroupInfo>,
}

fn records<'a>(chunk: &RawChunk<'a>, size: usize) -> impl Iterator<Item = &'a [u8]> {
    chunk.payload.chunks_exact(size)
}

impl WmoRoot {
    /// Decode the root file. Unknown chunks are ignored; a short `MOHD`
    /// leaves the counts at zero.
    pub fn parse(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut root = WmoRoot::default();
        let mut names: &[u8] = &[];

        for chunk in scan_chunks(buf, 0) {
            match chunk.tag {
                MOHD => {
                    if chunk.payload.len() >= 64 {
                        let p = chunk.payload;
                        root.header = WmoHeader {
                            texture_count: binary::read_u32(p, 0, "wmo header")?,
                            group_count: binary::read_u32(p, 4, "wmo header")?,
                            portal_count: binary::read_u32(p, 8, "wmo header")?,
                            light_count: binary::read_u32(p, 12, "wmo header")?,
                            model_count: binary::read_u32(p, 16, "wmo header")?,
                        };
                    }
                }
                MOTX => names = chunk.payload,
                MOMT => {
                    for record in records(&chunk, WmoMaterial::SIZE) {
                        root.materials.push(WmoMaterial {
                            flags: binary::read_u32(record, 0, "wmo material")?,
                            shader: binary::read_u32(record, 4, "wmo material")?,
                            blend_mode: binary::read_u32(record, 8, "wmo material")?,
                            texture1_offset: binary::read_u32(record, 12, "wmo material")?,
                            texture2_offset: binary::read_u32(record, 24, "wmo material")?,
                            texture_path: String::new(),
                        });
                    }
                }
                MOGI => {
                    for record in records(&chunk, WmoGroupInfo::SIZE) {
                        root.groups.push(WmoGroupInfo {
                            flags: binary::read_u32(record, 0, "wmo group info")?,
                            bounds_min: binary::read_vec3(record, 4, "wmo group info")?,
                            bounds_max: binary::read_vec3(record, 16, "wmo group info")?,
                            name_offset: binary::read_i32(record, 28, "wmo group info")?,
                        });
                    }
                }
                _ => {}
            }
        }

        root.textures = binary::split_names(names)
            .into_iter()
            .map(|(_, name)| name)
            .collect();
        for material in &mut root.materials {
            material.texture_path =
                binary::cstring_at(names, material.texture1_offset as usize).unwrap_or_default();
        }
        Ok(root)
    }

    /// Virtual path of group `index` for a root at `root_path`.
    pub fn group_path(root_path: &str, index: usize) -> String {
        let base = root_path
            .len()
            .checked_sub(4)
            .filter(|cut| {
                root_path
                    .get(*cut..)
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(".wmo"))
            })
            .map_or(root_path, |cut| &root_path[..cut]);
        format!("{base}_{index:03}.wmo")
    }
}

/// Per-triangle `MOPY` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriangleInfo {
    pub flags: u8,
    pub material: u8,
}

impl TriangleInfo {
    pub fn is_rendered(&self) -> bool {
        self.material != INVISIBLE_MATERIAL
    }

    pub fn collides(&self) -> bool {
        self.flags & TRIANGLE_NO_COLLIDE == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WmoGroup {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub triangles: Vec<[u16; 3]>,
    pub triangle_info: Vec<TriangleInfo>,
}

impl WmoGroup {
    /// Decode a group file. A file without `MOGP` yields an empty group.
    pub fn parse(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut group = WmoGroup::default();
        let Some(mogp) = find_chunk(buf, 0, MOGP) else {
            debug!("wmo group without MOGP chunk");
            return Ok(group);
        };

        let mut uvs_seen = false;
        for chunk in scan_chunks(buf, mogp.data_offset() + GROUP_HEADER_SIZE) {
            let p = chunk.payload;
            match chunk.tag {
                MOVT => group.positions = read_vec3s(p)?,
                MONR => group.normals = read_vec3s(p)?,
                MOTV if !uvs_seen => {
                    uvs_seen = true;
                    group.uvs = p
                        .chunks_exact(8)
                        .map(|uv| {
                            Ok([
                                binary::read_f32(uv, 0, "wmo uvs")?,
                                binary::read_f32(uv, 4, "wmo uvs")?,
                            ])
                        })
                        .collect::<Result<_, DecodeError>>()?;
                }
                MOVI => {
                    group.triangles = p
                        .chunks_exact(6)
                        .map(|tri| {
                            Ok([
                                binary::read_u16(tri, 0, "wmo indices")?,
                                binary::read_u16(tri, 2, "wmo indices")?,
                                binary::read_u16(tri, 4, "wmo indices")?,
                            ])
                        })
                        .collect::<Result<_, DecodeError>>()?;
                }
                MOPY => {
                    group.triangle_info = p
                        .chunks_exact(2)
                        .map(|info| TriangleInfo {
                            flags: info[0],
                            material: info[1],
                        })
                        .collect();
                }
                _ => {}
            }
        }
        Ok(group)
    }

    pub fn has_geometry(&self) -> bool {
        !self.positions.is_empty() && !self.triangles.is_empty()
    }

    /// Triangle info for `triangle`, defaulting to material 0 with no flags.
    pub fn info(&self, triangle: usize) -> TriangleInfo {
        self.triangle_info
            .get(triangle)
            .copied()
            .unwrap_or(TriangleInfo {
                flags: 0,
                material: 0,
            })
    }
}

fn read_vec3s(payload: &[u8]) -> Result<Vec<[f32; 3]>, DecodeError> {
    payload
        .chunks_exact(12)
        .map(|v| binary::read_vec3(v, 0, "wmo vectors"))
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::chunk::encode_chunk;

    /// Group file bytes with the given geometry and `(flags, material)` per triangle.
    pub fn group_bytes(positions: &[[f32; 3]], triangles: &[[u16; 3]], info: &[(u8, u8)]) -> Vec<u8> {
        let mut inner = vec![0u8; super::GROUP_HEADER_SIZE];
        let floats: Vec<u8> = positions
            .iter()
            .flatten()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        inner.extend(encode_chunk(b"MOVT", &floats));
        let indices: Vec<u8> = triangles
            .iter()
            .flatten()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        inner.extend(encode_chunk(b"MOVI", &indices));
        let mopy: Vec<u8> = info.iter().flat_map(|(f, m)| [*f, *m]).collect();
        inner.extend(encode_chunk(b"MOPY", &mopy));

        let mut out = encode_chunk(b"MVER", &17u32.to_le_bytes());
        out.extend(encode_chunk(b"MOGP", &inner));
        out
    }

    /// Root file bytes declaring `groups` groups and one material per texture.
    pub fn root_bytes(groups: u32, textures: &[&str]) -> Vec<u8> {
        let mut mohd = vec![0u8; 64];
        mohd[0..4].copy_from_slice(&(textures.len() as u32).to_le_bytes());
        mohd[4..8].copy_from_slice(&groups.to_le_bytes());

        let mut motx = Vec::new();
        let mut momt = Vec::new();
        for texture in textures {
            let mut material = vec![0u8; 64];
            material[12..16].copy_from_slice(&(motx.len() as u32).to_le_bytes());
            momt.extend(material);
            motx.extend_from_slice(texture.as_bytes());
            motx.push(0);
        }

        let mut out = encode_chunk(b"MVER", &17u32.to_le_bytes());
        out.extend(encode_chunk(b"MOHD", &mohd));
        out.extend(encode_chunk(b"MOTX", &motx));
        out.extend(encode_chunk(b"MOMT", &momt));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::chunk::encode_chunk;

    #[test]
    fn given_root_with_materials_when_parsing_then_texture_paths_are_resolved() {
        let bytes = root_bytes(3, &["Wall.blp", "Roof.blp"]);

        let root = WmoRoot::parse(&bytes).expect("root");

        assert_eq!(root.header.group_count, 3);
        assert_eq!(root.materials.len(), 2);
        assert_eq!(root.materials[1].texture_path, "Roof.blp");
        assert_eq!(root.textures, vec!["Wall.blp", "Roof.blp"]);
    }

    #[test]
    fn given_short_header_when_parsing_root_then_counts_stay_zero() {
        let bytes = encode_chunk(b"MOHD", &[1, 0, 0, 0]);

        let root = WmoRoot::parse(&bytes).expect("root");

        assert_eq!(root.header, WmoHeader::default());
    }

    #[test]
    fn given_group_file_when_parsing_then_sub_chunks_after_header_are_read() {
        let bytes = group_bytes(
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            &[[0, 1, 2]],
            &[(0x04, 2)],
        );

        let group = WmoGroup::parse(&bytes).expect("group");

        assert_eq!(group.positions.len(), 3);
        assert_eq!(group.triangles, vec![[0, 1, 2]]);
        assert!(!group.info(0).collides());
        assert_eq!(group.info(0).material, 2);
    }

    #[test]
    fn given_two_uv_sets_when_parsing_group_then_first_one_wins() {
        let mut inner = vec![0u8; GROUP_HEADER_SIZE];
        inner.extend(encode_chunk(b"MOTV", &[0, 0, 128, 63, 0, 0, 0, 0]));
        inner.extend(encode_chunk(b"MOTV", &[0, 0, 0, 64, 0, 0, 0, 0]));
        let bytes = encode_chunk(b"MOGP", &inner);

        let group = WmoGroup::parse(&bytes).expect("group");

        assert_eq!(group.uvs, vec![[1.0, 0.0]]);
    }

    #[test]
    fn given_root_path_when_building_group_path_then_index_is_zero_padded() {
        assert_eq!(
            WmoRoot::group_path("World\\wmo\\Abbey.wmo", 7),
            "World\\wmo\\Abbey_007.wmo"
        );
    }
}
