//! ADT tile decoding: texture names, terrain cells and placement records.

use log::debug;

use crate::{
    binary,
    chunk::{FourCC, RawChunk, scan_chunks},
    error::DecodeError,
};

const MTEX: FourCC = FourCC::new(b"MTEX");
const MCNK: FourCC = FourCC::new(b"MCNK");
const MMDX: FourCC = FourCC::new(b"MMDX");
const MMID: FourCC = FourCC::new(b"MMID");
const MDDF: FourCC = FourCC::new(b"MDDF");
const MWMO: FourCC = FourCC::new(b"MWMO");
const MWID: FourCC = FourCC::new(b"MWID");
const MODF: FourCC = FourCC::new(b"MODF");
const MCVT: FourCC = FourCC::new(b"MCVT");
const MCLY: FourCC = FourCC::new(b"MCLY");
const MCAL: FourCC = FourCC::new(b"MCAL");

const CELL_HEADER_SIZE: usize = 128;
const HEIGHT_COUNT: usize = 145;
const MAX_LAYERS: usize = 4;

/// Outer heights per cell (9×9).
pub const OUTER_HEIGHTS: usize = 81;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureLayer {
    pub texture_id: u32,
    pub flags: u32,
    pub alpha_offset: u32,
    pub effect_id: i32,
}

impl TextureLayer {
    pub const SIZE: usize = 16;
}

/// One of the 16×16 cells of a tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainCell {
    pub flags: u32,
    pub index_x: u32,
    pub index_y: u32,
    pub layer_count: u32,
    pub area_id: u32,
    pub position: [f32; 3],
    /// Row-major 9×9 outer heights relative to `position`.
    pub outer_heights: Option<Vec<f32>>,
    pub layers: Vec<TextureLayer>,
    pub alpha: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DoodadPlacement {
    pub name_id: u32,
    pub unique_id: u32,
    pub position: [f32; 3],
    /// Degrees.
    pub rotation: [f32; 3],
    /// Fixed point, 1024 = 1.0.
    pub scale: u16,
    pub flags: u16,
    pub model: String,
}

impl DoodadPlacement {
    pub const SIZE: usize = 36;
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildingPlacement {
    pub name_id: u32,
    pub unique_id: u32,
    pub position: [f32; 3],
    pub rotation: [f32; 3],
    pub extents_min: [f32; 3],
    pub extents_max: [f32; 3],
    pub flags: u16,
    pub doodad_set: u16,
    pub name_set: u16,
    pub scale: u16,
    pub model: String,
}

impl BuildingPlacement {
    pub const SIZE: usize = 64;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdtTile {
    pub textures: Vec<String>,
    pub cells: Vec<TerrainCell>,
    pub doodads: Vec<DoodadPlacement>,
    pub buildings: Vec<BuildingPlacement>,
}

impl AdtTile {
    /// Decode an ADT tile. Cells with a short header are skipped and
    /// optional cell sub-chunks that fail to resolve are left absent.
    pub fn parse(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut tile = AdtTile::default();
        let mut model_names: &[u8] = &[];
        let mut model_ids = Vec::new();
        let mut building_names: &[u8] = &[];
        let mut building_ids = Vec::new();

        for chunk in scan_chunks(buf, 0) {
            match chunk.tag {
                MTEX => {
                    tile.textures = binary::split_names(chunk.payload)
                        .into_iter()
                        .map(|(_, name)| name)
                        .collect();
                }
                MCNK => match parse_cell(buf, &chunk)? {
                    Some(cell) => tile.cells.push(cell),
                    None => debug!("skipping short MCNK at {}", chunk.offset),
                },
                MMDX => model_names = chunk.payload,
                MMID => model_ids = read_offsets(chunk.payload)?,
                MDDF => {
                    for record in chunk.payload.chunks_exact(DoodadPlacement::SIZE) {
                        tile.doodads.push(DoodadPlacement {
                            name_id: binary::read_u32(record, 0, "doodad placement")?,
                            unique_id: binary::read_u32(record, 4, "doodad placement")?,
                            position: binary::read_vec3(record, 8, "doodad placement")?,
                            rotation: binary::read_vec3(record, 20, "doodad placement")?,
                            scale: binary::read_u16(record, 32, "doodad placement")?,
                            flags: binary::read_u16(record, 34, "doodad placement")?,
                            model: String::new(),
                        });
                    }
                }
                MWMO => building_names = chunk.payload,
                MWID => building_ids = read_offsets(chunk.payload)?,
                MODF => {
                    for record in chunk.payload.chunks_exact(BuildingPlacement::SIZE) {
                        let ctx = "building placement";
                        tile.buildings.push(BuildingPlacement {
                            name_id: binary::read_u32(record, 0, ctx)?,
                            unique_id: binary::read_u32(record, 4, ctx)?,
                            position: binary::read_vec3(record, 8, ctx)?,
                            rotation: binary::read_vec3(record, 20, ctx)?,
                            extents_min: binary::read_vec3(record, 32, ctx)?,
                            extents_max: binary::read_vec3(record, 44, ctx)?,
                            flags: binary::read_u16(record, 56, ctx)?,
                            doodad_set: binary::read_u16(record, 58, ctx)?,
                            name_set: binary::read_u16(record, 60, ctx)?,
                            scale: binary::read_u16(record, 62, ctx)?,
                            model: String::new(),
                        });
                    }
                }
                _ => {}
            }
        }

        for doodad in &mut tile.doodads {
            doodad.model = resolve_name(model_names, &model_ids, doodad.name_id);
        }
        for building in &mut tile.buildings {
            building.model = resolve_name(building_names, &building_ids, building.name_id);
        }
        Ok(tile)
    }

    /// Cell at `(index_x, index_y)`, last one wins when duplicated.
    pub fn cell(&self, index_x: u32, index_y: u32) -> Option<&TerrainCell> {
        self.cells
            .iter()
            .rev()
            .find(|cell| cell.index_x == index_x && cell.index_y == index_y)
    }
}

fn read_offsets(payload: &[u8]) -> Result<Vec<u32>, DecodeError> {
    payload
        .chunks_exact(4)
        .map(|offset| binary::read_u32(offset, 0, "name offsets"))
        .collect()
}

/// Resolve `name_id -> offset -> NUL-terminated name`, `"unknown"` when any
/// step is out of range.
fn resolve_name(names: &[u8], offsets: &[u32], name_id: u32) -> String {
    offsets
        .get(name_id as usize)
        .and_then(|offset| binary::cstring_at(names, *offset as usize))
        .filter(|_| !names.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Locate a cell sub-chunk at `offset` from the cell start, checking its tag.
fn sub_chunk(buf: &[u8], cell_start: usize, offset: u32, tag: FourCC) -> Option<RawChunk<'_>> {
    if offset == 0 {
        return None;
    }
    let at = cell_start.checked_add(offset as usize)?;
    scan_chunks(buf, at).next().filter(|chunk| chunk.tag == tag)
}

fn parse_cell(buf: &[u8], chunk: &RawChunk<'_>) -> Result<Option<TerrainCell>, DecodeError> {
    let header = chunk.payload;
    if header.len() < CELL_HEADER_SIZE {
        return Ok(None);
    }
    let ctx = "terrain cell";
    let layer_count = binary::read_u32(header, 0x0C, ctx)?;
    let height_offset = binary::read_u32(header, 0x14, ctx)?;
    let layer_offset = binary::read_u32(header, 0x1C, ctx)?;
    let alpha_offset = binary::read_u32(header, 0x24, ctx)?;
    let alpha_size = binary::read_u32(header, 0x28, ctx)?;

    let outer_heights = sub_chunk(buf, chunk.offset, height_offset, MCVT)
        .filter(|mcvt| mcvt.payload.len() >= HEIGHT_COUNT * 4)
        .map(|mcvt| {
            (0..9)
                .flat_map(|row| (0..9).map(move |col| row * 17 + col))
                .map(|index| binary::read_f32(mcvt.payload, index * 4, "cell heights"))
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?;

    let layers = if layer_count > 0 {
        sub_chunk(buf, chunk.offset, layer_offset, MCLY)
            .map(|mcly| {
                mcly.payload
                    .chunks_exact(TextureLayer::SIZE)
                    .take((layer_count as usize).min(MAX_LAYERS))
                    .map(|layer| {
                        Ok(TextureLayer {
                            texture_id: binary::read_u32(layer, 0, "cell layer")?,
                            flags: binary::read_u32(layer, 4, "cell layer")?,
                            alpha_offset: binary::read_u32(layer, 8, "cell layer")?,
                            effect_id: binary::read_i32(layer, 12, "cell layer")?,
                        })
                    })
                    .collect::<Result<Vec<_>, DecodeError>>()
            })
            .transpose()?
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    let alpha = if alpha_size > 0 {
        sub_chunk(buf, chunk.offset, alpha_offset, MCAL).map(|mcal| mcal.payload.to_vec())
    } else {
        None
    };

    Ok(Some(TerrainCell {
        flags: binary::read_u32(header, 0x00, ctx)?,
        index_x: binary::read_u32(header, 0x04, ctx)?,
        index_y: binary::read_u32(header, 0x08, ctx)?,
        layer_count,
        area_id: binary::read_u32(header, 0x34, ctx)?,
        position: binary::read_vec3(header, 0x68, ctx)?,
        outer_heights,
        layers,
        alpha,
    }))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::chunk::encode_chunk;

    /// Cell builder producing an `MCNK` chunk with embedded sub-chunks.
    #[derive(Debug, Clone, Default)]
    pub struct CellSpec {
        pub index: (u32, u32),
        pub position: [f32; 3],
        /// Height added to every one of the 145 vertices.
        pub height: Option<f32>,
        /// `(texture_id, flags, alpha_offset)`.
        pub layers: Vec<(u32, u32, u32)>,
        pub alpha: Option<Vec<u8>>,
    }

    impl CellSpec {
        pub fn encode(&self) -> Vec<u8> {
            let mut header = vec![0u8; 128];
            let mut body = Vec::new();
            let put = |header: &mut Vec<u8>, at: usize, value: u32| {
                header[at..at + 4].copy_from_slice(&value.to_le_bytes());
            };
            put(&mut header, 0x04, self.index.0);
            put(&mut header, 0x08, self.index.1);
            put(&mut header, 0x0C, self.layers.len() as u32);
            for (axis, value) in self.position.iter().enumerate() {
                header[0x68 + axis * 4..0x6C + axis * 4].copy_from_slice(&value.to_le_bytes());
            }

            // Sub-chunk offsets count from the start of the MCNK preamble.
            let base = 8 + 128;
            if let Some(height) = self.height {
                put(&mut header, 0x14, (base + body.len()) as u32);
                let heights: Vec<u8> = (0..145).flat_map(|_| height.to_le_bytes()).collect();
                body.extend(encode_chunk(b"MCVT", &heights));
            }
            if !self.layers.is_empty() {
                put(&mut header, 0x1C, (base + body.len()) as u32);
                let mut records = Vec::new();
                for (texture, flags, offset) in &self.layers {
                    records.extend(texture.to_le_bytes());
                    records.extend(flags.to_le_bytes());
                    records.extend(offset.to_le_bytes());
                    records.extend(0i32.to_le_bytes());
                }
                body.extend(encode_chunk(b"MCLY", &records));
            }
            if let Some(alpha) = &self.alpha {
                put(&mut header, 0x24, (base + body.len()) as u32);
                put(&mut header, 0x28, alpha.len() as u32 + 8);
                body.extend(encode_chunk(b"MCAL", alpha));
            }

            header.extend(body);
            encode_chunk(b"MCNK", &header)
        }
    }

    fn names_block(names: &[&str]) -> (Vec<u8>, Vec<u8>) {
        let mut block = Vec::new();
        let mut offsets = Vec::new();
        for name in names {
            offsets.extend((block.len() as u32).to_le_bytes());
            block.extend_from_slice(name.as_bytes());
            block.push(0);
        }
        (block, offsets)
    }

    /// Tile with textures, cells, doodads `(model, unique_id, position)` and
    /// buildings `(model, unique_id, position)`.
    pub fn adt_bytes(
        textures: &[&str],
        cells: &[CellSpec],
        doodads: &[(&str, u32, [f32; 3])],
        buildings: &[(&str, u32, [f32; 3])],
    ) -> Vec<u8> {
        let mut out = encode_chunk(b"MVER", &18u32.to_le_bytes());
        let (mtex, _) = names_block(textures);
        out.extend(encode_chunk(b"MTEX", &mtex));

        let models: Vec<&str> = doodads.iter().map(|d| d.0).collect();
        let (mmdx, mmid) = names_block(&models);
        out.extend(encode_chunk(b"MMDX", &mmdx));
        out.extend(encode_chunk(b"MMID", &mmid));
        let mut mddf = Vec::new();
        for (index, (_, unique_id, position)) in doodads.iter().enumerate() {
            let mut record = vec![0u8; 36];
            record[0..4].copy_from_slice(&(index as u32).to_le_bytes());
            record[4..8].copy_from_slice(&unique_id.to_le_bytes());
            for (axis, value) in position.iter().enumerate() {
                record[8 + axis * 4..12 + axis * 4].copy_from_slice(&value.to_le_bytes());
            }
            record[32..34].copy_from_slice(&1024u16.to_le_bytes());
            mddf.extend(record);
        }
        out.extend(encode_chunk(b"MDDF", &mddf));

        let names: Vec<&str> = buildings.iter().map(|b| b.0).collect();
        let (mwmo, mwid) = names_block(&names);
        out.extend(encode_chunk(b"MWMO", &mwmo));
        out.extend(encode_chunk(b"MWID", &mwid));
        let mut modf = Vec::new();
        for (index, (_, unique_id, position)) in buildings.iter().enumerate() {
            let mut record = vec![0u8; 64];
            record[0..4].copy_from_slice(&(index as u32).to_le_bytes());
            record[4..8].copy_from_slice(&unique_id.to_le_bytes());
            for (axis, value) in position.iter().enumerate() {
                record[8 + axis * 4..12 + axis * 4].copy_from_slice(&value.to_le_bytes());
            }
            record[44..48].copy_from_slice(&10.0f32.to_le_bytes());
            modf.extend(record);
        }
        out.extend(encode_chunk(b"MODF", &modf));

        for cell in cells {
            out.extend(cell.encode());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::terrain::alpha::{LAYER_COMPRESSED_ALPHA, read_alpha_map};

    #[test]
    fn given_cell_with_heights_when_parsing_then_outer_grid_is_extracted() {
        let cell = CellSpec {
            index: (3, 4),
            position: [100.0, 200.0, 50.0],
            height: Some(2.5),
            ..CellSpec::default()
        };
        let bytes = adt_bytes(&["grass.blp"], &[cell], &[], &[]);

        let tile = AdtTile::parse(&bytes).expect("tile");

        assert_eq!(tile.textures, vec!["grass.blp"]);
        let cell = tile.cell(3, 4).expect("cell");
        assert_eq!(cell.position, [100.0, 200.0, 50.0]);
        assert_eq!(cell.outer_heights.as_ref().map(Vec::len), Some(OUTER_HEIGHTS));
        assert!(cell.layers.is_empty());
    }

    #[test]
    fn given_rle_layer_when_reading_alpha_then_scenario_prefix_is_decoded() {
        let cell = CellSpec {
            layers: vec![(0, 0, 0), (1, LAYER_COMPRESSED_ALPHA, 0)],
            alpha: Some(vec![0x83, 0xFF, 0x05, 0, 0, 0, 0, 0]),
            ..CellSpec::default()
        };
        let bytes = adt_bytes(&["a.blp", "b.blp"], &[cell], &[], &[]);
        let tile = AdtTile::parse(&bytes).expect("tile");
        let cell = &tile.cells[0];
        let layer = cell.layers[1];

        let alpha = read_alpha_map(
            cell.alpha.as_deref(),
            layer.alpha_offset as usize,
            layer.flags,
            false,
        )
        .expect("alpha");

        assert_eq!(alpha.len(), 4096);
        assert_eq!(&alpha[..10], &[255, 255, 255, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn given_placements_when_parsing_then_model_names_are_resolved() {
        let bytes = adt_bytes(
            &[],
            &[],
            &[("World\\Tree01.m2", 7, [1.0, 2.0, 3.0])],
            &[("World\\Abbey.wmo", 9, [4.0, 5.0, 6.0])],
        );

        let tile = AdtTile::parse(&bytes).expect("tile");

        assert_eq!(tile.doodads[0].model, "World\\Tree01.m2");
        assert_eq!(tile.doodads[0].scale, 1024);
        assert_eq!(tile.buildings[0].model, "World\\Abbey.wmo");
        assert_eq!(tile.buildings[0].extents_max[0], 10.0);
    }

    #[test]
    fn given_name_id_past_offsets_when_resolving_then_unknown_is_returned() {
        assert_eq!(resolve_name(b"a.m2\0", &[0], 3), "unknown");
        assert_eq!(resolve_name(b"", &[0], 0), "unknown");
        assert_eq!(resolve_name(b"a.m2\0", &[0], 0), "a.m2");
    }

    #[test]
    fn given_height_offset_pointing_elsewhere_when_parsing_then_heights_are_absent() {
        let mut cell = CellSpec {
            height: Some(1.0),
            ..CellSpec::default()
        }
        .encode();
        // Corrupt the MCVT offset so it lands inside the header.
        cell[8 + 0x14..8 + 0x18].copy_from_slice(&16u32.to_le_bytes());

        let tile = AdtTile::parse(&cell).expect("tile");

        assert_eq!(tile.cells[0].outer_heights, None);
    }
}
