use crate::{
    binary,
    chunk::{FourCC, scan_chunks},
    error::DecodeError,
};

use super::MAP_TILES;

const MPHD: FourCC = FourCC::new(b"MPHD");
const MAIN: FourCC = FourCC::new(b"MAIN");

/// `MPHD` flag selecting uncompressed 4096-byte alpha maps.
pub const FLAG_BIG_ALPHA: u32 = 0x4;

const MAIN_ENTRY_SIZE: usize = 8;

/// Map directory: global flags and the set of existing tiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wdt {
    pub flags: u32,
    tiles: Vec<bool>,
}

impl Default for Wdt {
    fn default() -> Self {
        Self {
            flags: 0,
            tiles: vec![false; (MAP_TILES * MAP_TILES) as usize],
        }
    }
}

impl Wdt {
    /// Decode a WDT. A truncated `MAIN` table marks only the complete
    /// entries.
    pub fn parse(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut wdt = Wdt::default();
        for chunk in scan_chunks(buf, 0) {
            match chunk.tag {
                MPHD => wdt.flags = binary::read_u32(chunk.payload, 0, "wdt header")?,
                MAIN => {
                    for (index, entry) in chunk
                        .payload
                        .chunks_exact(MAIN_ENTRY_SIZE)
                        .take(wdt.tiles.len())
                        .enumerate()
                    {
                        wdt.tiles[index] = binary::read_u32(entry, 0, "wdt tile")? & 1 != 0;
                    }
                }
                _ => {}
            }
        }
        Ok(wdt)
    }

    pub fn has_big_alpha(&self) -> bool {
        self.flags & FLAG_BIG_ALPHA != 0
    }

    pub fn has_tile(&self, x: i32, y: i32) -> bool {
        if !(0..MAP_TILES).contains(&x) || !(0..MAP_TILES).contains(&y) {
            return false;
        }
        self.tiles[(y * MAP_TILES + x) as usize]
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.iter().filter(|exists| **exists).count()
    }
}

#[cfg(test)]
pub(crate) fn wdt_bytes(flags: u32, tiles: &[(i32, i32)]) -> Vec<u8> {
    use crate::chunk::encode_chunk;

    let mut main = vec![0u8; (MAP_TILES * MAP_TILES) as usize * MAIN_ENTRY_SIZE];
    for (x, y) in tiles {
        let at = ((y * MAP_TILES + x) as usize) * MAIN_ENTRY_SIZE;
        main[at] = 1;
    }
    let mut out = encode_chunk(b"MVER", &18u32.to_le_bytes());
    out.extend(encode_chunk(b"MPHD", &{
        let mut header = vec![0u8; 32];
        header[0..4].copy_from_slice(&flags.to_le_bytes());
        header
    }));
    out.extend(encode_chunk(b"MAIN", &main));
    out
}
