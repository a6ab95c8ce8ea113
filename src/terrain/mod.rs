//! Terrain decoding (WDT, ADT) and compositing into heightmaps, baked tile
//! textures and placement lists.

pub mod adt;
pub mod alpha;
pub mod bake;
pub mod heightmap;
pub mod placement;
pub mod wdt;

use serde_json::{Value, json};

pub use adt::{AdtTile, BuildingPlacement, DoodadPlacement, TerrainCell, TextureLayer};
pub use bake::{BakeOptions, TerrainBaker};
pub use heightmap::{CellSample, HeightGrid, PositionAnalysis, analyze_positions, cell_samples};
pub use placement::{PlacementSet, collect_placements};
pub use wdt::Wdt;

/// Edge length of one map tile in world units.
pub const TILE_SIZE: f64 = 533.33333;

/// Distance between two outer heightmap vertices.
pub const VERTEX_SPACING: f64 = 33.33333 / 8.0;

/// Offset between world coordinates and the map origin (32 tiles).
pub const MAP_OFFSET: f64 = 17066.666666666666;

/// Tiles per map edge.
pub const MAP_TILES: i32 = 64;

/// Cells per tile edge.
pub const CELLS_PER_TILE: usize = 16;

/// Heightmap intervals per tile edge (16 cells of 8 intervals).
pub const GRID_PER_TILE: usize = 128;

/// Square block of tiles around a centre tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub start_x: i32,
    pub start_y: i32,
    pub count_x: usize,
    pub count_y: usize,
}

impl TileRange {
    pub fn around(center_x: i32, center_y: i32, radius: u32) -> Self {
        let radius = radius as i32;
        Self {
            start_x: center_x - radius,
            start_y: center_y - radius,
            count_x: (2 * radius + 1) as usize,
            count_y: (2 * radius + 1) as usize,
        }
    }

    /// Tile coordinates in row-major order.
    pub fn tiles(&self) -> Vec<(i32, i32)> {
        let mut tiles = Vec::with_capacity(self.count_x * self.count_y);
        for row in 0..self.count_y as i32 {
            for col in 0..self.count_x as i32 {
                tiles.push((self.start_x + col, self.start_y + row));
            }
        }
        tiles
    }

    /// Zero-based `(column, row)` of a tile inside the range.
    pub fn local(&self, tile: (i32, i32)) -> Option<(usize, usize)> {
        let col = usize::try_from(tile.0 - self.start_x).ok()?;
        let row = usize::try_from(tile.1 - self.start_y).ok()?;
        (col < self.count_x && row < self.count_y).then_some((col, row))
    }
}

pub fn wdt_path(map: &str) -> String {
    format!("World\\Maps\\{map}\\{map}.wdt")
}

pub fn adt_path(map: &str, x: i32, y: i32) -> String {
    format!("World\\Maps\\{map}\\{map}_{x}_{y}.adt")
}

/// Reference position of a tile: its centre cell (8, 8), else its first cell.
pub fn reference_position(tile: &AdtTile) -> Option<[f32; 3]> {
    tile.cells
        .iter()
        .find(|cell| cell.index_x == 8 && cell.index_y == 8)
        .or_else(|| tile.cells.first())
        .map(|cell| cell.position)
}

/// Metadata document describing the heightmap and its placement in the world.
pub fn terrain_meta(
    grid: &HeightGrid,
    range: &TileRange,
    center_tile: (i32, i32),
    center_position: [f32; 3],
    analysis: Option<&PositionAnalysis>,
) -> Value {
    let (min, max) = grid.height_range();
    let analysis = analysis.map_or(json!({}), |analysis| {
        json!({
            "pos0_range": analysis.ranges[0],
            "pos1_range": analysis.ranges[1],
            "pos2_range": analysis.ranges[2],
            "height_index": analysis.height_index,
            "horiz_indices": analysis.horizontal,
        })
    });

    json!({
        "gridWidth": grid.width,
        "gridHeight": grid.height,
        "cellSize": VERTEX_SPACING,
        "tiles": {
            "startX": range.start_x,
            "startY": range.start_y,
            "countX": range.count_x,
            "countY": range.count_y,
        },
        "centerTile": { "x": center_tile.0, "y": center_tile.1 },
        "centerPosition": {
            "pos0": center_position[0],
            "pos1": center_position[1],
            "pos2": center_position[2],
        },
        "positionAnalysis": analysis,
        "worldExtent": range.count_x as f64 * TILE_SIZE,
        "heightRange": { "min": min, "max": max },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_radius_one_when_building_range_then_three_by_three_tiles_are_listed() {
        let range = TileRange::around(32, 48, 1);

        let tiles = range.tiles();

        assert_eq!(tiles.len(), 9);
        assert_eq!(tiles[0], (31, 47));
        assert_eq!(tiles[1], (32, 47));
        assert_eq!(range.local((33, 49)), Some((2, 2)));
        assert_eq!(range.local((30, 48)), None);
    }

    #[test]
    fn given_map_name_when_building_paths_then_backslash_paths_are_produced() {
        assert_eq!(wdt_path("Azeroth"), "World\\Maps\\Azeroth\\Azeroth.wdt");
        assert_eq!(
            adt_path("Azeroth", 32, 48),
            "World\\Maps\\Azeroth\\Azeroth_32_48.adt"
        );
    }

    #[test]
    fn given_grid_when_building_meta_then_extent_and_sizes_are_reported() {
        let range = TileRange::around(32, 48, 1);
        let grid = HeightGrid::for_range(&range);

        let meta = terrain_meta(&grid, &range, (32, 48), [1.0, 2.0, 3.0], None);

        assert_eq!(meta["gridWidth"], 385);
        assert_eq!(meta["tiles"]["countX"], 3);
        assert!((meta["worldExtent"].as_f64().unwrap_or_default() - 1600.0).abs() < 1e-3);
        assert_eq!(meta["centerPosition"]["pos2"], 3.0);
    }
}
