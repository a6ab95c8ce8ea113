//! Unified heightmap over a block of tiles.

use std::collections::BTreeMap;

use log::debug;

use super::{AdtTile, GRID_PER_TILE, TileRange};

/// Heightmap component used when no position analysis is available.
const DEFAULT_HEIGHT_INDEX: usize = 2;

/// Cells examined for the index-to-position deltas (one tile).
const DELTA_SAMPLE: usize = 256;

/// Position of one terrain cell, tagged with its tile and cell indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellSample {
    pub tile: (i32, i32),
    pub cell: (u32, u32),
    pub position: [f32; 3],
}

/// Which cell position component is vertical, and how the horizontal ones
/// move with the cell indices.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionAnalysis {
    /// `(min, max)` of each component.
    pub ranges: [(f32, f32); 3],
    pub height_index: usize,
    pub horizontal: [usize; 2],
    /// Position change between the lowest and highest `index_x` in one row.
    pub index_x_delta: Option<[f32; 3]>,
    /// Position change between the lowest and highest `index_y` in one column.
    pub index_y_delta: Option<[f32; 3]>,
}

/// Samples of every cell carrying heights, in tile order.
pub fn cell_samples(tiles: &[((i32, i32), AdtTile)]) -> Vec<CellSample> {
    tiles
        .iter()
        .flat_map(|(coords, tile)| {
            tile.cells
                .iter()
                .filter(|cell| cell.outer_heights.is_some())
                .map(|cell| CellSample {
                    tile: *coords,
                    cell: (cell.index_x, cell.index_y),
                    position: cell.position,
                })
        })
        .collect()
}

/// The component with the smallest spread is taken as vertical; ties keep
/// component order.
pub fn analyze_positions(samples: &[CellSample]) -> Option<PositionAnalysis> {
    let first = samples.first()?;
    let mut ranges = [(0.0f32, 0.0f32); 3];
    for (axis, range) in ranges.iter_mut().enumerate() {
        *range = (first.position[axis], first.position[axis]);
    }
    for sample in samples {
        for (axis, range) in ranges.iter_mut().enumerate() {
            range.0 = range.0.min(sample.position[axis]);
            range.1 = range.1.max(sample.position[axis]);
        }
    }

    let mut order = [0usize, 1, 2];
    order.sort_by(|a, b| {
        let spread = |axis: usize| ranges[axis].1 - ranges[axis].0;
        spread(*a).total_cmp(&spread(*b))
    });

    let sample = &samples[..samples.len().min(DELTA_SAMPLE)];
    let (index_x_delta, index_y_delta) = if sample.len() >= 16 {
        (
            index_delta(sample, |s| (s.cell.1, s.cell.0)),
            index_delta(sample, |s| (s.cell.0, s.cell.1)),
        )
    } else {
        (None, None)
    };

    let analysis = PositionAnalysis {
        ranges,
        height_index: order[0],
        horizontal: [order[1], order[2]],
        index_x_delta,
        index_y_delta,
    };
    debug!(
        "position analysis: height axis {}, ranges {:?}",
        analysis.height_index, analysis.ranges
    );
    Some(analysis)
}

/// Group by the first key, then take the spread along the second key inside
/// the first group holding two or more cells.
fn index_delta(samples: &[CellSample], key: impl Fn(&CellSample) -> (u32, u32)) -> Option<[f32; 3]> {
    let mut groups: BTreeMap<u32, Vec<(u32, [f32; 3])>> = BTreeMap::new();
    for sample in samples {
        let (group, order) = key(sample);
        groups.entry(group).or_default().push((order, sample.position));
    }

    groups
        .into_values()
        .find(|cells| cells.len() >= 2)
        .and_then(|mut cells| {
            cells.sort_by_key(|(order, _)| *order);
            let (_, low) = cells.first()?;
            let (_, high) = cells.last()?;
            Some([high[0] - low[0], high[1] - low[1], high[2] - low[2]])
        })
}

/// Row-major `f32` height grid.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightGrid {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl HeightGrid {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    /// Zeroed grid covering a tile range; neighbouring tiles share edges.
    pub fn for_range(range: &TileRange) -> Self {
        Self::new(
            range.count_x * GRID_PER_TILE + 1,
            range.count_y * GRID_PER_TILE + 1,
        )
    }

    /// Write every cell's 9×9 outer heights into one grid. Heights are the
    /// cell position's `height_index` component plus the patch value; later
    /// writes win on shared edges.
    pub fn assemble(
        range: &TileRange,
        tiles: &[((i32, i32), AdtTile)],
        height_index: Option<usize>,
    ) -> Self {
        let height_index = height_index.unwrap_or(DEFAULT_HEIGHT_INDEX);
        let mut grid = Self::for_range(range);

        for (coords, tile) in tiles {
            let Some((tile_col, tile_row)) = range.local(*coords) else {
                continue;
            };
            for cell in &tile.cells {
                let Some(heights) = &cell.outer_heights else {
                    continue;
                };
                let base = cell.position[height_index];
                for row in 0..9 {
                    for col in 0..9 {
                        let gx = tile_col * GRID_PER_TILE + cell.index_x as usize * 8 + col;
                        let gy = tile_row * GRID_PER_TILE + cell.index_y as usize * 8 + row;
                        if let Some(value) = heights.get(row * 9 + col) {
                            grid.set(gx, gy, base + value);
                        }
                    }
                }
            }
        }
        grid
    }

    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get(y * self.width + x).copied()
    }

    fn set(&mut self, x: usize, y: usize, value: f32) {
        if x < self.width && y < self.height {
            self.data[y * self.width + x] = value;
        }
    }

    /// `(min, max)` over every sample, `(0, 0)` for an empty grid.
    pub fn height_range(&self) -> (f32, f32) {
        let mut values = self.data.iter().copied();
        let Some(first) = values.next() else {
            return (0.0, 0.0);
        };
        values.fold((first, first), |(min, max), value| {
            (min.min(value), max.max(value))
        })
    }

    /// Height at the grid midpoint, used as the vertical origin for placements.
    pub fn center_height(&self) -> f32 {
        self.get(self.width / 2, self.height / 2).unwrap_or(0.0)
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.data.iter().flat_map(|value| value.to_le_bytes()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::TerrainCell;

    fn cell(index: (u32, u32), position: [f32; 3], patch: f32) -> TerrainCell {
        TerrainCell {
            flags: 0,
            index_x: index.0,
            index_y: index.1,
            layer_count: 0,
            area_id: 0,
            position,
            outer_heights: Some(vec![patch; 81]),
            layers: Vec::new(),
            alpha: None,
        }
    }

    fn tile_of(cells: Vec<TerrainCell>) -> AdtTile {
        AdtTile {
            cells,
            ..AdtTile::default()
        }
    }

    #[test]
    fn given_single_tile_when_assembling_then_grid_is_129_square_with_heights() {
        let range = TileRange::around(32, 48, 0);
        let tiles = vec![(
            (32, 48),
            tile_of(vec![cell((0, 0), [0.0, 0.0, 10.0], 1.5), cell((15, 15), [0.0, 0.0, 20.0], 0.0)]),
        )];

        let grid = HeightGrid::assemble(&range, &tiles, Some(2));

        assert_eq!((grid.width, grid.height), (129, 129));
        assert_eq!(grid.get(0, 0), Some(11.5));
        assert_eq!(grid.get(8, 8), Some(11.5));
        assert_eq!(grid.get(128, 128), Some(20.0));
        assert_eq!(grid.get(64, 64), Some(0.0));
        assert_eq!(grid.height_range(), (0.0, 20.0));
        assert_eq!(grid.to_le_bytes().len(), 129 * 129 * 4);
    }

    #[test]
    fn given_second_tile_when_assembling_then_it_is_offset_by_128_columns() {
        let range = TileRange {
            start_x: 10,
            start_y: 10,
            count_x: 2,
            count_y: 1,
        };
        let tiles = vec![((11, 10), tile_of(vec![cell((0, 0), [0.0, 0.0, 5.0], 0.0)]))];

        let grid = HeightGrid::assemble(&range, &tiles, None);

        assert_eq!(grid.width, 257);
        assert_eq!(grid.get(127, 0), Some(0.0));
        assert_eq!(grid.get(128, 0), Some(5.0));
        assert_eq!(grid.get(136, 8), Some(5.0));
    }

    #[test]
    fn given_cells_spread_horizontally_when_analyzing_then_smallest_range_is_vertical() {
        let cells: Vec<TerrainCell> = (0..16u32)
            .map(|i| cell((i % 4, i / 4), [1000.0 - (i / 4) as f32 * 33.3, 2000.0 - (i % 4) as f32 * 33.3, 40.0 + i as f32 * 0.1], 0.0))
            .collect();
        let tiles = vec![((32, 48), tile_of(cells))];

        let analysis = analyze_positions(&cell_samples(&tiles)).expect("analysis");

        assert_eq!(analysis.height_index, 2);
        assert_eq!(analysis.horizontal, [0, 1]);
        let dx = analysis.index_x_delta.expect("x delta");
        assert!((dx[1] + 99.9).abs() < 1e-3);
        let dy = analysis.index_y_delta.expect("y delta");
        assert!((dy[0] + 99.9).abs() < 1e-3);
    }

    #[test]
    fn given_no_samples_when_analyzing_then_analysis_is_absent() {
        assert!(analyze_positions(&[]).is_none());
    }

    #[test]
    fn given_odd_grid_when_reading_center_height_then_midpoint_is_used() {
        let mut grid = HeightGrid::new(3, 3);
        grid.set(1, 1, 7.0);

        assert_eq!(grid.center_height(), 7.0);
        assert_eq!(grid.get(3, 0), None);
    }
}
