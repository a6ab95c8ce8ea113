//! Texture baking: composite each cell's texture layers into one image per tile.

use std::{collections::HashMap, sync::Arc};

use image::{
    DynamicImage, GrayImage, Rgba, RgbImage, RgbaImage,
    imageops::{self, FilterType},
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::{AdtTile, CELLS_PER_TILE, alpha};

/// Fill colour for cells without a resolvable base texture.
pub const BACKGROUND: Rgba<u8> = Rgba([80, 140, 60, 255]);

const ALPHA_EDGE: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BakeOptions {
    /// Edge length of one cell in the baked image.
    pub cell_px: u32,
    /// Times a source texture repeats across one cell.
    pub repeats: u32,
    /// Gaussian blur applied to resized alpha maps.
    pub blur_sigma: f32,
}

impl Default for BakeOptions {
    fn default() -> Self {
        Self {
            cell_px: 256,
            repeats: 8,
            blur_sigma: 1.5,
        }
    }
}

/// Bakes tiles while caching each texture already tiled and resized to one cell.
#[derive(Debug, Default)]
pub struct TerrainBaker {
    options: BakeOptions,
    prepared: HashMap<String, Option<Arc<RgbaImage>>>,
}

impl TerrainBaker {
    pub fn new(options: BakeOptions) -> Self {
        Self {
            options,
            prepared: HashMap::new(),
        }
    }

    pub fn options(&self) -> &BakeOptions {
        &self.options
    }

    /// Edge length of a baked tile.
    pub fn tile_px(&self) -> u32 {
        self.options.cell_px * CELLS_PER_TILE as u32
    }

    fn prepared(
        &mut self,
        path: &str,
        load: &mut impl FnMut(&str) -> Option<Arc<RgbaImage>>,
    ) -> Option<Arc<RgbaImage>> {
        if let Some(cached) = self.prepared.get(path) {
            return cached.clone();
        }
        let prepared = match load(path) {
            Some(source) => Some(Arc::new(self.tile_texture(&source))),
            None => {
                warn!("terrain texture not found: {path}");
                None
            }
        };
        self.prepared.insert(path.to_string(), prepared.clone());
        prepared
    }

    /// Repeat a texture `repeats` times per axis, then resample to one cell.
    fn tile_texture(&self, source: &RgbaImage) -> RgbaImage {
        let repeats = self.options.repeats.max(1);
        let (width, height) = source.dimensions();
        let mut tiled = RgbaImage::new(width * repeats, height * repeats);
        for i in 0..repeats {
            for j in 0..repeats {
                imageops::replace(
                    &mut tiled,
                    source,
                    (i * width) as i64,
                    (j * height) as i64,
                );
            }
        }
        let cell_px = self.options.cell_px;
        imageops::resize(&tiled, cell_px, cell_px, FilterType::Lanczos3)
    }

    fn overlay_alpha(&self, map: Vec<u8>) -> Option<GrayImage> {
        let map = GrayImage::from_raw(ALPHA_EDGE, ALPHA_EDGE, map)?;
        let cell_px = self.options.cell_px;
        let resized = imageops::resize(&map, cell_px, cell_px, FilterType::CatmullRom);
        Some(imageops::blur(&resized, self.options.blur_sigma))
    }

    /// Composite one tile.
    ///
    /// # Arguments
    ///
    /// * `tile` - Decoded tile; cells are placed at `(index_x, index_y)`.
    /// * `big_alpha` - Map-wide uncompressed alpha flag.
    /// * `load` - Resolves a texture name from the tile's texture list to pixels.
    ///
    /// # Returns
    ///
    /// An RGB image of `16 * cell_px` pixels per edge.
    pub fn bake(
        &mut self,
        tile: &AdtTile,
        big_alpha: bool,
        mut load: impl FnMut(&str) -> Option<Arc<RgbaImage>>,
    ) -> RgbImage {
        let cell_px = self.options.cell_px;
        let tile_px = self.tile_px();
        let mut canvas = RgbaImage::from_pixel(tile_px, tile_px, BACKGROUND);
        let texture_name = |id: u32| tile.textures.get(id as usize);

        for cell in &tile.cells {
            let (col, row) = (cell.index_x as usize, cell.index_y as usize);
            if col >= CELLS_PER_TILE || row >= CELLS_PER_TILE {
                continue;
            }
            let Some((base, overlays)) = cell.layers.split_first() else {
                continue;
            };

            let mut image = match texture_name(base.texture_id)
                .and_then(|name| self.prepared(name, &mut load))
            {
                Some(texture) => (*texture).clone(),
                None => RgbaImage::from_pixel(cell_px, cell_px, BACKGROUND),
            };

            for layer in overlays {
                let Some(texture) = texture_name(layer.texture_id)
                    .and_then(|name| self.prepared(name, &mut load))
                else {
                    continue;
                };
                let Some(map) = alpha::read_alpha_map(
                    cell.alpha.as_deref(),
                    layer.alpha_offset as usize,
                    layer.flags,
                    big_alpha,
                ) else {
                    continue;
                };
                let Some(mask) = self.overlay_alpha(map) else {
                    continue;
                };

                let mut overlay = (*texture).clone();
                for (pixel, coverage) in overlay.pixels_mut().zip(mask.pixels()) {
                    pixel.0[3] = coverage.0[0];
                }
                imageops::overlay(&mut image, &overlay, 0, 0);
            }

            imageops::replace(
                &mut canvas,
                &image,
                (col as u32 * cell_px) as i64,
                (row as u32 * cell_px) as i64,
            );
        }

        debug!(
            "baked {} cells into {tile_px}x{tile_px} ({} textures cached)",
            tile.cells.len(),
            self.prepared.len()
        );
        DynamicImage::ImageRgba8(canvas).to_rgb8()
    }
}
