use std::{collections::HashMap, io::Cursor, sync::Arc};

use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage, imageops::FilterType};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{archive::ArchivePool, blp, error::DecodeError, scene::EmbeddedImage};

/// Filter applied when embedded textures are downscaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeInterpolation {
    /// Keeps hard texel edges; suits pixel-art UI and palette textures.
    Nearest,
    /// Maps to `Triangle` in `image`. Cheapest filter that still blends texels.
    #[default]
    Bilinear,
    /// Maps to `CatmullRom` in `image`; sharper than bilinear on skin details.
    Bicubic,
    /// Soft result; hides DXT block artifacts at the cost of detail.
    Gaussian,
    /// Windowed sinc over three lobes. Slowest, best for large downscales.
    Lanczos3,
}

impl From<ResizeInterpolation> for FilterType {
    fn from(value: ResizeInterpolation) -> Self {
        match value {
            ResizeInterpolation::Nearest => FilterType::Nearest,
            ResizeInterpolation::Bilinear => FilterType::Triangle,
            ResizeInterpolation::Bicubic => FilterType::CatmullRom,
            ResizeInterpolation::Gaussian => FilterType::Gaussian,
            ResizeInterpolation::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Resize image to fit within `max_size` on both axes while preserving aspect ratio.
///
/// Images already inside the bound are returned unchanged; nothing is upscaled.
pub fn resize_texture_to_max(
    image: &RgbaImage,
    max_size: u32,
    interpolation: ResizeInterpolation,
) -> RgbaImage {
    if image.width() <= max_size && image.height() <= max_size {
        return image.clone();
    }

    DynamicImage::ImageRgba8(image.clone())
        .resize(max_size, max_size, interpolation.into())
        .to_rgba8()
}

// ─── Codec seam ───────────────────────────────────────────────────────────────

/// Encoded image container written into scenes and tile outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputImageFormat {
    #[default]
    Png,
    Webp,
}

impl OutputImageFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            OutputImageFormat::Png => "image/png",
            OutputImageFormat::Webp => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputImageFormat::Png => "png",
            OutputImageFormat::Webp => "webp",
        }
    }
}

impl From<OutputImageFormat> for ImageFormat {
    fn from(value: OutputImageFormat) -> Self {
        match value {
            OutputImageFormat::Png => ImageFormat::Png,
            OutputImageFormat::Webp => ImageFormat::WebP,
        }
    }
}

/// Pure conversion between encoded bytes and pixels.
pub trait ImageCodec: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<RgbaImage, DecodeError>;

    fn encode(&self, image: &RgbaImage, format: OutputImageFormat) -> image::ImageResult<Vec<u8>>;

    /// Encode an opaque image without an alpha channel.
    fn encode_rgb(&self, image: &RgbImage, format: OutputImageFormat) -> image::ImageResult<Vec<u8>> {
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(image.clone())
            .write_to(&mut Cursor::new(&mut out), ImageFormat::from(format))?;
        Ok(out)
    }
}

/// BLP2 via the built-in decoder, everything else through `image`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCodec;

impl ImageCodec for DefaultCodec {
    fn decode(&self, bytes: &[u8]) -> Result<RgbaImage, DecodeError> {
        if blp::is_blp(bytes) {
            return blp::decode_blp(bytes);
        }
        image::load_from_memory(bytes)
            .map(|image| image.to_rgba8())
            .map_err(|err| DecodeError::InvalidFormat {
                context: "image",
                detail: err.to_string(),
            })
    }

    fn encode(&self, image: &RgbaImage, format: OutputImageFormat) -> image::ImageResult<Vec<u8>> {
        let mut out = Vec::new();
        image.write_to(&mut Cursor::new(&mut out), ImageFormat::from(format))?;
        Ok(out)
    }
}

/// How decoded textures are re-encoded before embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageOptions {
    pub format: OutputImageFormat,
    /// Longest edge of embedded textures; larger images are downscaled.
    pub max_size: u32,
    pub interpolation: ResizeInterpolation,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            format: OutputImageFormat::Png,
            max_size: 1024,
            interpolation: ResizeInterpolation::Lanczos3,
        }
    }
}

/// Downscale and encode a decoded texture for embedding. Encode failures are
/// logged and yield `None` so the caller falls back to a flat material.
pub fn embed_image(
    codec: &dyn ImageCodec,
    image: &RgbaImage,
    options: &ImageOptions,
) -> Option<EmbeddedImage> {
    let resized = resize_texture_to_max(image, options.max_size, options.interpolation);
    match codec.encode(&resized, options.format) {
        Ok(bytes) => Some(EmbeddedImage {
            bytes,
            mime_type: options.format.mime_type(),
        }),
        Err(err) => {
            warn!("failed to encode texture: {err}");
            None
        }
    }
}

// ─── Texture cache ───────────────────────────────────────────────────────────

/// Virtual paths to probe for a texture reference: `TEXTURES\<path>`, the
/// path with backslashes, then the spelling as given.
pub fn texture_path_candidates(path: &str) -> Vec<String> {
    let native = path.replace('/', "\\");
    let mut candidates = vec![format!("TEXTURES\\{native}"), native];
    if !candidates.iter().any(|candidate| candidate == path) {
        candidates.push(path.to_string());
    }
    candidates
}

/// Decoded textures keyed by virtual path, shared across assets of a batch.
/// Failed lookups are cached as `None` so they are attempted once.
#[derive(Default)]
pub struct TextureCache {
    entries: HashMap<String, Option<Arc<RgbaImage>>>,
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fetch and decode the first candidate path that resolves.
    pub fn fetch(
        &mut self,
        pool: &ArchivePool,
        codec: &dyn ImageCodec,
        candidates: &[String],
    ) -> Option<Arc<RgbaImage>> {
        let key = candidates.first()?.to_ascii_lowercase();
        if let Some(cached) = self.entries.get(&key) {
            return cached.clone();
        }

        let probes: Vec<&str> = candidates.iter().map(String::as_str).collect();
        let decoded = pool.read_first(&probes).and_then(|(path, bytes)| {
            match codec.decode(&bytes) {
                Ok(image) => {
                    debug!("decoded {} ({}x{})", path, image.width(), image.height());
                    Some(Arc::new(image))
                }
                Err(err) => {
                    warn!("failed to decode texture {path}: {err}");
                    None
                }
            }
        });
        self.entries.insert(key, decoded.clone());
        decoded
    }
}
