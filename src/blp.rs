//! BLP2 texture decoding (palettized, DXT1/3/5 and raw BGRA, first mip only).

use image::RgbaImage;

use crate::{binary, error::DecodeError};

pub const BLP_MAGIC: &[u8; 4] = b"BLP2";

const HEADER_SIZE: usize = 148;
const PALETTE_SIZE: usize = 256 * 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Palette,
    Dxt,
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlpHeader {
    content: u32,
    encoding: Encoding,
    alpha_depth: u8,
    alpha_type: u8,
    width: u32,
    height: u32,
    mip_offset: usize,
    mip_size: usize,
}

impl BlpHeader {
    fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        const CTX: &str = "blp header";
        binary::expect_magic(bytes, 0, BLP_MAGIC, CTX)?;
        let encoding = match binary::read_u8(bytes, 8, CTX)? {
            1 => Encoding::Palette,
            2 => Encoding::Dxt,
            3 => Encoding::Raw,
            other => {
                return Err(DecodeError::InvalidFormat {
                    context: CTX,
                    detail: format!("unknown compression {other}"),
                });
            }
        };
        Ok(Self {
            content: binary::read_u32(bytes, 4, CTX)?,
            encoding,
            alpha_depth: binary::read_u8(bytes, 9, CTX)?,
            alpha_type: binary::read_u8(bytes, 10, CTX)?,
            width: binary::read_u32(bytes, 12, CTX)?,
            height: binary::read_u32(bytes, 16, CTX)?,
            mip_offset: binary::read_u32(bytes, 20, CTX)? as usize,
            mip_size: binary::read_u32(bytes, 84, CTX)? as usize,
        })
    }
}

pub fn is_blp(bytes: &[u8]) -> bool {
    bytes.starts_with(BLP_MAGIC)
}

/// Decode the largest mip level of a BLP2 texture into RGBA.
pub fn decode_blp(bytes: &[u8]) -> Result<RgbaImage, DecodeError> {
    let header = BlpHeader::parse(bytes)?;
    if header.content == 0 {
        return Err(DecodeError::InvalidFormat {
            context: "blp header",
            detail: "JPEG content is not supported".to_string(),
        });
    }
    if header.width == 0 || header.height == 0 {
        return Err(DecodeError::InvalidFormat {
            context: "blp header",
            detail: format!("empty image {}x{}", header.width, header.height),
        });
    }

    let (width, height) = (header.width as usize, header.height as usize);
    let mip = binary::slice(bytes, header.mip_offset, header.mip_size, "blp mip 0")?;
    let rgba = match header.encoding {
        Encoding::Palette => decode_palette(bytes, mip, &header, width * height)?,
        Encoding::Dxt => decode_dxt(mip, &header, width, height)?,
        Encoding::Raw => decode_raw(mip, width * height)?,
    };

    RgbaImage::from_raw(header.width, header.height, rgba).ok_or(DecodeError::InvalidFormat {
        context: "blp",
        detail: "pixel buffer size mismatch".to_string(),
    })
}

fn decode_palette(
    bytes: &[u8],
    mip: &[u8],
    header: &BlpHeader,
    pixels: usize,
) -> Result<Vec<u8>, DecodeError> {
    let palette = binary::slice(bytes, HEADER_SIZE, PALETTE_SIZE, "blp palette")?;
    let indices = binary::slice(mip, 0, pixels, "blp palette indices")?;
    let alpha = &mip[pixels..];

    let mut out = Vec::with_capacity(pixels * 4);
    for (pixel, index) in indices.iter().enumerate() {
        let entry = *index as usize * 4;
        let (b, g, r) = (palette[entry], palette[entry + 1], palette[entry + 2]);
        let a = palette_alpha(alpha, pixel, header.alpha_depth);
        out.extend_from_slice(&[r, g, b, a]);
    }
    Ok(out)
}

fn palette_alpha(alpha: &[u8], pixel: usize, depth: u8) -> u8 {
    match depth {
        1 => alpha
            .get(pixel / 8)
            .map(|byte| if byte >> (pixel % 8) & 1 == 1 { 255 } else { 0 })
            .unwrap_or(255),
        4 => alpha
            .get(pixel / 2)
            .map(|byte| (byte >> ((pixel % 2) * 4) & 0x0F) * 17)
            .unwrap_or(255),
        8 => alpha.get(pixel).copied().unwrap_or(255),
        _ => 255,
    }
}

fn decode_dxt(
    mip: &[u8],
    header: &BlpHeader,
    width: usize,
    height: usize,
) -> Result<Vec<u8>, DecodeError> {
    let block_size = if header.alpha_depth <= 1 { 8 } else { 16 };
    let block_len = width.div_ceil(4) * height.div_ceil(4) * block_size;
    let blocks = binary::slice(mip, 0, block_len, "blp dxt blocks")?;

    let mut packed = vec![0u32; width * height];
    let result = if header.alpha_depth <= 1 {
        texture2ddecoder::decode_bc1(blocks, width, height, &mut packed)
    } else if header.alpha_type == 7 {
        texture2ddecoder::decode_bc3(blocks, width, height, &mut packed)
    } else {
        texture2ddecoder::decode_bc2(blocks, width, height, &mut packed)
    };
    result.map_err(|err| DecodeError::InvalidFormat {
        context: "blp dxt",
        detail: err.to_string(),
    })?;

    Ok(bgra_u32_to_rgba_bytes(&packed))
}

fn decode_raw(mip: &[u8], pixels: usize) -> Result<Vec<u8>, DecodeError> {
    let raw = binary::slice(mip, 0, pixels * 4, "blp raw pixels")?;
    Ok(raw
        .chunks_exact(4)
        .flat_map(|bgra| [bgra[2], bgra[1], bgra[0], bgra[3]])
        .collect())
}

fn bgra_u32_to_rgba_bytes(data: &[u32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(data.len() * 4);
    for pixel in data {
        let [b, g, r, a] = pixel.to_le_bytes();
        bytes.extend_from_slice(&[r, g, b, a]);
    }
    bytes
}

#[cfg(test)]
pub(crate) fn blp_bytes(
    encoding: u8,
    alpha_depth: u8,
    width: u32,
    height: u32,
    palette: &[[u8; 4]],
    mip: &[u8],
) -> Vec<u8> {
    let mut out = vec![0u8; HEADER_SIZE + PALETTE_SIZE];
    out[0..4].copy_from_slice(BLP_MAGIC);
    out[4..8].copy_from_slice(&1u32.to_le_bytes());
    out[8] = encoding;
    out[9] = alpha_depth;
    out[12..16].copy_from_slice(&width.to_le_bytes());
    out[16..20].copy_from_slice(&height.to_le_bytes());
    let offset = out.len() as u32;
    out[20..24].copy_from_slice(&offset.to_le_bytes());
    out[84..88].copy_from_slice(&(mip.len() as u32).to_le_bytes());
    for (index, color) in palette.iter().enumerate() {
        out[HEADER_SIZE + index * 4..HEADER_SIZE + index * 4 + 4].copy_from_slice(color);
    }
    out.extend_from_slice(mip);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_raw_bgra_blp_when_decoding_then_channels_are_swapped() {
        let bytes = blp_bytes(3, 8, 1, 1, &[], &[10, 20, 30, 40]);

        let image = decode_blp(&bytes).expect("decode");

        assert_eq!(image.get_pixel(0, 0).0, [30, 20, 10, 40]);
    }

    #[test]
    fn given_palette_blp_with_8bit_alpha_when_decoding_then_alpha_follows_indices() {
        let palette = [[255, 0, 0, 0], [0, 0, 255, 0]];
        let mip = [0u8, 1, 128, 64];

        let image = decode_blp(&blp_bytes(1, 8, 2, 1, &palette, &mip)).expect("decode");

        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 255, 128]);
        assert_eq!(image.get_pixel(1, 0).0, [255, 0, 0, 64]);
    }

    #[test]
    fn given_palette_blp_with_1bit_alpha_when_decoding_then_bits_expand_to_full_range() {
        let palette = [[1, 2, 3, 0]];
        let mip = [0u8, 0, 0b0000_0010];

        let image = decode_blp(&blp_bytes(1, 1, 2, 1, &palette, &mip)).expect("decode");

        assert_eq!(image.get_pixel(0, 0).0[3], 0);
        assert_eq!(image.get_pixel(1, 0).0[3], 255);
    }

    #[test]
    fn given_truncated_mip_when_decoding_then_range_violation_is_returned() {
        let mut bytes = blp_bytes(3, 8, 2, 2, &[], &[0u8; 16]);
        bytes.truncate(bytes.len() - 4);

        assert!(matches!(
            decode_blp(&bytes),
            Err(DecodeError::RangeViolation { .. })
        ));
    }

    #[test]
    fn given_dxt_header_larger_than_mip_when_decoding_then_range_violation_is_returned() {
        let bytes = blp_bytes(2, 0, 65535, 65535, &[], &[0u8; 8]);

        assert!(matches!(
            decode_blp(&bytes),
            Err(DecodeError::RangeViolation { .. })
        ));
    }

    #[test]
    fn given_single_dxt1_block_when_decoding_then_small_image_is_produced() {
        let image = decode_blp(&blp_bytes(2, 0, 2, 2, &[], &[0u8; 8])).expect("decode");

        assert_eq!(image.dimensions(), (2, 2));
    }

    #[test]
    fn given_packed_bgra_when_converting_then_rgba_order_is_produced() {
        let bytes = bgra_u32_to_rgba_bytes(&[0x11223344]);

        assert_eq!(bytes, vec![0x22, 0x33, 0x44, 0x11]);
    }
}
