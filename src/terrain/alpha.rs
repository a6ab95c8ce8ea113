//! Alpha map decoding for terrain texture layers.
//!
//! All decoders are lenient: short or malformed input yields zero-padded or
//! absent maps, never an error.

/// Pixels of one 64×64 alpha map.
pub const ALPHA_MAP_SIZE: usize = 4096;

/// Packed 4-bit map size (two pixels per byte).
const PACKED_SIZE: usize = 2048;

/// Layer flag selecting run-length encoded alpha.
pub const LAYER_COMPRESSED_ALPHA: u32 = 0x200;

/// Decode a run-length encoded map starting at `offset`.
///
/// A control byte's low 7 bits give a count; with the high bit set the next
/// byte is repeated `count` times, otherwise `count` literal bytes follow.
/// Decoding stops at 4096 bytes or at the end of input, and the result is
/// zero-padded to exactly 4096 bytes.
pub fn decode_rle(raw: &[u8], offset: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(ALPHA_MAP_SIZE);
    let mut pos = offset;

    while out.len() < ALPHA_MAP_SIZE && pos < raw.len() {
        let control = raw[pos];
        pos += 1;
        let count = (control & 0x7F) as usize;
        if control & 0x80 != 0 {
            let value = raw.get(pos).copied().unwrap_or(0);
            pos += 1;
            out.extend(std::iter::repeat_n(value, count));
        } else {
            let end = (pos + count).min(raw.len());
            out.extend_from_slice(&raw[pos..end]);
            pos = end;
        }
    }

    out.resize(ALPHA_MAP_SIZE, 0);
    out
}

/// Expand 2048 bytes of 4-bit alpha, low nibble first, scaling each nibble by 17.
pub fn expand_packed(packed: &[u8]) -> Vec<u8> {
    packed
        .iter()
        .flat_map(|byte| [(byte & 0x0F) * 17, (byte >> 4) * 17])
        .collect()
}

/// Read the alpha map of one layer from a cell's raw alpha block.
///
/// # Arguments
///
/// * `raw` - The cell's alpha block, if present.
/// * `offset` - Layer offset into the block.
/// * `layer_flags` - Layer flags; `0x200` selects run-length encoding.
/// * `big_alpha` - Map-wide flag for uncompressed 4096-byte maps.
///
/// # Returns
///
/// 4096 alpha values, or `None` when the block is too short for the
/// selected encoding.
pub fn read_alpha_map(
    raw: Option<&[u8]>,
    offset: usize,
    layer_flags: u32,
    big_alpha: bool,
) -> Option<Vec<u8>> {
    let raw = raw?;
    if layer_flags & LAYER_COMPRESSED_ALPHA != 0 {
        return Some(decode_rle(raw, offset));
    }

    let full = offset
        .checked_add(ALPHA_MAP_SIZE)
        .and_then(|end| raw.get(offset..end));
    if let Some(bytes) = full {
        return Some(bytes.to_vec());
    }
    if big_alpha {
        return None;
    }

    offset
        .checked_add(PACKED_SIZE)
        .and_then(|end| raw.get(offset..end))
        .map(expand_packed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn given_fill_then_copy_runs_when_decoding_rle_then_prefix_matches_and_rest_is_zero() {
        let decoded = decode_rle(&[0x83, 0xFF, 0x05, 0, 0, 0, 0, 0], 0);

        assert_eq!(decoded.len(), ALPHA_MAP_SIZE);
        assert_eq!(&decoded[..8], &[255, 255, 255, 0, 0, 0, 0, 0]);
        assert!(decoded[8..].iter().all(|value| *value == 0));
    }

    #[test]
    fn given_fill_run_past_limit_when_decoding_rle_then_output_is_truncated() {
        let raw: Vec<u8> = std::iter::repeat_n([0xFF, 7], 40).flatten().collect();

        let decoded = decode_rle(&raw, 0);

        assert_eq!(decoded.len(), ALPHA_MAP_SIZE);
        assert!(decoded.iter().all(|value| *value == 7));
    }

    #[test]
    fn given_packed_byte_when_expanding_then_low_nibble_comes_first() {
        assert_eq!(expand_packed(&[0xF1]), vec![17, 255]);
    }

    #[test]
    fn given_short_block_without_big_alpha_when_reading_then_packed_fallback_is_used() {
        let raw = vec![0x21u8; 2048];

        let alpha = read_alpha_map(Some(&raw), 0, 0, false).expect("alpha");

        assert_eq!(alpha.len(), ALPHA_MAP_SIZE);
        assert_eq!(&alpha[..2], &[17, 34]);
    }

    #[test]
    fn given_short_block_with_big_alpha_when_reading_then_map_is_absent() {
        let raw = vec![0u8; 2048];

        assert!(read_alpha_map(Some(&raw), 0, 0, true).is_none());
        assert!(read_alpha_map(None, 0, 0, false).is_none());
    }

    #[test]
    fn given_full_block_when_reading_uncompressed_then_bytes_are_copied() {
        let mut raw = vec![0u8; 10];
        raw.extend((0..4096).map(|i| (i % 251) as u8));

        let alpha = read_alpha_map(Some(&raw), 10, 0, true).expect("alpha");

        assert_eq!(alpha[250], 250);
        assert_eq!(alpha[251], 0);
    }

    proptest! {
        #[test]
        fn given_arbitrary_input_when_decoding_rle_then_output_is_always_4096_bytes(
            raw in proptest::collection::vec(any::<u8>(), 0..6000),
            offset in 0usize..100,
        ) {
            prop_assert_eq!(decode_rle(&raw, offset).len(), ALPHA_MAP_SIZE);
        }
    }
}
