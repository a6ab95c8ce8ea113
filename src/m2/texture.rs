use crate::{
    binary::{self, ArrayRef},
    error::DecodeError,
};

/// Where a texture's image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureSlot {
    /// Filename embedded in the model.
    File(String),
    /// Supplied at runtime by the game (skin, hair, cape, ...), identified by type id.
    Runtime(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct M2Texture {
    pub kind: u32,
    pub flags: u32,
    pub slot: TextureSlot,
}

impl M2Texture {
    pub const SIZE: usize = 16;

    /// Filename for embedded textures with a non-empty name.
    pub fn filename(&self) -> Option<&str> {
        match &self.slot {
            TextureSlot::File(name) if !name.is_empty() => Some(name),
            _ => None,
        }
    }
}

pub(super) fn parse_textures(buf: &[u8], array: ArrayRef) -> Result<Vec<M2Texture>, DecodeError> {
    array.decode(buf, M2Texture::SIZE, "m2 textures", |record| {
        let kind = binary::read_u32(record, 0, "m2 texture")?;
        let flags = binary::read_u32(record, 4, "m2 texture")?;
        let name = ArrayRef::read(record, 8, "m2 texture")?;
        let slot = if kind == 0 {
            let raw = name.bytes(buf, 1, "m2 texture name")?;
            TextureSlot::File(binary::trimmed_string(raw))
        } else {
            TextureSlot::Runtime(kind)
        };
        Ok(M2Texture { kind, flags, slot })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::m2::{M2File, test_support::M2Builder};

    fn texture_record(kind: u32, name_len: u32, name_offset: u32) -> Vec<u8> {
        [kind, 0, name_len, name_offset]
            .iter()
            .flat_map(|value| value.to_le_bytes())
            .collect()
    }

    #[test]
    fn given_file_and_runtime_textures_when_decoding_then_only_file_has_name() {
        let mut builder = M2Builder::new();
        let name_offset = builder.append(b"World\\Tree.blp\0");
        let mut records = texture_record(0, 15, name_offset);
        records.extend(texture_record(1, 0, 0));
        builder.array(0x50, 2, &records);

        let model = M2File::parse(&builder.buf).expect("header");
        let textures = model.textures().expect("textures");

        assert_eq!(textures[0].filename(), Some("World\\Tree.blp"));
        assert_eq!(textures[1].slot, TextureSlot::Runtime(1));
        assert_eq!(textures[1].filename(), None);
    }

    #[test]
    fn given_combo_table_when_decoding_then_u16_values_are_returned() {
        let mut builder = M2Builder::new();
        builder.array(0x80, 3, &[2, 0, 0, 0, 1, 0]);

        let model = M2File::parse(&builder.buf).expect("header");

        assert_eq!(model.texture_combos().expect("combos"), vec![2, 0, 1]);
    }

    #[test]
    fn given_name_past_end_when_decoding_then_error_is_fatal() {
        let mut builder = M2Builder::new();
        let records = texture_record(0, 64, 0xFFFF);
        builder.array(0x50, 1, &records);

        let model = M2File::parse(&builder.buf).expect("header");

        assert!(model.textures().is_err());
    }
}
