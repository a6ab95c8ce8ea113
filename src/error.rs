use thiserror::Error;

/// Errors raised while decoding a single binary asset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The buffer does not start with the expected four-byte signature.
    #[error("{context}: expected magic {expected:?}, found {found:?}")]
    MagicMismatch {
        context: &'static str,
        expected: String,
        found: String,
    },

    /// A declared `(offset, length)` pair reaches past the end of the buffer.
    #[error("{context}: range {offset}..{offset}+{length} exceeds buffer of {buffer_len} bytes")]
    RangeViolation {
        context: &'static str,
        offset: usize,
        length: usize,
        buffer_len: usize,
    },

    /// Structurally valid bytes that do not form a usable record.
    #[error("{context}: {detail}")]
    InvalidFormat {
        context: &'static str,
        detail: String,
    },
}

/// Errors surfaced per asset by the extraction pipeline.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("not found in any archive: {path}")]
    NotFound { path: String },

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: DecodeError,
    },

    #[error("failed to decode image {path}: {detail}")]
    ImageDecode { path: String, detail: String },

    #[error("model {name} has no renderable geometry")]
    EmptyModel { name: String },

    #[error("failed to write glTF container: {0}")]
    Gltf(String),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ExtractError {
    pub fn decode(path: impl Into<String>, source: DecodeError) -> Self {
        Self::Decode {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_range_violation_when_formatting_then_message_names_offsets() {
        let error = DecodeError::RangeViolation {
            context: "vertices",
            offset: 16,
            length: 48,
            buffer_len: 40,
        };

        assert_eq!(
            error.to_string(),
            "vertices: range 16..16+48 exceeds buffer of 40 bytes"
        );
    }

    #[test]
    fn given_decode_error_when_wrapping_then_path_and_source_are_kept() {
        let source = DecodeError::MagicMismatch {
            context: "skin",
            expected: "SKIN".to_string(),
            found: "MD20".to_string(),
        };
        let error = ExtractError::decode("Character\\Human\\Male\\HumanMale00.skin", source);

        let message = error.to_string();
        assert!(message.contains("HumanMale00.skin"));
        assert!(message.contains("expected magic"));
    }
}
