use crate::{binary, error::DecodeError};

/// One model vertex in source space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct M2Vertex {
    pub position: [f32; 3],
    pub bone_weights: [u8; 4],
    pub bone_indices: [u8; 4],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub uv2: [f32; 2],
}

impl M2Vertex {
    pub const SIZE: usize = 48;

    pub fn parse(record: &[u8]) -> Result<Self, DecodeError> {
        const CTX: &str = "m2 vertex";
        let byte = |offset| binary::read_u8(record, offset, CTX);
        Ok(Self {
            position: binary::read_vec3(record, 0, CTX)?,
            bone_weights: [byte(12)?, byte(13)?, byte(14)?, byte(15)?],
            bone_indices: [byte(16)?, byte(17)?, byte(18)?, byte(19)?],
            normal: binary::read_vec3(record, 20, CTX)?,
            uv: [
                binary::read_f32(record, 32, CTX)?,
                binary::read_f32(record, 36, CTX)?,
            ],
            uv2: [
                binary::read_f32(record, 40, CTX)?,
                binary::read_f32(record, 44, CTX)?,
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::m2::test_support::vertex_bytes;

    #[test]
    fn given_vertex_record_when_parsing_then_weights_and_normal_are_decoded() {
        let bytes = vertex_bytes([0.5, -1.0, 2.0], [200, 55, 0, 0], [3, 7, 0, 0]);

        let vertex = M2Vertex::parse(&bytes).expect("vertex");

        assert_eq!(vertex.position, [0.5, -1.0, 2.0]);
        assert_eq!(vertex.bone_weights, [200, 55, 0, 0]);
        assert_eq!(vertex.bone_indices, [3, 7, 0, 0]);
        assert_eq!(vertex.normal, [0.0, 0.0, 1.0]);
        assert_eq!(vertex.uv2, [0.0, 0.0]);
    }

    #[test]
    fn given_truncated_record_when_parsing_then_range_violation_is_returned() {
        let bytes = vertex_bytes([0.0; 3], [0; 4], [0; 4]);

        assert!(M2Vertex::parse(&bytes[..40]).is_err());
    }
}
