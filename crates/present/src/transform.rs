//! Uniform buffer payload for the vertex shader.
//!
//! The structure must match the shader's uniform block layout exactly. It
//! uses `#[repr(C)]` for a predictable layout and implements `Pod` and
//! `Zeroable` for safe byte casting.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Per-frame transform uniform data.
///
/// A single column-major 4x4 matrix at offset 0, 64 bytes total. The
/// baseline writes the identity every frame; the matrix is the only part
/// of the frame's command stream that varies.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct TransformUbo {
    /// Transform applied to every vertex position.
    pub transform: Mat4,
}

impl TransformUbo {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Creates an identity transform.
    pub fn identity() -> Self {
        Self {
            transform: Mat4::IDENTITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_ubo_size() {
        // One Mat4 = 64 bytes
        assert_eq!(TransformUbo::SIZE, 64);
    }

    #[test]
    fn test_transform_ubo_alignment() {
        // Mat4 requires 16-byte alignment for GPU consumption
        assert_eq!(std::mem::align_of::<TransformUbo>(), 16);
    }

    #[test]
    fn test_transform_ubo_identity_bytes() {
        let ubo = TransformUbo::identity();
        let bytes: &[u8] = bytemuck::bytes_of(&ubo);
        assert_eq!(bytes.len(), TransformUbo::SIZE);

        let restored: &TransformUbo = bytemuck::from_bytes(bytes);
        assert_eq!(restored.transform, Mat4::IDENTITY);
    }
}
