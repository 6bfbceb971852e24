//! Vertex data structures and layouts for voxel rendering.
//!
//! This module defines the packed vertex format emitted by the mesher and
//! the per-chunk push constant block, and provides the buffer layout the
//! host's pipeline consumes.

use bytemuck::{Pod, Zeroable};

/// A vertex in the voxel rendering pipeline.
///
/// Coordinates are local to the owning chunk (0..=`CHUNK_SIZE` on face
/// layers), so a byte per axis is enough regardless of world size; the
/// shader adds the chunk origin from the push constants to reconstruct the
/// world position. Keeping the vertex at 8 bytes is what lets whole worlds
/// of geometry share a handful of pools.
///
/// # Memory Layout
/// - `x`, `y`, `z`: local position (3 bytes)
/// - `face_id`: 0=+X, 1=-X, 2=+Y, 3=-Y, 4=+Z, 5=-Z (1 byte)
/// - `ao`: ambient occlusion level 0-3, interpolated across the quad (1 byte)
/// - `reserved`: future per-vertex light level (1 byte)
/// - `palette_index`: block type, little-endian u16 (2 bytes)
///
/// Total size: 8 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct VoxelVertex {
    /// Local X within the chunk.
    pub x: u8,
    /// Local Y within the chunk.
    pub y: u8,
    /// Local Z within the chunk.
    pub z: u8,
    /// Which face of the voxel this vertex belongs to.
    pub face_id: u8,
    /// Ambient occlusion level, 0 (darkest) to 3 (open).
    pub ao: u8,
    /// Reserved for a future light level.
    pub reserved: u8,
    /// Block palette index.
    pub palette_index: u16,
}

const _: () = assert!(std::mem::size_of::<VoxelVertex>() == 8);

impl VoxelVertex {
    /// Returns the vertex buffer layout description for the shader pipeline.
    ///
    /// # Shader Attributes
    /// - `location = 0`: `uvec4` of `(x, y, z, face_id)`
    /// - `location = 1`: `uvec4` of `(ao, reserved, palette_lo, palette_hi)`
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 2] = [
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Uint8x4,
            },
            wgpu::VertexAttribute {
                offset: 4,
                shader_location: 1,
                format: wgpu::VertexFormat::Uint8x4,
            },
        ];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<VoxelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}

/// Byte offset of the per-chunk push constant block inside the host's
/// pipeline layout. The range below this offset carries the host's own
/// view/projection/lighting data.
pub const CHUNK_PUSH_CONSTANT_OFFSET: u32 = 128;

/// Per-chunk constants pushed before each chunk's draw call.
///
/// # Memory Layout
/// - `origin`: chunk world origin in blocks, `vec3<f32>` (12 bytes)
/// - `fade_progress`: 0.0 (just uploaded) to 1.0 (fully faded in) (4 bytes)
///
/// Total size: 16 bytes, pushed at offset [`CHUNK_PUSH_CONSTANT_OFFSET`]
/// for the vertex and fragment stages.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct ChunkPushConstants {
    /// World-space origin of the chunk's (0, 0, 0) corner.
    pub origin: [f32; 3],
    /// Fade-in progress of the most recent mesh upload.
    pub fade_progress: f32,
}

const _: () = assert!(std::mem::size_of::<ChunkPushConstants>() == 16);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout_matches_wire_contract() {
        let layout = VoxelVertex::desc();
        assert_eq!(layout.array_stride, 8);
        assert_eq!(layout.attributes.len(), 2);
        assert_eq!(layout.attributes[0].offset, 0);
        assert_eq!(layout.attributes[1].offset, 4);
        assert_eq!(layout.attributes[0].format, wgpu::VertexFormat::Uint8x4);
        assert_eq!(layout.attributes[1].format, wgpu::VertexFormat::Uint8x4);
    }

    #[test]
    fn test_palette_bytes_are_little_endian() {
        let vertex = VoxelVertex {
            x: 0,
            y: 0,
            z: 0,
            face_id: 0,
            ao: 0,
            reserved: 0,
            palette_index: 0x0201,
        };
        let bytes: &[u8] = bytemuck::bytes_of(&vertex);
        assert_eq!(bytes[6], 0x01);
        assert_eq!(bytes[7], 0x02);
    }
}
