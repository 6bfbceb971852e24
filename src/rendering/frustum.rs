//! # Frustum Culling Module
//!
//! Axis-aligned bounding boxes and view-frustum visibility testing for the
//! per-chunk draw loop.
//!
//! Planes are extracted from the combined view-projection matrix with the
//! Gribb/Hartmann row-combination method and normalized, so plane distances
//! are true signed world-space distances. Visibility uses the positive
//! vertex test: for each plane, only the AABB corner farthest along the
//! plane normal is examined, and one corner behind any plane proves the
//! whole box is outside.

use cgmath::{InnerSpace, Matrix, Matrix4, Point3, Vector3, Vector4};

use crate::world::chunk::CHUNK_SIZE;
use crate::world::ChunkKey;

/// An axis-aligned box in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Point3<f32>,
    /// Maximum corner.
    pub max: Point3<f32>,
}

impl Aabb {
    /// The world-space bounds of the chunk at `key`.
    pub fn chunk(key: ChunkKey) -> Self {
        let size = CHUNK_SIZE as f32;
        let min = Point3::new(
            key.x as f32 * size,
            key.y as f32 * size,
            key.z as f32 * size,
        );
        Self {
            min,
            max: Point3::new(min.x + size, min.y + size, min.z + size),
        }
    }
}

/// One plane of the frustum in `normal . p + d >= 0` form.
#[derive(Clone, Copy, Debug)]
struct Plane {
    normal: Vector3<f32>,
    d: f32,
}

impl Plane {
    /// Builds `a + sign_b * b` from two matrix rows and normalizes.
    fn from_rows(a: Vector4<f32>, b: Vector4<f32>, sign_b: f32) -> Self {
        let normal = Vector3::new(
            a.x + sign_b * b.x,
            a.y + sign_b * b.y,
            a.z + sign_b * b.z,
        );
        let d = a.w + sign_b * b.w;
        let len = normal.magnitude();
        if len > 1e-6 {
            Plane {
                normal: normal / len,
                d: d / len,
            }
        } else {
            Plane { normal, d }
        }
    }

    fn distance_to(&self, p: Point3<f32>) -> f32 {
        self.normal.x * p.x + self.normal.y * p.y + self.normal.z * p.z + self.d
    }
}

/// The six planes of a camera frustum.
pub struct Frustum {
    planes: [Plane; 6],
}

impl Frustum {
    /// Extracts the frustum from a column-major view-projection matrix.
    ///
    /// The near plane is `row2` alone, matching a [0, 1] clip-space depth
    /// range. The Y flip a typical projection applies does not matter here:
    /// the positive-vertex test is self-consistent as long as planes and
    /// boxes come from the same matrix convention.
    pub fn from_matrix(view_proj: Matrix4<f32>) -> Self {
        let r0 = view_proj.row(0);
        let r1 = view_proj.row(1);
        let r2 = view_proj.row(2);
        let r3 = view_proj.row(3);

        Self {
            planes: [
                Plane::from_rows(r3, r0, 1.0),  // left
                Plane::from_rows(r3, r0, -1.0), // right
                Plane::from_rows(r3, r1, 1.0),  // bottom
                Plane::from_rows(r3, r1, -1.0), // top
                Plane::from_rows(r2, r3, 0.0),  // near
                Plane::from_rows(r3, r2, -1.0), // far
            ],
        }
    }

    /// Returns `true` if any part of `aabb` may be inside the frustum.
    ///
    /// Conservative: a box that straddles a corner of the frustum can pass
    /// all six plane tests while being outside, which only costs a wasted
    /// draw, never a missing one.
    pub fn is_visible(&self, aabb: &Aabb) -> bool {
        for plane in &self.planes {
            let positive = Point3::new(
                if plane.normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );
            if plane.distance_to(positive) < 0.0 {
                return false;
            }
        }
        true
    }
}
