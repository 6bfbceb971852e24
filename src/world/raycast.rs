//! # Raycast Module
//!
//! Voxel picking via Amanatides-Woo DDA traversal.
//!
//! The ray walks voxel boundaries in order of crossing distance, stepping
//! first and testing the voxel it entered, so a ray starting inside a solid
//! voxel does not immediately hit its own cell. The returned normal is the
//! face through which the hit voxel was entered, which is exactly the face
//! a block-place action builds against.

use cgmath::{InnerSpace, Point3, Vector3};

use super::storage::ChunkStorage;

/// Result of a successful voxel pick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    /// World coordinates of the solid voxel that was hit.
    pub voxel: Point3<i32>,
    /// Unit normal of the face the ray crossed to enter the voxel.
    pub normal: Vector3<i32>,
    /// Distance from the ray origin to the crossing.
    pub distance: f32,
}

/// Casts a ray through the voxel world.
///
/// # Arguments
/// * `storage` - the world to sample
/// * `origin` - ray start in world space
/// * `dir` - ray direction; normalized internally, near-zero vectors miss
/// * `max_dist` - traversal cutoff in world units
///
/// # Returns
/// The first solid voxel along the ray, or `None` within `max_dist`.
pub fn raycast(
    storage: &ChunkStorage,
    origin: Point3<f32>,
    dir: Vector3<f32>,
    max_dist: f32,
) -> Option<RayHit> {
    let len = dir.magnitude();
    if len < 1e-6 {
        return None;
    }
    let dir = dir / len;

    let mut voxel = Point3::new(
        origin.x.floor() as i32,
        origin.y.floor() as i32,
        origin.z.floor() as i32,
    );

    let step = Vector3::new(
        if dir.x >= 0.0 { 1 } else { -1 },
        if dir.y >= 0.0 { 1 } else { -1 },
        if dir.z >= 0.0 { 1 } else { -1 },
    );

    // Per axis: distance along the ray to the next boundary, and between
    // consecutive boundaries.
    let axis_setup = |d: f32, position: f32, cell: i32, step: i32| -> (f32, f32) {
        if d.abs() < 1e-9 {
            return (f32::INFINITY, f32::INFINITY);
        }
        let delta = (1.0 / d).abs();
        let bound = if step > 0 {
            (cell + 1) as f32 - position
        } else {
            position - cell as f32
        };
        (bound * delta, delta)
    };

    let (mut t_max_x, t_delta_x) = axis_setup(dir.x, origin.x, voxel.x, step.x);
    let (mut t_max_y, t_delta_y) = axis_setup(dir.y, origin.y, voxel.y, step.y);
    let (mut t_max_z, t_delta_z) = axis_setup(dir.z, origin.z, voxel.z, step.z);

    let mut normal = Vector3::new(0, 0, 0);
    let max_steps = (max_dist * 3.0) as i32 + 64;

    for _ in 0..max_steps {
        // Step across the nearest boundary, then test the voxel entered.
        let t = if t_max_x < t_max_y && t_max_x < t_max_z {
            let t = t_max_x;
            voxel.x += step.x;
            t_max_x += t_delta_x;
            normal = Vector3::new(-step.x, 0, 0);
            t
        } else if t_max_y < t_max_z {
            let t = t_max_y;
            voxel.y += step.y;
            t_max_y += t_delta_y;
            normal = Vector3::new(0, -step.y, 0);
            t
        } else {
            let t = t_max_z;
            voxel.z += step.z;
            t_max_z += t_delta_z;
            normal = Vector3::new(0, 0, -step.z);
            t
        };

        if t > max_dist {
            break;
        }

        if storage.get_voxel(voxel.x, voxel.y, voxel.z).is_solid() {
            return Some(RayHit {
                voxel,
                normal,
                distance: t,
            });
        }
    }

    None
}
