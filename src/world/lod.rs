//! # LOD Controller Module
//!
//! Distance-based level-of-detail selection with hysteresis.
//!
//! A chunk's LOD is a coarsening factor for meshing: LOD 0 meshes per
//! voxel, LOD 1 per 2x2x2 super-block, LOD 2 per 4x4x4. Selection is by
//! Euclidean distance from the camera to the chunk center against two
//! ordered thresholds. When the chunk already has a LOD, each transition
//! must overshoot its threshold by the hysteresis band: moving to a coarser
//! level requires `dist > threshold + h`, moving to a finer level requires
//! `dist < threshold - h`. A camera hovering exactly on a boundary
//! therefore never re-meshes the chunk every frame.

use cgmath::{EuclideanSpace, MetricSpace, Point3};

use crate::config::EngineConfig;

use super::chunk::CHUNK_SIZE;
use super::ChunkKey;

/// Picks mesh LOD levels from camera distance.
pub struct LodController {
    camera_pos: Point3<f32>,
    dist0: f32,
    dist1: f32,
    hysteresis: f32,
}

impl LodController {
    /// Creates a controller from the config's LOD distances.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            camera_pos: Point3::origin(),
            dist0: config.lod_dist_0,
            dist1: config.lod_dist_1,
            hysteresis: config.lod_hysteresis,
        }
    }

    /// Stores the camera position used by subsequent LOD queries.
    pub fn set_camera_position(&mut self, pos: Point3<f32>) {
        self.camera_pos = pos;
    }

    /// The camera position LOD is currently evaluated against.
    pub fn camera_position(&self) -> Point3<f32> {
        self.camera_pos
    }

    /// Selects the LOD for the chunk at `key`.
    ///
    /// # Arguments
    /// * `key` - chunk grid coordinates
    /// * `current` - the chunk's present LOD, or `None` on first
    ///   assignment; hysteresis only applies when present
    ///
    /// # Returns
    /// 0, 1, or 2.
    pub fn calculate_lod(&self, key: ChunkKey, current: Option<u8>) -> u8 {
        let half = CHUNK_SIZE as f32 * 0.5;
        let center = Point3::new(
            key.x as f32 * CHUNK_SIZE as f32 + half,
            key.y as f32 * CHUNK_SIZE as f32 + half,
            key.z as f32 * CHUNK_SIZE as f32 + half,
        );
        let dist = center.distance(self.camera_pos);

        let d0 = self.dist0.max(0.0);
        let d1 = self.dist1.max(d0);
        let h = self.hysteresis.max(0.0);

        let Some(current) = current else {
            return if dist < d0 {
                0
            } else if dist < d1 {
                1
            } else {
                2
            };
        };

        match current {
            0 => {
                if dist > d0 + h {
                    if dist > d1 + h {
                        2
                    } else {
                        1
                    }
                } else {
                    0
                }
            }
            1 => {
                if dist < d0 - h {
                    0
                } else if dist > d1 + h {
                    2
                } else {
                    1
                }
            }
            _ => {
                if dist < d1 - h {
                    if dist < d0 - h {
                        0
                    } else {
                        1
                    }
                } else {
                    2
                }
            }
        }
    }
}
