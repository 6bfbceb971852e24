//! # Configuration Module
//!
//! This module defines the [`EngineConfig`] struct, the single injection
//! point for every tunable the engine core exposes. The core reads no
//! environment variables and holds no process-wide state; the host builds a
//! config (or deserializes one) and hands it to
//! [`ChunkManager::new`](crate::ChunkManager::new).

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Tunable parameters for the engine core.
///
/// All sizes are in bytes and all distances in world units (blocks). The
/// [`Default`] values match the sizes the engine was profiled with; hosts
/// targeting small GPUs usually shrink the pool sizes first.
///
/// # Examples
///
/// ```
/// use voxel_engine_core::EngineConfig;
///
/// let config = EngineConfig {
///     lod_dist_0: 96.0,
///     ..EngineConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of each geometry pool's vertex buffer in bytes.
    pub vertex_pool_bytes: u64,

    /// Capacity of each geometry pool's index buffer in bytes.
    pub index_pool_bytes: u64,

    /// Number of mesh worker threads. `0` means one thread per available
    /// hardware thread; any positive value forces that exact count.
    pub max_worker_threads: usize,

    /// Capacity of each priority ring queue. Must be a power of two.
    pub ring_capacity: usize,

    /// Camera distance below which chunks mesh at full detail (LOD 0).
    pub lod_dist_0: f32,

    /// Camera distance below which chunks mesh at half detail (LOD 1);
    /// beyond it they mesh at quarter detail (LOD 2).
    pub lod_dist_1: f32,

    /// Distance band around each LOD boundary inside which a chunk keeps its
    /// current LOD, preventing re-mesh flicker when the camera hovers near a
    /// threshold.
    pub lod_hysteresis: f32,

    /// Seconds over which a freshly uploaded chunk mesh fades in.
    pub fade_duration: f32,

    /// Byte alignment of every sub-allocation inside a geometry pool.
    pub alloc_align: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vertex_pool_bytes: 64 * 1024 * 1024,
            index_pool_bytes: 32 * 1024 * 1024,
            max_worker_threads: 0,
            ring_capacity: 65536,
            lod_dist_0: 64.0,
            lod_dist_1: 128.0,
            lod_hysteresis: 4.0,
            fade_duration: 1.0,
            alloc_align: 16,
        }
    }
}

impl EngineConfig {
    /// Checks the configuration for values the core cannot operate with.
    ///
    /// # Returns
    /// `Ok(())` if the configuration is usable, or
    /// [`EngineError::Config`] naming the first offending field.
    pub fn validate(&self) -> EngineResult<()> {
        if self.vertex_pool_bytes == 0 || self.index_pool_bytes == 0 {
            return Err(EngineError::Config(
                "pool capacities must be non-zero".into(),
            ));
        }
        if !self.ring_capacity.is_power_of_two() {
            return Err(EngineError::Config(format!(
                "ring_capacity must be a power of two, got {}",
                self.ring_capacity
            )));
        }
        if self.lod_dist_0 < 0.0 || self.lod_dist_1 < self.lod_dist_0 {
            return Err(EngineError::Config(format!(
                "lod distances must satisfy 0 <= lod_dist_0 <= lod_dist_1, \
                 got {} and {}",
                self.lod_dist_0, self.lod_dist_1
            )));
        }
        if self.lod_hysteresis < 0.0 {
            return Err(EngineError::Config(
                "lod_hysteresis must be non-negative".into(),
            ));
        }
        if self.alloc_align == 0 || !self.alloc_align.is_power_of_two() {
            return Err(EngineError::Config(format!(
                "alloc_align must be a power of two, got {}",
                self.alloc_align
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_power_of_two_ring() {
        let config = EngineConfig {
            ring_capacity: 1000,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_lod_distances() {
        let config = EngineConfig {
            lod_dist_0: 128.0,
            lod_dist_1: 64.0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
