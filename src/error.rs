//! # Error Module
//!
//! Error types for the fallible operations of the engine core.
//!
//! Most conditions the core encounters are expected and handled locally:
//! stale mesh results are dropped, voxel reads outside the loaded world
//! return air, and a missing neighbor is treated as air at the chunk border.
//! Only conditions the host must react to cross the crate boundary as an
//! [`EngineError`].

use thiserror::Error;

/// Errors surfaced to the host by the engine core.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A mesh could not be placed in any geometry pool, even after a fresh
    /// pool was created. The affected chunk stays dirty and is retried on
    /// the next frame, so this is not fatal unless it repeats forever.
    #[error(
        "geometry pool capacity exceeded: mesh needs {vertex_bytes} vertex bytes \
         and {index_bytes} index bytes"
    )]
    CapacityExceeded {
        /// Vertex bytes the failed allocation asked for.
        vertex_bytes: u64,
        /// Index bytes the failed allocation asked for.
        index_bytes: u64,
    },

    /// The batched staging upload could not be recorded or submitted. The
    /// affected render records are invalidated and their chunks left dirty
    /// for retry.
    #[error("gpu upload failed: {reason}")]
    Upload {
        /// Backend description of the failure.
        reason: String,
    },

    /// A mesh worker thread panicked. The pool has shut down and no further
    /// results will be produced; the world must be regenerated to recover.
    #[error("mesh worker thread panicked; worker pool has shut down")]
    WorkerPanicked,

    /// The supplied [`EngineConfig`](crate::EngineConfig) failed validation.
    #[error("invalid engine configuration: {0}")]
    Config(String),
}

/// Type alias for results in the engine core.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::CapacityExceeded {
            vertex_bytes: 1024,
            index_bytes: 512,
        };
        assert_eq!(
            err.to_string(),
            "geometry pool capacity exceeded: mesh needs 1024 vertex bytes \
             and 512 index bytes"
        );
    }
}
