//! # Block Palette Module
//!
//! This module defines the block palette: the table mapping the 12-bit
//! palette index stored in every voxel to the static properties of its
//! block type.
//!
//! The palette is owned by whoever creates it and passed down explicitly.
//! The engine core consults it when constructing voxels from block types
//! (placement, terrain) and hosts consult it for display names and tint
//! colors; per-voxel state (health, baked AO) stays in the voxel record.

use serde::{Deserialize, Serialize};

use super::voxel::{VoxelData, FLAG_SOLID, PALETTE_DIRT, PALETTE_GRASS, PALETTE_STONE};

/// Static properties shared by every voxel of one block type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Palette index this entry occupies (0-4095).
    pub palette_index: u16,
    /// Display name.
    pub name: String,
    /// Property bits stamped onto placed voxels (`FLAG_*` constants).
    pub flags: u8,
    /// RGBA tint, linear 0-1.
    pub color: [f32; 4],
    /// Hits a full-health voxel of this type survives before breaking.
    pub durability: u8,
}

/// The table of registered block types.
///
/// Index 0 is always air and cannot be replaced.
///
/// # Examples
///
/// ```
/// use voxel_engine_core::world::palette::BlockPalette;
///
/// let palette = BlockPalette::with_defaults();
/// assert_eq!(palette.get(1).unwrap().name, "stone");
/// assert!(palette.is_solid(1));
/// assert!(!palette.is_solid(0));
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BlockPalette {
    entries: Vec<Option<BlockInfo>>,
}

impl BlockPalette {
    /// Maximum number of palette entries (12-bit index).
    pub const CAPACITY: usize = 4096;

    /// Creates an empty palette; only air resolves.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a palette preloaded with the built-in terrain blocks.
    pub fn with_defaults() -> Self {
        let mut palette = Self::new();
        palette.register(BlockInfo {
            palette_index: PALETTE_STONE,
            name: "stone".into(),
            flags: FLAG_SOLID,
            color: [0.5, 0.5, 0.5, 1.0],
            durability: 8,
        });
        palette.register(BlockInfo {
            palette_index: PALETTE_DIRT,
            name: "dirt".into(),
            flags: FLAG_SOLID,
            color: [0.5, 0.3, 0.1, 1.0],
            durability: 3,
        });
        palette.register(BlockInfo {
            palette_index: PALETTE_GRASS,
            name: "grass".into(),
            flags: FLAG_SOLID,
            color: [0.3, 0.7, 0.2, 1.0],
            durability: 3,
        });
        palette
    }

    /// Registers or replaces a block type.
    ///
    /// Entries above [`CAPACITY`](Self::CAPACITY) and entry 0 (air) are
    /// ignored.
    pub fn register(&mut self, info: BlockInfo) {
        let index = info.palette_index as usize;
        if index == 0 || index >= Self::CAPACITY {
            return;
        }
        if self.entries.len() <= index {
            self.entries.resize(index + 1, None);
        }
        self.entries[index] = Some(info);
    }

    /// Looks up a block type by palette index.
    pub fn get(&self, palette_index: u16) -> Option<&BlockInfo> {
        self.entries.get(palette_index as usize)?.as_ref()
    }

    /// `true` if the palette entry exists and is flagged solid.
    pub fn is_solid(&self, palette_index: u16) -> bool {
        self.get(palette_index)
            .map(|info| info.flags & FLAG_SOLID != 0)
            .unwrap_or(false)
    }

    /// Builds a full-health voxel of the given block type.
    ///
    /// # Returns
    /// `None` for unregistered indices; index 0 yields air.
    pub fn make_voxel(&self, palette_index: u16) -> Option<VoxelData> {
        if palette_index == 0 {
            return Some(VoxelData::AIR);
        }
        let info = self.get(palette_index)?;
        Some(VoxelData::make(info.palette_index, 255, 0, info.flags))
    }

    /// Number of registered block types (air excluded).
    pub fn len(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    /// `true` if nothing besides air is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
