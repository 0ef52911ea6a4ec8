//! # Block Type Module
//!
//! This module defines the different types of blocks in the voxel world.
//! Block behaviour is data: every variant indexes a row of the static block
//! registry, and all queries are table lookups.

use std::fmt;

use num_derive::FromPrimitive;

use super::{block_side::BlockSide, BlockProperties, BlockTypeSize, TintClass, BLOCK_REGISTRY};

/// Enumerates all possible block types in the voxel world.
///
/// The discriminant is the on-disk block id, so variants must never be
/// reordered. The `FromPrimitive` derive allows conversion from stored bytes.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, FromPrimitive, Default)]
pub enum BlockType {
    /// Empty space.
    #[default]
    Air = 0,
    /// Flowing or still water; the level lives in the chunk's water field.
    Water = 1,
    /// Molten rock; emits light but is not walkable.
    Lava = 2,
    /// Default underground block.
    Stone = 3,
    /// Subsoil.
    Dirt = 4,
    /// Dirt with a grass top, tinted by biome.
    Grass = 5,
    /// Player building block.
    Cobblestone = 6,
    /// Player building block.
    Planks = 7,
    /// Tree trunk.
    Log = 8,
    /// Tree canopy; solid for collision, transparent for culling.
    Leaves = 9,
    /// Beach and desert surface.
    Sand = 10,
    /// Loose stone found under water.
    Gravel = 11,
    /// Clear building block.
    Glass = 12,
    /// Indestructible world floor.
    Bedrock = 13,
    /// Cold high-altitude surface.
    Snow = 14,
    /// Desert plant.
    Cactus = 15,
    /// Full-strength light source.
    Glowstone = 16,
    /// Shallow, common ore.
    CoalOre = 17,
    /// Mid-depth ore.
    IronOre = 18,
    /// Deep ore.
    GoldOre = 19,
    /// Deepest ore.
    DiamondOre = 20,
    /// Deep ore.
    RedstoneOre = 21,
    /// Player building block.
    Bricks = 22,
    /// Ground cover; not solid.
    TallGrass = 23,
}

/// Number of entries in the block registry.
pub const BLOCK_TYPE_COUNT: usize = 24;

impl BlockType {
    /// Converts a stored `BlockTypeSize` back to a `BlockType`.
    ///
    /// # Returns
    /// `None` for ids the registry does not know about.
    pub fn from_id(id: BlockTypeSize) -> Option<Self> {
        num_traits::FromPrimitive::from_u8(id)
    }

    /// The id written to disk and packed into chunk storage.
    #[inline]
    pub fn id(self) -> BlockTypeSize {
        self as BlockTypeSize
    }

    /// The registry row describing this block.
    #[inline]
    pub fn properties(self) -> &'static BlockProperties {
        &BLOCK_REGISTRY[self as usize]
    }

    /// Participates in collision and blocks faces.
    #[inline]
    pub fn is_solid(self) -> bool {
        self.properties().solid
    }

    /// Passes light and lets neighbouring faces render.
    #[inline]
    pub fn is_transparent(self) -> bool {
        self.properties().transparent
    }

    /// Solid and not transparent; what ambient occlusion counts.
    #[inline]
    pub fn is_opaque_solid(self) -> bool {
        let props = self.properties();
        props.solid && !props.transparent
    }

    /// Light strength in `0..=15`.
    #[inline]
    pub fn emission(self) -> u8 {
        self.properties().emission
    }

    /// Atlas tile for the given face.
    #[inline]
    pub fn face_slot(self, side: BlockSide) -> u8 {
        self.properties().face_slots[side as usize]
    }

    /// Which runtime recolour applies to this block.
    #[inline]
    pub fn tint(self) -> TintClass {
        self.properties().tint
    }

    /// Produces geometry in the opaque mesh pass.
    #[inline]
    pub fn is_meshed_opaque(self) -> bool {
        !matches!(self, BlockType::Air | BlockType::Water)
    }

    /// Water may flow into this cell, replacing what is there.
    #[inline]
    pub fn is_water_replaceable(self) -> bool {
        matches!(self, BlockType::Air | BlockType::Water | BlockType::TallGrass)
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.properties().name)
    }
}
