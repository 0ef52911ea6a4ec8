//! # Block Module
//!
//! This module provides the static block registry for the voxel engine.
//! Each block id maps to one `BlockProperties` row describing solidity,
//! transparency, light emission, atlas tiles and tint class. Special cases
//! such as water, leaves and glass are bits in the row, never code paths.

pub mod block_side;
pub mod block_type;

use block_type::BLOCK_TYPE_COUNT;

/// The underlying integer type used to represent block types in memory.
/// This is used for efficient storage and serialization of block data.
pub type BlockTypeSize = u8;

/// Runtime biome recolour applied to a block's texture.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TintClass {
    /// Rendered as-is.
    None = 0,
    /// Only the top face is tinted (grass).
    GrassTop = 1,
    /// All faces are tinted (leaves, tall grass).
    Foliage = 2,
    /// Tinted by the water colour.
    Water = 3,
}

/// One row of the block registry.
#[derive(Copy, Clone, Debug)]
pub struct BlockProperties {
    /// Human readable name, used in logs.
    pub name: &'static str,
    /// Participates in collision and blocks faces.
    pub solid: bool,
    /// Passes light and permits neighbouring faces to render.
    pub transparent: bool,
    /// Light strength in `0..=15`.
    pub emission: u8,
    /// Atlas tile index per face, in `BlockSide` order.
    pub face_slots: [u8; 6],
    /// Runtime recolour class.
    pub tint: TintClass,
}

const fn row(
    name: &'static str,
    solid: bool,
    transparent: bool,
    emission: u8,
    face_slots: [u8; 6],
    tint: TintClass,
) -> BlockProperties {
    BlockProperties {
        name,
        solid,
        transparent,
        emission,
        face_slots,
        tint,
    }
}

/// Same tile on every face.
const fn uniform(tile: u8) -> [u8; 6] {
    [tile; 6]
}

/// Distinct top and bottom tiles around a side tile.
/// Order is [FRONT, BACK, BOTTOM, TOP, LEFT, RIGHT].
const fn column(side: u8, bottom: u8, top: u8) -> [u8; 6] {
    [side, side, bottom, top, side, side]
}

/// Maps each block type to its properties.
///
/// Indexed by `BlockType as usize`; the order must match the enum.
pub static BLOCK_REGISTRY: [BlockProperties; BLOCK_TYPE_COUNT] = [
    row("air", false, true, 0, uniform(0), TintClass::None),
    row("water", false, true, 0, uniform(1), TintClass::Water),
    row("lava", false, false, 14, uniform(2), TintClass::None),
    row("stone", true, false, 0, uniform(3), TintClass::None),
    row("dirt", true, false, 0, uniform(4), TintClass::None),
    row("grass", true, false, 0, column(5, 4, 6), TintClass::GrassTop),
    row("cobblestone", true, false, 0, uniform(7), TintClass::None),
    row("planks", true, false, 0, uniform(8), TintClass::None),
    row("log", true, false, 0, column(9, 10, 10), TintClass::None),
    row("leaves", true, true, 0, uniform(11), TintClass::Foliage),
    row("sand", true, false, 0, uniform(12), TintClass::None),
    row("gravel", true, false, 0, uniform(13), TintClass::None),
    row("glass", true, true, 0, uniform(14), TintClass::None),
    row("bedrock", true, false, 0, uniform(15), TintClass::None),
    row("snow", true, false, 0, column(16, 4, 17), TintClass::None),
    row("cactus", true, false, 0, column(18, 19, 19), TintClass::None),
    row("glowstone", true, false, 15, uniform(20), TintClass::None),
    row("coal_ore", true, false, 0, uniform(21), TintClass::None),
    row("iron_ore", true, false, 0, uniform(22), TintClass::None),
    row("gold_ore", true, false, 0, uniform(23), TintClass::None),
    row("diamond_ore", true, false, 0, uniform(24), TintClass::None),
    row("redstone_ore", true, false, 0, uniform(25), TintClass::None),
    row("bricks", true, false, 0, uniform(26), TintClass::None),
    row("tall_grass", false, true, 0, uniform(27), TintClass::Foliage),
];
