//! # Chunk Module
//!
//! This module provides the `Chunk` struct: a fixed 16x256x16 column of voxels
//! keyed by its `(cx, cz)` column coordinate and sliced into sixteen 16-tall
//! sub-chunks for culling and meshing.
//!
//! ## Storage
//!
//! - `blocks`: one `BlockType` byte per cell, packed `x`-major, then `z`, with
//!   `y` innermost. This is also the on-disk order, so persistence is a copy.
//! - `water`: 4 bits per cell, `0` = none, `8` = source, `1..=7` = flowing.
//! - `light`: 4 bits per cell of block light.
//!
//! Alongside the cells the chunk keeps incremental bookkeeping that lets the
//! mesher and the water simulator skip work cheaply: per-layer non-air
//! counts (from which the tight vertical extent is derived), a water cell
//! count, dirty and revision markers, and a per-sub-chunk emptiness flag
//! written after meshing.
//!
//! Coordinates outside the column read as air and writes to them are dropped.

use std::sync::atomic::{AtomicBool, Ordering};

use bitvec::prelude::*;
use log::warn;

use super::block::block_type::BlockType;

pub mod chunk_iteration;
pub mod coords;
pub mod nibble_array;

pub use coords::{world_to_local, ChunkPos, SubChunkKey};
use nibble_array::NibbleArray;

/// The horizontal dimension (X and Z) of a chunk in blocks.
pub const CHUNK_WIDTH: i32 = 16;
/// The vertical dimension of a chunk in blocks.
pub const CHUNK_HEIGHT: i32 = 256;
/// Height of one sub-chunk slice.
pub const SUB_CHUNK_HEIGHT: i32 = 16;
/// Number of sub-chunk slices per chunk.
pub const SUB_CHUNKS: usize = (CHUNK_HEIGHT / SUB_CHUNK_HEIGHT) as usize;
/// Number of cells in one chunk.
pub const CHUNK_VOLUME: usize = (CHUNK_WIDTH * CHUNK_WIDTH * CHUNK_HEIGHT) as usize;

/// Water level of a source block.
pub const WATER_SOURCE_LEVEL: u8 = 8;
/// Highest block light level.
pub const MAX_LIGHT_LEVEL: u8 = 15;

static WATER_INVARIANT_HEALED: AtomicBool = AtomicBool::new(false);

/// Represents a 16x256x16 column of voxel blocks in the world.
#[derive(Clone, Debug)]
pub struct Chunk {
    /// The position of this chunk in chunk coordinates (not block coordinates).
    pub position: ChunkPos,
    blocks: Vec<BlockType>,
    water: NibbleArray,
    light: NibbleArray,
    /// Non-air cell count for each Y layer.
    layer_counts: Vec<u16>,
    min_y: i32,
    max_y: i32,
    water_cells: u32,
    revision: u64,
    sub_chunk_empty: BitArray<[u16; 1], Lsb0>,
    /// Needs a remesh.
    pub dirty: bool,
    /// The water simulator should visit this chunk on its next tick.
    pub has_water_updates: bool,
    /// Edited since it was generated or loaded.
    pub modified: bool,
    /// Neighbours whose feature spills this chunk already holds.
    pub spill_sources: Vec<ChunkPos>,
    /// Whether neighbour feature spills may still be written into this chunk.
    /// Chunks read back from disk hold their final blocks and refuse them.
    pub accepts_spills: bool,
}

impl Chunk {
    /// Creates a new, completely empty chunk (all blocks are air).
    pub fn empty(position: ChunkPos) -> Self {
        Chunk {
            position,
            blocks: vec![BlockType::Air; CHUNK_VOLUME],
            water: NibbleArray::new(CHUNK_VOLUME),
            light: NibbleArray::new(CHUNK_VOLUME),
            layer_counts: vec![0; CHUNK_HEIGHT as usize],
            min_y: CHUNK_HEIGHT,
            max_y: -1,
            water_cells: 0,
            revision: 0,
            sub_chunk_empty: BitArray::new([u16::MAX]),
            dirty: true,
            has_water_updates: false,
            modified: false,
            spill_sources: Vec::new(),
            accepts_spills: true,
        }
    }

    /// Rebuilds a chunk from raw block ids in storage order.
    ///
    /// Water cells take their level from `water_levels` when given, otherwise
    /// they are sources. Returns `None` when the length does not match
    /// `CHUNK_VOLUME` or an id is unknown.
    pub fn from_block_ids(
        position: ChunkPos,
        ids: &[u8],
        water_levels: Option<&[u8]>,
    ) -> Option<Self> {
        if ids.len() != CHUNK_VOLUME {
            return None;
        }
        if water_levels.is_some_and(|levels| levels.len() != CHUNK_VOLUME) {
            return None;
        }
        let mut chunk = Chunk::empty(position);
        for (index, id) in ids.iter().enumerate() {
            let block = BlockType::from_id(*id)?;
            if block == BlockType::Air {
                continue;
            }
            let (x, y, z) = Self::coords_of(index);
            chunk.set_block(x, y, z, block);
            if block == BlockType::Water {
                if let Some(levels) = water_levels {
                    let level = levels[index].min(WATER_SOURCE_LEVEL);
                    if level > 0 {
                        chunk.water.set(index, level);
                    }
                }
            }
        }
        chunk.revision = 0;
        chunk.modified = false;
        chunk.accepts_spills = false;
        Some(chunk)
    }

    /// Storage index of a local coordinate. The caller guarantees bounds.
    #[inline]
    pub fn index(x: i32, y: i32, z: i32) -> usize {
        ((x * CHUNK_WIDTH + z) * CHUNK_HEIGHT + y) as usize
    }

    /// Inverse of [`Chunk::index`].
    #[inline]
    pub fn coords_of(index: usize) -> (i32, i32, i32) {
        let index = index as i32;
        let y = index % CHUNK_HEIGHT;
        let column = index / CHUNK_HEIGHT;
        (column / CHUNK_WIDTH, y, column % CHUNK_WIDTH)
    }

    /// Whether a local coordinate lies inside the column.
    #[inline]
    pub fn in_bounds(x: i32, y: i32, z: i32) -> bool {
        (0..CHUNK_WIDTH).contains(&x)
            && (0..CHUNK_HEIGHT).contains(&y)
            && (0..CHUNK_WIDTH).contains(&z)
    }

    /// Gets the block at chunk-local coordinates; air when out of range.
    #[inline]
    pub fn get_block(&self, x: i32, y: i32, z: i32) -> BlockType {
        if Self::in_bounds(x, y, z) {
            self.blocks[Self::index(x, y, z)]
        } else {
            BlockType::Air
        }
    }

    /// Sets the block at chunk-local coordinates.
    ///
    /// Keeps the water field, the vertical extent and the water count in step
    /// with the new block, marks the chunk dirty and bumps its revision.
    ///
    /// # Returns
    /// `true` if the cell changed. Out-of-range writes are dropped.
    pub fn set_block(&mut self, x: i32, y: i32, z: i32, block: BlockType) -> bool {
        if !Self::in_bounds(x, y, z) {
            return false;
        }
        let index = Self::index(x, y, z);
        let previous = self.blocks[index];
        if previous == block {
            return false;
        }
        self.blocks[index] = block;

        match (previous == BlockType::Air, block == BlockType::Air) {
            (true, false) => self.add_to_layer(y),
            (false, true) => self.remove_from_layer(y),
            _ => {}
        }

        if previous == BlockType::Water {
            self.water_cells -= 1;
            self.water.set(index, 0);
        }
        if block == BlockType::Water {
            self.water_cells += 1;
            self.water.set(index, WATER_SOURCE_LEVEL);
            self.has_water_updates = true;
        }

        self.dirty = true;
        self.revision += 1;
        true
    }

    fn add_to_layer(&mut self, y: i32) {
        self.layer_counts[y as usize] += 1;
        self.min_y = self.min_y.min(y);
        self.max_y = self.max_y.max(y);
    }

    fn remove_from_layer(&mut self, y: i32) {
        self.layer_counts[y as usize] -= 1;
        if self.layer_counts[y as usize] > 0 {
            return;
        }
        if y == self.min_y {
            self.min_y = (y + 1..=self.max_y)
                .find(|layer| self.layer_counts[*layer as usize] > 0)
                .unwrap_or(CHUNK_HEIGHT);
        }
        if y == self.max_y {
            self.max_y = (self.min_y..y)
                .rev()
                .find(|layer| self.layer_counts[*layer as usize] > 0)
                .unwrap_or(-1);
        }
        if self.min_y > self.max_y {
            self.min_y = CHUNK_HEIGHT;
            self.max_y = -1;
        }
    }

    /// Gets the water level at chunk-local coordinates.
    ///
    /// A non-zero level on a non-water cell violates the storage invariant;
    /// it reads as zero here and is zeroed by [`Chunk::heal_water_level`].
    pub fn get_water_level(&self, x: i32, y: i32, z: i32) -> u8 {
        if !Self::in_bounds(x, y, z) {
            return 0;
        }
        let index = Self::index(x, y, z);
        if self.blocks[index] != BlockType::Water {
            return 0;
        }
        self.water.get(index)
    }

    /// Sets the water level at chunk-local coordinates.
    ///
    /// A positive level turns the cell into water; zero on a water cell turns
    /// it back into air. Levels are clamped to the source level.
    pub fn set_water_level(&mut self, x: i32, y: i32, z: i32, level: u8) -> bool {
        if !Self::in_bounds(x, y, z) {
            return false;
        }
        let level = level.min(WATER_SOURCE_LEVEL);
        let index = Self::index(x, y, z);
        let block = self.blocks[index];
        if level == 0 {
            return block == BlockType::Water && self.set_block(x, y, z, BlockType::Air);
        }
        let mut changed = false;
        if block != BlockType::Water {
            changed = self.set_block(x, y, z, BlockType::Water);
        }
        if self.water.get(index) != level {
            self.water.set(index, level);
            self.dirty = true;
            self.revision += 1;
            changed = true;
        }
        if changed {
            self.has_water_updates = true;
        }
        changed
    }

    /// Zeroes a stray water level on a non-water cell, logging once per session.
    ///
    /// # Returns
    /// `true` if a violation was found and repaired.
    pub fn heal_water_level(&mut self, x: i32, y: i32, z: i32) -> bool {
        if !Self::in_bounds(x, y, z) {
            return false;
        }
        let index = Self::index(x, y, z);
        if self.blocks[index] == BlockType::Water || self.water.get(index) == 0 {
            return false;
        }
        self.water.set(index, 0);
        if !WATER_INVARIANT_HEALED.swap(true, Ordering::Relaxed) {
            warn!(
                "Water level on non-water cell ({}, {}, {}) in chunk {:?}; zeroed",
                x, y, z, self.position
            );
        }
        true
    }

    /// Gets the block light at chunk-local coordinates; `0` when out of range.
    #[inline]
    pub fn get_light(&self, x: i32, y: i32, z: i32) -> u8 {
        if Self::in_bounds(x, y, z) {
            self.light.get(Self::index(x, y, z))
        } else {
            0
        }
    }

    /// Sets the block light at chunk-local coordinates, clamped to 15.
    pub fn set_light(&mut self, x: i32, y: i32, z: i32, level: u8) {
        if Self::in_bounds(x, y, z) {
            self.light
                .set(Self::index(x, y, z), level.min(MAX_LIGHT_LEVEL));
        }
    }

    /// Zeroes the whole light field.
    pub fn clear_light(&mut self) {
        self.light.clear();
    }

    /// Lowest Y holding a non-air cell (`CHUNK_HEIGHT` when empty).
    pub fn min_y(&self) -> i32 {
        self.min_y
    }

    /// Highest Y holding a non-air cell (`-1` when empty).
    pub fn max_y(&self) -> i32 {
        self.max_y
    }

    /// Tight `(min_y, max_y)` bounds over non-air cells, if any exist.
    pub fn vertical_extent(&self) -> Option<(i32, i32)> {
        (self.min_y <= self.max_y).then_some((self.min_y, self.max_y))
    }

    /// Whether any non-air cell falls inside sub-chunk `sub_y`.
    pub fn sub_chunk_has_blocks(&self, sub_y: usize) -> bool {
        let start = sub_y * SUB_CHUNK_HEIGHT as usize;
        self.layer_counts[start..start + SUB_CHUNK_HEIGHT as usize]
            .iter()
            .any(|count| *count > 0)
    }

    /// Whether the chunk holds any water.
    pub fn has_water(&self) -> bool {
        self.water_cells > 0
    }

    /// Number of water cells.
    pub fn water_cells(&self) -> u32 {
        self.water_cells
    }

    /// Edit counter; bumped by every cell change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The `isEmpty` flag written after meshing.
    pub fn is_sub_chunk_empty(&self, sub_y: usize) -> bool {
        self.sub_chunk_empty[sub_y]
    }

    /// Records the meshing result for sub-chunk `sub_y`.
    pub fn set_sub_chunk_empty(&mut self, sub_y: usize, empty: bool) {
        self.sub_chunk_empty.set(sub_y, empty);
    }

    /// Raw block storage in storage order.
    pub fn blocks(&self) -> &[BlockType] {
        &self.blocks
    }

    /// Raw water level of a storage index, without the invariant check.
    pub fn water_level_at_index(&self, index: usize) -> u8 {
        self.water.get(index)
    }

    /// Marks the chunk as needing a remesh because a neighbour changed.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips_every_block() {
        let mut chunk = Chunk::empty(ChunkPos::new(0, 0));
        for id in 0..super::super::block::block_type::BLOCK_TYPE_COUNT as u8 {
            let block = BlockType::from_id(id).unwrap();
            chunk.set_block(3, 100, 9, block);
            assert_eq!(chunk.get_block(3, 100, 9), block);
        }
    }

    #[test]
    fn out_of_range_reads_air_and_drops_writes() {
        let mut chunk = Chunk::empty(ChunkPos::new(0, 0));
        assert!(!chunk.set_block(0, CHUNK_HEIGHT, 0, BlockType::Stone));
        assert!(!chunk.set_block(0, -1, 0, BlockType::Stone));
        assert_eq!(chunk.get_block(0, -1, 0), BlockType::Air);
        assert_eq!(chunk.get_block(16, 5, 0), BlockType::Air);
        assert_eq!(chunk.vertical_extent(), None);
    }

    #[test]
    fn vertical_extent_tracks_edits_incrementally() {
        let mut chunk = Chunk::empty(ChunkPos::new(0, 0));
        chunk.set_block(0, 10, 0, BlockType::Stone);
        chunk.set_block(5, 40, 5, BlockType::Dirt);
        chunk.set_block(5, 40, 6, BlockType::Dirt);
        assert_eq!(chunk.vertical_extent(), Some((10, 40)));

        chunk.set_block(5, 40, 5, BlockType::Air);
        assert_eq!(chunk.vertical_extent(), Some((10, 40)));
        chunk.set_block(5, 40, 6, BlockType::Air);
        assert_eq!(chunk.vertical_extent(), Some((10, 10)));
        chunk.set_block(0, 10, 0, BlockType::Air);
        assert_eq!(chunk.vertical_extent(), None);
        assert!(!chunk.sub_chunk_has_blocks(0));
    }

    #[test]
    fn water_level_implies_water_block() {
        let mut chunk = Chunk::empty(ChunkPos::new(0, 0));
        chunk.set_water_level(1, 1, 1, 5);
        assert_eq!(chunk.get_block(1, 1, 1), BlockType::Water);
        assert_eq!(chunk.get_water_level(1, 1, 1), 5);
        assert!(chunk.has_water());

        chunk.set_block(1, 1, 1, BlockType::Stone);
        assert_eq!(chunk.get_water_level(1, 1, 1), 0);
        assert!(!chunk.has_water());

        chunk.set_block(2, 2, 2, BlockType::Water);
        assert_eq!(chunk.get_water_level(2, 2, 2), WATER_SOURCE_LEVEL);
        chunk.set_water_level(2, 2, 2, 0);
        assert_eq!(chunk.get_block(2, 2, 2), BlockType::Air);
    }

    #[test]
    fn edits_bump_revision_and_dirty() {
        let mut chunk = Chunk::empty(ChunkPos::new(0, 0));
        chunk.dirty = false;
        let before = chunk.revision();
        assert!(chunk.set_block(0, 0, 0, BlockType::Bedrock));
        assert!(chunk.dirty);
        assert!(chunk.revision() > before);
        assert!(!chunk.set_block(0, 0, 0, BlockType::Bedrock));
    }

    #[test]
    fn storage_index_is_x_major_y_innermost() {
        assert_eq!(Chunk::index(0, 1, 0), 1);
        assert_eq!(Chunk::index(0, 0, 1), CHUNK_HEIGHT as usize);
        assert_eq!(Chunk::index(1, 0, 0), (CHUNK_HEIGHT * CHUNK_WIDTH) as usize);
        for index in [0usize, 1, 257, 4095, CHUNK_VOLUME - 1] {
            let (x, y, z) = Chunk::coords_of(index);
            assert_eq!(Chunk::index(x, y, z), index);
        }
    }

    #[test]
    fn from_block_ids_rejects_bad_input() {
        assert!(Chunk::from_block_ids(ChunkPos::new(0, 0), &[0; 10], None).is_none());
        let mut ids = vec![0u8; CHUNK_VOLUME];
        ids[0] = 200;
        assert!(Chunk::from_block_ids(ChunkPos::new(0, 0), &ids, None).is_none());
        ids[0] = BlockType::Water.id();
        let chunk = Chunk::from_block_ids(ChunkPos::new(0, 0), &ids, None).unwrap();
        assert_eq!(chunk.get_water_level(0, 0, 0), WATER_SOURCE_LEVEL);
        assert!(!chunk.modified);
        assert!(!chunk.accepts_spills);
    }
}
