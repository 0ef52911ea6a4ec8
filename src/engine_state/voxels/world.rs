//! # World Module
//!
//! This module provides the `World` struct which owns every resident chunk
//! and is the only place chunk storage is mutated. It offers
//!
//! - world-space block, water and light access (floor division into chunks),
//! - three neighbour-aware readers with different fallbacks for chunks that
//!   are not resident (`get_block`, `get_block_safe`, `get_block_water`),
//! - edits that keep light, neighbour dirtiness and water activity in step,
//! - the feature inbox that delivers tree canopies and other stamped
//!   features across chunk seams,
//! - boundary slices, the one-cell-thick neighbour snapshots that mesh
//!   tasks carry to workers.
//!
//! ## Ownership
//!
//! Chunks are uniquely owned by the map and never hold references to their
//! neighbours. Everything that needs a neighbour looks it up by position.

use std::collections::HashMap;

use cgmath::Point3;
use log::debug;

use super::{
    block::{block_side::BlockSide, block_type::BlockType},
    chunk::{world_to_local, Chunk, ChunkPos, CHUNK_HEIGHT, CHUNK_WIDTH},
    generation::{
        features::{apply_spill, FeatureSpill},
        GeneratedChunk, PlacedBlock,
    },
    light::relight_chunk,
};

/// One face layer of a chunk as seen from its neighbour: the 16x256 cells
/// touching the shared seam.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundarySlice {
    blocks: Vec<BlockType>,
    light: Vec<u8>,
}

impl BoundarySlice {
    fn capture(chunk: &Chunk, side: BlockSide) -> Self {
        let len = (CHUNK_WIDTH * CHUNK_HEIGHT) as usize;
        let mut blocks = Vec::with_capacity(len);
        let mut light = Vec::with_capacity(len);
        for along in 0..CHUNK_WIDTH {
            for y in 0..CHUNK_HEIGHT {
                let (x, z) = Self::cell(side, along);
                blocks.push(chunk.get_block(x, y, z));
                light.push(chunk.get_light(x, y, z));
            }
        }
        BoundarySlice { blocks, light }
    }

    /// Local `(x, z)` inside the neighbour for position `along` the seam,
    /// where `side` is the side of the *meshed* chunk the neighbour sits on.
    fn cell(side: BlockSide, along: i32) -> (i32, i32) {
        match side {
            BlockSide::RIGHT => (0, along),
            BlockSide::LEFT => (CHUNK_WIDTH - 1, along),
            BlockSide::FRONT => (along, 0),
            BlockSide::BACK => (along, CHUNK_WIDTH - 1),
            BlockSide::TOP | BlockSide::BOTTOM => (along, along),
        }
    }

    /// Block at `y` and position `along` the seam (the meshed chunk's Z for
    /// X sides, X for Z sides).
    #[inline]
    pub fn block(&self, along: i32, y: i32) -> BlockType {
        if !(0..CHUNK_HEIGHT).contains(&y) {
            return BlockType::Air;
        }
        self.blocks[(along * CHUNK_HEIGHT + y) as usize]
    }

    /// Light at `y` and position `along` the seam.
    #[inline]
    pub fn light(&self, along: i32, y: i32) -> u8 {
        if !(0..CHUNK_HEIGHT).contains(&y) {
            return 0;
        }
        self.light[(along * CHUNK_HEIGHT + y) as usize]
    }
}

/// Boundary slices of a chunk's four horizontal neighbours, in
/// `BlockSide::horizontal()` order. `None` marks a neighbour that is not
/// resident.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NeighborSlices {
    /// Neighbour across +Z.
    pub front: Option<BoundarySlice>,
    /// Neighbour across -Z.
    pub back: Option<BoundarySlice>,
    /// Neighbour across -X.
    pub left: Option<BoundarySlice>,
    /// Neighbour across +X.
    pub right: Option<BoundarySlice>,
}

impl NeighborSlices {
    /// The slice on a horizontal side.
    pub fn side(&self, side: BlockSide) -> Option<&BoundarySlice> {
        match side {
            BlockSide::FRONT => self.front.as_ref(),
            BlockSide::BACK => self.back.as_ref(),
            BlockSide::LEFT => self.left.as_ref(),
            BlockSide::RIGHT => self.right.as_ref(),
            BlockSide::TOP | BlockSide::BOTTOM => None,
        }
    }
}

/// The chunk map plus everything that must stay consistent across chunks.
#[derive(Default)]
pub struct World {
    chunks: HashMap<ChunkPos, Chunk>,
    /// Feature blocks each resident chunk produced for its neighbours, kept
    /// until the source chunk is evicted.
    feature_inbox: HashMap<ChunkPos, Vec<FeatureSpill>>,
}

impl World {
    /// Creates an empty world.
    pub fn new() -> Self {
        World::default()
    }

    /// Number of resident chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether no chunk is resident.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Whether the chunk at `position` is resident.
    pub fn contains(&self, position: ChunkPos) -> bool {
        self.chunks.contains_key(&position)
    }

    /// Borrow a resident chunk.
    pub fn chunk(&self, position: ChunkPos) -> Option<&Chunk> {
        self.chunks.get(&position)
    }

    /// Mutably borrow a resident chunk.
    pub fn chunk_mut(&mut self, position: ChunkPos) -> Option<&mut Chunk> {
        self.chunks.get_mut(&position)
    }

    /// Positions of all resident chunks, unordered.
    pub fn positions(&self) -> impl Iterator<Item = ChunkPos> + '_ {
        self.chunks.keys().copied()
    }

    /// All resident chunks, unordered.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }

    /// Inserts freshly generated terrain and exchanges feature spills with
    /// the resident neighbourhood.
    ///
    /// A resident neighbour takes this chunk's spill only once; a source
    /// that is evicted and regenerated does not overwrite edits made since.
    pub fn insert_generated(&mut self, generated: GeneratedChunk) {
        let GeneratedChunk { mut chunk, spills } = generated;
        let position = chunk.position;

        self.receive_spills(&mut chunk);
        for spill in &spills {
            let Some(target) = self.chunks.get_mut(&spill.target) else {
                continue;
            };
            if !deliver_spill(target, position, &spill.blocks) {
                continue;
            }
            relight_chunk(target);
            for placed in &spill.blocks {
                let local = Point3::new(placed.x as i32, placed.y as i32, placed.z as i32);
                self.touch_seams(spill.target, local);
            }
        }
        if !spills.is_empty() {
            self.feature_inbox.insert(position, spills);
        }
        self.insert_resident(chunk);
    }

    /// Inserts a chunk restored from disk or from the eviction cache.
    ///
    /// Only spills from neighbours the chunk has not heard from yet are
    /// applied, and none at all to a chunk read back from disk.
    pub fn insert_chunk(&mut self, mut chunk: Chunk) {
        self.receive_spills(&mut chunk);
        self.insert_resident(chunk);
    }

    fn receive_spills(&self, chunk: &mut Chunk) {
        let position = chunk.position;
        let mut received = false;
        for dx in -1..=1 {
            for dz in -1..=1 {
                let source = ChunkPos::new(position.x + dx, position.z + dz);
                let Some(spills) = self.feature_inbox.get(&source) else {
                    continue;
                };
                for spill in spills.iter().filter(|spill| spill.target == position) {
                    received |= deliver_spill(chunk, source, &spill.blocks);
                }
            }
        }
        if received {
            debug!("Applied feature spills to chunk {:?}", position);
        }
    }

    fn insert_resident(&mut self, mut chunk: Chunk) {
        let position = chunk.position;
        relight_chunk(&mut chunk);
        chunk.dirty = true;
        for neighbor in position.neighbors() {
            if let Some(neighbor) = self.chunks.get_mut(&neighbor) {
                neighbor.mark_dirty();
                if neighbor.has_water() {
                    neighbor.has_water_updates = true;
                }
            }
        }
        self.chunks.insert(position, chunk);
    }

    /// Evicts a chunk, dropping the spills it was holding for neighbours.
    pub fn remove(&mut self, position: ChunkPos) -> Option<Chunk> {
        self.feature_inbox.remove(&position);
        self.chunks.remove(&position)
    }

    /// Block at a world position; air when the chunk is not resident or Y is
    /// outside the column.
    pub fn get_block(&self, wx: i32, wy: i32, wz: i32) -> BlockType {
        self.read_block(wx, wy, wz).unwrap_or(BlockType::Air)
    }

    /// Like [`World::get_block`] but unloaded chunks read as stone, so
    /// nothing renders a face toward the load frontier.
    pub fn get_block_safe(&self, wx: i32, wy: i32, wz: i32) -> BlockType {
        self.read_block(wx, wy, wz).unwrap_or(BlockType::Stone)
    }

    /// Like [`World::get_block`] but unloaded chunks read as water, so water
    /// surfaces do not grow walls at the load frontier.
    pub fn get_block_water(&self, wx: i32, wy: i32, wz: i32) -> BlockType {
        self.read_block(wx, wy, wz).unwrap_or(BlockType::Water)
    }

    fn read_block(&self, wx: i32, wy: i32, wz: i32) -> Option<BlockType> {
        let (position, local) = world_to_local(wx, wy, wz);
        let chunk = self.chunks.get(&position)?;
        Some(chunk.get_block(local.x, local.y, local.z))
    }

    /// Whether the block at a world position is resident and solid.
    pub fn is_solid(&self, wx: i32, wy: i32, wz: i32) -> bool {
        self.get_block(wx, wy, wz).is_solid()
    }

    /// Water level at a world position.
    pub fn get_water_level(&self, wx: i32, wy: i32, wz: i32) -> u8 {
        let (position, local) = world_to_local(wx, wy, wz);
        self.chunks
            .get(&position)
            .map(|chunk| chunk.get_water_level(local.x, local.y, local.z))
            .unwrap_or(0)
    }

    /// Block light at a world position.
    pub fn get_light(&self, wx: i32, wy: i32, wz: i32) -> u8 {
        let (position, local) = world_to_local(wx, wy, wz);
        self.chunks
            .get(&position)
            .map(|chunk| chunk.get_light(local.x, local.y, local.z))
            .unwrap_or(0)
    }

    /// Sets a block at a world position.
    ///
    /// The owning chunk is relit and flagged for the water simulator;
    /// neighbours sharing the edited seam are dirtied. Writes outside the
    /// column or into non-resident chunks are dropped.
    ///
    /// # Returns
    /// `true` if a cell changed.
    pub fn set_block(&mut self, wx: i32, wy: i32, wz: i32, block: BlockType) -> bool {
        let (position, local) = world_to_local(wx, wy, wz);
        let Some(chunk) = self.chunks.get_mut(&position) else {
            return false;
        };
        if !chunk.set_block(local.x, local.y, local.z, block) {
            return false;
        }
        chunk.modified = true;
        chunk.has_water_updates = true;
        relight_chunk(chunk);
        self.touch_seams(position, local);
        true
    }

    /// Sets a water level at a world position; see [`Chunk::set_water_level`].
    ///
    /// Used by the water simulator. Light is left alone since water is
    /// transparent and never emits.
    pub fn set_water_level(&mut self, wx: i32, wy: i32, wz: i32, level: u8) -> bool {
        let (position, local) = world_to_local(wx, wy, wz);
        let Some(chunk) = self.chunks.get_mut(&position) else {
            return false;
        };
        if !chunk.set_water_level(local.x, local.y, local.z, level) {
            return false;
        }
        chunk.modified = true;
        self.touch_seams(position, local);
        true
    }

    fn touch_seams(&mut self, position: ChunkPos, local: Point3<i32>) {
        let mut sides = Vec::with_capacity(2);
        if local.x == 0 {
            sides.push(BlockSide::LEFT);
        }
        if local.x == CHUNK_WIDTH - 1 {
            sides.push(BlockSide::RIGHT);
        }
        if local.z == 0 {
            sides.push(BlockSide::BACK);
        }
        if local.z == CHUNK_WIDTH - 1 {
            sides.push(BlockSide::FRONT);
        }
        for side in sides {
            if let Some(neighbor) = self.chunks.get_mut(&position.neighbor(side)) {
                neighbor.mark_dirty();
                neighbor.has_water_updates = true;
            }
        }
    }

    /// Snapshots the seams a mesh task for `position` needs.
    pub fn neighbor_slices(&self, position: ChunkPos) -> NeighborSlices {
        let capture = |side: BlockSide| {
            self.chunks
                .get(&position.neighbor(side))
                .map(|neighbor| BoundarySlice::capture(neighbor, side))
        };
        NeighborSlices {
            front: capture(BlockSide::FRONT),
            back: capture(BlockSide::BACK),
            left: capture(BlockSide::LEFT),
            right: capture(BlockSide::RIGHT),
        }
    }

    /// Number of chunks holding undelivered or retained feature spills.
    pub fn feature_inbox_len(&self) -> usize {
        self.feature_inbox.len()
    }
}

/// Writes one source's spill into `chunk` unless it already holds it or
/// refuses spills.
///
/// # Returns
/// `true` if a cell changed.
fn deliver_spill(chunk: &mut Chunk, source: ChunkPos, blocks: &[PlacedBlock]) -> bool {
    if !chunk.accepts_spills || chunk.spill_sources.contains(&source) {
        return false;
    }
    chunk.spill_sources.push(source);
    apply_spill(chunk, blocks)
}
