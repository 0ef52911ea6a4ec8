//! Read access to a chunk and the one-cell seams of its neighbours.

use crate::engine_state::voxels::{
    block::{block_side::BlockSide, block_type::BlockType},
    chunk::{Chunk, CHUNK_HEIGHT, CHUNK_WIDTH},
    world::NeighborSlices,
};

/// Samples blocks and light around a chunk being meshed.
///
/// Coordinates are chunk-local. One step past a horizontal edge reads the
/// matching neighbour slice; a missing neighbour reads as the caller's
/// `frontier` block and light 0. Cells past two edges at once read as air.
/// Below the column is solid bedrock, above it is air.
pub struct ChunkSampler<'a> {
    chunk: &'a Chunk,
    neighbors: &'a NeighborSlices,
}

impl<'a> ChunkSampler<'a> {
    /// Wraps a chunk snapshot and its neighbour seams.
    pub fn new(chunk: &'a Chunk, neighbors: &'a NeighborSlices) -> Self {
        ChunkSampler { chunk, neighbors }
    }

    /// The chunk being meshed.
    pub fn chunk(&self) -> &'a Chunk {
        self.chunk
    }

    /// Block at a local coordinate.
    pub fn block(&self, x: i32, y: i32, z: i32, frontier: BlockType) -> BlockType {
        if y < 0 {
            return BlockType::Bedrock;
        }
        if y >= CHUNK_HEIGHT {
            return BlockType::Air;
        }
        match Self::locate(x, z) {
            Location::Inside => self.chunk.get_block(x, y, z),
            Location::Seam(side, along) => self
                .neighbors
                .side(side)
                .map_or(frontier, |slice| slice.block(along, y)),
            Location::Beyond => BlockType::Air,
        }
    }

    /// Block light at a local coordinate.
    pub fn light(&self, x: i32, y: i32, z: i32) -> u8 {
        if !(0..CHUNK_HEIGHT).contains(&y) {
            return 0;
        }
        match Self::locate(x, z) {
            Location::Inside => self.chunk.get_light(x, y, z),
            Location::Seam(side, along) => self
                .neighbors
                .side(side)
                .map_or(0, |slice| slice.light(along, y)),
            Location::Beyond => 0,
        }
    }

    fn locate(x: i32, z: i32) -> Location {
        let x_inside = (0..CHUNK_WIDTH).contains(&x);
        let z_inside = (0..CHUNK_WIDTH).contains(&z);
        match (x_inside, z_inside) {
            (true, true) => Location::Inside,
            (false, true) if x == -1 => Location::Seam(BlockSide::LEFT, z),
            (false, true) if x == CHUNK_WIDTH => Location::Seam(BlockSide::RIGHT, z),
            (true, false) if z == -1 => Location::Seam(BlockSide::BACK, x),
            (true, false) if z == CHUNK_WIDTH => Location::Seam(BlockSide::FRONT, x),
            _ => Location::Beyond,
        }
    }
}

enum Location {
    Inside,
    Seam(BlockSide, i32),
    Beyond,
}
