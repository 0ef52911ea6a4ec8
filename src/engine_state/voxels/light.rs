//! Block light propagation.
//!
//! Light is a breadth-first flood from every emissive cell of a chunk,
//! losing one level per step and passing only through transparent cells.
//! The flood never leaves the chunk it starts in; a lamp next to a chunk
//! seam lights only its own side.

use std::collections::VecDeque;

use super::{
    block::block_side::BlockSide,
    chunk::{chunk_iteration::ChunkBlockIterator, Chunk},
};

/// Recomputes the whole light field of a chunk from its emitters.
///
/// # Returns
/// The number of lit cells.
pub fn relight_chunk(chunk: &mut Chunk) -> usize {
    chunk.clear_light();

    let emitters: Vec<_> = ChunkBlockIterator::new(chunk, |block| block.emission() > 0)
        .map(|(position, block)| (position, block.emission()))
        .collect();

    let mut queue = VecDeque::with_capacity(emitters.len() * 8);
    for (position, emission) in emitters {
        chunk.set_light(position.x, position.y, position.z, emission);
        queue.push_back((position.x, position.y, position.z, emission));
    }

    let mut lit = queue.len();
    while let Some((x, y, z, level)) = queue.pop_front() {
        if level <= 1 {
            continue;
        }
        let next = level - 1;
        for side in BlockSide::all() {
            let offset = side.offset();
            let (nx, ny, nz) = (x + offset.x, y + offset.y, z + offset.z);
            if !Chunk::in_bounds(nx, ny, nz) {
                continue;
            }
            if !chunk.get_block(nx, ny, nz).is_transparent() {
                continue;
            }
            if chunk.get_light(nx, ny, nz) >= next {
                continue;
            }
            if chunk.get_light(nx, ny, nz) == 0 {
                lit += 1;
            }
            chunk.set_light(nx, ny, nz, next);
            queue.push_back((nx, ny, nz, next));
        }
    }
    lit
}
