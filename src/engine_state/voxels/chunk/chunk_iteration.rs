//! # Chunk Iteration Module
//!
//! Iterators over the cells of a chunk that stay inside its tight vertical
//! extent, so empty air above and below the terrain is never visited.

use cgmath::Point3;

use super::{Chunk, CHUNK_WIDTH};
use crate::engine_state::voxels::block::block_type::BlockType;

/// Walks every cell between the chunk's `min_y` and `max_y` and yields those
/// whose block matches a filter.
///
/// Order is `y` descending (top-down), then `z`, then `x`, which is the order
/// the water simulator needs; lighting does not care.
pub struct ChunkBlockIterator<'a, F>
where
    F: Fn(BlockType) -> bool,
{
    /// Reference to the chunk being iterated over
    chunk_ref: &'a Chunk,
    filter: F,
    local_x: i32,
    local_y: i32,
    local_z: i32,
    min_y: i32,
}

impl<'a, F> ChunkBlockIterator<'a, F>
where
    F: Fn(BlockType) -> bool,
{
    /// Creates an iterator positioned at the top of the chunk's extent.
    pub fn new(chunk_ref: &'a Chunk, filter: F) -> Self {
        let (min_y, max_y) = chunk_ref.vertical_extent().unwrap_or((0, -1));
        ChunkBlockIterator {
            chunk_ref,
            filter,
            local_x: 0,
            local_y: max_y,
            local_z: 0,
            min_y,
        }
    }
}

impl<F> Iterator for ChunkBlockIterator<'_, F>
where
    F: Fn(BlockType) -> bool,
{
    type Item = (Point3<i32>, BlockType);

    fn next(&mut self) -> Option<Self::Item> {
        while self.local_y >= self.min_y {
            let position = Point3::new(self.local_x, self.local_y, self.local_z);
            let block = self
                .chunk_ref
                .get_block(self.local_x, self.local_y, self.local_z);

            self.local_x += 1;
            if self.local_x == CHUNK_WIDTH {
                self.local_x = 0;
                self.local_z += 1;
                if self.local_z == CHUNK_WIDTH {
                    self.local_z = 0;
                    self.local_y -= 1;
                }
            }

            if (self.filter)(block) {
                return Some((position, block));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::chunk::ChunkPos;

    #[test]
    fn yields_matching_cells_top_down() {
        let mut chunk = Chunk::empty(ChunkPos::new(0, 0));
        chunk.set_block(1, 5, 1, BlockType::Glowstone);
        chunk.set_block(2, 9, 3, BlockType::Glowstone);
        chunk.set_block(0, 7, 0, BlockType::Stone);

        let found: Vec<_> =
            ChunkBlockIterator::new(&chunk, |block| block == BlockType::Glowstone).collect();
        assert_eq!(
            found,
            vec![
                (Point3::new(2, 9, 3), BlockType::Glowstone),
                (Point3::new(1, 5, 1), BlockType::Glowstone),
            ]
        );
    }

    #[test]
    fn empty_chunk_yields_nothing() {
        let chunk = Chunk::empty(ChunkPos::new(0, 0));
        assert_eq!(ChunkBlockIterator::new(&chunk, |_| true).count(), 0);
    }
}
