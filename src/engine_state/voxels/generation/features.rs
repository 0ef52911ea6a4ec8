//! Stamped surface features: trees, cacti and tall grass.
//!
//! Placement is a jittered grid anchored in world space, so the chunk that
//! owns a feature's base column always decides it the same way regardless
//! of generation order. Blocks a feature writes outside its own chunk are
//! collected as spills and delivered through the world's feature inbox.
//!
//! Every feature write follows one rule: a block replaces the current cell
//! only when it has a strictly higher feature priority. Overlapping canopies
//! and late-arriving spills therefore settle on the same result whatever
//! order they are applied in.

use std::collections::BTreeMap;

use crate::engine_state::voxels::{
    block::block_type::BlockType,
    chunk::{Chunk, ChunkPos, CHUNK_HEIGHT, CHUNK_WIDTH},
};

use super::{
    noise::{hash_2d, unit_from_hash, NoiseRole},
    terrain::{Biome, ColumnSample},
};

/// A single block written by a feature, in target-chunk-local coordinates.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PlacedBlock {
    /// Local X.
    pub x: u8,
    /// Y.
    pub y: u8,
    /// Local Z.
    pub z: u8,
    /// What to write.
    pub block: BlockType,
}

/// Feature blocks one chunk produced for a neighbouring chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeatureSpill {
    /// Chunk the blocks belong in.
    pub target: ChunkPos,
    /// Blocks to write, in placement order.
    pub blocks: Vec<PlacedBlock>,
}

/// Output of terrain generation for one chunk.
#[derive(Clone, Debug)]
pub struct GeneratedChunk {
    /// The populated chunk.
    pub chunk: Chunk,
    /// Feature blocks that crossed into neighbouring chunks.
    pub spills: Vec<FeatureSpill>,
}

/// Rank used to resolve overlapping feature writes.
pub fn feature_priority(block: BlockType) -> u8 {
    match block {
        BlockType::Air => 0,
        BlockType::TallGrass => 1,
        BlockType::Leaves => 2,
        BlockType::Cactus => 3,
        BlockType::Log => 4,
        _ => u8::MAX,
    }
}

/// Writes a feature block into a chunk if it outranks what is there.
pub fn place_feature_block(chunk: &mut Chunk, x: i32, y: i32, z: i32, block: BlockType) -> bool {
    let existing = chunk.get_block(x, y, z);
    if feature_priority(existing) >= feature_priority(block) {
        return false;
    }
    chunk.set_block(x, y, z, block)
}

/// Applies a batch of spilled blocks to their target chunk.
pub fn apply_spill(chunk: &mut Chunk, blocks: &[PlacedBlock]) -> bool {
    let mut changed = false;
    for placed in blocks {
        changed |= place_feature_block(
            chunk,
            placed.x as i32,
            placed.y as i32,
            placed.z as i32,
            placed.block,
        );
    }
    changed
}

/// Routes world-space feature writes to the owning chunk or to a spill.
struct FeatureWriter<'a> {
    chunk: &'a mut Chunk,
    spills: BTreeMap<ChunkPos, Vec<PlacedBlock>>,
}

impl FeatureWriter<'_> {
    fn put(&mut self, wx: i32, wy: i32, wz: i32, block: BlockType) {
        if !(0..CHUNK_HEIGHT).contains(&wy) {
            return;
        }
        let target = ChunkPos::from_world(wx, wz);
        let lx = wx.rem_euclid(CHUNK_WIDTH);
        let lz = wz.rem_euclid(CHUNK_WIDTH);
        if target == self.chunk.position {
            place_feature_block(self.chunk, lx, wy, lz, block);
        } else {
            self.spills.entry(target).or_default().push(PlacedBlock {
                x: lx as u8,
                y: wy as u8,
                z: lz as u8,
                block,
            });
        }
    }
}

const TREE_CELL: i32 = 6;
const CACTUS_CELL: i32 = 7;

/// Jittered grid points whose column falls inside `chunk`, with their
/// placement hash.
fn grid_points(seed: u64, chunk: ChunkPos, cell: i32, salt: i32) -> Vec<(i32, i32, u64)> {
    let origin = chunk.origin();
    let first_x = origin.x.div_euclid(cell);
    let last_x = (origin.x + CHUNK_WIDTH - 1).div_euclid(cell);
    let first_z = origin.z.div_euclid(cell);
    let last_z = (origin.z + CHUNK_WIDTH - 1).div_euclid(cell);

    let mut points = Vec::new();
    for gx in first_x..=last_x {
        for gz in first_z..=last_z {
            let hash = hash_2d(seed, NoiseRole::Feature, gx.wrapping_mul(31).wrapping_add(salt), gz);
            let px = gx * cell + (hash % cell as u64) as i32;
            let pz = gz * cell + ((hash >> 8) % cell as u64) as i32;
            if ChunkPos::from_world(px, pz) == chunk {
                points.push((px, pz, hash));
            }
        }
    }
    points
}

fn tree_density(biome: Biome) -> f64 {
    match biome {
        Biome::Forest => 0.75,
        Biome::Plains => 0.06,
        Biome::Tundra => 0.12,
        Biome::Desert | Biome::Ocean => 0.0,
    }
}

fn stamp_tree(writer: &mut FeatureWriter<'_>, wx: i32, ground: i32, wz: i32, hash: u64) {
    let trunk = 4 + ((hash >> 24) % 3) as i32;
    let top = ground + trunk;
    for y in ground + 1..=top {
        writer.put(wx, y, wz, BlockType::Log);
    }
    for y in top - 2..=top + 1 {
        let radius: i32 = if y <= top - 1 { 2 } else { 1 };
        for dx in -radius..=radius {
            for dz in -radius..=radius {
                let corner = dx.abs() == radius && dz.abs() == radius;
                if corner && (y == top + 1 || (hash >> (32 + ((dx + dz + y) & 15))) & 1 == 0) {
                    continue;
                }
                writer.put(wx + dx, y, wz + dz, BlockType::Leaves);
            }
        }
    }
}

/// Stamps every feature rooted in this chunk.
///
/// `columns` holds the column samples in `x * 16 + z` order.
pub fn decorate(seed: u64, sea_level: i32, chunk: &mut Chunk, columns: &[ColumnSample]) -> Vec<FeatureSpill> {
    let position = chunk.position;
    let origin = position.origin();
    let mut writer = FeatureWriter {
        chunk,
        spills: BTreeMap::new(),
    };

    let column_at = |wx: i32, wz: i32| {
        let lx = wx - origin.x;
        let lz = wz - origin.z;
        &columns[(lx * CHUNK_WIDTH + lz) as usize]
    };

    for (wx, wz, hash) in grid_points(seed, position, TREE_CELL, 1) {
        let column = column_at(wx, wz);
        if column.height <= sea_level || column.height + 9 >= CHUNK_HEIGHT {
            continue;
        }
        let ground = writer
            .chunk
            .get_block(wx - origin.x, column.height, wz - origin.z);
        if !matches!(ground, BlockType::Grass | BlockType::Snow | BlockType::Dirt) {
            continue;
        }
        if unit_from_hash(hash.rotate_left(17)) < tree_density(column.biome) {
            stamp_tree(&mut writer, wx, column.height, wz, hash);
        }
    }

    for (wx, wz, hash) in grid_points(seed, position, CACTUS_CELL, 2) {
        let column = column_at(wx, wz);
        if column.biome != Biome::Desert || column.height <= sea_level {
            continue;
        }
        let (lx, lz) = (wx - origin.x, wz - origin.z);
        if writer.chunk.get_block(lx, column.height, lz) != BlockType::Sand {
            continue;
        }
        if unit_from_hash(hash.rotate_left(9)) < 0.3 {
            let height = 1 + ((hash >> 40) % 3) as i32;
            for y in column.height + 1..=column.height + height {
                writer.put(wx, y, wz, BlockType::Cactus);
            }
        }
    }

    for lx in 0..CHUNK_WIDTH {
        for lz in 0..CHUNK_WIDTH {
            let column = &columns[(lx * CHUNK_WIDTH + lz) as usize];
            if !matches!(column.biome, Biome::Plains | Biome::Forest) {
                continue;
            }
            if writer.chunk.get_block(lx, column.height, lz) != BlockType::Grass {
                continue;
            }
            let (wx, wz) = (origin.x + lx, origin.z + lz);
            let roll = unit_from_hash(hash_2d(seed, NoiseRole::Feature, wx, wz.wrapping_mul(7).wrapping_add(3)));
            if roll < 0.12 {
                writer.put(wx, column.height + 1, wz, BlockType::TallGrass);
            }
        }
    }

    writer
        .spills
        .into_iter()
        .map(|(target, blocks)| FeatureSpill { target, blocks })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priorities_make_writes_order_independent() {
        let writes = [BlockType::TallGrass, BlockType::Leaves, BlockType::Log, BlockType::Leaves];
        let mut forward = Chunk::empty(ChunkPos::new(0, 0));
        let mut backward = Chunk::empty(ChunkPos::new(0, 0));
        for block in writes {
            place_feature_block(&mut forward, 1, 70, 1, block);
        }
        for block in writes.iter().rev() {
            place_feature_block(&mut backward, 1, 70, 1, *block);
        }
        assert_eq!(forward.get_block(1, 70, 1), BlockType::Log);
        assert_eq!(backward.get_block(1, 70, 1), BlockType::Log);
    }

    #[test]
    fn features_never_replace_terrain() {
        let mut chunk = Chunk::empty(ChunkPos::new(0, 0));
        chunk.set_block(2, 64, 2, BlockType::Stone);
        chunk.set_block(3, 64, 2, BlockType::Water);
        assert!(!place_feature_block(&mut chunk, 2, 64, 2, BlockType::Leaves));
        assert!(!place_feature_block(&mut chunk, 3, 64, 2, BlockType::Log));
        assert_eq!(chunk.get_block(2, 64, 2), BlockType::Stone);
    }

    #[test]
    fn writer_routes_out_of_chunk_blocks_to_spills() {
        let mut chunk = Chunk::empty(ChunkPos::new(0, 0));
        let mut writer = FeatureWriter {
            chunk: &mut chunk,
            spills: BTreeMap::new(),
        };
        writer.put(15, 70, 3, BlockType::Leaves);
        writer.put(16, 70, 3, BlockType::Leaves);
        writer.put(-1, 71, -1, BlockType::Leaves);
        let spills = writer.spills;
        assert_eq!(chunk.get_block(15, 70, 3), BlockType::Leaves);
        assert_eq!(spills.len(), 2);
        assert_eq!(
            spills[&ChunkPos::new(1, 0)],
            vec![PlacedBlock {
                x: 0,
                y: 70,
                z: 3,
                block: BlockType::Leaves
            }]
        );
        assert!(spills.contains_key(&ChunkPos::new(-1, -1)));
    }

    #[test]
    fn grid_points_stay_inside_their_chunk() {
        for cx in -2..2 {
            for cz in -2..2 {
                let chunk = ChunkPos::new(cx, cz);
                for (x, z, _) in grid_points(77, chunk, TREE_CELL, 1) {
                    assert_eq!(ChunkPos::from_world(x, z), chunk);
                }
            }
        }
    }
}
