//! Ore veins.
//!
//! Each chunk rolls its own veins from a PRNG seeded by the world seed and
//! the chunk position. Veins are small blobs whose outline is roughened by
//! 3D noise, confined to a depth window per ore, and only ever replace
//! stone.

use crate::engine_state::voxels::{
    block::block_type::BlockType,
    chunk::{Chunk, CHUNK_WIDTH},
};

use super::noise::WorldNoise;

struct OreKind {
    block: BlockType,
    attempts: u32,
    min_y: i32,
    max_y: i32,
    radius: i32,
}

const ORES: [OreKind; 5] = [
    OreKind {
        block: BlockType::CoalOre,
        attempts: 20,
        min_y: 5,
        max_y: 128,
        radius: 2,
    },
    OreKind {
        block: BlockType::IronOre,
        attempts: 14,
        min_y: 5,
        max_y: 64,
        radius: 1,
    },
    OreKind {
        block: BlockType::GoldOre,
        attempts: 4,
        min_y: 5,
        max_y: 32,
        radius: 1,
    },
    OreKind {
        block: BlockType::RedstoneOre,
        attempts: 8,
        min_y: 5,
        max_y: 16,
        radius: 1,
    },
    OreKind {
        block: BlockType::DiamondOre,
        attempts: 2,
        min_y: 5,
        max_y: 16,
        radius: 1,
    },
];

/// Places every ore vein for one chunk.
pub fn place_ores(chunk: &mut Chunk, noise: &WorldNoise, seed: u64) {
    let mut rng = fastrand::Rng::with_seed(seed);
    let origin = chunk.position.origin();

    for ore in &ORES {
        for _ in 0..ore.attempts {
            let cx = rng.i32(0..CHUNK_WIDTH);
            let cz = rng.i32(0..CHUNK_WIDTH);
            let cy = rng.i32(ore.min_y..ore.max_y);
            let r = ore.radius;
            for dx in -r..=r {
                for dy in -r..=r {
                    for dz in -r..=r {
                        let (x, y, z) = (cx + dx, cy + dy, cz + dz);
                        if chunk.get_block(x, y, z) != BlockType::Stone {
                            continue;
                        }
                        let distance = (dx * dx + dy * dy + dz * dz) as f64;
                        let shape = noise.ore(
                            (origin.x + x) as f64,
                            y as f64,
                            (origin.z + z) as f64,
                        );
                        let limit = (r * r) as f64 * (0.6 + 0.4 * shape);
                        if distance == 0.0 || distance <= limit {
                            chunk.set_block(x, y, z, ore.block);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::chunk::ChunkPos;

    fn stone_chunk() -> Chunk {
        let mut chunk = Chunk::empty(ChunkPos::new(0, 0));
        for x in 0..CHUNK_WIDTH {
            for z in 0..CHUNK_WIDTH {
                for y in 0..140 {
                    chunk.set_block(x, y, z, BlockType::Stone);
                }
            }
        }
        chunk
    }

    #[test]
    fn ores_respect_depth_windows() {
        let noise = WorldNoise::new(1, 8.0, 8.0);
        let mut chunk = stone_chunk();
        place_ores(&mut chunk, &noise, 1234);
        let mut found = 0;
        for x in 0..CHUNK_WIDTH {
            for z in 0..CHUNK_WIDTH {
                for y in 0..140 {
                    let block = chunk.get_block(x, y, z);
                    let Some(ore) = ORES.iter().find(|ore| ore.block == block) else {
                        continue;
                    };
                    found += 1;
                    assert!(y >= ore.min_y - ore.radius && y < ore.max_y + ore.radius);
                }
            }
        }
        assert!(found > 0);
    }

    #[test]
    fn ores_are_seed_deterministic() {
        let noise = WorldNoise::new(1, 8.0, 8.0);
        let mut a = stone_chunk();
        let mut b = stone_chunk();
        place_ores(&mut a, &noise, 99);
        place_ores(&mut b, &noise, 99);
        assert_eq!(a.blocks(), b.blocks());
    }
}
