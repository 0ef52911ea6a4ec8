//! # Terrain Generator
//!
//! A pure function from `(seed, chunk position)` to a populated chunk:
//! heightmap, soil layers, sea fill, caves, ores and stamped features, in
//! that order. Nothing here touches shared mutable state, so any number of
//! workers can generate chunks at once and always agree byte for byte.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::engine_state::{
    config::{GenerationType, WorldConfig},
    voxels::{
        block::block_type::BlockType,
        chunk::{Chunk, ChunkPos, CHUNK_HEIGHT, CHUNK_WIDTH},
    },
};

use super::{
    equation::{Equation, EquationInputs},
    features::{decorate, GeneratedChunk},
    noise::{hash_2d, NoiseRole, WorldNoise},
    ores::place_ores,
};

/// Nominal surface height of standard terrain.
pub const BASE_HEIGHT: i32 = 64;
/// Highest water cell of the sea fill.
pub const SEA_LEVEL: i32 = 62;
/// Above this, cold columns are capped with snow.
const SNOW_LINE: i32 = 120;

/// Lattice spacing of the cave field; values between points are interpolated.
const CAVE_STEP_XZ: i32 = 4;
const CAVE_STEP_Y: i32 = 8;
/// Carved cells at or below this height fill with lava.
const LAVA_LEVEL: i32 = 10;

/// Climate class of a column.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Biome {
    /// Grassland with sparse trees.
    Plains,
    /// Dense trees.
    Forest,
    /// Sand and cacti.
    Desert,
    /// Cold, snowy.
    Tundra,
    /// Surface below sea level.
    Ocean,
}

/// Everything the generator decided about one column.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ColumnSample {
    /// Y of the surface block.
    pub height: i32,
    /// Biome temperature, `[-1, 1]`.
    pub temperature: f64,
    /// Biome humidity, `[-1, 1]`.
    pub humidity: f64,
    /// Resulting biome.
    pub biome: Biome,
}

fn classify(height: i32, temperature: f64, humidity: f64) -> Biome {
    if height < SEA_LEVEL {
        Biome::Ocean
    } else if temperature < -0.35 {
        Biome::Tundra
    } else if temperature > 0.3 && humidity < -0.1 {
        Biome::Desert
    } else if humidity > 0.15 {
        Biome::Forest
    } else {
        Biome::Plains
    }
}

/// Deterministic chunk generator for one world.
pub struct TerrainGenerator {
    seed: u64,
    generation_type: GenerationType,
    noise: WorldNoise,
    equation: Option<Equation>,
    height_cap: i32,
    continent_scale: f64,
    mountain_scale: f64,
    detail_scale: f64,
}

impl TerrainGenerator {
    /// Builds a generator from a validated config.
    ///
    /// `equation` is the parsed custom equation, required only by
    /// `custom-equation` worlds; without one they fall back to base height.
    pub fn new(config: &WorldConfig, equation: Option<Equation>) -> Self {
        TerrainGenerator {
            seed: config.seed,
            generation_type: config.generation_type,
            noise: WorldNoise::new(
                config.seed,
                config.min_biome_size as f64,
                config.max_biome_size as f64,
            ),
            equation,
            height_cap: config.max_y_height.min(CHUNK_HEIGHT),
            continent_scale: config.continent_scale,
            mountain_scale: config.mountain_scale,
            detail_scale: config.detail_scale,
        }
    }

    /// World seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Terrain shaping mode.
    pub fn generation_type(&self) -> GenerationType {
        self.generation_type
    }

    /// Sea level of this world.
    pub fn sea_level(&self) -> i32 {
        SEA_LEVEL
    }

    /// The custom equation, if the world uses one.
    pub fn equation(&self) -> Option<&Equation> {
        self.equation.as_ref()
    }

    /// Surface height and climate of world column `(wx, wz)`.
    pub fn sample_column(&self, wx: i32, wz: i32) -> ColumnSample {
        let (x, z) = (wx as f64, wz as f64);
        let temperature = self.noise.temperature(x, z);
        let humidity = self.noise.humidity(x, z);

        let raw_height = match self.generation_type {
            GenerationType::Superflat => SEA_LEVEL as f64,
            GenerationType::CustomEquation => {
                let inputs = EquationInputs {
                    continent: self.noise.continent(x, z),
                    mountain: self.noise.mountain(x, z),
                    detail: self.noise.detail(x, z),
                    temperature,
                    humidity,
                    x,
                    z,
                };
                self.equation
                    .as_ref()
                    .map(|equation| equation.evaluate(&inputs))
                    .unwrap_or(BASE_HEIGHT as f64)
            }
            GenerationType::Islands => {
                let continent = self.noise.continent(x * 2.0, z * 2.0);
                let island = ((continent + 0.15) * 2.2).clamp(-1.0, 1.0);
                let mask = self.noise.mountain(x, z).max(0.0);
                (SEA_LEVEL - 10) as f64
                    + island * 22.0 * self.continent_scale
                    + mask * mask * 40.0 * self.mountain_scale
                    + self.noise.detail(x, z) * 3.0 * self.detail_scale
            }
            kind => {
                let (k1, k2, lift) = match kind {
                    GenerationType::Amplified => (36.0, 220.0, 0.0),
                    GenerationType::Caves => (24.0, 90.0, 24.0),
                    _ => (24.0, 90.0, 0.0),
                };
                let mask = self.noise.mountain(x, z).max(0.0);
                BASE_HEIGHT as f64
                    + lift
                    + self.noise.continent(x, z) * k1 * self.continent_scale
                    + mask * mask * k2 * self.mountain_scale
                    + self.noise.detail(x, z) * 4.0 * self.detail_scale
            }
        };

        let height = (raw_height.round() as i32).clamp(1, self.height_cap - 1);
        ColumnSample {
            height,
            temperature,
            humidity,
            biome: classify(height, temperature, humidity),
        }
    }

    fn surface_block(&self, column: &ColumnSample) -> BlockType {
        let near_sea = column.height <= SEA_LEVEL + 1;
        if near_sea && column.humidity < 0.2 {
            return BlockType::Sand;
        }
        if column.height < SEA_LEVEL {
            return BlockType::Gravel;
        }
        match column.biome {
            Biome::Desert => BlockType::Sand,
            _ if column.temperature < -0.2 && column.height > SNOW_LINE => BlockType::Snow,
            Biome::Tundra => BlockType::Snow,
            _ if near_sea => BlockType::Dirt,
            _ => BlockType::Grass,
        }
    }

    fn fill_column(&self, chunk: &mut Chunk, lx: i32, lz: i32, column: &ColumnSample) {
        if self.generation_type == GenerationType::Superflat {
            chunk.set_block(lx, 0, lz, BlockType::Bedrock);
            for y in 1..=58 {
                chunk.set_block(lx, y, lz, BlockType::Stone);
            }
            for y in 59..=61 {
                chunk.set_block(lx, y, lz, BlockType::Dirt);
            }
            chunk.set_block(lx, 62, lz, BlockType::Grass);
            return;
        }

        let surface = self.surface_block(column);
        let (soil, depth) = match surface {
            BlockType::Sand => (BlockType::Sand, 4),
            BlockType::Gravel => (BlockType::Gravel, 2),
            _ => (BlockType::Dirt, 3),
        };
        let height = column.height;

        chunk.set_block(lx, 0, lz, BlockType::Bedrock);
        for y in 1..height - depth {
            chunk.set_block(lx, y, lz, BlockType::Stone);
        }
        for y in (height - depth).max(1)..height {
            chunk.set_block(lx, y, lz, soil);
        }
        chunk.set_block(lx, height, lz, surface);
        for y in height + 1..=SEA_LEVEL {
            chunk.set_block(lx, y, lz, BlockType::Water);
        }
    }

    fn carve_caves(&self, chunk: &mut Chunk, columns: &[ColumnSample], cancel: &AtomicBool) -> bool {
        let threshold = match self.generation_type {
            GenerationType::Superflat => return true,
            GenerationType::Caves => 0.86,
            _ => 0.93,
        };
        let top = columns.iter().map(|column| column.height).max().unwrap_or(0);
        let points_xz = (CHUNK_WIDTH / CAVE_STEP_XZ + 1) as usize;
        let points_y = (top / CAVE_STEP_Y + 2) as usize;
        let origin = chunk.position.origin();

        let mut lattice = vec![0.0f64; points_xz * points_xz * points_y];
        let lattice_index = |ix: usize, iy: usize, iz: usize| (ix * points_xz + iz) * points_y + iy;
        for ix in 0..points_xz {
            for iz in 0..points_xz {
                for iy in 0..points_y {
                    lattice[lattice_index(ix, iy, iz)] = self.noise.cave(
                        (origin.x + ix as i32 * CAVE_STEP_XZ) as f64,
                        (iy as i32 * CAVE_STEP_Y) as f64,
                        (origin.z + iz as i32 * CAVE_STEP_XZ) as f64,
                    );
                }
            }
        }

        for lx in 0..CHUNK_WIDTH {
            if cancel.load(Ordering::Relaxed) {
                return false;
            }
            let ix = (lx / CAVE_STEP_XZ) as usize;
            let fx = (lx % CAVE_STEP_XZ) as f64 / CAVE_STEP_XZ as f64;
            for lz in 0..CHUNK_WIDTH {
                let iz = (lz / CAVE_STEP_XZ) as usize;
                let fz = (lz % CAVE_STEP_XZ) as f64 / CAVE_STEP_XZ as f64;
                let ceiling = columns[(lx * CHUNK_WIDTH + lz) as usize].height - 4;
                for y in 1..ceiling {
                    let iy = (y / CAVE_STEP_Y) as usize;
                    let fy = (y % CAVE_STEP_Y) as f64 / CAVE_STEP_Y as f64;
                    let sample = |dx: usize, dy: usize, dz: usize| {
                        lattice[lattice_index(ix + dx, iy + dy, iz + dz)]
                    };
                    let value = lerp(
                        lerp(
                            lerp(sample(0, 0, 0), sample(1, 0, 0), fx),
                            lerp(sample(0, 0, 1), sample(1, 0, 1), fx),
                            fz,
                        ),
                        lerp(
                            lerp(sample(0, 1, 0), sample(1, 1, 0), fx),
                            lerp(sample(0, 1, 1), sample(1, 1, 1), fx),
                            fz,
                        ),
                        fy,
                    );
                    if value > threshold {
                        let fill = if y <= LAVA_LEVEL {
                            BlockType::Lava
                        } else {
                            BlockType::Air
                        };
                        chunk.set_block(lx, y, lz, fill);
                    }
                }
            }
        }
        true
    }

    /// Generates one chunk.
    ///
    /// Checks `cancel` between column loops and returns `None` as soon as it
    /// is set.
    pub fn generate(&self, position: ChunkPos, cancel: &AtomicBool) -> Option<GeneratedChunk> {
        let origin = position.origin();
        let mut columns = Vec::with_capacity((CHUNK_WIDTH * CHUNK_WIDTH) as usize);
        for lx in 0..CHUNK_WIDTH {
            if cancel.load(Ordering::Relaxed) {
                return None;
            }
            for lz in 0..CHUNK_WIDTH {
                columns.push(self.sample_column(origin.x + lx, origin.z + lz));
            }
        }

        let mut chunk = Chunk::empty(position);
        for lx in 0..CHUNK_WIDTH {
            if cancel.load(Ordering::Relaxed) {
                return None;
            }
            for lz in 0..CHUNK_WIDTH {
                self.fill_column(&mut chunk, lx, lz, &columns[(lx * CHUNK_WIDTH + lz) as usize]);
            }
        }

        if !self.carve_caves(&mut chunk, &columns, cancel) {
            return None;
        }

        let spills = if self.generation_type == GenerationType::Superflat {
            Vec::new()
        } else {
            let ore_seed = hash_2d(self.seed, NoiseRole::Ore, position.x, position.z);
            place_ores(&mut chunk, &self.noise, ore_seed);
            decorate(self.seed, SEA_LEVEL, &mut chunk, &columns)
        };

        chunk.modified = false;
        Some(GeneratedChunk { chunk, spills })
    }
}

#[inline]
fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(kind: GenerationType, seed: u64) -> TerrainGenerator {
        let config = WorldConfig {
            seed,
            generation_type: kind,
            ..WorldConfig::default()
        };
        TerrainGenerator::new(&config, None)
    }

    fn generate(generator: &TerrainGenerator, x: i32, z: i32) -> GeneratedChunk {
        generator
            .generate(ChunkPos::new(x, z), &AtomicBool::new(false))
            .unwrap()
    }

    #[test]
    fn generation_is_deterministic() {
        let a = generator(GenerationType::Standard, 0x5EED);
        let b = generator(GenerationType::Standard, 0x5EED);
        for (x, z) in [(0, 0), (-3, 7)] {
            let first = generate(&a, x, z);
            let second = generate(&b, x, z);
            assert_eq!(first.chunk.blocks(), second.chunk.blocks());
            assert_eq!(first.spills, second.spills);
        }
    }

    #[test]
    fn columns_have_bedrock_and_sea_fill() {
        let generator = generator(GenerationType::Standard, 42);
        let generated = generate(&generator, 2, -1);
        let chunk = &generated.chunk;
        for lx in 0..CHUNK_WIDTH {
            for lz in 0..CHUNK_WIDTH {
                assert_eq!(chunk.get_block(lx, 0, lz), BlockType::Bedrock);
                let column = generator.sample_column(32 + lx, -16 + lz);
                for y in column.height + 1..=SEA_LEVEL {
                    assert_eq!(chunk.get_block(lx, y, lz), BlockType::Water);
                    assert_eq!(chunk.get_water_level(lx, y, lz), 8);
                }
            }
        }
        let (min_y, max_y) = chunk.vertical_extent().unwrap();
        assert_eq!(min_y, 0);
        assert!(max_y >= SEA_LEVEL);
    }

    #[test]
    fn superflat_layers() {
        let generator = generator(GenerationType::Superflat, 1);
        let generated = generate(&generator, 5, 5);
        let chunk = &generated.chunk;
        assert!(generated.spills.is_empty());
        for (y, block) in [
            (0, BlockType::Bedrock),
            (1, BlockType::Stone),
            (58, BlockType::Stone),
            (59, BlockType::Dirt),
            (61, BlockType::Dirt),
            (62, BlockType::Grass),
            (63, BlockType::Air),
        ] {
            assert_eq!(chunk.get_block(7, y, 9), block, "y = {}", y);
        }
        assert_eq!(chunk.vertical_extent(), Some((0, 62)));
    }

    #[test]
    fn height_cap_limits_terrain() {
        let config = WorldConfig {
            seed: 9,
            generation_type: GenerationType::Amplified,
            max_y_height: 80,
            ..WorldConfig::default()
        };
        let generator = TerrainGenerator::new(&config, None);
        for i in 0..200 {
            assert!(generator.sample_column(i * 37, i * -53).height <= 79);
        }
    }

    #[test]
    fn custom_equation_drives_height() {
        let config = WorldConfig {
            generation_type: GenerationType::CustomEquation,
            custom_equation: Some("70 + (x > 0 ? 5 : 0)".to_string()),
            ..WorldConfig::default()
        };
        let equation = config.validate().unwrap();
        let generator = TerrainGenerator::new(&config, equation);
        assert_eq!(generator.sample_column(-4, 0).height, 70);
        assert_eq!(generator.sample_column(4, 0).height, 75);
    }

    #[test]
    fn cancellation_stops_generation() {
        let generator = generator(GenerationType::Standard, 3);
        assert!(generator
            .generate(ChunkPos::new(0, 0), &AtomicBool::new(true))
            .is_none());
    }
}
