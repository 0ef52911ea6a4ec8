//! Seeded noise primitives.
//!
//! Every role a noise field plays in terrain generation (continents,
//! mountains, biomes, caves, ores, features) gets its own generator whose
//! seed is derived from the 64-bit world seed and a fixed per-role salt, so
//! changing one layer never shifts another.

use ::noise::{Fbm, MultiFractal, NoiseFn, Perlin, Simplex};

/// Edge of one biome region, in multiples of the largest biome size.
const BIOME_REGION_SPAN: f64 = 4.0;

/// The independent noise layers a world draws from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NoiseRole {
    /// Large-scale land/ocean shape.
    Continent,
    /// Mountain mask.
    Mountain,
    /// Small surface bumps.
    Detail,
    /// Biome temperature.
    Temperature,
    /// Biome humidity.
    Humidity,
    /// Cave carving field.
    Cave,
    /// Ore blob shapes and per-chunk ore rolls.
    Ore,
    /// Feature placement rolls.
    Feature,
}

impl NoiseRole {
    fn salt(self) -> u64 {
        match self {
            NoiseRole::Continent => 0x636F_6E74_696E_656E,
            NoiseRole::Mountain => 0x6D6F_756E_7461_696E,
            NoiseRole::Detail => 0x6465_7461_696C_0001,
            NoiseRole::Temperature => 0x7465_6D70_6572_6174,
            NoiseRole::Humidity => 0x6875_6D69_6469_7479,
            NoiseRole::Cave => 0x6361_7665_7300_0002,
            NoiseRole::Ore => 0x6F72_6573_0000_0003,
            NoiseRole::Feature => 0x6665_6174_7572_6573,
        }
    }
}

/// SplitMix64 finaliser; a cheap, well-mixed 64-bit hash.
#[inline]
pub fn mix64(mut value: u64) -> u64 {
    value = value.wrapping_add(0x9E37_79B9_7F4A_7C15);
    value = (value ^ (value >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    value = (value ^ (value >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    value ^ (value >> 31)
}

/// 64-bit seed for a role.
pub fn role_seed(seed: u64, role: NoiseRole) -> u64 {
    mix64(seed ^ role.salt())
}

/// 32-bit seed for a role, as the `noise` generators take.
pub fn role_seed_u32(seed: u64, role: NoiseRole) -> u32 {
    let mixed = role_seed(seed, role);
    (mixed ^ (mixed >> 32)) as u32
}

/// Deterministic hash of an integer lattice point under a role.
pub fn hash_2d(seed: u64, role: NoiseRole, x: i32, z: i32) -> u64 {
    let packed = ((x as u32 as u64) << 32) | (z as u32 as u64);
    mix64(role_seed(seed, role) ^ mix64(packed))
}

/// Maps a hash to `[0, 1)`.
#[inline]
pub fn unit_from_hash(hash: u64) -> f64 {
    (hash >> 11) as f64 / (1u64 << 53) as f64
}

/// The full set of noise fields used by the terrain generator.
///
/// Cheap to share: generators are immutable after construction and
/// `Send + Sync`, so one instance serves every worker.
pub struct WorldNoise {
    continent: Fbm<Perlin>,
    mountain: Fbm<Perlin>,
    detail: Fbm<Simplex>,
    temperature: Fbm<Perlin>,
    humidity: Fbm<Perlin>,
    cave: Fbm<Perlin>,
    cave_warp: Perlin,
    ore: Simplex,
    seed: u64,
    min_biome_chunks: f64,
    max_biome_chunks: f64,
    biome_region_blocks: f64,
}

impl WorldNoise {
    /// Builds every layer from the world seed.
    ///
    /// Biome sizes, in chunks, are drawn per biome region from
    /// `[min_biome_chunks, max_biome_chunks]` and set the wavelength of the
    /// temperature and humidity fields there.
    pub fn new(seed: u64, min_biome_chunks: f64, max_biome_chunks: f64) -> Self {
        let min_biome_chunks = min_biome_chunks.max(1.0);
        let max_biome_chunks = max_biome_chunks.max(min_biome_chunks);
        WorldNoise {
            continent: Fbm::<Perlin>::new(role_seed_u32(seed, NoiseRole::Continent))
                .set_octaves(4)
                .set_frequency(1.0 / 512.0)
                .set_persistence(0.5),
            mountain: Fbm::<Perlin>::new(role_seed_u32(seed, NoiseRole::Mountain))
                .set_octaves(3)
                .set_frequency(1.0 / 192.0)
                .set_persistence(0.45),
            detail: Fbm::<Simplex>::new(role_seed_u32(seed, NoiseRole::Detail))
                .set_octaves(2)
                .set_frequency(1.0 / 24.0),
            temperature: Fbm::<Perlin>::new(role_seed_u32(seed, NoiseRole::Temperature))
                .set_octaves(2)
                .set_frequency(1.0),
            humidity: Fbm::<Perlin>::new(role_seed_u32(seed, NoiseRole::Humidity))
                .set_octaves(2)
                .set_frequency(1.0),
            cave: Fbm::<Perlin>::new(role_seed_u32(seed, NoiseRole::Cave))
                .set_octaves(2)
                .set_frequency(1.0 / 48.0),
            cave_warp: Perlin::new(role_seed_u32(seed, NoiseRole::Cave).wrapping_add(1)),
            ore: Simplex::new(role_seed_u32(seed, NoiseRole::Ore)),
            seed,
            min_biome_chunks,
            max_biome_chunks,
            biome_region_blocks: max_biome_chunks * 16.0 * BIOME_REGION_SPAN,
        }
    }

    /// Continental shape in `[-1, 1]`.
    pub fn continent(&self, x: f64, z: f64) -> f64 {
        clamp_unit(self.continent.get([x, z]))
    }

    /// Mountain mask in `[-1, 1]`.
    pub fn mountain(&self, x: f64, z: f64) -> f64 {
        clamp_unit(self.mountain.get([x, z]))
    }

    /// Surface detail in `[-1, 1]`.
    pub fn detail(&self, x: f64, z: f64) -> f64 {
        clamp_unit(self.detail.get([x, z]))
    }

    /// Biome temperature in `[-1, 1]`.
    pub fn temperature(&self, x: f64, z: f64) -> f64 {
        clamp_unit(self.biome_field(&self.temperature, x, z) * 1.4)
    }

    /// Biome humidity in `[-1, 1]`.
    pub fn humidity(&self, x: f64, z: f64) -> f64 {
        clamp_unit(self.biome_field(&self.humidity, x, z) * 1.4)
    }

    /// Biome size in chunks drawn for biome region `(rx, rz)`.
    pub fn biome_size(&self, rx: i32, rz: i32) -> f64 {
        let mut rng = fastrand::Rng::with_seed(hash_2d(self.seed, NoiseRole::Temperature, rx, rz));
        self.min_biome_chunks + (self.max_biome_chunks - self.min_biome_chunks) * rng.f64()
    }

    /// Samples a climate field at the biome size of each surrounding region
    /// corner and blends the four with smoothstep weights, so sizes vary
    /// across the world without seams.
    fn biome_field(&self, field: &Fbm<Perlin>, x: f64, z: f64) -> f64 {
        let gx = x / self.biome_region_blocks;
        let gz = z / self.biome_region_blocks;
        let (rx, rz) = (gx.floor(), gz.floor());
        let tx = smoothstep(gx - rx);
        let tz = smoothstep(gz - rz);
        let (rx, rz) = (rx as i32, rz as i32);
        let sample = |cx: i32, cz: i32| {
            let frequency = 1.0 / (self.biome_size(cx, cz) * 16.0);
            field.get([x * frequency, z * frequency])
        };
        let near = sample(rx, rz) + (sample(rx + 1, rz) - sample(rx, rz)) * tx;
        let far = sample(rx, rz + 1) + (sample(rx + 1, rz + 1) - sample(rx, rz + 1)) * tx;
        near + (far - near) * tz
    }

    /// Ridged cave field in `[0, 1]`; values near 1 lie on tunnel centre lines.
    pub fn cave(&self, x: f64, y: f64, z: f64) -> f64 {
        let warp = self.cave_warp.get([x / 96.0, y / 96.0, z / 96.0]) * 12.0;
        let ridge = 1.0 - self.cave.get([x + warp, y * 1.6, z - warp]).abs();
        ridge.clamp(0.0, 1.0)
    }

    /// Ore blob shape in `[-1, 1]`.
    pub fn ore(&self, x: f64, y: f64, z: f64) -> f64 {
        clamp_unit(self.ore.get([x * 0.25, y * 0.25, z * 0.25]))
    }

}

#[inline]
fn smoothstep(t: f64) -> f64 {
    t * t * (3.0 - 2.0 * t)
}

#[inline]
fn clamp_unit(value: f64) -> f64 {
    value.clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_get_distinct_seeds() {
        let roles = [
            NoiseRole::Continent,
            NoiseRole::Mountain,
            NoiseRole::Detail,
            NoiseRole::Temperature,
            NoiseRole::Humidity,
            NoiseRole::Cave,
            NoiseRole::Ore,
            NoiseRole::Feature,
        ];
        let mut seeds: Vec<u64> = roles.iter().map(|role| role_seed(7, *role)).collect();
        seeds.sort_unstable();
        seeds.dedup();
        assert_eq!(seeds.len(), roles.len());
    }

    #[test]
    fn noise_is_deterministic_and_bounded() {
        let a = WorldNoise::new(99, 4.0, 16.0);
        let b = WorldNoise::new(99, 4.0, 16.0);
        for i in 0..64 {
            let x = i as f64 * 13.7 - 300.0;
            let z = i as f64 * -7.3 + 41.0;
            assert_eq!(a.continent(x, z), b.continent(x, z));
            assert_eq!(a.cave(x, 30.0, z), b.cave(x, 30.0, z));
            for value in [
                a.continent(x, z),
                a.mountain(x, z),
                a.detail(x, z),
                a.temperature(x, z),
                a.humidity(x, z),
                a.ore(x, 12.0, z),
            ] {
                assert!((-1.0..=1.0).contains(&value));
            }
            assert!((0.0..=1.0).contains(&a.cave(x, 30.0, z)));
        }
    }

    #[test]
    fn biome_sizes_vary_within_bounds() {
        let noise = WorldNoise::new(3, 4.0, 16.0);
        let mut sizes = Vec::new();
        for rx in -8..8 {
            for rz in -8..8 {
                let size = noise.biome_size(rx, rz);
                assert!((4.0..=16.0).contains(&size));
                assert_eq!(size, noise.biome_size(rx, rz));
                sizes.push(size);
            }
        }
        let smallest = sizes.iter().copied().fold(f64::INFINITY, f64::min);
        let largest = sizes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert!(largest - smallest > 4.0);

        let fixed = WorldNoise::new(3, 8.0, 8.0);
        assert_eq!(fixed.biome_size(5, -2), 8.0);
    }

    #[test]
    fn climate_is_continuous_across_region_edges() {
        let noise = WorldNoise::new(11, 2.0, 12.0);
        let edge = noise.biome_region_blocks;
        let before = noise.temperature(edge - 0.01, 37.0);
        let after = noise.temperature(edge + 0.01, 37.0);
        assert!((before - after).abs() < 0.01);
    }

    #[test]
    fn unit_hash_stays_in_range() {
        for i in 0..1000 {
            let value = unit_from_hash(hash_2d(5, NoiseRole::Feature, i, -i));
            assert!((0.0..1.0).contains(&value));
        }
    }
}
