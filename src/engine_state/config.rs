//! # World Configuration
//!
//! Options recognised by the world core, loadable from JSON. Every field has
//! a default so partial files work; `validate()` enforces the accepted
//! ranges and parses the custom terrain equation up front so that a bad
//! expression rejects the world before anything is created.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use super::voxels::generation::equation::Equation;

/// Terrain shaping mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationType {
    /// Continents, mountains and detail noise.
    #[default]
    Standard,
    /// Standard with exaggerated mountains.
    Amplified,
    /// Flat layers, no features.
    Superflat,
    /// Mostly ocean with scattered islands.
    Islands,
    /// A solid world riddled with large caverns.
    Caves,
    /// Height from a user-provided expression.
    CustomEquation,
}

impl GenerationType {
    /// Name used in `world.meta` and config files.
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationType::Standard => "standard",
            GenerationType::Amplified => "amplified",
            GenerationType::Superflat => "superflat",
            GenerationType::Islands => "islands",
            GenerationType::Caves => "caves",
            GenerationType::CustomEquation => "custom-equation",
        }
    }

    /// Inverse of [`GenerationType::as_str`].
    pub fn parse(name: &str) -> Option<Self> {
        [
            GenerationType::Standard,
            GenerationType::Amplified,
            GenerationType::Superflat,
            GenerationType::Islands,
            GenerationType::Caves,
            GenerationType::CustomEquation,
        ]
        .into_iter()
        .find(|kind| kind.as_str() == name)
    }
}

/// All options recognised by the world core.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// World seed.
    pub seed: u64,
    /// Chebyshev radius of loaded and rendered chunks, `4..=48`.
    pub render_distance: i32,
    /// Eviction radius, at least `render_distance`.
    pub unload_distance: i32,
    /// Chunk drain and enqueue cap per frame.
    pub max_chunks_per_frame: usize,
    /// Mesh drain and enqueue cap per frame.
    pub max_meshes_per_frame: usize,
    /// Disable per-frame caps (initial load, teleports).
    pub burst_mode: bool,
    /// Run generation and meshing on the worker pool.
    pub multithreading: bool,
    /// Worker threads per task lane; `0` picks half the hardware threads, minimum 2.
    pub worker_threads: usize,
    /// Consult the renderer's Hi-Z visibility map when one is supplied.
    pub hi_z_culling: bool,
    /// Cull per sub-chunk instead of per chunk.
    pub sub_chunk_culling: bool,
    /// Terrain shaping mode.
    pub generation_type: GenerationType,
    /// Expression used by `custom-equation` worlds.
    pub custom_equation: Option<String>,
    /// Terrain height cap, `64..=512`; heights never exceed the chunk column.
    pub max_y_height: i32,
    /// Smallest biome cell, in chunks.
    pub min_biome_size: i32,
    /// Largest biome cell, in chunks.
    pub max_biome_size: i32,
    /// Continental height multiplier.
    pub continent_scale: f64,
    /// Mountain height multiplier.
    pub mountain_scale: f64,
    /// Surface detail multiplier.
    pub detail_scale: f64,
    /// Radius in chunks around the observer where water is simulated.
    pub water_tick_radius: i32,
    /// Water simulation rate.
    pub water_tick_hz: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        WorldConfig {
            seed: 0,
            render_distance: 8,
            unload_distance: 10,
            max_chunks_per_frame: 8,
            max_meshes_per_frame: 8,
            burst_mode: false,
            multithreading: true,
            worker_threads: 0,
            hi_z_culling: false,
            sub_chunk_culling: true,
            generation_type: GenerationType::Standard,
            custom_equation: None,
            max_y_height: 256,
            min_biome_size: 4,
            max_biome_size: 16,
            continent_scale: 1.0,
            mountain_scale: 1.0,
            detail_scale: 1.0,
            water_tick_radius: 4,
            water_tick_hz: 10.0,
        }
    }
}

fn out_of_range(option: &'static str, value: impl ToString, range: &'static str) -> ConfigError {
    ConfigError::OutOfRange {
        option,
        value: value.to_string(),
        range,
    }
}

impl WorldConfig {
    /// Reads a config from a JSON file and validates it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Parse(format!("{}: {}", path.display(), err)))?;
        Self::from_json(&text)
    }

    /// Parses a config from JSON text and validates it.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: WorldConfig =
            serde_json::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every option against its accepted range.
    ///
    /// # Returns
    /// The parsed custom equation when the generation type uses one.
    pub fn validate(&self) -> Result<Option<Equation>, ConfigError> {
        if !(4..=48).contains(&self.render_distance) {
            return Err(out_of_range("render_distance", self.render_distance, "4..=48"));
        }
        if self.unload_distance < self.render_distance {
            return Err(out_of_range(
                "unload_distance",
                self.unload_distance,
                ">= render_distance",
            ));
        }
        if self.max_chunks_per_frame == 0 {
            return Err(out_of_range("max_chunks_per_frame", 0, ">= 1"));
        }
        if self.max_meshes_per_frame == 0 {
            return Err(out_of_range("max_meshes_per_frame", 0, ">= 1"));
        }
        if !(64..=512).contains(&self.max_y_height) {
            return Err(out_of_range("max_y_height", self.max_y_height, "64..=512"));
        }
        if self.min_biome_size < 1 {
            return Err(out_of_range("min_biome_size", self.min_biome_size, ">= 1"));
        }
        if self.max_biome_size < self.min_biome_size {
            return Err(out_of_range(
                "max_biome_size",
                self.max_biome_size,
                ">= min_biome_size",
            ));
        }
        for (option, value) in [
            ("continent_scale", self.continent_scale),
            ("mountain_scale", self.mountain_scale),
            ("detail_scale", self.detail_scale),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(out_of_range(option, value, "finite and >= 0"));
            }
        }
        if self.water_tick_radius < 0 {
            return Err(out_of_range("water_tick_radius", self.water_tick_radius, ">= 0"));
        }
        if !(self.water_tick_hz > 0.0 && self.water_tick_hz.is_finite()) {
            return Err(out_of_range("water_tick_hz", self.water_tick_hz, "> 0"));
        }

        if self.generation_type != GenerationType::CustomEquation {
            return Ok(None);
        }
        let source = self
            .custom_equation
            .as_deref()
            .ok_or(ConfigError::MissingEquation)?;
        Ok(Some(Equation::parse(source)?))
    }

    /// Worker threads to spawn per lane.
    pub fn threads_per_lane(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads;
        }
        let hardware = std::thread::available_parallelism()
            .map(|threads| threads.get())
            .unwrap_or(2);
        (hardware / 2).max(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert_eq!(WorldConfig::default().validate(), Ok(None));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = WorldConfig::from_json(
            r#"{ "seed": 42, "render_distance": 6, "generation_type": "superflat" }"#,
        )
        .unwrap();
        assert_eq!(config.seed, 42);
        assert_eq!(config.render_distance, 6);
        assert_eq!(config.generation_type, GenerationType::Superflat);
        assert_eq!(config.max_chunks_per_frame, 8);
    }

    #[test]
    fn ranges_are_enforced() {
        let config = WorldConfig {
            render_distance: 3,
            ..WorldConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                option: "render_distance",
                ..
            })
        ));

        let config = WorldConfig {
            unload_distance: 7,
            ..WorldConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn custom_equation_is_parsed_at_validation() {
        let mut config = WorldConfig {
            generation_type: GenerationType::CustomEquation,
            ..WorldConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::MissingEquation));

        config.custom_equation = Some("64 + continent * (".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Equation(_))));

        config.custom_equation = Some("64 + continent * 20".to_string());
        assert!(config.validate().unwrap().is_some());
    }

    #[test]
    fn generation_type_names_round_trip() {
        for name in ["standard", "amplified", "superflat", "islands", "caves", "custom-equation"] {
            assert_eq!(GenerationType::parse(name).unwrap().as_str(), name);
        }
        assert_eq!(GenerationType::parse("flat"), None);
    }
}
