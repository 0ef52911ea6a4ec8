//! Procedural world generation.
//!
//! * `noise` - seeded noise fields, one per generation role
//! * `terrain` - the chunk generator (heightmap, layers, sea, caves)
//! * `equation` - user-written height expressions
//! * `ores` - ore veins
//! * `features` - trees, cacti, tall grass and cross-chunk spills

pub mod equation;
pub mod features;
pub mod noise;
pub mod ores;
pub mod terrain;

pub use features::{FeatureSpill, GeneratedChunk, PlacedBlock};
pub use terrain::{TerrainGenerator, SEA_LEVEL};
