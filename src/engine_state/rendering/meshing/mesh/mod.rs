//! Mesh generation for voxel rendering.
//!
//! Converts a chunk snapshot plus the one-cell seams of its neighbours into
//! packed vertex buffers, one set per sub-chunk and LOD level, with a separate
//! water buffer.
//!
//! # Architecture
//! - [`ChunkMesh`]: all sub-chunk meshes of one chunk, tagged with the chunk revision
//! - [`Face`]: a rectangle of identical faces inside one slice
//! - [`ChunkSampler`]: seam-aware block and light lookups
//! - [`mesh_chunk`]: the greedy mesher itself
//!
//! # Usage
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//! use voxel_world::engine_state::{
//!     rendering::meshing::mesh::mesh_chunk,
//!     voxels::{chunk::{Chunk, ChunkPos}, world::NeighborSlices},
//! };
//!
//! let chunk = Chunk::empty(ChunkPos::new(0, 0));
//! let mesh = mesh_chunk(&chunk, &NeighborSlices::default(), &AtomicBool::new(false));
//! ```

mod face;
mod greedy;
mod mesh;
mod sampler;

pub use face::{Face, FaceKey};
pub use greedy::mesh_chunk;
pub use mesh::*;
pub use sampler::ChunkSampler;
