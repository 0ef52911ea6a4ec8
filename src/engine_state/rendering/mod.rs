//! Rendering side of the world core.
//!
//! Nothing here talks to a GPU. The mesher turns chunks into packed vertex
//! data, the mesh manager hands that data to a [`meshing::Renderer`] and keeps
//! the returned handles, and the culler picks and orders what to draw.
//!
//! # Modules
//! - `vertex`: the packed vertex format
//! - `meshing`: greedy mesher with LOD and AO, mesh manager, renderer seam
//! - `culling`: frustum and Hi-Z culling, LOD selection, draw-list order
//! - `tasks`: the mesh generation task run on the worker pool

pub mod culling;
pub mod meshing;
pub mod tasks;
pub mod vertex;

// Re-export commonly used types
pub use meshing::MeshManager;
pub use vertex::Vertex;
