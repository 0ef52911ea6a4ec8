//! Background tasks for the rendering system.
//!
//! # Available Tasks
//! - `MeshGenerationTask`: Generates mesh data for chunks in the background

pub mod mesh_generation_task;

pub use mesh_generation_task::MeshGenerationTask;
