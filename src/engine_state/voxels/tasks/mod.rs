//! # Voxel Task System
//!
//! Tasks run on the chunk generation lane of the worker pool.

pub mod chunk_generation_task;

pub use chunk_generation_task::ChunkGenerationTask;
