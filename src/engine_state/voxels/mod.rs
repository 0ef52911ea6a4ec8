//! # Voxel World
//!
//! Blocks, chunks and everything that reads or writes them.
//!
//! ## Architecture
//!
//! * **Block**: block ids and their registry rows (solidity, transparency,
//!   emission, texture slots, tint class), plus block sides
//! * **Chunk**: fixed 16×256×16 columns with block, water and light fields
//! * **World**: the chunk map keyed by column coordinate, neighbour-aware
//!   reads, edits that dirty the right chunks, and the feature inbox
//! * **Generation**: noise, the terrain generator, ores and features
//! * **Light**: block light flood fill, bounded to one chunk
//! * **Water**: the fixed-rate water level automaton
//! * **Raycast** and **Physics**: the queries the observer makes
//! * **Tasks**: the chunk generation task run on the worker pool
//!
//! ## Threading
//!
//! The chunk map lives on the main thread and only the main thread writes
//! to it. Workers get owned inputs (a seed and a coordinate, or a chunk
//! snapshot plus its neighbours' boundary slices) and send owned results back.

pub mod block;
pub mod chunk;
pub mod generation;
pub mod light;
pub mod physics;
pub mod raycast;
pub mod tasks;
pub mod water;
pub mod world;
