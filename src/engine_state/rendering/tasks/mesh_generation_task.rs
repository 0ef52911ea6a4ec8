//! Task for generating mesh data for chunks in a background thread.

use std::sync::atomic::AtomicBool;

use crate::engine_state::{
    rendering::meshing::mesh_chunk,
    task_management::task::{Task, TaskKind, TaskOutcome, TaskOutput},
    voxels::{
        chunk::{Chunk, ChunkPos},
        world::NeighborSlices,
    },
};

/// A task that meshes an owned snapshot of a chunk and its neighbour seams.
///
/// The snapshot carries the chunk revision, so a result that arrives after
/// the chunk was edited again can be recognised as stale and dropped.
pub struct MeshGenerationTask {
    chunk: Chunk,
    neighbors: NeighborSlices,
}

impl MeshGenerationTask {
    /// Creates a new mesh generation task.
    ///
    /// # Arguments
    /// * `chunk` - Snapshot of the chunk to mesh
    /// * `neighbors` - Boundary slices of its four neighbours
    pub fn new(chunk: Chunk, neighbors: NeighborSlices) -> Self {
        MeshGenerationTask { chunk, neighbors }
    }
}

impl Task for MeshGenerationTask {
    fn kind(&self) -> TaskKind {
        TaskKind::MeshGeneration
    }

    fn key(&self) -> ChunkPos {
        self.chunk.position
    }

    fn process(&self, cancel: &AtomicBool) -> TaskOutcome {
        match mesh_chunk(&self.chunk, &self.neighbors, cancel) {
            Some(mesh) => TaskOutcome::Completed(TaskOutput::Mesh(Box::new(mesh))),
            None => TaskOutcome::Cancelled,
        }
    }
}
