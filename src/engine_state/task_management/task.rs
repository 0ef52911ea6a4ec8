//! # Task System Core Types
//!
//! This module defines the fundamental building blocks of the task system,
//! which executes world work on background threads.
//!
//! ## Core Components
//! - `Task`: A unit of work over owned inputs
//! - `TaskKind`: The lane a task runs on
//! - `TaskOutcome`: What a task produced, or why it produced nothing
//! - `TaskResult`: An outcome tagged with the task's lane and chunk
//!
//! ## Task Lifecycle
//! 1. A `Task` is created and scheduled via `TaskManager::publish_task()`
//! 2. The task's `process()` method is called on a worker thread
//! 3. The outcome travels back through its lane's result queue
//! 4. The main thread drains results with `TaskManager::drain_completed()`
//!
//! ## Thread Safety
//! - `Task` must be `Send` to be transferred between threads
//! - Tasks own their inputs; workers never touch world storage

use std::fmt::{Debug, Formatter};
use std::sync::atomic::AtomicBool;

use crate::engine_state::{
    rendering::meshing::ChunkMesh, voxels::chunk::ChunkPos, voxels::generation::GeneratedChunk,
};

/// The lane a task runs on. Lanes have separate workers so slow meshing
/// never holds up generation and vice versa.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskKind {
    /// Produces a new chunk from the seed or from disk.
    ChunkGeneration,
    /// Produces a chunk mesh from a snapshot.
    MeshGeneration,
}

impl TaskKind {
    /// Both lanes, in lane index order.
    pub const ALL: [TaskKind; 2] = [TaskKind::ChunkGeneration, TaskKind::MeshGeneration];

    /// Index of the lane.
    pub fn index(self) -> usize {
        match self {
            TaskKind::ChunkGeneration => 0,
            TaskKind::MeshGeneration => 1,
        }
    }
}

/// Owned product of a finished task.
pub enum TaskOutput {
    /// A generated or loaded chunk plus the feature blocks it spilled.
    Chunk(Box<GeneratedChunk>),
    /// A finished chunk mesh.
    Mesh(Box<ChunkMesh>),
}

impl Debug for TaskOutput {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskOutput::Chunk(generated) => write!(f, "Chunk({:?})", generated.chunk.position),
            TaskOutput::Mesh(mesh) => write!(f, "Mesh({:?}, rev {})", mesh.position, mesh.revision),
        }
    }
}

/// How a task ended.
#[derive(Debug)]
pub enum TaskOutcome {
    /// The task produced its output.
    Completed(TaskOutput),
    /// The task saw its cancel flag at a checkpoint.
    Cancelled,
    /// The task failed or panicked.
    Failed(String),
}

/// A unit of work that can be executed on a worker thread.
///
/// # Implementation Guidelines
/// - Must own everything it reads
/// - Should poll `cancel` at coarse checkpoints and return
///   [`TaskOutcome::Cancelled`] once it is raised
pub trait Task: Send {
    /// Lane the task runs on.
    fn kind(&self) -> TaskKind;

    /// Chunk the task works for. At most one task per lane and chunk is pending.
    fn key(&self) -> ChunkPos;

    /// Processes the task on a worker thread.
    fn process(&self, cancel: &AtomicBool) -> TaskOutcome;
}

/// A task outcome delivered back to the main thread.
#[derive(Debug)]
pub struct TaskResult {
    /// Lane the task ran on.
    pub kind: TaskKind,
    /// Chunk the task worked for.
    pub key: ChunkPos,
    /// What happened.
    pub outcome: TaskOutcome,
}
