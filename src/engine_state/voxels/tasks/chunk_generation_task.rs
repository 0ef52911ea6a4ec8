//! # Chunk Generation Task
//!
//! This module defines the `ChunkGenerationTask` which produces the block
//! data of one chunk on a worker thread. It is scheduled by the streaming
//! controller when a chunk inside the load window is missing.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use log::warn;

use crate::engine_state::{
    persistence::SaveDirectory,
    task_management::task::{Task, TaskKind, TaskOutcome, TaskOutput},
    voxels::{
        chunk::ChunkPos,
        generation::{GeneratedChunk, TerrainGenerator},
    },
};

/// A task that generates chunk data asynchronously.
///
/// This task is responsible for:
/// 1. Running the terrain generator for the chunk
/// 2. Replacing the generated blocks with the saved ones when a readable
///    region file exists
///
/// The generator always runs so that the feature blocks this chunk spills
/// into its neighbours are produced even when its own blocks come from disk.
pub struct ChunkGenerationTask {
    position: ChunkPos,
    generator: Arc<TerrainGenerator>,
    saves: Option<SaveDirectory>,
}

impl ChunkGenerationTask {
    /// Creates a new chunk generation task.
    ///
    /// # Arguments
    /// * `position` - The chunk to produce
    /// * `generator` - Shared, immutable terrain generator
    /// * `saves` - Save directory to read region files from, if any
    pub fn new(
        position: ChunkPos,
        generator: Arc<TerrainGenerator>,
        saves: Option<SaveDirectory>,
    ) -> Self {
        ChunkGenerationTask {
            position,
            generator,
            saves,
        }
    }
}

impl Task for ChunkGenerationTask {
    fn kind(&self) -> TaskKind {
        TaskKind::ChunkGeneration
    }

    fn key(&self) -> ChunkPos {
        self.position
    }

    fn process(&self, cancel: &AtomicBool) -> TaskOutcome {
        let Some(generated) = self.generator.generate(self.position, cancel) else {
            return TaskOutcome::Cancelled;
        };

        if let Some(saves) = &self.saves {
            match saves.read_chunk(self.position) {
                Ok(Some(chunk)) => {
                    return TaskOutcome::Completed(TaskOutput::Chunk(Box::new(GeneratedChunk {
                        chunk,
                        spills: generated.spills,
                    })));
                }
                Ok(None) => {}
                Err(err) => warn!(
                    "Malformed chunk file for {:?}: {}; regenerating",
                    self.position, err
                ),
            }
        }
        TaskOutcome::Completed(TaskOutput::Chunk(Box::new(generated)))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::engine_state::{
        config::{GenerationType, WorldConfig},
        voxels::block::block_type::BlockType,
    };

    fn generator() -> Arc<TerrainGenerator> {
        let config = WorldConfig {
            generation_type: GenerationType::Superflat,
            ..WorldConfig::default()
        };
        Arc::new(TerrainGenerator::new(&config, None))
    }

    fn chunk_of(outcome: TaskOutcome) -> GeneratedChunk {
        match outcome {
            TaskOutcome::Completed(TaskOutput::Chunk(generated)) => *generated,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn saved_chunks_win_and_malformed_ones_regenerate() {
        let root = std::env::temp_dir().join(format!("voxel-world-gen-task-{}", std::process::id()));
        let saves = SaveDirectory::new(&root);
        saves.create_dirs().unwrap();
        let position = ChunkPos::new(3, -2);

        let fresh = chunk_of(ChunkGenerationTask::new(position, generator(), None).process(&AtomicBool::new(false)));
        let mut edited = fresh.chunk.clone();
        edited.set_block(1, 100, 1, BlockType::Glowstone);
        saves.write_chunk(&edited).unwrap();

        let task = ChunkGenerationTask::new(position, generator(), Some(saves.clone()));
        let loaded = chunk_of(task.process(&AtomicBool::new(false)));
        assert_eq!(loaded.chunk.get_block(1, 100, 1), BlockType::Glowstone);

        fs::write(saves.chunk_path(position), b"not a chunk").unwrap();
        let regenerated = chunk_of(task.process(&AtomicBool::new(false)));
        assert_eq!(regenerated.chunk.blocks(), fresh.chunk.blocks());

        assert!(matches!(task.process(&AtomicBool::new(true)), TaskOutcome::Cancelled));
        let _ = fs::remove_dir_all(&root);
    }
}
