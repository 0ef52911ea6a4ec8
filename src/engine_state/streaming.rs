//! # Streaming Controller
//!
//! Keeps the window of resident chunks centred on the observer.
//!
//! Every frame, in order:
//! 1. Evict chunks further than `max(unload_distance, render_distance + 1)`
//!    (Chebyshev). Edited chunks are written to the save directory, if any,
//!    and kept in a small LRU cache so edits survive leaving and re-entering.
//! 2. Cancel generation tasks outside the load window and mesh tasks outside
//!    the render window.
//! 3. Insert up to `max_chunks_per_frame` finished chunks.
//! 4. Upload up to `max_meshes_per_frame` finished meshes. Meshes of chunks
//!    that were evicted or edited since the snapshot are dropped.
//! 5. Enqueue generation for missing chunks, ring by ring out to
//!    `render_distance + 1`, at most `max_chunks_per_frame` per frame.
//! 6. Enqueue meshing for dirty chunks inside `render_distance` whose four
//!    neighbours are resident or unavailable, nearest first.
//!
//! The extra ring at `render_distance + 1` is loaded but never meshed; it
//! only provides the seams of the outermost drawn chunks.
//!
//! Burst mode lifts the per-frame caps.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;

use log::{error, trace, warn};
use lru::LruCache;

use crate::engine_state::{
    config::WorldConfig,
    persistence::SaveDirectory,
    rendering::{
        meshing::{MeshManager, Renderer},
        tasks::MeshGenerationTask,
    },
    task_management::{
        task::{TaskKind, TaskOutcome, TaskOutput},
        TaskManager,
    },
    voxels::{
        chunk::{Chunk, ChunkPos},
        generation::TerrainGenerator,
        tasks::ChunkGenerationTask,
        world::World,
    },
};

/// Edited chunks remembered after eviction.
const EVICTED_CACHE_CAPACITY: usize = 256;

/// Generation attempts before a chunk is marked unavailable.
const MAX_GENERATION_ATTEMPTS: u8 = 2;

/// What one streaming step did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamingStats {
    /// Chunks made resident.
    pub inserted: usize,
    /// Meshes uploaded.
    pub uploaded: usize,
    /// Chunks evicted.
    pub evicted: usize,
    /// Generation tasks published.
    pub chunk_tasks: usize,
    /// Mesh tasks published.
    pub mesh_tasks: usize,
    /// Finished meshes dropped as stale or orphaned.
    pub discarded_meshes: usize,
    /// Meshes the renderer refused.
    pub upload_failures: usize,
}

/// Drives chunk loading, unloading and meshing around the observer.
pub struct StreamingController {
    tasks: TaskManager,
    generator: Arc<TerrainGenerator>,
    saves: Option<SaveDirectory>,
    evicted: LruCache<ChunkPos, Chunk>,
    failures: HashMap<ChunkPos, u8>,
    unavailable: HashSet<ChunkPos>,
    render_distance: i32,
    unload_distance: i32,
    max_chunks_per_frame: usize,
    max_meshes_per_frame: usize,
    burst_mode: bool,
}

impl StreamingController {
    /// Creates a controller and its worker pool.
    ///
    /// With `multithreading` off both lanes run inline, bounded by the
    /// per-frame caps.
    pub fn new(
        config: &WorldConfig,
        generator: Arc<TerrainGenerator>,
        saves: Option<SaveDirectory>,
    ) -> Self {
        let threads = if config.multithreading {
            config.threads_per_lane()
        } else {
            0
        };
        let capacity = NonZeroUsize::new(EVICTED_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);

        let mut controller = StreamingController {
            tasks: TaskManager::new(threads, 1),
            generator,
            saves,
            evicted: LruCache::new(capacity),
            failures: HashMap::new(),
            unavailable: HashSet::new(),
            render_distance: config.render_distance,
            unload_distance: config.unload_distance,
            max_chunks_per_frame: config.max_chunks_per_frame,
            max_meshes_per_frame: config.max_meshes_per_frame,
            burst_mode: false,
        };
        controller.set_burst_mode(config.burst_mode);
        controller
    }

    /// Lifts or restores the per-frame caps. Takes effect on the next step.
    pub fn set_burst_mode(&mut self, burst_mode: bool) {
        self.burst_mode = burst_mode;
        let inline_budget = if burst_mode {
            usize::MAX
        } else {
            self.max_chunks_per_frame.max(self.max_meshes_per_frame)
        };
        self.tasks.set_inline_budget(inline_budget);
    }

    /// True while the per-frame caps are lifted.
    pub fn burst_mode(&self) -> bool {
        self.burst_mode
    }

    /// Render distance in chunks.
    pub fn render_distance(&self) -> i32 {
        self.render_distance
    }

    /// Chunks resident but never meshed: the radius of the load window.
    pub fn load_distance(&self) -> i32 {
        self.render_distance + 1
    }

    fn keep_distance(&self) -> i32 {
        self.unload_distance.max(self.load_distance())
    }

    fn chunk_cap(&self) -> usize {
        if self.burst_mode {
            usize::MAX
        } else {
            self.max_chunks_per_frame
        }
    }

    fn mesh_cap(&self) -> usize {
        if self.burst_mode {
            usize::MAX
        } else {
            self.max_meshes_per_frame
        }
    }

    /// True if generation of `position` failed for good.
    pub fn is_unavailable(&self, position: ChunkPos) -> bool {
        self.unavailable.contains(&position)
    }

    /// Generation tasks not yet drained.
    pub fn pending_chunks(&self) -> usize {
        self.tasks.pending_count(TaskKind::ChunkGeneration)
    }

    /// Mesh tasks not yet drained.
    pub fn pending_meshes(&self) -> usize {
        self.tasks.pending_count(TaskKind::MeshGeneration)
    }

    /// Edited chunks held in the eviction cache.
    pub fn cached_chunks(&self) -> usize {
        self.evicted.len()
    }

    /// Runs one streaming step around `center`.
    pub fn update<R: Renderer + ?Sized>(
        &mut self,
        world: &mut World,
        meshes: &mut MeshManager,
        renderer: &mut R,
        center: ChunkPos,
    ) -> StreamingStats {
        let mut stats = StreamingStats::default();

        self.evict(world, meshes, renderer, center, &mut stats);
        self.cancel_outside(center);
        self.insert_generated(world, center, &mut stats);
        self.upload_meshes(world, meshes, renderer, &mut stats);
        self.enqueue_generation(world, center, &mut stats);
        self.enqueue_meshes(world, center, &mut stats);
        self.tasks.process_queued_tasks();

        trace!("Streaming step at {:?}: {:?}", center, stats);
        stats
    }

    fn evict<R: Renderer + ?Sized>(
        &mut self,
        world: &mut World,
        meshes: &mut MeshManager,
        renderer: &mut R,
        center: ChunkPos,
        stats: &mut StreamingStats,
    ) {
        let keep = self.keep_distance();
        let outside: Vec<ChunkPos> = world
            .positions()
            .filter(|position| position.chebyshev_distance(center) > keep)
            .collect();

        for position in outside {
            meshes.unload(renderer, position);
            self.tasks.cancel(TaskKind::MeshGeneration, position);
            let Some(chunk) = world.remove(position) else {
                continue;
            };
            stats.evicted += 1;
            if chunk.modified {
                if let Some(saves) = &self.saves {
                    if let Err(err) = saves.write_chunk(&chunk) {
                        warn!("Failed to save evicted chunk {:?}: {}", position, err);
                    }
                }
                self.evicted.put(position, chunk);
            }
        }

        self.unavailable
            .retain(|position| position.chebyshev_distance(center) <= keep);
        self.failures
            .retain(|position, _| position.chebyshev_distance(center) <= keep);
    }

    fn cancel_outside(&mut self, center: ChunkPos) {
        let load = self.load_distance();
        for position in self.tasks.pending_keys(TaskKind::ChunkGeneration) {
            if position.chebyshev_distance(center) > load {
                self.tasks.cancel(TaskKind::ChunkGeneration, position);
            }
        }
        for position in self.tasks.pending_keys(TaskKind::MeshGeneration) {
            if position.chebyshev_distance(center) > self.render_distance {
                self.tasks.cancel(TaskKind::MeshGeneration, position);
            }
        }
    }

    fn insert_generated(&mut self, world: &mut World, center: ChunkPos, stats: &mut StreamingStats) {
        let keep = self.keep_distance();
        for result in self
            .tasks
            .drain_completed(TaskKind::ChunkGeneration, self.chunk_cap())
        {
            let position = result.key;
            match result.outcome {
                TaskOutcome::Completed(TaskOutput::Chunk(generated)) => {
                    if world.contains(position) || position.chebyshev_distance(center) > keep {
                        continue;
                    }
                    world.insert_generated(*generated);
                    self.failures.remove(&position);
                    stats.inserted += 1;
                }
                TaskOutcome::Completed(other) => {
                    error!("Generation lane returned {:?} for {:?}", other, position);
                }
                TaskOutcome::Cancelled => {}
                TaskOutcome::Failed(reason) => {
                    let attempts = self.failures.entry(position).or_insert(0);
                    *attempts += 1;
                    if *attempts < MAX_GENERATION_ATTEMPTS {
                        warn!("Generating chunk {:?} failed: {}; retrying", position, reason);
                        self.publish_generation(position);
                    } else {
                        error!(
                            "Generating chunk {:?} failed again: {}; marking unavailable",
                            position, reason
                        );
                        self.unavailable.insert(position);
                    }
                }
            }
        }
    }

    fn upload_meshes<R: Renderer + ?Sized>(
        &mut self,
        world: &mut World,
        meshes: &mut MeshManager,
        renderer: &mut R,
        stats: &mut StreamingStats,
    ) {
        for result in self
            .tasks
            .drain_completed(TaskKind::MeshGeneration, self.mesh_cap())
        {
            let position = result.key;
            let Some(chunk) = world.chunk_mut(position) else {
                stats.discarded_meshes += 1;
                continue;
            };
            match result.outcome {
                TaskOutcome::Completed(TaskOutput::Mesh(mesh)) => {
                    if mesh.revision != chunk.revision() {
                        trace!("Dropping stale mesh for {:?}", position);
                        chunk.dirty = true;
                        stats.discarded_meshes += 1;
                        continue;
                    }
                    match meshes.upload(renderer, &mesh) {
                        Ok(()) => {
                            for (sub_y, sub_chunk) in mesh.sub_chunks.iter().enumerate() {
                                chunk.set_sub_chunk_empty(sub_y, sub_chunk.is_empty());
                            }
                            stats.uploaded += 1;
                        }
                        Err(err) => {
                            warn!("Upload for chunk {:?} failed: {}; will remesh", position, err);
                            chunk.dirty = true;
                            stats.upload_failures += 1;
                        }
                    }
                }
                TaskOutcome::Completed(other) => {
                    error!("Mesh lane returned {:?} for {:?}", other, position);
                    chunk.dirty = true;
                }
                TaskOutcome::Cancelled => chunk.dirty = true,
                TaskOutcome::Failed(reason) => {
                    warn!("Meshing chunk {:?} failed: {}; will retry", position, reason);
                    chunk.dirty = true;
                }
            }
        }
    }

    fn enqueue_generation(&mut self, world: &mut World, center: ChunkPos, stats: &mut StreamingStats) {
        let cap = self.chunk_cap();
        let mut budget_used = 0;
        for radius in 0..=self.load_distance() {
            for position in center.ring(radius) {
                if budget_used >= cap {
                    return;
                }
                if world.contains(position)
                    || self.unavailable.contains(&position)
                    || self.tasks.is_pending(TaskKind::ChunkGeneration, position)
                {
                    continue;
                }
                if self.evicted.contains(&position) {
                    // Restores count as insertions, under the same cap.
                    if stats.inserted >= cap {
                        continue;
                    }
                    if let Some(chunk) = self.evicted.pop(&position) {
                        world.insert_chunk(chunk);
                        stats.inserted += 1;
                    }
                } else {
                    self.publish_generation(position);
                    stats.chunk_tasks += 1;
                }
                budget_used += 1;
            }
        }
    }

    fn publish_generation(&mut self, position: ChunkPos) {
        self.tasks.publish_task(Box::new(ChunkGenerationTask::new(
            position,
            self.generator.clone(),
            self.saves.clone(),
        )));
    }

    fn enqueue_meshes(&mut self, world: &mut World, center: ChunkPos, stats: &mut StreamingStats) {
        let ready = |position: ChunkPos| world.contains(position) || self.unavailable.contains(&position);
        let mut candidates: Vec<ChunkPos> = world
            .chunks()
            .filter(|chunk| chunk.dirty)
            .map(|chunk| chunk.position)
            .filter(|position| position.chebyshev_distance(center) <= self.render_distance)
            .filter(|position| !self.tasks.is_pending(TaskKind::MeshGeneration, *position))
            .filter(|position| position.neighbors().into_iter().all(ready))
            .collect();
        candidates.sort_by_key(|position| (position.distance_squared(center), *position));
        candidates.truncate(self.mesh_cap());

        for position in candidates {
            let neighbors = world.neighbor_slices(position);
            let Some(chunk) = world.chunk_mut(position) else {
                continue;
            };
            chunk.dirty = false;
            let snapshot = chunk.clone();
            self.tasks
                .publish_task(Box::new(MeshGenerationTask::new(snapshot, neighbors)));
            stats.mesh_tasks += 1;
        }
    }

    /// Cancels outstanding work and joins the workers.
    pub fn shutdown(&mut self) {
        self.tasks.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::{
        config::GenerationType,
        rendering::meshing::HeadlessRenderer,
        voxels::block::block_type::BlockType,
    };

    fn config() -> WorldConfig {
        WorldConfig {
            render_distance: 4,
            unload_distance: 6,
            max_chunks_per_frame: 8,
            max_meshes_per_frame: 8,
            multithreading: false,
            generation_type: GenerationType::Superflat,
            ..WorldConfig::default()
        }
    }

    struct Harness {
        controller: StreamingController,
        world: World,
        meshes: MeshManager,
        renderer: HeadlessRenderer,
    }

    impl Harness {
        fn new(config: WorldConfig) -> Self {
            let generator = Arc::new(TerrainGenerator::new(&config, None));
            Harness {
                controller: StreamingController::new(&config, generator, None),
                world: World::new(),
                meshes: MeshManager::new(),
                renderer: HeadlessRenderer::new(),
            }
        }

        fn step(&mut self, center: ChunkPos) -> StreamingStats {
            self.controller
                .update(&mut self.world, &mut self.meshes, &mut self.renderer, center)
        }

        fn settle(&mut self, center: ChunkPos, max_frames: usize) -> usize {
            for frame in 0..max_frames {
                self.step(center);
                if self.is_settled(center) {
                    return frame + 1;
                }
            }
            max_frames
        }

        fn is_settled(&self, center: ChunkPos) -> bool {
            let r = self.controller.render_distance();
            (-r..=r).all(|dx| {
                (-r..=r).all(|dz| {
                    let position = ChunkPos::new(center.x + dx, center.z + dz);
                    self.world.chunk(position).is_some_and(|chunk| !chunk.dirty)
                        && self.meshes.is_chunk_meshed(position)
                })
            }) && self.controller.pending_meshes() == 0
        }
    }

    #[test]
    fn fills_the_window_within_the_caps() {
        let mut harness = Harness::new(config());
        let center = ChunkPos::new(0, 0);
        for _ in 0..200 {
            let stats = harness.step(center);
            assert!(stats.inserted <= 8);
            assert!(stats.chunk_tasks <= 8);
            assert!(stats.uploaded <= 8);
            if harness.is_settled(center) {
                break;
            }
        }
        assert!(harness.is_settled(center));
        for _ in 0..10 {
            harness.step(center);
        }
        // The border ring is resident but not meshed.
        assert_eq!(harness.world.len(), 11 * 11);
        assert!(!harness.meshes.is_chunk_meshed(ChunkPos::new(5, 0)));
        assert_eq!(harness.meshes.len(), 9 * 9);
    }

    #[test]
    fn burst_mode_lifts_the_caps() {
        let mut harness = Harness::new(WorldConfig {
            burst_mode: true,
            ..config()
        });
        let frames = harness.settle(ChunkPos::new(0, 0), 20);
        assert!(frames <= 4, "took {} frames", frames);

        harness.controller.set_burst_mode(false);
        let stats = harness.step(ChunkPos::new(20, 0));
        assert!(stats.chunk_tasks <= 8);
    }

    #[test]
    fn eviction_keeps_edits_in_the_cache() {
        let mut harness = Harness::new(config());
        let home = ChunkPos::new(0, 0);
        harness.settle(home, 200);
        assert!(harness.world.set_block(3, 90, 3, BlockType::Bricks));

        let away = ChunkPos::new(40, 0);
        harness.settle(away, 400);
        assert!(!harness.world.contains(home));
        assert!(!harness.meshes.is_chunk_meshed(home));
        assert_eq!(harness.controller.cached_chunks(), 1);

        harness.settle(home, 400);
        assert_eq!(harness.world.get_block(3, 90, 3), BlockType::Bricks);
        assert_eq!(harness.controller.cached_chunks(), 0);
    }

    #[test]
    fn edits_are_remeshed_and_stale_meshes_dropped() {
        let mut harness = Harness::new(config());
        let home = ChunkPos::new(0, 0);
        harness.settle(home, 200);
        let before = harness.meshes.get(home).map(|buffers| buffers.revision);

        harness.world.set_block(8, 100, 8, BlockType::Stone);
        harness.step(home);
        assert_eq!(harness.controller.pending_meshes(), 1);
        // Edit again before the mesh lands: the first result is stale.
        harness.world.set_block(8, 101, 8, BlockType::Stone);
        let stats = harness.step(home);
        assert_eq!(stats.discarded_meshes, 1);

        harness.settle(home, 20);
        let after = harness.meshes.get(home).map(|buffers| buffers.revision);
        assert_ne!(before, after);
        assert_eq!(
            after,
            harness.world.chunk(home).map(|chunk| chunk.revision())
        );
    }

    #[test]
    fn upload_failures_leave_the_chunk_dirty() {
        let mut harness = Harness::new(config());
        let home = ChunkPos::new(0, 0);
        harness.settle(home, 200);

        harness.world.set_block(8, 100, 8, BlockType::Stone);
        harness.step(home);
        harness.renderer.fail_next_uploads(1);
        let stats = harness.step(home);
        assert_eq!(stats.upload_failures, 1);
        // Rescheduled in the same step.
        assert_eq!(stats.mesh_tasks, 1);
        assert_eq!(harness.controller.pending_meshes(), 1);

        harness.settle(home, 20);
        assert!(harness.is_settled(home));
    }
}
