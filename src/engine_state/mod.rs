//! # Engine State Module
//!
//! The world core: everything between a seed and a stream of draw lists.
//!
//! ## Key Components
//!
//! * `EngineState` - The facade the game loop talks to
//! * `streaming` - Keeps the window of resident chunks around the observer
//! * `task_management` - Worker pool with a generation lane and a mesh lane
//! * `voxels` - Blocks, chunks, the chunk map, terrain, light, water, raycasts and physics
//! * `rendering` - Vertex format, greedy mesher, mesh manager, culling and the renderer seam
//! * `persistence` - Save directories, chunk files, metadata and the player file
//!
//! ## Frame Flow
//!
//! Each frame the caller runs `update()` with the observer position, which
//! streams chunks, uploads finished meshes, ticks water and advances the day
//! cycle, then `submit_frame()` with the camera matrix, which culls and hands
//! the ordered draw lists to the [`Renderer`]. Edits go through
//! `break_block()` and `place_block()` and show up in the next frame's meshes;
//! queries see them immediately.

use std::collections::HashSet;

use cgmath::{Matrix4, Point3, Vector3};
use log::{debug, info};

use crate::engine_state::{
    config::WorldConfig,
    day_cycle::DayCycle,
    error::{PersistenceError, WorldOpenError},
    persistence::{
        metadata::{now_epoch_seconds, WorldMetadata},
        player::PlayerState,
        SaveDirectory,
    },
    rendering::{
        culling::{build_draw_lists, CullSettings, DrawLists, Frustum, HiZMap},
        meshing::{MeshManager, Renderer},
    },
    streaming::StreamingController,
    voxels::{
        block::block_type::BlockType,
        chunk::ChunkPos,
        generation::{equation::Equation, TerrainGenerator, SEA_LEVEL},
        physics::{MovementInput, PlayerBody, PLAYER_HEIGHT, PLAYER_WIDTH},
        raycast::{raycast, RaycastHit},
        water::WaterSimulator,
        world::World,
    },
};

pub mod camera;
pub mod config;
pub mod day_cycle;
pub mod error;
pub mod persistence;
pub mod rendering;
pub mod streaming;
pub mod task_management;
pub mod voxels;

/// Where a fresh world puts the observer.
pub const SPAWN_POSITION: Point3<f32> = Point3::new(0.5, 80.0, 0.5);

/// Counters for one frame, handed to the renderer with the draw lists.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameStats {
    /// Frames updated so far.
    pub frame: u64,
    /// Resident chunks.
    pub resident: usize,
    /// Generation tasks in flight.
    pub pending_chunks: usize,
    /// Mesh tasks in flight.
    pub pending_meshes: usize,
    /// Chunks inserted this frame.
    pub inserted: usize,
    /// Meshes uploaded this frame.
    pub uploaded: usize,
    /// Chunks evicted this frame.
    pub evicted: usize,
    /// Sub-chunks drawn this frame.
    pub visible: usize,
    /// Sub-chunks with geometry culled this frame.
    pub culled: usize,
    /// Water ticks run this frame.
    pub water_ticks: u32,
    /// Time of day in `[0, 1)`.
    pub time_of_day: f32,
    /// Sky brightness scalar.
    pub sun_brightness: f32,
}

/// The world core behind one renderer.
///
/// # Examples
///
/// ```
/// use voxel_world::{EngineState, HeadlessRenderer, WorldConfig};
///
/// let config = WorldConfig { render_distance: 4, unload_distance: 4, ..WorldConfig::default() };
/// let mut engine = EngineState::new(config, HeadlessRenderer::new()).unwrap();
/// let observer = engine.player().position;
/// engine.update(observer, 1.0 / 60.0);
/// engine.submit_frame(None, None);
/// ```
pub struct EngineState<R: Renderer> {
    config: WorldConfig,
    name: String,
    world: World,
    meshes: MeshManager,
    renderer: R,
    streaming: StreamingController,
    water: WaterSimulator,
    saves: Option<SaveDirectory>,
    player: PlayerBody,
    observer: Point3<f32>,
    visible_chunks: Option<HashSet<ChunkPos>>,
    forced_lod: Option<u8>,
    day: DayCycle,
    stats: FrameStats,
}

impl<R: Renderer> EngineState<R> {
    /// Creates a world that lives only in memory.
    ///
    /// # Errors
    /// [`WorldOpenError::Config`] if the configuration is out of range or the
    /// custom equation does not parse.
    pub fn new(config: WorldConfig, renderer: R) -> Result<Self, WorldOpenError> {
        let equation = config.validate()?;
        Ok(Self::build(config, equation, renderer, None, "world".to_string()))
    }

    /// Creates a new world in `saves`, writing its metadata right away.
    pub fn create(
        config: WorldConfig,
        renderer: R,
        saves: SaveDirectory,
        name: &str,
    ) -> Result<Self, WorldOpenError> {
        let equation = config.validate()?;
        saves.create_dirs()?;
        let engine = Self::build(config, equation, renderer, Some(saves), name.to_string());
        engine.write_metadata()?;
        info!("Created world '{}' with seed {}", engine.name, engine.config.seed);
        Ok(engine)
    }

    /// Opens an existing world.
    ///
    /// Seed, generation type, height cap and custom equation come from
    /// `world.meta`; the rest of `config` applies as given.
    ///
    /// # Errors
    /// [`WorldOpenError::Persistence`] if `world.meta` or `player.dat` is
    /// missing or corrupt.
    pub fn open(
        mut config: WorldConfig,
        renderer: R,
        saves: SaveDirectory,
    ) -> Result<Self, WorldOpenError> {
        let metadata = saves.read_metadata()?;
        let player = saves.read_player()?;

        config.seed = metadata.seed;
        config.generation_type = metadata.generation_type;
        config.max_y_height = metadata.max_height;
        config.custom_equation = metadata.custom_equation.clone();
        let equation = config.validate()?;
        saves.create_dirs()?;

        let mut engine = Self::build(config, equation, renderer, Some(saves), metadata.name);
        if let Some(player) = player {
            engine.player.position = player.position;
            engine.player.yaw = player.yaw;
            engine.player.pitch = player.pitch;
            engine.player.flying = player.flying;
            engine.observer = player.position;
        }
        info!(
            "Opened world '{}' (seed {}, {})",
            engine.name,
            engine.config.seed,
            engine.config.generation_type.as_str()
        );
        Ok(engine)
    }

    fn build(
        config: WorldConfig,
        equation: Option<Equation>,
        renderer: R,
        saves: Option<SaveDirectory>,
        name: String,
    ) -> Self {
        let generator = std::sync::Arc::new(TerrainGenerator::new(&config, equation));
        let streaming = StreamingController::new(&config, generator, saves.clone());
        let water = WaterSimulator::new(config.water_tick_hz, config.water_tick_radius);

        EngineState {
            config,
            name,
            world: World::new(),
            meshes: MeshManager::new(),
            renderer,
            streaming,
            water,
            saves,
            player: PlayerBody::new(SPAWN_POSITION),
            observer: SPAWN_POSITION,
            visible_chunks: None,
            forced_lod: None,
            day: DayCycle::default(),
            stats: FrameStats::default(),
        }
    }

    /// Runs one frame of world upkeep around `observer`.
    ///
    /// Streams chunks, uploads finished meshes, ticks water and advances the
    /// day cycle.
    pub fn update(&mut self, observer: Point3<f32>, dt: f32) -> &FrameStats {
        self.observer = observer;
        let center = ChunkPos::from_world_f32(observer);

        let streamed = self.streaming.update(
            &mut self.world,
            &mut self.meshes,
            &mut self.renderer,
            center,
        );
        let water_ticks =
            self.water
                .update(&mut self.world, center, self.visible_chunks.as_ref(), dt);
        self.day.advance(dt);

        self.stats = FrameStats {
            frame: self.stats.frame + 1,
            resident: self.world.len(),
            pending_chunks: self.streaming.pending_chunks(),
            pending_meshes: self.streaming.pending_meshes(),
            inserted: streamed.inserted,
            uploaded: streamed.uploaded,
            evicted: streamed.evicted,
            visible: 0,
            culled: 0,
            water_ticks,
            time_of_day: self.day.time_of_day(),
            sun_brightness: self.day.sun_brightness(),
        };
        &self.stats
    }

    /// Culls, orders and submits this frame's draw lists.
    ///
    /// Without a view-projection matrix nothing is frustum culled. The Hi-Z
    /// map is only consulted when `hi_z_culling` is enabled.
    pub fn submit_frame(
        &mut self,
        view_projection: Option<&Matrix4<f32>>,
        hi_z: Option<&HiZMap>,
    ) -> DrawLists {
        let frustum = view_projection.map(Frustum::from_view_projection);
        let hi_z = hi_z.filter(|_| self.config.hi_z_culling);
        let settings = CullSettings {
            render_distance: self.config.render_distance,
            sub_chunk_culling: self.config.sub_chunk_culling,
            forced_lod: self.forced_lod,
        };
        let lists = build_draw_lists(&self.meshes, self.observer, frustum.as_ref(), hi_z, &settings);

        self.visible_chunks = Some(
            lists
                .opaque
                .iter()
                .chain(lists.water.iter())
                .map(|entry| entry.key.chunk())
                .collect(),
        );
        self.stats.visible = lists.visible;
        self.stats.culled = lists.culled;
        self.renderer.submit(&lists.opaque, &lists.water, &self.stats);
        lists
    }

    /// Moves the observer body by one physics step. Skipped while the chunk
    /// under it is not resident, so it never falls through unloaded terrain.
    pub fn step_player(&mut self, input: &MovementInput, dt: f32) -> &PlayerBody {
        let position = ChunkPos::from_world_f32(self.player.position);
        if self.world.contains(position) {
            self.player.step(&self.world, input, dt);
        }
        &self.player
    }

    /// Replaces the block at a world position with air.
    ///
    /// # Returns
    /// The block that was removed, or `None` if the cell was air, out of
    /// range or not resident.
    pub fn break_block(&mut self, wx: i32, wy: i32, wz: i32) -> Option<BlockType> {
        let previous = self.world.get_block(wx, wy, wz);
        if previous == BlockType::Air || !self.world.set_block(wx, wy, wz, BlockType::Air) {
            return None;
        }
        debug!("Broke {} at ({}, {}, {})", previous, wx, wy, wz);
        Some(previous)
    }

    /// Places a block into an air, water or tall-grass cell.
    ///
    /// Solid blocks are refused where they would overlap the observer body.
    ///
    /// # Returns
    /// `true` if the block was placed.
    pub fn place_block(&mut self, wx: i32, wy: i32, wz: i32, block: BlockType) -> bool {
        if block == BlockType::Air || !self.world.contains(ChunkPos::from_world(wx, wz)) {
            return false;
        }
        if !self.world.get_block(wx, wy, wz).is_water_replaceable() {
            return false;
        }
        if block.is_solid() && self.overlaps_player(wx, wy, wz) {
            return false;
        }
        let placed = self.world.set_block(wx, wy, wz, block);
        if placed {
            debug!("Placed {} at ({}, {}, {})", block, wx, wy, wz);
        }
        placed
    }

    fn overlaps_player(&self, wx: i32, wy: i32, wz: i32) -> bool {
        let half = PLAYER_WIDTH / 2.0;
        let p = self.player.position;
        let overlaps = |lo: f32, hi: f32, cell: i32| lo < (cell + 1) as f32 && hi > cell as f32;
        overlaps(p.x - half, p.x + half, wx)
            && overlaps(p.y, p.y + PLAYER_HEIGHT, wy)
            && overlaps(p.z - half, p.z + half, wz)
    }

    /// Walks a ray from `origin` and returns the first voxel `predicate`
    /// accepts within `max_distance`.
    pub fn raycast<F>(
        &self,
        origin: Point3<f32>,
        direction: Vector3<f32>,
        max_distance: f32,
        predicate: F,
    ) -> Option<RaycastHit>
    where
        F: Fn(BlockType) -> bool,
    {
        raycast(&self.world, origin, direction, max_distance, predicate)
    }

    /// Writes metadata, the player file and every resident chunk.
    ///
    /// # Errors
    /// [`PersistenceError::Io`] if the world has no save directory or a
    /// write failed.
    pub fn save(&mut self) -> Result<(), PersistenceError> {
        let Some(saves) = &self.saves else {
            return Err(PersistenceError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "world has no save directory",
            )));
        };
        saves.create_dirs()?;
        for chunk in self.world.chunks() {
            saves.write_chunk(chunk)?;
        }
        saves.write_player(&PlayerState {
            position: self.player.position,
            yaw: self.player.yaw,
            pitch: self.player.pitch,
            flying: self.player.flying,
        })?;
        self.write_metadata()?;
        info!("Saved world '{}' ({} chunks)", self.name, self.world.len());
        Ok(())
    }

    fn write_metadata(&self) -> Result<(), PersistenceError> {
        let Some(saves) = &self.saves else {
            return Ok(());
        };
        saves.write_metadata(&WorldMetadata {
            name: self.name.clone(),
            seed: self.config.seed,
            generation_type: self.config.generation_type,
            max_height: self.config.max_y_height,
            last_played: now_epoch_seconds(),
            custom_equation: self.config.custom_equation.clone(),
            sea_level: Some(SEA_LEVEL),
        })
    }

    /// Lifts or restores the per-frame streaming caps.
    pub fn set_burst_mode(&mut self, burst_mode: bool) {
        self.config.burst_mode = burst_mode;
        self.streaming.set_burst_mode(burst_mode);
    }

    /// Draws every sub-chunk at one LOD, or restores distance-based LOD.
    pub fn set_forced_lod(&mut self, lod: Option<u8>) {
        self.forced_lod = lod;
    }

    /// Switches between sub-chunk and whole-chunk culling.
    pub fn set_sub_chunk_culling(&mut self, enabled: bool) {
        self.config.sub_chunk_culling = enabled;
    }

    /// World name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Active configuration.
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// The chunk map.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable chunk map, for tools and tests that edit directly.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Uploaded mesh buffers.
    pub fn meshes(&self) -> &MeshManager {
        &self.meshes
    }

    /// The renderer.
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// The renderer, mutably.
    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    /// The observer body.
    pub fn player(&self) -> &PlayerBody {
        &self.player
    }

    /// The observer body, mutably.
    pub fn player_mut(&mut self) -> &mut PlayerBody {
        &mut self.player
    }

    /// The streaming controller.
    pub fn streaming(&self) -> &StreamingController {
        &self.streaming
    }

    /// The water simulator.
    pub fn water_mut(&mut self) -> &mut WaterSimulator {
        &mut self.water
    }

    /// Splits the engine into the world and its water simulator, for
    /// driving ticks by hand.
    pub fn world_and_water(&mut self) -> (&mut World, &mut WaterSimulator) {
        (&mut self.world, &mut self.water)
    }

    /// The day cycle.
    pub fn day_cycle(&self) -> &DayCycle {
        &self.day
    }

    /// The day cycle, mutably.
    pub fn day_cycle_mut(&mut self) -> &mut DayCycle {
        &mut self.day
    }

    /// Stats of the last frame.
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// True once every chunk inside the render distance around `observer`
    /// is resident, meshed and clean.
    pub fn is_settled_around(&self, observer: Point3<f32>) -> bool {
        let center = ChunkPos::from_world_f32(observer);
        let r = self.config.render_distance;
        (-r..=r).all(|dx| {
            (-r..=r).all(|dz| {
                let position = ChunkPos::new(center.x + dx, center.z + dz);
                self.world.chunk(position).is_some_and(|chunk| !chunk.dirty)
                    && self.meshes.is_chunk_meshed(position)
            })
        })
    }

    /// Stops the worker pool and releases every uploaded buffer.
    pub fn shutdown(&mut self) {
        self.streaming.shutdown();
        self.meshes.clear(&mut self.renderer);
    }
}
