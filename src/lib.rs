#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Voxel World
//!
//! The world core of a block game: an infinite grid of 16×256×16 chunks
//! generated from a 64-bit seed, meshed greedily at four levels of detail,
//! streamed around a moving observer by a worker pool, and handed to a
//! renderer as ordered draw lists.
//!
//! ## Key Modules
//!
//! * `engine_state` - The [`EngineState`] facade and every subsystem behind it
//! * `engine_state::voxels` - Blocks, chunks, terrain, light, water, raycasts, physics
//! * `engine_state::rendering` - Vertex format, mesher, mesh manager, culling
//! * `engine_state::task_management` - The two-lane worker pool
//! * `engine_state::persistence` - Save directories and file formats
//!
//! ## Architecture
//!
//! The world is owned by one thread. Generation and meshing run on workers
//! over owned inputs and post owned results back; the main thread drains a
//! bounded number of them per frame, uploads meshes through the
//! [`Renderer`] seam, and submits draw lists.
//!
//! ## Usage
//!
//! ```rust
//! use voxel_world::{EngineState, HeadlessRenderer, WorldConfig};
//!
//! let config = WorldConfig {
//!     render_distance: 4,
//!     unload_distance: 5,
//!     burst_mode: true,
//!     ..WorldConfig::default()
//! };
//! let mut engine = EngineState::new(config, HeadlessRenderer::new()).unwrap();
//! let observer = engine.player().position;
//! for _ in 0..100 {
//!     engine.update(observer, 1.0 / 60.0);
//!     if engine.is_settled_around(observer) {
//!         break;
//!     }
//! }
//! engine.submit_frame(None, None);
//! ```

use std::path::Path;

use cgmath::{Deg, Vector3};
use log::{error, info};

pub mod engine_state;

pub use engine_state::{
    camera::{Camera, Projection},
    config::{GenerationType, WorldConfig},
    error::{ConfigError, EquationError, PersistenceError, UploadError, WorldOpenError},
    persistence::SaveDirectory,
    rendering::meshing::{HeadlessRenderer, Renderer},
    voxels::{block::block_type::BlockType, chunk::ChunkPos, physics::MovementInput},
    EngineState, FrameStats,
};

/// Simulated frame time of the demo loop.
const FRAME_DT: f32 = 1.0 / 60.0;

/// Frames allowed for the initial load before the demo gives up waiting.
const MAX_LOAD_FRAMES: usize = 10_000;

/// Pause between load frames so workers get the CPU.
const LOAD_FRAME_PAUSE: std::time::Duration = std::time::Duration::from_millis(1);

/// Frames the demo observer flies for.
const DEMO_FRAMES: usize = 600;

/// Runs a headless session: loads the world around the spawn in burst mode,
/// then flies the observer east for ten simulated seconds, culling against
/// a camera every frame.
///
/// The first command-line argument, if any, is a JSON config file.
pub fn run() {
    let mut log_builder = env_logger::Builder::new();
    log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .init();
    info!("Logger initialized");

    let config = match std::env::args().nth(1) {
        Some(path) => match WorldConfig::load(Path::new(&path)) {
            Ok(config) => config,
            Err(err) => {
                error!("Invalid config {}: {}", path, err);
                return;
            }
        },
        None => WorldConfig::default(),
    };
    let burst_mode = config.burst_mode;

    let mut engine = match EngineState::new(config, HeadlessRenderer::new()) {
        Ok(engine) => engine,
        Err(err) => {
            error!("{}", err);
            return;
        }
    };

    let start = web_time::Instant::now();
    engine.set_burst_mode(true);
    let spawn = engine.player().position;
    let mut frames = 0;
    while frames < MAX_LOAD_FRAMES && !engine.is_settled_around(spawn) {
        engine.update(spawn, FRAME_DT);
        frames += 1;
        std::thread::sleep(LOAD_FRAME_PAUSE);
    }
    info!(
        "Initial load took {} frames and {:?}: {} chunks resident, {} meshed",
        frames,
        start.elapsed(),
        engine.world().len(),
        engine.meshes().len()
    );
    engine.set_burst_mode(burst_mode);

    let projection = Projection::new(1280, 720, Deg(70.0), 0.1, 1000.0);
    let input = MovementInput {
        horizontal: Vector3::unit_x(),
        ..MovementInput::default()
    };
    engine.player_mut().flying = true;

    for frame in 0..DEMO_FRAMES {
        engine.step_player(&input, FRAME_DT);
        let observer = engine.player().position;
        engine.update(observer, FRAME_DT);
        let view_projection = projection.view_projection(&Camera::from(engine.player()));
        let lists = engine.submit_frame(Some(&view_projection), None);
        if frame % 60 == 0 {
            let stats = engine.stats();
            info!(
                "Frame {}: observer at ({:.1}, {:.1}, {:.1}), {} resident, {} pending, {} opaque draws, {} water draws, {} culled",
                stats.frame,
                observer.x,
                observer.y,
                observer.z,
                stats.resident,
                stats.pending_chunks + stats.pending_meshes,
                lists.opaque.len(),
                lists.water.len(),
                stats.culled
            );
        }
    }

    let renderer = engine.renderer();
    info!(
        "Demo finished: {} uploads, {} releases, {} frames submitted",
        renderer.upload_count(),
        renderer.release_count(),
        renderer.frame_count()
    );
    engine.shutdown();
}
