//! End-to-end scenarios driven through `EngineState` with the headless
//! renderer. Render distances are trimmed to keep the runs short.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

use cgmath::{Point3, Vector3};
use voxel_world::engine_state::voxels::{generation::TerrainGenerator, raycast::solid};
use voxel_world::{
    BlockType, ChunkPos, EngineState, GenerationType, HeadlessRenderer, SaveDirectory,
    WorldConfig, WorldOpenError,
};

const DT: f32 = 1.0 / 60.0;

fn config(seed: u64, render_distance: i32, generation_type: GenerationType) -> WorldConfig {
    WorldConfig {
        seed,
        render_distance,
        unload_distance: render_distance + 2,
        max_chunks_per_frame: 8,
        max_meshes_per_frame: 8,
        burst_mode: true,
        multithreading: false,
        generation_type,
        // Natural water stays put unless a test ticks it on purpose.
        water_tick_hz: 1e-3,
        ..WorldConfig::default()
    }
}

fn engine(config: WorldConfig) -> EngineState<HeadlessRenderer> {
    EngineState::new(config, HeadlessRenderer::new()).unwrap()
}

fn is_idle(engine: &EngineState<HeadlessRenderer>, observer: Point3<f32>) -> bool {
    let stats = engine.stats();
    stats.pending_chunks == 0 && stats.pending_meshes == 0 && engine.is_settled_around(observer)
}

fn settle(engine: &mut EngineState<HeadlessRenderer>, observer: Point3<f32>, max_frames: usize) -> usize {
    for frame in 0..max_frames {
        engine.update(observer, DT);
        if is_idle(engine, observer) {
            return frame + 1;
        }
    }
    panic!("world did not settle around {:?} within {} frames", observer, max_frames);
}

fn snapshot(engine: &EngineState<HeadlessRenderer>) -> HashMap<ChunkPos, Vec<BlockType>> {
    engine
        .world()
        .chunks()
        .map(|chunk| (chunk.position, chunk.blocks().to_vec()))
        .collect()
}

fn temp_world(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "voxel-world-{}-{}-{}",
        name,
        std::process::id(),
        web_time::SystemTime::now()
            .duration_since(web_time::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or(0)
    ));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

#[test]
fn same_seed_produces_identical_chunks() {
    let walk = [Point3::new(0.0, 80.0, 0.0), Point3::new(128.0, 80.0, 128.0)];
    let mut first = engine(config(0x5EED, 4, GenerationType::Standard));
    let mut second = engine(config(0x5EED, 4, GenerationType::Standard));

    for observer in walk {
        settle(&mut first, observer, 400);
        settle(&mut second, observer, 400);
    }

    let a = snapshot(&first);
    let b = snapshot(&second);
    let mut compared = 0;
    for (position, blocks) in &a {
        if let Some(other) = b.get(position) {
            assert!(blocks == other, "chunk {:?} differs", position);
            compared += 1;
        }
    }
    assert!(compared >= 81);
}

#[test]
fn generation_does_not_depend_on_the_thread() {
    let config = config(0x5EED, 4, GenerationType::Standard);
    let generator = Arc::new(TerrainGenerator::new(&config, None));
    let positions: Vec<ChunkPos> = (-2..2)
        .flat_map(|x| (-1..1).map(move |z| ChunkPos::new(x, z)))
        .collect();

    let cancel = AtomicBool::new(false);
    let reference: Vec<_> = positions
        .iter()
        .map(|position| generator.generate(*position, &cancel).unwrap())
        .collect();

    let workers: Vec<_> = (0..3)
        .map(|worker| {
            let generator = generator.clone();
            let mut order = positions.clone();
            order.rotate_left(worker * 3);
            thread::spawn(move || {
                let cancel = AtomicBool::new(false);
                order
                    .into_iter()
                    .map(|position| (position, generator.generate(position, &cancel).unwrap()))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for worker in workers {
        for (position, generated) in worker.join().unwrap() {
            let index = positions.iter().position(|p| *p == position).unwrap();
            let expected = &reference[index];
            assert!(generated.chunk.blocks() == expected.chunk.blocks());
            assert_eq!(generated.spills, expected.spills);
        }
    }
}

#[test]
fn placing_then_breaking_restores_the_mesh() {
    let observer = Point3::new(0.5, 80.0, 0.5);
    let mut engine = engine(config(42, 4, GenerationType::Standard));
    settle(&mut engine, observer, 400);

    let home = ChunkPos::new(0, 0);
    let vertex_count = |engine: &EngineState<HeadlessRenderer>| {
        engine.meshes().get(home).map(|buffers| buffers.vertex_count(0)).unwrap()
    };
    let before = vertex_count(&engine);

    let top = (0..256)
        .rev()
        .find(|y| engine.world().get_block(10, *y, 10) != BlockType::Air)
        .unwrap_or(0);
    let y = (top + 2).max(70);
    assert_eq!(engine.world().get_block(10, y, 10), BlockType::Air);

    assert!(engine.place_block(10, y, 10, BlockType::Stone));
    assert_eq!(engine.world().get_block(10, y, 10), BlockType::Stone);
    settle(&mut engine, observer, 50);
    assert_ne!(vertex_count(&engine), before);

    assert_eq!(engine.break_block(10, y, 10), Some(BlockType::Stone));
    assert_eq!(engine.world().get_block(10, y, 10), BlockType::Air);
    settle(&mut engine, observer, 50);
    assert_eq!(vertex_count(&engine), before);
}

#[test]
fn water_spreads_decays_and_drains() {
    let observer = Point3::new(0.5, 80.0, 0.5);
    let mut engine = engine(WorldConfig {
        water_tick_hz: 10.0,
        ..config(7, 4, GenerationType::Superflat)
    });
    settle(&mut engine, observer, 200);

    for x in -8..=8 {
        for z in -8..=8 {
            engine.world_mut().set_block(x, 62, z, BlockType::Stone);
        }
    }
    assert!(engine.place_block(0, 63, 0, BlockType::Water));

    // 10 Hz with 0.1 s frames: one tick per update.
    let mut ticks = 0;
    while ticks < 90 {
        ticks += engine.update(observer, 0.1).water_ticks;
    }

    let level = |engine: &EngineState<HeadlessRenderer>, x: i32, z: i32| {
        engine.world().get_water_level(x, 63, z)
    };
    for x in -8i32..=8 {
        for z in -8i32..=8 {
            let distance = x.abs() + z.abs();
            let found = level(&engine, x, z);
            if distance <= 7 {
                assert!((1..=8).contains(&found), "({}, {}) at level {}", x, z, found);
            } else if distance == 8 {
                assert_eq!(found, 0, "({}, {})", x, z);
            }
        }
    }
    for d in 0..7 {
        assert!(level(&engine, d, 0) > level(&engine, d + 1, 0));
        assert!(level(&engine, -d, 0) > level(&engine, -d - 1, 0));
    }

    assert_eq!(engine.break_block(0, 63, 0), Some(BlockType::Water));
    let mut ticks = 0;
    while ticks < 80 {
        ticks += engine.update(observer, 0.1).water_ticks;
    }
    for x in -8..=8 {
        for z in -8..=8 {
            assert_eq!(level(&engine, x, z), 0, "({}, {}) still wet", x, z);
        }
    }
}

#[test]
fn saved_world_reopens_bit_for_bit() {
    let root = temp_world("persistence");
    let player = Point3::new(3.25f32, 90.5, -7.75);

    let saved = {
        let mut engine = EngineState::create(
            config(12345, 4, GenerationType::Standard),
            HeadlessRenderer::new(),
            SaveDirectory::new(&root),
            "persistence",
        )
        .unwrap();
        engine.player_mut().position = player;
        engine.player_mut().yaw = 1.25;
        engine.player_mut().flying = true;
        settle(&mut engine, player, 400);
        engine.save().unwrap();
        let saved = snapshot(&engine);
        engine.shutdown();
        saved
    };
    assert!(root.join("world.meta").exists());
    assert!(root.join("player.dat").exists());
    assert!(root.join("region").join("c.0.0.chunk").exists());

    let mut engine = EngineState::open(
        config(0, 4, GenerationType::Superflat),
        HeadlessRenderer::new(),
        SaveDirectory::new(&root),
    )
    .unwrap();
    assert_eq!(engine.config().seed, 12345);
    assert_eq!(engine.config().generation_type, GenerationType::Standard);
    assert_eq!(engine.name(), "persistence");

    let restored = *engine.player();
    assert!((restored.position.x - player.x).abs() < 1e-5);
    assert!((restored.position.y - player.y).abs() < 1e-5);
    assert!((restored.position.z - player.z).abs() < 1e-5);
    assert!(restored.flying);
    assert!((restored.yaw - 1.25).abs() < 1e-6);

    settle(&mut engine, player, 400);
    for (position, blocks) in &saved {
        let chunk = engine
            .world()
            .chunk(*position)
            .unwrap_or_else(|| panic!("chunk {:?} not reloaded", position));
        assert!(chunk.blocks() == blocks.as_slice(), "chunk {:?} differs", position);
    }

    engine.shutdown();
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn corrupt_metadata_refuses_to_open() {
    let root = temp_world("corrupt");
    let saves = SaveDirectory::new(&root);
    saves.create_dirs().unwrap();
    std::fs::write(root.join("world.meta"), "name=broken\nseed=not-a-number\n").unwrap();

    let result = EngineState::open(
        config(0, 4, GenerationType::Superflat),
        HeadlessRenderer::new(),
        saves,
    );
    match result {
        Err(err @ WorldOpenError::Persistence(_)) => assert!(!err.to_string().is_empty()),
        Err(other) => panic!("unexpected error {}", other),
        Ok(_) => panic!("corrupt metadata was accepted"),
    }
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn invalid_equation_rejects_the_world() {
    let result = EngineState::new(
        WorldConfig {
            generation_type: GenerationType::CustomEquation,
            custom_equation: Some("64 + * x".to_string()),
            ..config(1, 4, GenerationType::CustomEquation)
        },
        HeadlessRenderer::new(),
    );
    match result {
        Err(WorldOpenError::Config(err)) => assert!(err.to_string().contains("column")),
        Err(other) => panic!("unexpected error {}", other),
        Ok(_) => panic!("bad equation was accepted"),
    }
}

#[test]
fn teleport_refills_the_window_within_the_caps() {
    let render_distance = 12;
    let start = Point3::new(0.5, 80.0, 0.5);
    let mut engine = engine(config(3, render_distance, GenerationType::Superflat));
    settle(&mut engine, start, 200);

    engine.set_burst_mode(false);
    let target = Point3::new(2000.5, 80.0, 0.5);
    let window = ((2 * render_distance + 1) * (2 * render_distance + 1)) as usize;
    let budget = window / 8 + 100;

    let mut frames = 0;
    while !is_idle(&engine, target) {
        assert!(frames < budget, "window not filled after {} frames", frames);
        let stats = engine.update(target, DT).clone();
        frames += 1;

        assert!(stats.inserted <= 8, "frame {} inserted {}", frames, stats.inserted);
        assert!(stats.uploaded <= 8, "frame {} uploaded {}", frames, stats.uploaded);
        for (position, _) in engine.meshes().iter() {
            assert!(engine.world().contains(*position), "mesh for absent chunk {:?}", position);
        }
    }
    assert!(!engine.world().contains(ChunkPos::new(0, 0)));
}

#[test]
fn raycast_finds_the_column_and_places_against_it() {
    let observer = Point3::new(0.5, 80.0, 0.5);
    let mut engine = engine(config(9, 4, GenerationType::Superflat));
    settle(&mut engine, observer, 200);
    for y in 70..=90 {
        engine.world_mut().set_block(5, y, 0, BlockType::Stone);
    }

    let hit = engine
        .raycast(observer, Vector3::new(1.0, 0.0, 0.0), 10.0, solid)
        .unwrap();
    assert_eq!(hit.voxel, Point3::new(5, 80, 0));
    assert_eq!(hit.normal, Vector3::new(-1, 0, 0));
    assert!((hit.distance - 4.5).abs() < 1e-4);

    let place = hit.place_position();
    assert_eq!(place, Point3::new(4, 80, 0));
    assert!(engine.place_block(place.x, place.y, place.z, BlockType::Cobblestone));
    assert_eq!(engine.world().get_block(4, 80, 0), BlockType::Cobblestone);

    assert!(engine
        .raycast(observer, Vector3::new(-1.0, 0.0, 0.0), 10.0, solid)
        .is_none());
}

#[test]
fn frames_are_culled_and_submitted() {
    let observer = Point3::new(0.5, 80.0, 0.5);
    let mut engine = engine(config(11, 4, GenerationType::Superflat));
    settle(&mut engine, observer, 200);

    let everything = engine.submit_frame(None, None);
    assert!(everything.visible > 0);
    assert_eq!(everything.culled, 0);

    let projection = voxel_world::Projection::new(1280, 720, cgmath::Deg(70.0), 0.1, 1000.0);
    let camera = voxel_world::Camera::new(observer, cgmath::Rad(0.0), cgmath::Rad(0.0));
    let view_projection = projection.view_projection(&camera);
    let culled = engine.submit_frame(Some(&view_projection), None);
    assert!(culled.culled > 0);
    assert!(culled.visible < everything.visible);
    assert_eq!(engine.renderer().frame_count(), 2);
    assert_eq!(engine.renderer().last_opaque().len(), culled.opaque.len());
    assert_eq!(engine.stats().visible, culled.visible);
}
