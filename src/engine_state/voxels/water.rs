//! # Water Module
//!
//! A discrete cellular automaton over the per-cell water level field,
//! `0` = dry, `8` = source, `1..=7` = flowing depth.
//!
//! Each tick runs two phases over a set of chunks:
//!
//! 1. **Flow.** Every water cell is read from a snapshot of the world.
//!    Water falls first: a non-solid, replaceable cell below that is not
//!    already a source becomes a source. Otherwise, standing on solid
//!    ground or on a resting source, the cell spreads sideways at
//!    `spread = 7` for a source and `level - 1` for flowing water, raising
//!    any lower horizontal neighbour to `spread`. Updates are collected and
//!    merged by maximum, then applied, so the outcome does not depend on
//!    visit order.
//! 2. **Cleanup.** Cells reachable from a resting source through the same
//!    links the flow uses are tagged; every untagged cell the simulator
//!    made dries up. Removing a source therefore drains its flow on the
//!    following tick.
//!
//! Sources created by falling water are remembered as *falling* so they
//! neither spread while in the air nor keep a waterfall alive once the
//! water feeding it is gone. That memory is not persisted; a waterfall
//! saved mid-flow reloads as a column of resting sources.
//!
//! Ticks run on the main thread at a fixed rate, over chunks near the
//! observer that were visible last frame.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use log::trace;

use super::{
    block::{block_side::BlockSide, block_type::BlockType},
    chunk::{Chunk, ChunkPos, CHUNK_HEIGHT, CHUNK_WIDTH, WATER_SOURCE_LEVEL},
    world::World,
};

/// Most ticks run in a single `update`, so a long frame cannot stall.
pub const MAX_TICKS_PER_UPDATE: u32 = 4;

type Cell = (i32, i32, i32);

/// What occupies a cell as far as water is concerned.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum CellRead {
    /// The chunk is not resident.
    Unloaded,
    /// Below the world floor.
    Floor,
    /// A resident cell.
    Cell(BlockType, u8),
}

fn read_cell(world: &World, (wx, wy, wz): Cell) -> CellRead {
    if wy < 0 {
        return CellRead::Floor;
    }
    if wy >= CHUNK_HEIGHT {
        return CellRead::Cell(BlockType::Air, 0);
    }
    if !world.contains(ChunkPos::from_world(wx, wz)) {
        return CellRead::Unloaded;
    }
    CellRead::Cell(world.get_block(wx, wy, wz), world.get_water_level(wx, wy, wz))
}

fn spread_level(level: u8) -> u8 {
    if level >= WATER_SOURCE_LEVEL {
        WATER_SOURCE_LEVEL - 1
    } else {
        level.saturating_sub(1)
    }
}

fn accepts_water(block: BlockType) -> bool {
    !block.is_solid() && block.is_water_replaceable()
}

/// Drives water ticks at a fixed rate.
#[derive(Debug)]
pub struct WaterSimulator {
    interval: f32,
    accumulator: f32,
    radius: i32,
    ticks: u64,
    falling: HashSet<Cell>,
}

impl WaterSimulator {
    /// Creates a simulator ticking at `hz` over chunks within `radius`.
    pub fn new(hz: f32, radius: i32) -> Self {
        WaterSimulator {
            interval: 1.0 / hz.max(f32::EPSILON),
            accumulator: 0.0,
            radius: radius.max(0),
            ticks: 0,
            falling: HashSet::new(),
        }
    }

    /// Total ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Advances the clock by `dt` seconds and runs the ticks that fell due.
    ///
    /// `visible` is last frame's set of visible chunks; before the first
    /// frame every resident chunk in range is eligible.
    ///
    /// # Returns
    /// The number of ticks run.
    pub fn update(
        &mut self,
        world: &mut World,
        center: ChunkPos,
        visible: Option<&HashSet<ChunkPos>>,
        dt: f32,
    ) -> u32 {
        self.accumulator += dt.max(0.0);
        let mut ran = 0;
        while self.accumulator >= self.interval && ran < MAX_TICKS_PER_UPDATE {
            self.accumulator -= self.interval;
            self.tick(world, center, visible);
            ran += 1;
        }
        if ran == MAX_TICKS_PER_UPDATE {
            self.accumulator = self.accumulator.min(self.interval);
        }
        ran
    }

    /// Runs one tick immediately.
    ///
    /// # Returns
    /// The number of cells whose water level changed.
    pub fn tick(
        &mut self,
        world: &mut World,
        center: ChunkPos,
        visible: Option<&HashSet<ChunkPos>>,
    ) -> usize {
        self.ticks += 1;
        let set = self.tick_set(world, center, visible);
        if set.is_empty() {
            return 0;
        }

        let mut changed_chunks = BTreeSet::new();
        let mut changed = 0;
        for ((wx, wy, wz), level) in flow_updates(world, &set, &self.falling) {
            if level > world.get_water_level(wx, wy, wz) && world.set_water_level(wx, wy, wz, level) {
                if level == WATER_SOURCE_LEVEL {
                    self.falling.insert((wx, wy, wz));
                }
                changed_chunks.insert(ChunkPos::from_world(wx, wz));
                changed += 1;
            }
        }
        for (wx, wy, wz) in unsupported_cells(world, &set, &self.falling) {
            if world.set_water_level(wx, wy, wz, 0) {
                changed_chunks.insert(ChunkPos::from_world(wx, wz));
                changed += 1;
            }
        }
        self.falling
            .retain(|&(wx, wy, wz)| world.get_water_level(wx, wy, wz) == WATER_SOURCE_LEVEL);

        for position in &set {
            if changed_chunks.contains(position) {
                continue;
            }
            if let Some(chunk) = world.chunk_mut(*position) {
                chunk.has_water_updates = false;
            }
        }
        if changed > 0 {
            trace!(
                "Water tick {} changed {} cells over {} chunks",
                self.ticks,
                changed,
                set.len()
            );
        }
        changed
    }

    fn tick_set(
        &self,
        world: &World,
        center: ChunkPos,
        visible: Option<&HashSet<ChunkPos>>,
    ) -> BTreeSet<ChunkPos> {
        let eligible = |position: ChunkPos| {
            world.contains(position)
                && position.chebyshev_distance(center) <= self.radius
                && visible.map_or(true, |visible| visible.contains(&position))
        };

        let active: BTreeSet<ChunkPos> = world
            .chunks()
            .filter(|chunk| chunk.has_water_updates && eligible(chunk.position))
            .map(|chunk| chunk.position)
            .collect();

        let mut set = active.clone();
        for position in &active {
            for neighbor in position.neighbors() {
                let has_water = world.chunk(neighbor).is_some_and(Chunk::has_water);
                if has_water && eligible(neighbor) {
                    set.insert(neighbor);
                }
            }
        }
        set
    }
}

/// Every water cell of a chunk in world coordinates, with its level.
fn water_cells(chunk: &Chunk) -> Vec<(Cell, u8)> {
    let mut cells = Vec::with_capacity(chunk.water_cells() as usize);
    if !chunk.has_water() {
        return cells;
    }
    let Some((min_y, max_y)) = chunk.vertical_extent() else {
        return cells;
    };
    let origin = chunk.position.origin();
    for x in 0..CHUNK_WIDTH {
        for z in 0..CHUNK_WIDTH {
            for y in (min_y..=max_y).rev() {
                let level = chunk.get_water_level(x, y, z);
                if level > 0 {
                    cells.push(((origin.x + x, y, origin.z + z), level));
                }
            }
        }
    }
    cells
}

fn offset(cell: Cell, side: BlockSide) -> Cell {
    let step = side.offset();
    (cell.0 + step.x, cell.1 + step.y, cell.2 + step.z)
}

fn flow_updates(
    world: &World,
    set: &BTreeSet<ChunkPos>,
    falling: &HashSet<Cell>,
) -> BTreeMap<Cell, u8> {
    let mut updates: BTreeMap<Cell, u8> = BTreeMap::new();
    let mut raise = |cell: Cell, level: u8| {
        let entry = updates.entry(cell).or_insert(0);
        *entry = (*entry).max(level);
    };

    for position in set {
        let Some(chunk) = world.chunk(*position) else {
            continue;
        };
        for (cell, level) in water_cells(chunk) {
            let below = offset(cell, BlockSide::BOTTOM);
            let grounded = match read_cell(world, below) {
                CellRead::Cell(block, below_level) if accepts_water(block) => {
                    if below_level < WATER_SOURCE_LEVEL {
                        raise(below, WATER_SOURCE_LEVEL);
                        continue;
                    }
                    // A source made by falling water does not support
                    // spreading; only a resting source below does.
                    block == BlockType::Water && !falling.contains(&below)
                }
                CellRead::Cell(block, _) => block.is_solid(),
                CellRead::Floor => true,
                CellRead::Unloaded => false,
            };
            if !grounded {
                continue;
            }

            let spread = spread_level(level);
            if spread == 0 {
                continue;
            }
            for side in BlockSide::horizontal() {
                let target = offset(cell, side);
                if let CellRead::Cell(block, target_level) = read_cell(world, target) {
                    if accepts_water(block) && target_level < spread {
                        raise(target, spread);
                    }
                }
            }
        }
    }
    updates
}

/// Flowing cells in the tick set that no source reaches any more.
fn unsupported_cells(
    world: &World,
    set: &BTreeSet<ChunkPos>,
    falling: &HashSet<Cell>,
) -> Vec<Cell> {
    let mut levels: BTreeMap<Cell, u8> = BTreeMap::new();
    for position in set {
        if let Some(chunk) = world.chunk(*position) {
            levels.extend(water_cells(chunk));
        }
    }

    let in_set = |cell: Cell| set.contains(&ChunkPos::from_world(cell.0, cell.2));
    let mut supported: HashSet<Cell> = HashSet::new();
    let mut queue = VecDeque::new();

    for (&cell, &level) in &levels {
        let seed = if level == WATER_SOURCE_LEVEL && !falling.contains(&cell) {
            true
        } else {
            // Flow entering from outside the tick set is taken on trust.
            BlockSide::horizontal().into_iter().any(|side| {
                let neighbor = offset(cell, side);
                if in_set(neighbor) {
                    return false;
                }
                match read_cell(world, neighbor) {
                    CellRead::Unloaded => true,
                    CellRead::Cell(_, outside) => outside > level,
                    CellRead::Floor => false,
                }
            })
        };
        if seed && supported.insert(cell) {
            queue.push_back(cell);
        }
    }

    while let Some(cell) = queue.pop_front() {
        let level = levels[&cell];
        let below = offset(cell, BlockSide::BOTTOM);
        if levels.contains_key(&below) && supported.insert(below) {
            queue.push_back(below);
        }
        let spread = spread_level(level);
        for side in BlockSide::horizontal() {
            let neighbor = offset(cell, side);
            let Some(&neighbor_level) = levels.get(&neighbor) else {
                continue;
            };
            if (1..=spread).contains(&neighbor_level) && supported.insert(neighbor) {
                queue.push_back(neighbor);
            }
        }
    }

    levels
        .into_iter()
        .filter(|(cell, _)| !supported.contains(cell))
        .map(|(cell, _)| cell)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLOOR: i32 = 62;

    fn platform(radius: i32) -> World {
        let mut world = World::new();
        for cx in -radius..=radius {
            for cz in -radius..=radius {
                let mut chunk = Chunk::empty(ChunkPos::new(cx, cz));
                for x in 0..CHUNK_WIDTH {
                    for z in 0..CHUNK_WIDTH {
                        chunk.set_block(x, FLOOR, z, BlockType::Stone);
                    }
                }
                world.insert_chunk(chunk);
            }
        }
        world
    }

    fn run(simulator: &mut WaterSimulator, world: &mut World, ticks: usize) {
        for _ in 0..ticks {
            simulator.tick(world, ChunkPos::new(0, 0), None);
        }
    }

    fn manhattan_cells(distance: i32) -> impl Iterator<Item = (i32, i32)> {
        (-distance..=distance).flat_map(move |dx| {
            let dz = distance - dx.abs();
            [(dx, dz), (dx, -dz)]
        })
    }

    #[test]
    fn source_spreads_with_monotonic_decay() {
        let mut world = platform(1);
        let mut simulator = WaterSimulator::new(10.0, 4);
        world.set_block(0, FLOOR + 1, 0, BlockType::Water);
        run(&mut simulator, &mut world, 80);

        for distance in 1..=7 {
            for (dx, dz) in manhattan_cells(distance) {
                assert_eq!(
                    world.get_water_level(dx, FLOOR + 1, dz),
                    8 - distance as u8,
                    "distance {} at ({}, {})",
                    distance,
                    dx,
                    dz
                );
            }
        }
        for (dx, dz) in manhattan_cells(8) {
            assert_eq!(world.get_water_level(dx, FLOOR + 1, dz), 0);
            assert_eq!(world.get_block(dx, FLOOR + 1, dz), BlockType::Air);
        }
    }

    #[test]
    fn removing_the_source_drains_the_flow() {
        let mut world = platform(1);
        let mut simulator = WaterSimulator::new(10.0, 4);
        world.set_block(0, FLOOR + 1, 0, BlockType::Water);
        run(&mut simulator, &mut world, 20);
        assert!(world.get_water_level(3, FLOOR + 1, -2) > 0);

        world.set_block(0, FLOOR + 1, 0, BlockType::Air);
        run(&mut simulator, &mut world, 80);
        for chunk in world.chunks() {
            assert!(!chunk.has_water(), "chunk {:?} still wet", chunk.position);
        }
    }

    #[test]
    fn water_falls_before_spreading() {
        let mut world = platform(0);
        let mut simulator = WaterSimulator::new(10.0, 4);
        world.set_block(8, FLOOR + 5, 8, BlockType::Water);
        run(&mut simulator, &mut world, 1);
        assert_eq!(world.get_water_level(8, FLOOR + 4, 8), 8);
        assert_eq!(world.get_water_level(9, FLOOR + 5, 8), 0);

        run(&mut simulator, &mut world, 3);
        assert_eq!(world.get_water_level(8, FLOOR + 1, 8), 8);
        run(&mut simulator, &mut world, 1);
        assert_eq!(world.get_water_level(9, FLOOR + 1, 8), 7);
    }

    #[test]
    fn falling_column_drains_when_its_top_is_removed() {
        let mut world = platform(0);
        let mut simulator = WaterSimulator::new(10.0, 4);
        world.set_block(8, FLOOR + 5, 8, BlockType::Water);
        run(&mut simulator, &mut world, 10);
        assert_eq!(world.get_water_level(8, FLOOR + 3, 8), 8);
        assert_eq!(world.get_water_level(9, FLOOR + 3, 8), 0);
        assert!(world.get_water_level(9, FLOOR + 1, 8) > 0);
        world.set_block(8, FLOOR + 5, 8, BlockType::Air);
        run(&mut simulator, &mut world, 10);
        assert!(!world.chunk(ChunkPos::new(0, 0)).unwrap().has_water());
    }

    #[test]
    fn settled_chunks_leave_the_tick_set() {
        let mut world = platform(1);
        let mut simulator = WaterSimulator::new(10.0, 4);
        world.set_block(8, FLOOR + 1, 8, BlockType::Water);
        run(&mut simulator, &mut world, 20);
        assert!(world.chunks().all(|chunk| !chunk.has_water_updates));
        assert_eq!(simulator.tick(&mut world, ChunkPos::new(0, 0), None), 0);
    }

    #[test]
    fn invisible_chunks_are_not_ticked() {
        let mut world = platform(0);
        let mut simulator = WaterSimulator::new(10.0, 4);
        world.set_block(8, FLOOR + 1, 8, BlockType::Water);
        let visible = HashSet::new();
        run_visible(&mut simulator, &mut world, &visible);
        assert_eq!(world.get_water_level(9, FLOOR + 1, 8), 0);
    }

    fn run_visible(simulator: &mut WaterSimulator, world: &mut World, visible: &HashSet<ChunkPos>) {
        for _ in 0..5 {
            simulator.tick(world, ChunkPos::new(0, 0), Some(visible));
        }
    }

    #[test]
    fn update_runs_ticks_at_the_configured_rate() {
        let mut world = platform(0);
        let mut simulator = WaterSimulator::new(10.0, 4);
        assert_eq!(simulator.update(&mut world, ChunkPos::new(0, 0), None, 0.05), 0);
        assert_eq!(simulator.update(&mut world, ChunkPos::new(0, 0), None, 0.06), 1);
        assert_eq!(
            simulator.update(&mut world, ChunkPos::new(0, 0), None, 10.0),
            MAX_TICKS_PER_UPDATE
        );
        assert_eq!(simulator.ticks(), 1 + MAX_TICKS_PER_UPDATE as u64);
    }
}
