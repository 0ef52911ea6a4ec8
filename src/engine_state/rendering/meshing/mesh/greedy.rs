//! Greedy meshing implementation for voxel rendering.
//!
//! This module implements the greedy meshing algorithm which combines adjacent coplanar
//! faces with the same attributes into larger quads, significantly reducing the number of
//! vertices needed to render a voxel world.
//!
//! Each sub-chunk is meshed one block side at a time, one slice perpendicular to the
//! side's normal at a time. Within a slice the visible faces of a row are first merged
//! into runs, then runs are stacked onto identical runs of the previous row.
//!
//! LOD 0 works on single voxels and carries ambient occlusion and smooth light. LODs
//! 1 to 3 work on `2^L` cubes: a cube is solid if any of its voxels is, it is textured
//! by its most common block, and faces appear only where a solid cube meets an empty one.

use std::sync::atomic::{AtomicBool, Ordering};

use cgmath::{Point3, Vector3};
use log::trace;
use web_time::Instant;

use crate::engine_state::{
    rendering::vertex::{Vertex, VertexAttributes},
    voxels::{
        block::{
            block_side::{Axis, BlockSide},
            block_type::{BlockType, BLOCK_TYPE_COUNT},
            TintClass,
        },
        chunk::{Chunk, CHUNK_HEIGHT, CHUNK_WIDTH, SUB_CHUNKS, SUB_CHUNK_HEIGHT},
        world::NeighborSlices,
    },
};

use super::{
    face::{Face, FaceKey},
    mesh::{ChunkMesh, MeshBuffers, SubChunkMesh, LOD_COUNT},
    sampler::ChunkSampler,
};

/// Order in which sides are emitted: X, then Y, then Z, negative first.
const MESH_SIDE_ORDER: [BlockSide; 6] = [
    BlockSide::LEFT,
    BlockSide::RIGHT,
    BlockSide::BOTTOM,
    BlockSide::TOP,
    BlockSide::BACK,
    BlockSide::FRONT,
];

/// Meshes every non-empty sub-chunk of `chunk`.
///
/// Reads only `chunk` and the neighbour seams, so two chunks with equal blocks,
/// light and seams produce equal meshes.
///
/// # Returns
/// `None` if `cancel` was raised between sub-chunks.
pub fn mesh_chunk(chunk: &Chunk, neighbors: &NeighborSlices, cancel: &AtomicBool) -> Option<ChunkMesh> {
    let start = Instant::now();
    let sampler = ChunkSampler::new(chunk, neighbors);
    let mut mesh = ChunkMesh::new(chunk.position, chunk.revision());

    for sub_y in 0..SUB_CHUNKS {
        if cancel.load(Ordering::Relaxed) {
            return None;
        }
        if !chunk.sub_chunk_has_blocks(sub_y) {
            continue;
        }
        mesh.sub_chunks[sub_y] = mesh_sub_chunk(&sampler, sub_y);
    }

    trace!(
        "Meshed chunk {:?} in {:?} ({} LOD0 vertices)",
        chunk.position,
        start.elapsed(),
        mesh.vertex_count(0)
    );
    Some(mesh)
}

fn mesh_sub_chunk(sampler: &ChunkSampler, sub_y: usize) -> SubChunkMesh {
    let y0 = sub_y as i32 * SUB_CHUNK_HEIGHT;
    let mut out = SubChunkMesh::default();

    emit_pass(&mut out.lods[0], 0, y0, |side, x, y, z| {
        opaque_key(sampler, side, x, y0 + y, z)
    });
    emit_pass(&mut out.water, 0, y0, |side, x, y, z| {
        water_key(sampler, side, x, y0 + y, z)
    });
    for lod in 1..LOD_COUNT {
        let grid = CubeGrid::build(sampler, lod as u8, y0);
        emit_pass(&mut out.lods[lod], lod as u8, y0, |side, i, j, k| {
            grid.key(sampler, side, i, j, k)
        });
    }
    out
}

/// Cube coordinate of slice cell `(layer, row, col)`.
///
/// X slices run rows along Y and columns along Z, Y slices rows along Z and
/// columns along X, Z slices rows along Y and columns along X.
fn cube_of(axis: Axis, layer: i32, row: i32, col: i32) -> (i32, i32, i32) {
    match axis {
        Axis::X => (layer, row, col),
        Axis::Y => (col, layer, row),
        Axis::Z => (col, row, layer),
    }
}

fn emit_pass<F>(buffers: &mut MeshBuffers, lod: u8, y0: i32, key: F)
where
    F: Fn(BlockSide, i32, i32, i32) -> Option<FaceKey>,
{
    let scale = 1 << lod;
    let n = SUB_CHUNK_HEIGHT / scale;
    let mut keys = vec![None; (n * n) as usize];

    for side in MESH_SIDE_ORDER {
        let axis = side.axis();
        for layer in 0..n {
            for row in 0..n {
                for col in 0..n {
                    let (i, j, k) = cube_of(axis, layer, row, col);
                    keys[(row * n + col) as usize] = key(side, i, j, k);
                }
            }
            for face in greedy_slice(&keys, n as u32) {
                push_face(buffers, side, layer as u32, &face, scale as u32, y0 as u32, lod);
            }
        }
    }
}

/// Merges the visible cells of one slice into rectangles, sorted by row then column.
fn greedy_slice(keys: &[Option<FaceKey>], n: u32) -> Vec<Face> {
    let mut finished = Vec::new();
    let mut open: Vec<Face> = Vec::new();

    for row in 0..n {
        let mut runs: Vec<Face> = Vec::new();
        for col in 0..n {
            let Some(key) = keys[(row * n + col) as usize] else {
                continue;
            };
            let face = Face::new(row, col, key);
            match runs.last().and_then(|last| last.merge_right(&face)) {
                Some(merged) => {
                    if let Some(last) = runs.last_mut() {
                        *last = merged;
                    }
                }
                None => runs.push(face),
            }
        }

        let mut consumed = vec![false; open.len()];
        let mut next_open = Vec::with_capacity(runs.len());
        for run in runs {
            let grown = open.iter().enumerate().find_map(|(index, below)| {
                if consumed[index] {
                    return None;
                }
                below.merge_up(&run).map(|merged| (index, merged))
            });
            match grown {
                Some((index, merged)) => {
                    consumed[index] = true;
                    next_open.push(merged);
                }
                None => next_open.push(run),
            }
        }
        finished.extend(
            open.iter()
                .zip(consumed)
                .filter(|(_, consumed)| !consumed)
                .map(|(face, _)| *face),
        );
        open = next_open;
    }

    finished.extend(open);
    finished.sort_by_key(|face| (face.row, face.col));
    finished
}

fn push_face(
    buffers: &mut MeshBuffers,
    side: BlockSide,
    layer: u32,
    face: &Face,
    scale: u32,
    y0: u32,
    lod: u8,
) {
    let axis = side.axis();
    let plane = if side.is_positive() { layer + 1 } else { layer } * scale;
    let (row0, row1) = (face.row * scale, (face.row + face.height) * scale);
    let (col0, col1) = (face.col * scale, (face.col + face.width) * scale);

    let point = |row: u32, col: u32| match axis {
        Axis::X => Point3::new(plane, y0 + row, col),
        Axis::Y => Point3::new(col, y0 + plane, row),
        Axis::Z => Point3::new(col, y0 + row, plane),
    };
    // (u, v) spans the quad so that u x v points along the positive normal.
    let ((u0, u1), (v0, v1), u_is_row) = match axis {
        Axis::X | Axis::Y => ((row0, row1), (col0, col1), true),
        Axis::Z => ((col0, col1), (row0, row1), false),
    };
    let attributes = VertexAttributes {
        normal: side,
        ao: face.key.ao,
        light: face.key.light,
        tint: face.key.tint,
        slot: face.key.slot,
        lod,
    };
    let corner = |u: u32, v: u32| {
        let position = if u_is_row { point(u, v) } else { point(v, u) };
        Vertex::new(position, &attributes, (u - u0) as u8, (v - v0) as u8)
    };

    let ll = corner(u0, v0);
    let lr = corner(u1, v0);
    let ul = corner(u0, v1);
    let ur = corner(u1, v1);
    if side.is_positive() {
        buffers.push_quad([ll, lr, ul, ur]);
    } else {
        buffers.push_quad([ll, ul, lr, ur]);
    }
}

/// Tangent unit steps `(U, V)` of a face plane, matching `push_face`.
fn tangents(axis: Axis) -> (Vector3<i32>, Vector3<i32>) {
    match axis {
        Axis::X => (Vector3::new(0, 1, 0), Vector3::new(0, 0, 1)),
        Axis::Y => (Vector3::new(0, 0, 1), Vector3::new(1, 0, 0)),
        Axis::Z => (Vector3::new(1, 0, 0), Vector3::new(0, 1, 0)),
    }
}

fn face_tint(block: BlockType, side: BlockSide) -> TintClass {
    match block.tint() {
        TintClass::GrassTop if side != BlockSide::TOP => TintClass::None,
        tint => tint,
    }
}

fn opaque_key(sampler: &ChunkSampler, side: BlockSide, x: i32, y: i32, z: i32) -> Option<FaceKey> {
    let block = sampler.chunk().get_block(x, y, z);
    if !block.is_meshed_opaque() {
        return None;
    }
    let offset = side.offset();
    let n = Point3::new(x + offset.x, y + offset.y, z + offset.z);
    let neighbor = sampler.block(n.x, n.y, n.z, BlockType::Stone);
    if !neighbor.is_transparent() || (neighbor == block && block != BlockType::Leaves) {
        return None;
    }
    let (ao, light) = corner_shading(sampler, side, n);
    Some(FaceKey {
        slot: block.face_slot(side),
        ao,
        light,
        tint: face_tint(block, side),
    })
}

fn water_key(sampler: &ChunkSampler, side: BlockSide, x: i32, y: i32, z: i32) -> Option<FaceKey> {
    let block = sampler.chunk().get_block(x, y, z);
    if block != BlockType::Water {
        return None;
    }
    let offset = side.offset();
    let n = Point3::new(x + offset.x, y + offset.y, z + offset.z);
    let neighbor = sampler.block(n.x, n.y, n.z, BlockType::Water);
    if !neighbor.is_transparent() || neighbor == BlockType::Water {
        return None;
    }
    Some(FaceKey {
        slot: block.face_slot(side),
        ao: 0,
        light: sampler.light(n.x, n.y, n.z),
        tint: TintClass::Water,
    })
}

/// Face-averaged ambient occlusion and light for the face looking into cell `n`.
fn corner_shading(sampler: &ChunkSampler, side: BlockSide, n: Point3<i32>) -> (u8, u8) {
    let (u, v) = tangents(side.axis());
    let occludes = |p: Point3<i32>| sampler.block(p.x, p.y, p.z, BlockType::Air).is_opaque_solid();
    let light = |p: Point3<i32>| sampler.light(p.x, p.y, p.z);

    let mut ao_sum = 0u32;
    let mut light_sum = 0u32;
    for (du, dv) in [(-1, -1), (1, -1), (-1, 1), (1, 1)] {
        let side_u = n + u * du;
        let side_v = n + v * dv;
        let diagonal = n + u * du + v * dv;
        ao_sum += [side_u, side_v, diagonal]
            .into_iter()
            .filter(|p| occludes(*p))
            .count() as u32;
        light_sum += light(n)
            .max(light(side_u))
            .max(light(side_v))
            .max(light(diagonal)) as u32;
    }
    (((ao_sum + 2) / 4) as u8, ((light_sum + 2) / 4) as u8)
}

/// One aggregated `2^L` cube.
#[derive(Copy, Clone, Debug)]
struct Cube {
    solid: bool,
    block: BlockType,
    light: u8,
}

/// The cubes of one sub-chunk at one LOD level.
struct CubeGrid {
    scale: i32,
    n: i32,
    y0: i32,
    cubes: Vec<Cube>,
}

impl CubeGrid {
    fn build(sampler: &ChunkSampler, lod: u8, y0: i32) -> Self {
        let scale = 1 << lod;
        let n = SUB_CHUNK_HEIGHT / scale;
        let mut cubes = Vec::with_capacity((n * n * n) as usize);
        for i in 0..n {
            for j in 0..n {
                for k in 0..n {
                    cubes.push(aggregate(sampler, scale, i * scale, y0 + j * scale, k * scale));
                }
            }
        }
        CubeGrid {
            scale,
            n,
            y0,
            cubes,
        }
    }

    fn cube(&self, sampler: &ChunkSampler, i: i32, j: i32, k: i32) -> Cube {
        let inside = |c: i32| (0..self.n).contains(&c);
        if inside(i) && inside(j) && inside(k) {
            return self.cubes[((i * self.n + j) * self.n + k) as usize];
        }
        aggregate(
            sampler,
            self.scale,
            i * self.scale,
            self.y0 + j * self.scale,
            k * self.scale,
        )
    }

    fn key(&self, sampler: &ChunkSampler, side: BlockSide, i: i32, j: i32, k: i32) -> Option<FaceKey> {
        let own = self.cube(sampler, i, j, k);
        if !own.solid {
            return None;
        }
        let offset = side.offset();
        let neighbor = self.cube(sampler, i + offset.x, j + offset.y, k + offset.z);
        if neighbor.solid {
            return None;
        }
        Some(FaceKey {
            slot: own.block.face_slot(side),
            ao: 0,
            light: neighbor.light,
            tint: face_tint(own.block, side),
        })
    }
}

/// Aggregates the cube with minimum corner `(x0, y0, z0)`.
///
/// Cubes outside the chunk horizontally collapse onto the neighbour seam.
fn aggregate(sampler: &ChunkSampler, scale: i32, x0: i32, y0: i32, z0: i32) -> Cube {
    if y0 < 0 {
        return Cube {
            solid: true,
            block: BlockType::Bedrock,
            light: 0,
        };
    }
    if y0 >= CHUNK_HEIGHT {
        return Cube {
            solid: false,
            block: BlockType::Air,
            light: 0,
        };
    }
    let span = |start: i32| {
        if start < 0 {
            -1..0
        } else if start >= CHUNK_WIDTH {
            CHUNK_WIDTH..CHUNK_WIDTH + 1
        } else {
            start..start + scale
        }
    };

    let mut counts = [0u16; BLOCK_TYPE_COUNT];
    let mut light = 0;
    for x in span(x0) {
        for z in span(z0) {
            for y in y0..(y0 + scale).min(CHUNK_HEIGHT) {
                let block = sampler.block(x, y, z, BlockType::Stone);
                if block.is_meshed_opaque() {
                    counts[block as usize] += 1;
                }
                light = light.max(sampler.light(x, y, z));
            }
        }
    }

    let mut majority: Option<(BlockType, u16)> = None;
    for (id, count) in counts.iter().enumerate() {
        if *count == 0 || majority.is_some_and(|(_, best)| best >= *count) {
            continue;
        }
        if let Some(block) = BlockType::from_id(id as u8) {
            majority = Some((block, *count));
        }
    }
    match majority {
        Some((block, _)) => Cube {
            solid: true,
            block,
            light,
        },
        None => Cube {
            solid: false,
            block: BlockType::Air,
            light,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::{chunk::ChunkPos, world::World};

    fn mesh(chunk: &Chunk, neighbors: &NeighborSlices) -> ChunkMesh {
        mesh_chunk(chunk, neighbors, &AtomicBool::new(false)).unwrap()
    }

    fn lone(blocks: &[(i32, i32, i32, BlockType)]) -> Chunk {
        let mut chunk = Chunk::empty(ChunkPos::new(0, 0));
        for (x, y, z, block) in blocks {
            chunk.set_block(*x, *y, *z, *block);
        }
        chunk
    }

    fn position(vertex: &Vertex) -> Vector3<i32> {
        let p = vertex.position();
        Vector3::new(p.x as i32, p.y as i32, p.z as i32)
    }

    #[test]
    fn single_block_has_six_outward_faces() {
        let chunk = lone(&[(8, 100, 8, BlockType::Stone)]);
        let mesh = mesh(&chunk, &NeighborSlices::default());
        let buffers = &mesh.sub_chunks[6].lods[0];
        assert_eq!(buffers.quad_count(), 6);
        assert_eq!(buffers.indices.len(), 36);
        assert!(mesh.sub_chunks[6].water.is_empty());

        for quad in buffers.vertices.chunks(4) {
            let normal = BlockSide::all()[quad[0].normal_index() as usize].offset();
            let (ll, lr, ul) = (position(&quad[0]), position(&quad[1]), position(&quad[2]));
            let cross = (lr - ll).cross(ul - ll);
            assert_eq!(cross, normal, "quad facing {:?}", normal);
        }
    }

    #[test]
    fn flat_layer_collapses_to_two_quads() {
        let mut chunk = Chunk::empty(ChunkPos::new(0, 0));
        for x in 0..CHUNK_WIDTH {
            for z in 0..CHUNK_WIDTH {
                chunk.set_block(x, 10, z, BlockType::Stone);
            }
        }
        let mesh = mesh(&chunk, &NeighborSlices::default());
        let buffers = &mesh.sub_chunks[0].lods[0];
        assert_eq!(buffers.quad_count(), 2);
        let top = buffers
            .vertices
            .iter()
            .find(|vertex| vertex.normal_index() == BlockSide::TOP as u8)
            .unwrap();
        assert_eq!(top.position().y, 11);
        let (u, v) = buffers.vertices.iter().map(Vertex::uv).max().unwrap();
        assert_eq!((u, v), (16, 16));
    }

    #[test]
    fn water_does_not_face_water() {
        let chunk = lone(&[(4, 50, 4, BlockType::Water), (5, 50, 4, BlockType::Water)]);
        let mesh = mesh(&chunk, &NeighborSlices::default());
        let sub_chunk = &mesh.sub_chunks[3];
        assert!(sub_chunk.lods[0].is_empty());
        assert_eq!(sub_chunk.water.quad_count(), 6);
        assert!(sub_chunk
            .water
            .vertices
            .iter()
            .all(|vertex| vertex.tint() == TintClass::Water as u8));
    }

    #[test]
    fn equal_opaque_blocks_hide_each_other_but_leaves_do_not() {
        let stone = lone(&[(4, 50, 4, BlockType::Stone), (5, 50, 4, BlockType::Stone)]);
        assert_eq!(mesh(&stone, &NeighborSlices::default()).sub_chunks[3].lods[0].quad_count(), 6);

        let leaves = lone(&[(4, 50, 4, BlockType::Leaves), (5, 50, 4, BlockType::Leaves)]);
        assert_eq!(mesh(&leaves, &NeighborSlices::default()).sub_chunks[3].lods[0].quad_count(), 8);
    }

    #[test]
    fn seams_follow_the_neighbour_slice() {
        let mut world = World::new();
        world.insert_chunk(lone(&[(15, 40, 3, BlockType::Stone)]));
        world.insert_chunk(Chunk::empty(ChunkPos::new(1, 0)));
        let chunk = world.chunk(ChunkPos::new(0, 0)).unwrap().clone();

        let open = mesh(&chunk, &world.neighbor_slices(chunk.position));
        assert_eq!(open.sub_chunks[2].lods[0].quad_count(), 6);

        world.set_block(16, 40, 3, BlockType::Dirt);
        let closed = mesh(&chunk, &world.neighbor_slices(chunk.position));
        assert_eq!(closed.sub_chunks[2].lods[0].quad_count(), 5);

        // A missing neighbour reads as stone and hides the face too.
        let frontier = mesh(&chunk, &NeighborSlices::default());
        assert_eq!(frontier.sub_chunks[2].lods[0].quad_count(), 5);
    }

    #[test]
    fn ambient_occlusion_darkens_faces_next_to_walls() {
        let open = lone(&[(8, 20, 8, BlockType::Stone)]);
        let walled = lone(&[(8, 20, 8, BlockType::Stone), (9, 21, 8, BlockType::Stone)]);
        let top_ao = |chunk: &Chunk| {
            mesh(chunk, &NeighborSlices::default()).sub_chunks[1].lods[0]
                .vertices
                .iter()
                .find(|vertex| vertex.normal_index() == BlockSide::TOP as u8 && vertex.position().y == 21)
                .map(Vertex::ao)
        };
        assert_eq!(top_ao(&open), Some(0));
        assert_eq!(top_ao(&walled), Some(1));
    }

    #[test]
    fn solid_sub_chunk_has_one_top_quad_at_every_lod() {
        let mut chunk = Chunk::empty(ChunkPos::new(0, 0));
        for x in 0..CHUNK_WIDTH {
            for y in 0..SUB_CHUNK_HEIGHT {
                for z in 0..CHUNK_WIDTH {
                    chunk.set_block(x, y, z, BlockType::Stone);
                }
            }
        }
        let mesh = mesh(&chunk, &NeighborSlices::default());
        for lod in 0..LOD_COUNT {
            let buffers = &mesh.sub_chunks[0].lods[lod];
            assert_eq!(buffers.quad_count(), 1, "lod {}", lod);
            assert!(buffers
                .vertices
                .iter()
                .all(|vertex| vertex.position().y == 16 && vertex.lod() == lod as u8));
        }
    }

    #[test]
    fn lod_cubes_take_the_majority_texture() {
        let mut chunk = Chunk::empty(ChunkPos::new(0, 0));
        // One 2x2x2 cube: five dirt, three stone.
        let cells = [(0, 0, 0), (1, 0, 0), (0, 0, 1), (1, 0, 1), (0, 1, 0)];
        for (x, y, z) in cells {
            chunk.set_block(x, 64 + y, z, BlockType::Dirt);
        }
        for (x, y, z) in [(1, 1, 0), (0, 1, 1), (1, 1, 1)] {
            chunk.set_block(x, 64 + y, z, BlockType::Stone);
        }
        let mesh = mesh(&chunk, &NeighborSlices::default());
        let lod1 = &mesh.sub_chunks[4].lods[1];
        let top = lod1
            .vertices
            .iter()
            .find(|vertex| vertex.normal_index() == BlockSide::TOP as u8)
            .unwrap();
        assert_eq!(top.slot(), BlockType::Dirt.face_slot(BlockSide::TOP));
        assert_eq!(top.position().y, 66);
    }

    #[test]
    fn meshing_is_deterministic_and_cancellable() {
        let chunk = lone(&[(1, 1, 1, BlockType::Grass), (2, 200, 9, BlockType::Glass)]);
        let first = mesh(&chunk, &NeighborSlices::default());
        let second = mesh(&chunk, &NeighborSlices::default());
        assert_eq!(first, second);
        assert!(mesh_chunk(&chunk, &NeighborSlices::default(), &AtomicBool::new(true)).is_none());
    }
}
