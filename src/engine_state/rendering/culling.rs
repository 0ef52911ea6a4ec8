//! Frustum and occlusion culling, and draw-list ordering.
//!
//! Culling works per sub-chunk. A sub-chunk is drawn if its box touches the
//! view frustum and, when a Hi-Z map is supplied, the map does not mark it
//! hidden. Opaque entries are ordered front to back and pick their LOD from
//! the distance ratio; water entries are ordered back to front.

use std::collections::HashMap;

use cgmath::{InnerSpace, Matrix4, Point3, Vector3, Vector4};

use crate::engine_state::voxels::chunk::{SubChunkKey, CHUNK_HEIGHT, CHUNK_WIDTH, SUB_CHUNK_HEIGHT};

use super::meshing::{mesh::LOD_COUNT, DrawEntry, MeshManager, UploadedBuffer};

/// Per-frame occlusion answers from the renderer's depth pyramid.
/// Sub-chunks missing from the map count as visible.
pub type HiZMap = HashMap<SubChunkKey, bool>;

/// The six normalized planes of a view frustum, as `(normal, distance)`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Frustum {
    planes: [Vector4<f32>; 6],
}

impl Frustum {
    /// Extracts the planes of a view-projection matrix by combining its rows.
    pub fn from_view_projection(m: &Matrix4<f32>) -> Self {
        let row = |i: usize| Vector4::new(m.x[i], m.y[i], m.z[i], m.w[i]);
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));
        let planes = [
            r3 + r0, // left
            r3 - r0, // right
            r3 + r1, // bottom
            r3 - r1, // top
            r3 + r2, // near
            r3 - r2, // far
        ]
        .map(|plane| {
            let length = plane.truncate().magnitude();
            if length > 0.0 {
                plane / length
            } else {
                plane
            }
        });
        Frustum { planes }
    }

    /// True if the box is at least partially inside every plane.
    pub fn contains_aabb(&self, min: Point3<f32>, max: Point3<f32>) -> bool {
        self.planes.iter().all(|plane| {
            // Corner furthest along the plane normal.
            let p = Vector3::new(
                if plane.x >= 0.0 { max.x } else { min.x },
                if plane.y >= 0.0 { max.y } else { min.y },
                if plane.z >= 0.0 { max.z } else { min.z },
            );
            plane.truncate().dot(p) + plane.w >= 0.0
        })
    }
}

/// LOD level for a sub-chunk at squared distance `distance_squared` when the
/// render distance is `render_distance_blocks`.
pub fn lod_for_distance(distance_squared: f32, render_distance_blocks: f32) -> u8 {
    let ratio = distance_squared / (render_distance_blocks * render_distance_blocks).max(1.0);
    if ratio < 0.49 {
        0
    } else if ratio < 0.7225 {
        1
    } else if ratio < 0.9025 {
        2
    } else {
        3
    }
}

/// Knobs for [`build_draw_lists`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CullSettings {
    /// Render distance in chunks.
    pub render_distance: i32,
    /// Cull per sub-chunk. When false whole chunks are tested and Hi-Z is ignored.
    pub sub_chunk_culling: bool,
    /// Draw every sub-chunk at this LOD instead of the distance-based one.
    /// Levels past the coarsest one draw at the coarsest.
    pub forced_lod: Option<u8>,
}

/// Ordered draw lists of one frame plus culling counts.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrawLists {
    /// Opaque entries, nearest first.
    pub opaque: Vec<DrawEntry>,
    /// Water entries, furthest first.
    pub water: Vec<DrawEntry>,
    /// Sub-chunks with geometry that passed culling.
    pub visible: usize,
    /// Sub-chunks with geometry that were culled.
    pub culled: usize,
}

/// Selects and orders the sub-chunks to draw this frame.
pub fn build_draw_lists(
    meshes: &MeshManager,
    camera: Point3<f32>,
    frustum: Option<&Frustum>,
    hi_z: Option<&HiZMap>,
    settings: &CullSettings,
) -> DrawLists {
    let render_distance_blocks = (settings.render_distance * CHUNK_WIDTH) as f32;
    let mut lists = DrawLists::default();
    let mut opaque = Vec::new();
    let mut water = Vec::new();

    for (position, buffers) in meshes.iter() {
        let occupied = buffers.sub_chunks.iter().filter(|sub| !sub.is_empty()).count();
        if !settings.sub_chunk_culling {
            let origin = position.origin();
            let min = Point3::new(origin.x as f32, 0.0, origin.z as f32);
            let max = min + Vector3::new(CHUNK_WIDTH as f32, CHUNK_HEIGHT as f32, CHUNK_WIDTH as f32);
            if !frustum.map_or(true, |frustum| frustum.contains_aabb(min, max)) {
                lists.culled += occupied;
                continue;
            }
        }

        for (sub_y, sub_chunk) in buffers.sub_chunks.iter().enumerate() {
            if sub_chunk.is_empty() {
                continue;
            }
            let key = SubChunkKey::new(position.x, sub_y as i32, position.z);
            if settings.sub_chunk_culling && !sub_chunk_visible(key, frustum, hi_z) {
                lists.culled += 1;
                continue;
            }
            lists.visible += 1;

            let distance_squared = (key.center() - camera).magnitude2();
            let lod = settings
                .forced_lod
                .map(|lod| lod.min(LOD_COUNT as u8 - 1))
                .unwrap_or_else(|| lod_for_distance(distance_squared, render_distance_blocks));
            let entry = |buffer: UploadedBuffer, lod: u8| DrawEntry {
                key,
                handle: buffer.handle,
                index_count: buffer.index_count,
                world_offset: buffers.world_offset,
                lod,
            };
            if let Some(buffer) = sub_chunk.lods.get(lod as usize).copied().flatten() {
                opaque.push((distance_squared, entry(buffer, lod)));
            }
            if let Some(buffer) = sub_chunk.water {
                water.push((distance_squared, entry(buffer, 0)));
            }
        }
    }

    opaque.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.key.cmp(&b.1.key)));
    water.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.key.cmp(&b.1.key)));
    lists.opaque = opaque.into_iter().map(|(_, entry)| entry).collect();
    lists.water = water.into_iter().map(|(_, entry)| entry).collect();
    lists
}

fn sub_chunk_visible(key: SubChunkKey, frustum: Option<&Frustum>, hi_z: Option<&HiZMap>) -> bool {
    let min = key.min_corner();
    let max = min + Vector3::new(CHUNK_WIDTH as f32, SUB_CHUNK_HEIGHT as f32, CHUNK_WIDTH as f32);
    frustum.map_or(true, |frustum| frustum.contains_aabb(min, max))
        && hi_z.map_or(true, |map| map.get(&key).copied().unwrap_or(true))
}
