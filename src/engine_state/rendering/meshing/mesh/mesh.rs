//! Mesh data structures for voxel rendering.
//!
//! A chunk mesh holds one record per sub-chunk. Each record carries four
//! opaque vertex/index buffers, one per LOD level, and one water buffer.

use cgmath::Vector3;

use crate::engine_state::{
    rendering::Vertex,
    voxels::chunk::{ChunkPos, SUB_CHUNKS},
};

/// Number of opaque LOD levels produced per sub-chunk.
pub const LOD_COUNT: usize = 4;

/// Vertex and index data for one draw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeshBuffers {
    /// Packed vertices, four per quad.
    pub vertices: Vec<Vertex>,
    /// Triangle indices, six per quad.
    pub indices: Vec<u32>,
}

impl MeshBuffers {
    /// Appends one quad given its corners in `[ll, lr, ul, ur]` order.
    pub fn push_quad(&mut self, corners: [Vertex; 4]) {
        let num_faces_generated = (self.vertices.len() / 4) as u32;
        self.vertices.extend_from_slice(&corners);
        self.indices
            .extend_from_slice(&Self::generate_face_indices(num_faces_generated));
    }

    /// Generates index data for a face, adjusted by the number of previously generated faces.
    ///
    /// # Returns
    /// Six indices forming the triangles `ll, lr, ur` and `ll, ur, ul`.
    pub fn generate_face_indices(num_faces_generated: u32) -> [u32; 6] {
        let base = num_faces_generated * 4;
        [base, base + 1, base + 3, base, base + 3, base + 2]
    }

    /// Whether nothing would be drawn.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of quads.
    pub fn quad_count(&self) -> usize {
        self.vertices.len() / 4
    }
}

/// Geometry for one 16-tall slice of a chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubChunkMesh {
    /// Opaque geometry at LOD 0 (full detail) through 3 (8x aggregation).
    pub lods: [MeshBuffers; LOD_COUNT],
    /// Translucent water surfaces, full detail only.
    pub water: MeshBuffers,
}

impl SubChunkMesh {
    /// No geometry in any pass.
    pub fn is_empty(&self) -> bool {
        self.lods.iter().all(MeshBuffers::is_empty) && self.water.is_empty()
    }

    /// Has a water surface to draw.
    pub fn has_water(&self) -> bool {
        !self.water.is_empty()
    }
}

/// The complete mesh of one chunk, as produced by a mesh task.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkMesh {
    /// Chunk the mesh was built from.
    pub position: ChunkPos,
    /// Chunk revision at snapshot time; stale meshes are discarded.
    pub revision: u64,
    /// One record per sub-chunk, bottom to top.
    pub sub_chunks: Vec<SubChunkMesh>,
    /// Translation from chunk-local vertices to world space.
    pub world_offset: Vector3<f32>,
}

impl ChunkMesh {
    /// An empty mesh for `position`.
    pub fn new(position: ChunkPos, revision: u64) -> Self {
        ChunkMesh {
            position,
            revision,
            sub_chunks: vec![SubChunkMesh::default(); SUB_CHUNKS],
            world_offset: position.world_offset(),
        }
    }

    /// Total opaque vertices at `lod` across all sub-chunks.
    pub fn vertex_count(&self, lod: usize) -> usize {
        self.sub_chunks
            .iter()
            .map(|sub_chunk| sub_chunk.lods[lod].vertex_count())
            .sum()
    }

    /// Total water vertices across all sub-chunks.
    pub fn water_vertex_count(&self) -> usize {
        self.sub_chunks
            .iter()
            .map(|sub_chunk| sub_chunk.water.vertex_count())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_follow_the_quad_count() {
        assert_eq!(MeshBuffers::generate_face_indices(0), [0, 1, 3, 0, 3, 2]);
        assert_eq!(MeshBuffers::generate_face_indices(2), [8, 9, 11, 8, 11, 10]);
    }
}
