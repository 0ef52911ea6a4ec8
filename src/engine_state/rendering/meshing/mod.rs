//! Mesh generation and management for voxel rendering.
//!
//! This module turns chunk meshes into renderer buffers and remembers which
//! buffers belong to which chunk.
//!
//! # Architecture
//! - `MeshManager`: owns the buffer handles of every uploaded chunk
//! - `mesh/`: the greedy mesher and the mesh data it produces
//! - `renderer`: the [`Renderer`] seam and the in-memory [`HeadlessRenderer`]
//!
//! # Upload policy
//! A chunk's new mesh replaces the old one only once every one of its buffers
//! uploaded. If any upload fails the new buffers are released, the previous
//! buffers stay in place and the caller re-dirties the chunk.

use std::collections::HashMap;

use cgmath::Vector3;
use log::{trace, warn};

/// Core mesh generation algorithms and data structures.
pub mod mesh;
mod renderer;

pub use mesh::*;
pub use renderer::*;

use crate::engine_state::{
    error::UploadError,
    voxels::chunk::{ChunkPos, SubChunkKey, SUB_CHUNKS},
};

/// One uploaded buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UploadedBuffer {
    /// Renderer handle.
    pub handle: BufferHandle,
    /// Indices to draw.
    pub index_count: u32,
    /// Vertices stored.
    pub vertex_count: u32,
}

/// Buffers of one sub-chunk.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SubChunkBuffers {
    /// Opaque buffers per LOD; `None` where that LOD has no geometry.
    pub lods: [Option<UploadedBuffer>; LOD_COUNT],
    /// Water buffer, if the sub-chunk has water faces.
    pub water: Option<UploadedBuffer>,
}

impl SubChunkBuffers {
    /// True if nothing was uploaded for this sub-chunk.
    pub fn is_empty(&self) -> bool {
        self.water.is_none() && self.lods.iter().all(Option::is_none)
    }

    fn handles(&self) -> impl Iterator<Item = BufferHandle> + '_ {
        self.lods
            .iter()
            .chain(std::iter::once(&self.water))
            .flatten()
            .map(|buffer| buffer.handle)
    }
}

/// All uploaded buffers of one chunk.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkBuffers {
    /// Chunk revision the buffers were meshed from.
    pub revision: u64,
    /// Translation of the chunk-local vertices.
    pub world_offset: Vector3<f32>,
    /// One entry per sub-chunk, bottom to top.
    pub sub_chunks: Vec<SubChunkBuffers>,
}

impl ChunkBuffers {
    /// Vertices uploaded for one LOD across all sub-chunks.
    pub fn vertex_count(&self, lod: usize) -> u32 {
        self.sub_chunks
            .iter()
            .filter_map(|sub_chunk| sub_chunk.lods[lod])
            .map(|buffer| buffer.vertex_count)
            .sum()
    }

    /// Water vertices uploaded across all sub-chunks.
    pub fn water_vertex_count(&self) -> u32 {
        self.sub_chunks
            .iter()
            .filter_map(|sub_chunk| sub_chunk.water)
            .map(|buffer| buffer.vertex_count)
            .sum()
    }

    fn handles(&self) -> impl Iterator<Item = BufferHandle> + '_ {
        self.sub_chunks.iter().flat_map(SubChunkBuffers::handles)
    }
}

/// Central manager for uploaded chunk meshes.
///
/// The `MeshManager` is responsible for:
/// - Uploading every non-empty buffer of a [`ChunkMesh`]
/// - Swapping a chunk's buffers atomically on success
/// - Releasing buffers when chunks are unloaded
#[derive(Debug, Default)]
pub struct MeshManager {
    chunks: HashMap<ChunkPos, ChunkBuffers>,
}

impl MeshManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uploads a finished mesh and makes it the chunk's current mesh.
    ///
    /// # Errors
    /// The first [`UploadError`] hit. Buffers uploaded before the failure are
    /// released and the chunk keeps its previous buffers.
    pub fn upload<R: Renderer + ?Sized>(
        &mut self,
        renderer: &mut R,
        mesh: &ChunkMesh,
    ) -> Result<(), UploadError> {
        let mut uploaded = ChunkBuffers {
            revision: mesh.revision,
            world_offset: mesh.world_offset,
            sub_chunks: vec![SubChunkBuffers::default(); SUB_CHUNKS],
        };

        for (sub_y, sub_mesh) in mesh.sub_chunks.iter().enumerate() {
            let key = SubChunkKey::new(mesh.position.x, sub_y as i32, mesh.position.z);
            let slot = &mut uploaded.sub_chunks[sub_y];
            for (lod, buffers) in sub_mesh.lods.iter().enumerate() {
                let kind = BufferKind::Opaque { lod: lod as u8 };
                match upload_buffers(renderer, key, kind, buffers) {
                    Ok(buffer) => slot.lods[lod] = buffer,
                    Err(err) => return Err(abandon(renderer, &uploaded, err)),
                }
            }
            match upload_buffers(renderer, key, BufferKind::Water, &sub_mesh.water) {
                Ok(buffer) => slot.water = buffer,
                Err(err) => return Err(abandon(renderer, &uploaded, err)),
            }
        }

        if let Some(previous) = self.chunks.insert(mesh.position, uploaded) {
            for handle in previous.handles() {
                renderer.release(handle);
            }
        }
        trace!("Uploaded mesh for {:?} at revision {}", mesh.position, mesh.revision);
        Ok(())
    }

    /// Releases the buffers of a chunk. Returns false if it had none.
    pub fn unload<R: Renderer + ?Sized>(&mut self, renderer: &mut R, position: ChunkPos) -> bool {
        match self.chunks.remove(&position) {
            Some(buffers) => {
                for handle in buffers.handles() {
                    renderer.release(handle);
                }
                true
            }
            None => false,
        }
    }

    /// Releases every buffer.
    pub fn clear<R: Renderer + ?Sized>(&mut self, renderer: &mut R) {
        for (_, buffers) in self.chunks.drain() {
            for handle in buffers.handles() {
                renderer.release(handle);
            }
        }
    }

    /// Checks if a chunk has uploaded buffers.
    pub fn is_chunk_meshed(&self, position: ChunkPos) -> bool {
        self.chunks.contains_key(&position)
    }

    /// Buffers of one chunk.
    pub fn get(&self, position: ChunkPos) -> Option<&ChunkBuffers> {
        self.chunks.get(&position)
    }

    /// Every meshed chunk.
    pub fn iter(&self) -> impl Iterator<Item = (&ChunkPos, &ChunkBuffers)> {
        self.chunks.iter()
    }

    /// Number of meshed chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// True if no chunk is meshed.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

fn upload_buffers<R: Renderer + ?Sized>(
    renderer: &mut R,
    key: SubChunkKey,
    kind: BufferKind,
    buffers: &MeshBuffers,
) -> Result<Option<UploadedBuffer>, UploadError> {
    if buffers.is_empty() {
        return Ok(None);
    }
    let handle = renderer.upload(key, kind, &buffers.vertices, &buffers.indices)?;
    Ok(Some(UploadedBuffer {
        handle,
        index_count: buffers.indices.len() as u32,
        vertex_count: buffers.vertices.len() as u32,
    }))
}

fn abandon<R: Renderer + ?Sized>(
    renderer: &mut R,
    partial: &ChunkBuffers,
    err: UploadError,
) -> UploadError {
    warn!("{}; keeping previous mesh", err);
    for handle in partial.handles() {
        renderer.release(handle);
    }
    err
}
