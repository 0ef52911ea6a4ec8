//! The seam between the world core and a GPU backend.
//!
//! The world never talks to a graphics API directly. It hands packed vertex
//! and index data to a [`Renderer`], keeps the returned handles, and each frame
//! submits draw lists that reference those handles.
//!
//! [`HeadlessRenderer`] records everything it is given and never touches a GPU.
//! It backs the demo binary and the tests, and can be told to refuse uploads.

use std::collections::HashMap;

use cgmath::Vector3;
use log::{debug, trace};

use crate::engine_state::{
    error::UploadError, rendering::vertex::Vertex, voxels::chunk::SubChunkKey, FrameStats,
};

/// Opaque reference to one uploaded vertex/index buffer pair.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u64);

/// Which pass a buffer belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Opaque geometry at one LOD level.
    Opaque {
        /// LOD level, `0..LOD_COUNT`.
        lod: u8,
    },
    /// Alpha-blended water, LOD 0 only.
    Water,
}

/// One draw call of a frame submission.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DrawEntry {
    /// Sub-chunk being drawn.
    pub key: SubChunkKey,
    /// Buffer to draw from.
    pub handle: BufferHandle,
    /// Number of indices to draw.
    pub index_count: u32,
    /// Translation applied to the chunk-local vertices.
    pub world_offset: Vector3<f32>,
    /// LOD level of `handle`.
    pub lod: u8,
}

/// GPU backend used by the world.
///
/// All calls happen on the main thread.
pub trait Renderer {
    /// Uploads one sub-chunk buffer.
    ///
    /// # Errors
    /// [`UploadError`] if the backend could not allocate or write the buffer.
    /// The caller keeps whatever it had uploaded before.
    fn upload(
        &mut self,
        key: SubChunkKey,
        kind: BufferKind,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> Result<BufferHandle, UploadError>;

    /// Frees a buffer returned by [`Renderer::upload`].
    fn release(&mut self, handle: BufferHandle);

    /// Receives one frame: opaque entries front to back, water back to front.
    fn submit(&mut self, opaque: &[DrawEntry], water: &[DrawEntry], stats: &FrameStats);
}

/// Bookkeeping for one live buffer in the [`HeadlessRenderer`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HeadlessBuffer {
    /// Sub-chunk the buffer was uploaded for.
    pub key: SubChunkKey,
    /// Pass of the buffer.
    pub kind: BufferKind,
    /// Vertices uploaded.
    pub vertex_count: usize,
    /// Indices uploaded.
    pub index_count: usize,
}

/// A [`Renderer`] that keeps buffers in memory only.
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    next_handle: u64,
    buffers: HashMap<BufferHandle, HeadlessBuffer>,
    uploads: u64,
    releases: u64,
    fail_uploads: u32,
    frames: u64,
    last_opaque: Vec<DrawEntry>,
    last_water: Vec<DrawEntry>,
    last_stats: FrameStats,
}

impl HeadlessRenderer {
    /// Creates an empty renderer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` uploads fail.
    pub fn fail_next_uploads(&mut self, count: u32) {
        self.fail_uploads = count;
    }

    /// Buffers currently alive.
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Looks up a live buffer.
    pub fn buffer(&self, handle: BufferHandle) -> Option<&HeadlessBuffer> {
        self.buffers.get(&handle)
    }

    /// Successful uploads so far.
    pub fn upload_count(&self) -> u64 {
        self.uploads
    }

    /// Releases so far.
    pub fn release_count(&self) -> u64 {
        self.releases
    }

    /// Frames submitted so far.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Opaque draw list of the last frame.
    pub fn last_opaque(&self) -> &[DrawEntry] {
        &self.last_opaque
    }

    /// Water draw list of the last frame.
    pub fn last_water(&self) -> &[DrawEntry] {
        &self.last_water
    }

    /// Stats of the last frame.
    pub fn last_stats(&self) -> &FrameStats {
        &self.last_stats
    }
}

impl Renderer for HeadlessRenderer {
    fn upload(
        &mut self,
        key: SubChunkKey,
        kind: BufferKind,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> Result<BufferHandle, UploadError> {
        if self.fail_uploads > 0 {
            self.fail_uploads -= 1;
            return Err(UploadError(format!("injected failure for {:?}", key)));
        }
        let handle = BufferHandle(self.next_handle);
        self.next_handle += 1;
        self.uploads += 1;
        self.buffers.insert(
            handle,
            HeadlessBuffer {
                key,
                kind,
                vertex_count: vertices.len(),
                index_count: indices.len(),
            },
        );
        trace!("Uploaded {:?} {:?} as {:?}", key, kind, handle);
        Ok(handle)
    }

    fn release(&mut self, handle: BufferHandle) {
        if self.buffers.remove(&handle).is_some() {
            self.releases += 1;
        } else {
            debug!("Release of unknown buffer {:?}", handle);
        }
    }

    fn submit(&mut self, opaque: &[DrawEntry], water: &[DrawEntry], stats: &FrameStats) {
        self.frames += 1;
        self.last_opaque = opaque.to_vec();
        self.last_water = water.to_vec();
        self.last_stats = stats.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injected_failures_are_consumed_in_order() {
        let mut renderer = HeadlessRenderer::new();
        let key = SubChunkKey::new(0, 0, 0);
        renderer.fail_next_uploads(1);
        assert!(renderer.upload(key, BufferKind::Water, &[], &[]).is_err());
        let handle = renderer.upload(key, BufferKind::Water, &[], &[]).unwrap();
        assert_eq!(renderer.live_buffers(), 1);
        renderer.release(handle);
        renderer.release(handle);
        assert_eq!(renderer.live_buffers(), 0);
        assert_eq!(renderer.release_count(), 1);
    }
}
