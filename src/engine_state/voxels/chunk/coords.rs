//! Chunk and sub-chunk addressing.
//!
//! World-space block coordinates convert to a `(ChunkPos, local)` pair by
//! floor division over the chunk width. Y is never split across chunks.

use cgmath::{Point3, Vector3};

use super::{CHUNK_WIDTH, SUB_CHUNK_HEIGHT};
use crate::engine_state::voxels::block::block_side::BlockSide;

/// Column coordinate of a chunk, in chunk units.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkPos {
    /// Chunk index along X.
    pub x: i32,
    /// Chunk index along Z.
    pub z: i32,
}

impl ChunkPos {
    /// Creates a chunk coordinate.
    pub const fn new(x: i32, z: i32) -> Self {
        ChunkPos { x, z }
    }

    /// The chunk containing world column `(wx, wz)`.
    pub fn from_world(wx: i32, wz: i32) -> Self {
        ChunkPos {
            x: wx.div_euclid(CHUNK_WIDTH),
            z: wz.div_euclid(CHUNK_WIDTH),
        }
    }

    /// The chunk containing a floating point world position.
    pub fn from_world_f32(position: Point3<f32>) -> Self {
        Self::from_world(position.x.floor() as i32, position.z.floor() as i32)
    }

    /// World-space block coordinate of the chunk's `(0, 0, 0)` cell.
    pub fn origin(self) -> Vector3<i32> {
        Vector3::new(self.x * CHUNK_WIDTH, 0, self.z * CHUNK_WIDTH)
    }

    /// Chunk origin as floats, used to relocate chunk-local vertices.
    pub fn world_offset(self) -> Vector3<f32> {
        self.origin().cast::<f32>().unwrap_or(Vector3::new(0.0, 0.0, 0.0))
    }

    /// Chebyshev ("ring") distance between two chunks.
    pub fn chebyshev_distance(self, other: ChunkPos) -> i32 {
        (self.x - other.x).abs().max((self.z - other.z).abs())
    }

    /// Squared euclidean distance in chunk units.
    pub fn distance_squared(self, other: ChunkPos) -> i64 {
        let dx = (self.x - other.x) as i64;
        let dz = (self.z - other.z) as i64;
        dx * dx + dz * dz
    }

    /// The horizontally adjacent chunk across `side`.
    ///
    /// Vertical sides return `self`; chunks span the whole column.
    pub fn neighbor(self, side: BlockSide) -> ChunkPos {
        let offset = side.offset();
        ChunkPos::new(self.x + offset.x, self.z + offset.z)
    }

    /// The four horizontal neighbours in `BlockSide::horizontal()` order.
    pub fn neighbors(self) -> [ChunkPos; 4] {
        BlockSide::horizontal().map(|side| self.neighbor(side))
    }

    /// All chunks in Chebyshev ring `radius` around `self`, in a fixed order.
    ///
    /// Ring 0 is the chunk itself.
    pub fn ring(self, radius: i32) -> Vec<ChunkPos> {
        if radius == 0 {
            return vec![self];
        }
        let mut ring = Vec::with_capacity(8 * radius as usize);
        for dx in -radius..=radius {
            ring.push(ChunkPos::new(self.x + dx, self.z - radius));
        }
        for dz in (-radius + 1)..=radius {
            ring.push(ChunkPos::new(self.x + radius, self.z + dz));
        }
        for dx in (-radius..radius).rev() {
            ring.push(ChunkPos::new(self.x + dx, self.z + radius));
        }
        for dz in ((-radius + 1)..radius).rev() {
            ring.push(ChunkPos::new(self.x - radius, self.z + dz));
        }
        ring
    }
}

/// Splits a world block coordinate into its chunk and chunk-local coordinate.
pub fn world_to_local(wx: i32, wy: i32, wz: i32) -> (ChunkPos, Point3<i32>) {
    let chunk = ChunkPos::from_world(wx, wz);
    (
        chunk,
        Point3::new(wx.rem_euclid(CHUNK_WIDTH), wy, wz.rem_euclid(CHUNK_WIDTH)),
    )
}

/// Address of one 16-tall slice of a chunk; the unit of culling.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubChunkKey {
    /// Chunk index along X.
    pub cx: i32,
    /// Sub-chunk index, `0..SUB_CHUNKS`.
    pub sub_y: i32,
    /// Chunk index along Z.
    pub cz: i32,
}

impl SubChunkKey {
    /// Creates a sub-chunk key.
    pub const fn new(cx: i32, sub_y: i32, cz: i32) -> Self {
        SubChunkKey { cx, sub_y, cz }
    }

    /// The chunk this slice belongs to.
    pub fn chunk(self) -> ChunkPos {
        ChunkPos::new(self.cx, self.cz)
    }

    /// World-space lower corner of the slice.
    pub fn min_corner(self) -> Point3<f32> {
        Point3::new(
            (self.cx * CHUNK_WIDTH) as f32,
            (self.sub_y * SUB_CHUNK_HEIGHT) as f32,
            (self.cz * CHUNK_WIDTH) as f32,
        )
    }

    /// World-space centre of the slice.
    pub fn center(self) -> Point3<f32> {
        let half_width = CHUNK_WIDTH as f32 * 0.5;
        let half_height = SUB_CHUNK_HEIGHT as f32 * 0.5;
        self.min_corner() + Vector3::new(half_width, half_height, half_width)
    }
}
