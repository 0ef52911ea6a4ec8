//! Vertex data structures and layouts for voxel rendering.
//!
//! This module defines the packed vertex format shared by every LOD level and
//! the water pass. Positions are local to the chunk, so all vertices of one
//! chunk share a single `world_offset` translation.
//!
//! # Memory Layout
//! Two 32-bit words, 8 bytes per vertex:
//!
//! | word | bits    | field                                   |
//! |------|---------|-----------------------------------------|
//! | 0    | 0..5    | x (0..=16)                              |
//! | 0    | 5..14   | y (0..=256)                             |
//! | 0    | 14..19  | z (0..=16)                              |
//! | 0    | 19..22  | face normal, `BlockSide` index          |
//! | 0    | 22..24  | ambient occlusion (0..=3)               |
//! | 0    | 24..28  | block light (0..=15)                    |
//! | 0    | 28..30  | tint class                              |
//! | 1    | 0..8    | atlas texture slot                      |
//! | 1    | 8..13   | u, in blocks (0..=16)                   |
//! | 1    | 13..18  | v, in blocks (0..=16)                   |
//! | 1    | 18..20  | LOD level                               |

use cgmath::Point3;

use crate::engine_state::voxels::block::{block_side::BlockSide, TintClass};

const X_SHIFT: u32 = 0;
const Y_SHIFT: u32 = 5;
const Z_SHIFT: u32 = 14;
const NORMAL_SHIFT: u32 = 19;
const AO_SHIFT: u32 = 22;
const LIGHT_SHIFT: u32 = 24;
const TINT_SHIFT: u32 = 28;

const SLOT_SHIFT: u32 = 0;
const U_SHIFT: u32 = 8;
const V_SHIFT: u32 = 13;
const LOD_SHIFT: u32 = 18;

/// Size of one vertex in bytes.
pub const VERTEX_STRIDE: usize = std::mem::size_of::<Vertex>();

/// A vertex in the voxel rendering pipeline.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    packed: [u32; 2],
}

/// Everything a vertex carries besides its position.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct VertexAttributes {
    /// Face the quad belongs to.
    pub normal: BlockSide,
    /// Ambient occlusion, `0..=3`.
    pub ao: u8,
    /// Block light, `0..=15`.
    pub light: u8,
    /// Runtime recolour class.
    pub tint: TintClass,
    /// Atlas tile.
    pub slot: u8,
    /// LOD level, `0..=3`.
    pub lod: u8,
}

impl Vertex {
    /// Packs a vertex.
    ///
    /// # Arguments
    /// * `pos` - Chunk-local corner position
    /// * `attributes` - Face attributes shared by the quad
    /// * `u`, `v` - Texture coordinates in blocks, so tiles repeat across merged quads
    pub fn new(pos: Point3<u32>, attributes: &VertexAttributes, u: u8, v: u8) -> Self {
        let word0 = (pos.x & 0x1F) << X_SHIFT
            | (pos.y & 0x1FF) << Y_SHIFT
            | (pos.z & 0x1F) << Z_SHIFT
            | (attributes.normal as u32 & 0x7) << NORMAL_SHIFT
            | (attributes.ao as u32 & 0x3) << AO_SHIFT
            | (attributes.light as u32 & 0xF) << LIGHT_SHIFT
            | (attributes.tint as u32 & 0x3) << TINT_SHIFT;
        let word1 = (attributes.slot as u32) << SLOT_SHIFT
            | (u as u32 & 0x1F) << U_SHIFT
            | (v as u32 & 0x1F) << V_SHIFT
            | (attributes.lod as u32 & 0x3) << LOD_SHIFT;
        Vertex {
            packed: [word0, word1],
        }
    }

    /// Chunk-local position.
    pub fn position(&self) -> Point3<u32> {
        let word = self.packed[0];
        Point3::new(
            (word >> X_SHIFT) & 0x1F,
            (word >> Y_SHIFT) & 0x1FF,
            (word >> Z_SHIFT) & 0x1F,
        )
    }

    /// `BlockSide` index of the face normal.
    pub fn normal_index(&self) -> u8 {
        ((self.packed[0] >> NORMAL_SHIFT) & 0x7) as u8
    }

    /// Ambient occlusion.
    pub fn ao(&self) -> u8 {
        ((self.packed[0] >> AO_SHIFT) & 0x3) as u8
    }

    /// Block light.
    pub fn light(&self) -> u8 {
        ((self.packed[0] >> LIGHT_SHIFT) & 0xF) as u8
    }

    /// Tint class bits.
    pub fn tint(&self) -> u8 {
        ((self.packed[0] >> TINT_SHIFT) & 0x3) as u8
    }

    /// Atlas tile.
    pub fn slot(&self) -> u8 {
        ((self.packed[1] >> SLOT_SHIFT) & 0xFF) as u8
    }

    /// Texture coordinates in blocks.
    pub fn uv(&self) -> (u8, u8) {
        (
            ((self.packed[1] >> U_SHIFT) & 0x1F) as u8,
            ((self.packed[1] >> V_SHIFT) & 0x1F) as u8,
        )
    }

    /// LOD level.
    pub fn lod(&self) -> u8 {
        ((self.packed[1] >> LOD_SHIFT) & 0x3) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_and_unpacks_extremes() {
        let attributes = VertexAttributes {
            normal: BlockSide::RIGHT,
            ao: 3,
            light: 15,
            tint: TintClass::Water,
            slot: 255,
            lod: 3,
        };
        let vertex = Vertex::new(Point3::new(16, 256, 16), &attributes, 16, 16);
        assert_eq!(vertex.position(), Point3::new(16, 256, 16));
        assert_eq!(vertex.normal_index(), BlockSide::RIGHT as u8);
        assert_eq!(vertex.ao(), 3);
        assert_eq!(vertex.light(), 15);
        assert_eq!(vertex.tint(), TintClass::Water as u8);
        assert_eq!(vertex.slot(), 255);
        assert_eq!(vertex.uv(), (16, 16));
        assert_eq!(vertex.lod(), 3);
        assert_eq!(VERTEX_STRIDE, 8);
    }

    #[test]
    fn fields_do_not_bleed_into_each_other() {
        let attributes = VertexAttributes {
            normal: BlockSide::FRONT,
            ao: 0,
            light: 0,
            tint: TintClass::None,
            slot: 0,
            lod: 0,
        };
        let vertex = Vertex::new(Point3::new(0, 511, 0), &attributes, 0, 31);
        assert_eq!(vertex.position(), Point3::new(0, 511, 0));
        assert_eq!(vertex.normal_index(), 0);
        assert_eq!(vertex.uv(), (0, 31));
        assert_eq!(vertex.lod(), 0);
    }
}
