use crate::engine_state::voxels::block::TintClass;

/// Everything that must match for two neighbouring faces to merge.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FaceKey {
    /// Atlas tile.
    pub slot: u8,
    /// Face-averaged ambient occlusion.
    pub ao: u8,
    /// Face-averaged block light.
    pub light: u8,
    /// Runtime recolour class.
    pub tint: TintClass,
}

/// A rectangle of visible faces within one slice of one block side.
///
/// Slices are addressed by `row` and `col` in units of the LOD cube. The
/// greedy mesher first grows faces to the right along a row, then upward
/// across rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Face {
    /// First row covered.
    pub row: u32,
    /// First column covered.
    pub col: u32,
    /// Columns covered.
    pub width: u32,
    /// Rows covered.
    pub height: u32,
    /// Shared attributes.
    pub key: FaceKey,
}

impl Face {
    /// A single-cell face.
    pub fn new(row: u32, col: u32, key: FaceKey) -> Self {
        Face {
            row,
            col,
            width: 1,
            height: 1,
            key,
        }
    }

    /// Attempts to merge this face with another face that is directly above it.
    ///
    /// # Returns
    /// `Some(merged_face)` if the faces share attributes, column span and an
    /// edge, otherwise `None`.
    pub fn merge_up(&self, other: &Face) -> Option<Face> {
        if self.key == other.key
            && self.col == other.col
            && self.width == other.width
            && self.row + self.height == other.row
        {
            return Some(Face {
                height: self.height + other.height,
                ..*self
            });
        }

        None
    }

    /// Attempts to merge this face with another face that is directly to its right.
    ///
    /// # Returns
    /// `Some(merged_face)` if the faces share attributes, row span and an
    /// edge, otherwise `None`.
    pub fn merge_right(&self, other: &Face) -> Option<Face> {
        if self.key == other.key
            && self.row == other.row
            && self.height == other.height
            && self.col + self.width == other.col
        {
            return Some(Face {
                width: self.width + other.width,
                ..*self
            });
        }

        None
    }
}
