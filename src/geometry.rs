//! Integer box geometry on the voxel grid,
//! which might also be useful for users of this library.

use glam::IVec3;

/// An axis-aligned box of voxels, half-open: it covers the cells with
/// coordinates in `[origin, origin + extent)` along every axis.
///
/// Origins may become negative once periodic translations are applied;
/// extents are always positive for live boxes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Cuboid {
    /// Lowest corner of the box.
    pub origin: IVec3,
    /// Number of cells along each axis.
    pub extent: IVec3,
}

impl Cuboid {
    /// Create a box from its lowest corner and its size along each axis.
    pub fn new(origin: IVec3, extent: IVec3) -> Self {
        Self { origin, extent }
    }

    /// The corner just past the highest cell of the box.
    pub fn max(&self) -> IVec3 {
        self.origin + self.extent
    }

    /// Number of cells covered by the box.
    pub fn volume(&self) -> i64 {
        self.extent.x as i64 * self.extent.y as i64 * self.extent.z as i64
    }

    /// Whether the box is degenerate (zero cells along some axis).
    pub fn is_empty(&self) -> bool {
        self.extent.x <= 0 || self.extent.y <= 0 || self.extent.z <= 0
    }

    /// The same box shifted by a translation vector.
    pub fn translated(&self, shift: IVec3) -> Self {
        Self {
            origin: self.origin + shift,
            extent: self.extent,
        }
    }

    /// Whether this box, expanded by one cell in every direction, intersects
    /// `other`. Face, edge and corner contact all count.
    pub fn touches(&self, other: &Cuboid) -> bool {
        let a_max = self.max();
        let b_max = other.max();
        other.origin.x <= a_max.x
            && self.origin.x <= b_max.x
            && other.origin.y <= a_max.y
            && self.origin.y <= b_max.y
            && other.origin.z <= a_max.z
            && self.origin.z <= b_max.z
    }

    /// Whether the box contains the given cell.
    pub fn contains(&self, cell: IVec3) -> bool {
        let max = self.max();
        cell.x >= self.origin.x
            && cell.x < max.x
            && cell.y >= self.origin.y
            && cell.y < max.y
            && cell.z >= self.origin.z
            && cell.z < max.z
    }
}
