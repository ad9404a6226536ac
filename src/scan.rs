//! Homogeneity scanning of grid boxes.
//!
//! A box is homogeneous when every cell falls in the same classification
//! bucket as its first corner, where the bucket of a cell is the pair
//! (grid value == 0?, mask value == 0?). Two scan strategies exist: a fast
//! one that walks contiguous rows as slices, and a scalar reference one
//! that indexes cell by cell. The strategy is chosen once up front from the
//! memory layout of the input arrays; both must report identical split
//! points.

use glam::IVec3;
use ndarray::{s, ArrayView3};

use crate::geometry::Cuboid;

/// Result of scanning one box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Homogeneity {
    /// Every cell matches the first corner's classification.
    Homogeneous,
    /// Offset, relative to the box origin, of the first cell (in scan
    /// order: axis 0 slowest, axis 2 fastest) that differs.
    InhomogeneousAt(IVec3),
}

/// Classification bucket of a single cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Bucket {
    vacant: bool,
    inside: bool,
}

#[inline]
fn bucket(grid: i64, mask: i8) -> Bucket {
    Bucket {
        vacant: grid == 0,
        inside: mask == 0,
    }
}

/// How boxes are scanned for homogeneity.
///
/// Selected once per run by [`ScanStrategy::detect`]; never switched
/// mid-run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanStrategy {
    /// Compare whole rows along the last axis through contiguous slices.
    /// Requires both arrays to be in standard (row-major, contiguous)
    /// memory order.
    Rows,
    /// Per-cell indexing. Works for any memory layout.
    Scalar,
}

impl ScanStrategy {
    /// Pick the fastest strategy the given arrays support.
    pub fn detect(grid: &ArrayView3<i64>, mask: &ArrayView3<i8>) -> Self {
        if grid.is_standard_layout() && mask.is_standard_layout() {
            ScanStrategy::Rows
        } else {
            ScanStrategy::Scalar
        }
    }

    /// Scan the cells of `cuboid` and report the first classification
    /// difference relative to the box's first corner, if any.
    pub fn scan(
        self,
        grid: &ArrayView3<i64>,
        mask: &ArrayView3<i8>,
        cuboid: &Cuboid,
    ) -> Homogeneity {
        match self {
            ScanStrategy::Rows => scan_rows(grid, mask, cuboid),
            ScanStrategy::Scalar => scan_scalar(grid, mask, cuboid),
        }
    }
}

fn scan_scalar(grid: &ArrayView3<i64>, mask: &ArrayView3<i8>, cuboid: &Cuboid) -> Homogeneity {
    let o = cuboid.origin;
    let (ox, oy, oz) = (o.x as usize, o.y as usize, o.z as usize);
    let first = bucket(grid[[ox, oy, oz]], mask[[ox, oy, oz]]);

    for x in 0..cuboid.extent.x as usize {
        for y in 0..cuboid.extent.y as usize {
            for z in 0..cuboid.extent.z as usize {
                let cell = [ox + x, oy + y, oz + z];
                if bucket(grid[cell], mask[cell]) != first {
                    return Homogeneity::InhomogeneousAt(IVec3::new(
                        x as i32, y as i32, z as i32,
                    ));
                }
            }
        }
    }

    Homogeneity::Homogeneous
}

fn scan_rows(grid: &ArrayView3<i64>, mask: &ArrayView3<i8>, cuboid: &Cuboid) -> Homogeneity {
    let o = cuboid.origin;
    let (ox, oy, oz) = (o.x as usize, o.y as usize, o.z as usize);
    let z_end = oz + cuboid.extent.z as usize;
    let first = bucket(grid[[ox, oy, oz]], mask[[ox, oy, oz]]);

    for x in 0..cuboid.extent.x as usize {
        for y in 0..cuboid.extent.y as usize {
            let grid_row = grid.slice(s![ox + x, oy + y, oz..z_end]);
            let mask_row = mask.slice(s![ox + x, oy + y, oz..z_end]);
            // Rows along the last axis of a standard-layout array are
            // contiguous, so these slices always exist for this strategy.
            let grid_row = grid_row
                .to_slice()
                .expect("row of a standard-layout array must be contiguous");
            let mask_row = mask_row
                .to_slice()
                .expect("row of a standard-layout array must be contiguous");

            let mismatch = grid_row
                .iter()
                .zip(mask_row)
                .position(|(&g, &m)| bucket(g, m) != first);
            if let Some(z) = mismatch {
                return Homogeneity::InhomogeneousAt(IVec3::new(x as i32, y as i32, z as i32));
            }
        }
    }

    Homogeneity::Homogeneous
}
