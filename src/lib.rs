//! **Split-and-merge cavity detection on periodic voxel grids.**
//!
//! Molecular structure analyses discretize the simulation cell into a 3D
//! grid where every voxel is either claimed by an atom, part of a cavity,
//! or still undetermined, and a mask marks the voxels lying outside the
//! (possibly triclinic) cell volume. This crate locates the maximal
//! connected regions of a chosen material in such a grid, respecting the
//! periodic boundary conditions of the cell.
//!
//! The algorithm is a *split-and-merge* decomposition:
//!
//! - the grid is recursively subdivided into homogeneous axis-aligned
//!   boxes, keeping the ones made of relevant material inside the volume;
//! - directly adjacent boxes are merged into connected regions;
//! - boxes on the volume boundary are matched against the periodic images
//!   of other boundary boxes, and regions are merged across the boundary,
//!   carrying the translation vectors needed to express every box in one
//!   common spatial frame;
//! - regions that wrap around the cell and reconnect to themselves are
//!   flagged as cyclic instead of being unwrapped forever.
//!
//! Homogeneous boxes typically cover thousands of voxels each, so all
//! later phases work on a few hundred boxes instead of millions of cells.
//!
//! # Example
//!
//! ```
//! use glam::IVec3;
//! use ndarray::{Array3, ArrayView3};
//! use voxel_cavities::Cavities;
//!
//! fn vacant(view: ArrayView3<'_, i64>) -> bool {
//!     view[[0, 0, 0]] == 0
//! }
//!
//! fn no_translation(_cell: IVec3) -> IVec3 {
//!     IVec3::ZERO
//! }
//!
//! // A 4x4x4 non-periodic volume, fully claimed except for one vacant
//! // 2x2x2 block.
//! let mut grid = Array3::<i64>::from_elem((4, 4, 4), 1);
//! for x in 1..3 {
//!     for y in 1..3 {
//!         for z in 1..3 {
//!             grid[[x, y, z]] = 0;
//!         }
//!     }
//! }
//! let mask = Array3::<i8>::zeros((4, 4, 4));
//!
//! let cavities =
//!     Cavities::build(grid.view(), mask.view(), &vacant, &no_translation, None).unwrap();
//! assert_eq!(cavities.areas().len(), 1);
//! ```

mod decomposition;
mod error;
pub mod geometry;
mod graph;
mod groups;
mod scan;

pub use decomposition::{Area, Cavities, Decomposition};
pub use error::{Error, Phase};
pub use scan::{Homogeneity, ScanStrategy};
