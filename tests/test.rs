//! End-to-end tests of the decomposition pipeline, including brute-force
//! cross-checks on randomized grids.

use glam::IVec3;
use ndarray::{Array3, ArrayView3};
use rand::prelude::*;
use rand::rngs::StdRng;

use voxel_cavities::geometry::Cuboid;
use voxel_cavities::{Cavities, Decomposition, Error};

fn vacant(view: ArrayView3<'_, i64>) -> bool {
    view[[0, 0, 0]] == 0
}

fn no_translation(_cell: IVec3) -> IVec3 {
    IVec3::ZERO
}

/// Period of the z-periodic test worlds: the volume spans z in [1, 4].
const Z_PERIOD: i32 = 4;

/// Translation for arrays of z extent 6 whose outside layers sit at z = 0
/// and z = 5.
fn z_translation(cell: IVec3) -> IVec3 {
    if cell.z <= 0 {
        IVec3::new(0, 0, Z_PERIOD)
    } else {
        IVec3::new(0, 0, -Z_PERIOD)
    }
}

/// Mask with outside layers on the two z faces only.
fn z_ring_mask(dims: (usize, usize, usize)) -> Array3<i8> {
    Array3::from_shape_fn(dims, |(_, _, z)| i8::from(z == 0 || z == dims.2 - 1))
}

fn sort_key(cuboid: &Cuboid) -> (i32, i32, i32, i32, i32, i32) {
    (
        cuboid.origin.x,
        cuboid.origin.y,
        cuboid.origin.z,
        cuboid.extent.x,
        cuboid.extent.y,
        cuboid.extent.z,
    )
}

/// Areas as sorted lists of as-stored boxes, sorted across areas, so two
/// results can be compared independently of merge order.
fn normalized_areas(cavities: &Cavities) -> Vec<Vec<Cuboid>> {
    let mut areas: Vec<Vec<Cuboid>> = cavities
        .areas()
        .iter()
        .map(|area| {
            let mut nodes = area.nodes().to_vec();
            nodes.sort_by_key(sort_key);
            nodes
        })
        .collect();
    areas.sort_by_key(|nodes| sort_key(&nodes[0]));
    areas
}

fn cells_of(cuboid: &Cuboid) -> Vec<(i32, i32, i32)> {
    let max = cuboid.max();
    let mut cells = vec![];
    for x in cuboid.origin.x..max.x {
        for y in cuboid.origin.y..max.y {
            for z in cuboid.origin.z..max.z {
                cells.push((x, y, z));
            }
        }
    }
    cells
}

/// Whether the boxes form one connected component under `touches`.
fn connected(cuboids: &[Cuboid]) -> bool {
    if cuboids.is_empty() {
        return true;
    }
    let mut reached = vec![false; cuboids.len()];
    reached[0] = true;
    let mut frontier = vec![0];
    while let Some(i) = frontier.pop() {
        for (j, other) in cuboids.iter().enumerate() {
            if !reached[j] && cuboids[i].touches(other) {
                reached[j] = true;
                frontier.push(j);
            }
        }
    }
    reached.into_iter().all(|r| r)
}

#[test]
fn test_single_block_yields_single_area() {
    // Fully claimed non-periodic volume with one vacant block: one leaf,
    // no merges, no borders, one area identical to its unwrapped form.
    let mut grid = Array3::<i64>::from_elem((4, 4, 4), 1);
    for x in 1..3 {
        for y in 1..3 {
            for z in 1..3 {
                grid[[x, y, z]] = 0;
            }
        }
    }
    let mask = Array3::<i8>::zeros((4, 4, 4));

    let cavities =
        Cavities::build(grid.view(), mask.view(), &vacant, &no_translation, None).unwrap();

    assert_eq!(cavities.areas().len(), 1);
    let area = &cavities.areas()[0];
    let block = Cuboid::new(IVec3::new(1, 1, 1), IVec3::new(2, 2, 2));
    assert_eq!(area.nodes(), &[block]);
    assert_eq!(area.translated_nodes(), &[block]);
    assert!(!area.is_cyclic());
    assert!(cavities.cyclic_area_indices().is_empty());
}

#[test]
fn test_build_accepts_independently_owned_inputs() {
    // The grid, mask and callbacks live in different scopes; the call
    // must unify their borrows instead of demanding one shared owner.
    let grid = Array3::<i64>::zeros((2, 2, 2));
    {
        let mask = Array3::<i8>::zeros((2, 2, 2));
        let cavities =
            Cavities::build(grid.view(), mask.view(), &vacant, &no_translation, None).unwrap();
        assert_eq!(cavities.areas().len(), 1);
    }
}

#[test]
fn test_region_split_by_periodic_boundary_is_one_area() {
    // Vacant patches hugging the two z faces of the volume form one
    // region through the periodic boundary. Unwrapped, the patches are
    // adjacent; as stored, they keep their original grid positions.
    let dims = (4, 4, 6);
    let mut grid = Array3::<i64>::from_elem(dims, 1);
    for x in 1..3 {
        for y in 1..3 {
            grid[[x, y, 1]] = 0;
            grid[[x, y, 4]] = 0;
        }
    }
    let mask = z_ring_mask(dims);

    let cavities =
        Cavities::build(grid.view(), mask.view(), &vacant, &z_translation, None).unwrap();

    assert_eq!(cavities.areas().len(), 1);
    let area = &cavities.areas()[0];
    assert!(!area.is_cyclic());

    let mut stored: Vec<(i32, i32, i32)> =
        area.nodes().iter().flat_map(cells_of).collect();
    stored.sort_unstable();
    let mut expected = vec![];
    for x in 1..3 {
        for y in 1..3 {
            expected.push((x, y, 1));
            expected.push((x, y, 4));
        }
    }
    expected.sort_unstable();
    assert_eq!(stored, expected);

    // One patch was shifted by a whole period, the other stayed put.
    assert!(connected(area.translated_nodes()));
    let offsets: Vec<IVec3> = area
        .nodes()
        .iter()
        .zip(area.translated_nodes())
        .map(|(stored, translated)| translated.origin - stored.origin)
        .collect();
    assert!(offsets
        .iter()
        .all(|o| o.x == 0 && o.y == 0 && o.z % Z_PERIOD == 0));
    assert!(offsets.iter().any(|&o| o == IVec3::ZERO));
    assert!(offsets.iter().any(|&o| o != IVec3::ZERO));
    for (stored, translated) in area.nodes().iter().zip(area.translated_nodes()) {
        assert_eq!(stored.extent, translated.extent);
    }
}

#[test]
fn test_channel_through_cell_is_cyclic() {
    // A vacant channel spanning the periodic axis, with a side pocket so
    // it decomposes into several boxes, reconnects to itself.
    let dims = (4, 4, 6);
    let mut grid = Array3::<i64>::from_elem(dims, 1);
    for z in 1..5 {
        grid[[1, 1, z]] = 0;
    }
    grid[[2, 1, 2]] = 0;
    let mask = z_ring_mask(dims);

    let cavities =
        Cavities::build(grid.view(), mask.view(), &vacant, &z_translation, None).unwrap();

    assert_eq!(cavities.areas().len(), 1);
    let area = &cavities.areas()[0];
    assert!(area.is_cyclic());
    assert_eq!(cavities.cyclic_area_indices(), &[0]);
    assert_eq!(
        area.nodes()
            .iter()
            .map(|c| c.volume())
            .sum::<i64>(),
        5
    );
    assert_eq!(area.nodes().len(), area.translated_nodes().len());
}

#[test]
fn test_failed_merge_leaves_state_unchanged() {
    // A rejected merge of non-neighbors must not alter the graph or the
    // region partition.
    let mut grid = Array3::<i64>::from_elem((6, 1, 1), 1);
    grid[[0, 0, 0]] = 0;
    grid[[1, 0, 0]] = 0;
    grid[[4, 0, 0]] = 0;
    grid[[5, 0, 0]] = 0;
    let mask = Array3::<i8>::zeros((6, 1, 1));

    let mut decomposition =
        Decomposition::new(grid.view(), mask.view(), &vacant, &no_translation);
    decomposition.split().unwrap();
    decomposition.merge_neighbors().unwrap();

    let leaves = decomposition.leaves();
    let neighbors_before: Vec<Vec<usize>> = leaves
        .iter()
        .map(|&leaf| decomposition.neighbors(leaf))
        .collect();
    let regions_before: Vec<Vec<bool>> = leaves
        .iter()
        .map(|&a| {
            leaves
                .iter()
                .map(|&b| decomposition.same_region(a, b))
                .collect()
        })
        .collect();

    // Pick two leaves from different regions; they cannot be neighbors.
    let a = leaves[0];
    let b = *leaves
        .iter()
        .find(|&&b| !decomposition.same_region(a, b))
        .expect("two separate regions exist");
    assert_eq!(
        decomposition.merge(a, b),
        Err(Error::NotNeighboring { a, b })
    );

    assert_eq!(decomposition.leaves(), leaves);
    for (i, &leaf) in leaves.iter().enumerate() {
        assert_eq!(decomposition.neighbors(leaf), neighbors_before[i]);
    }
    for (i, &x) in leaves.iter().enumerate() {
        for (j, &y) in leaves.iter().enumerate() {
            assert_eq!(decomposition.same_region(x, y), regions_before[i][j]);
        }
    }
}

#[test]
fn test_areas_partition_the_relevant_cells() {
    // On random grids, the as-stored boxes of all areas must cover every
    // vacant inside-volume cell exactly once and nothing else.
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..20 {
        let dims = (5, 5, 6);
        let mask = z_ring_mask(dims);
        let grid = Array3::from_shape_fn(dims, |_| i64::from(rng.gen_range(0..100) < 60));

        let cavities =
            Cavities::build(grid.view(), mask.view(), &vacant, &z_translation, None).unwrap();

        let mut covered = Array3::<u8>::zeros(dims);
        for area in cavities.areas() {
            for cuboid in area.nodes() {
                for (x, y, z) in cells_of(cuboid) {
                    covered[[x as usize, y as usize, z as usize]] += 1;
                }
            }
        }
        for ((x, y, z), &count) in covered.indexed_iter() {
            let expected = u8::from(grid[[x, y, z]] == 0 && mask[[x, y, z]] == 0);
            assert_eq!(
                count, expected,
                "cell ({x}, {y}, {z}) covered {count} times"
            );
        }
    }
}

#[test]
fn test_merge_order_does_not_change_the_result() {
    // Merging the same adjacent pairs in arbitrary orders must produce
    // the same region partition.
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..10 {
        let dims = (6, 6, 6);
        let mask = Array3::<i8>::zeros(dims);
        let grid = Array3::from_shape_fn(dims, |_| i64::from(rng.gen_range(0..100) < 50));

        let reference = {
            let mut decomposition =
                Decomposition::new(grid.view(), mask.view(), &vacant, &no_translation);
            decomposition.split().unwrap();
            decomposition.merge_neighbors().unwrap();
            decomposition.detect_borders(None).unwrap();
            decomposition.merge_periodic().unwrap();
            normalized_areas(&decomposition.extract().unwrap())
        };

        for _ in 0..3 {
            let mut decomposition =
                Decomposition::new(grid.view(), mask.view(), &vacant, &no_translation);
            decomposition.split().unwrap();

            let mut pairs = vec![];
            for a in decomposition.leaves() {
                for b in decomposition.neighbors(a) {
                    if b > a {
                        pairs.push((a, b));
                    }
                }
            }
            pairs.shuffle(&mut rng);
            for (a, b) in pairs {
                decomposition.merge(a, b).unwrap();
            }

            decomposition.detect_borders(None).unwrap();
            decomposition.merge_periodic().unwrap();
            let shuffled = normalized_areas(&decomposition.extract().unwrap());
            assert_eq!(shuffled, reference);
        }
    }
}

/// 26-connected components of the vacant volume cells, optionally wrapping
/// along z. Returns the cell-to-component map and the component count.
fn brute_force_components(
    grid: &Array3<i64>,
    mask: &Array3<i8>,
    wrap: bool,
) -> (std::collections::HashMap<(i32, i32, i32), usize>, usize) {
    let dims = grid.dim();
    let in_volume = |x: i32, y: i32, z: i32| {
        x >= 0
            && (x as usize) < dims.0
            && y >= 0
            && (y as usize) < dims.1
            && z >= 1
            && z <= Z_PERIOD
            && grid[[x as usize, y as usize, z as usize]] == 0
            && mask[[x as usize, y as usize, z as usize]] == 0
    };

    let mut component_of = std::collections::HashMap::new();
    let mut count = 0;
    for sx in 0..dims.0 as i32 {
        for sy in 0..dims.1 as i32 {
            for sz in 1..=Z_PERIOD {
                if !in_volume(sx, sy, sz) || component_of.contains_key(&(sx, sy, sz)) {
                    continue;
                }
                let component = count;
                count += 1;
                component_of.insert((sx, sy, sz), component);
                let mut frontier = vec![(sx, sy, sz)];
                while let Some((x, y, z)) = frontier.pop() {
                    for dx in -1..=1 {
                        for dy in -1..=1 {
                            for dz in -1..=1 {
                                if dx == 0 && dy == 0 && dz == 0 {
                                    continue;
                                }
                                let (nx, ny) = (x + dx, y + dy);
                                let raw_z = z + dz;
                                let nz = if wrap {
                                    (raw_z - 1).rem_euclid(Z_PERIOD) + 1
                                } else {
                                    raw_z
                                };
                                if !in_volume(nx, ny, nz)
                                    || component_of.contains_key(&(nx, ny, nz))
                                {
                                    continue;
                                }
                                component_of.insert((nx, ny, nz), component);
                                frontier.push((nx, ny, nz));
                            }
                        }
                    }
                }
            }
        }
    }
    (component_of, count)
}

struct Dsu {
    parent: Vec<usize>,
}

impl Dsu {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) -> usize {
        let (ra, rb) = (self.find(a), self.find(b));
        self.parent[rb] = ra;
        ra
    }
}

#[test]
fn test_areas_and_cyclic_flags_match_brute_force() {
    // Areas must be the wrap-connected components of the vacant volume,
    // and a component must be flagged cyclic exactly when the periodic
    // edges form a cycle over its pre-periodic pieces (one redundant edge
    // among already united pieces means the region wraps onto itself).
    let mut rng = StdRng::seed_from_u64(29);
    for round in 0..15 {
        let dims = (5, 5, 6);
        let mask = z_ring_mask(dims);
        let grid = Array3::from_shape_fn(dims, |_| i64::from(rng.gen_range(0..100) < 55));

        let mut decomposition =
            Decomposition::new(grid.view(), mask.view(), &vacant, &z_translation);
        decomposition.split().unwrap();
        decomposition.merge_neighbors().unwrap();
        decomposition.detect_borders(None).unwrap();
        let edges = decomposition.periodic_edges().to_vec();
        decomposition.merge_periodic().unwrap();
        let cavities = decomposition.extract().unwrap();

        let (wrapped_of, wrapped_count) = brute_force_components(&grid, &mask, true);
        assert_eq!(
            cavities.areas().len(),
            wrapped_count,
            "area count mismatch in round {round}"
        );

        // Replay the periodic edges over the independently computed
        // pre-periodic components.
        let (piece_of, piece_count) = brute_force_components(&grid, &mask, false);
        let piece_of_node = |node: usize| {
            let o = decomposition.cuboid(node).origin;
            piece_of[&(o.x, o.y, o.z)]
        };
        let mut dsu = Dsu::new(piece_count);
        let mut cyclic = vec![false; piece_count];
        for &(n, m, _) in &edges {
            let (pn, pm) = (piece_of_node(n), piece_of_node(m));
            let (rn, rm) = (dsu.find(pn), dsu.find(pm));
            if rn == rm {
                cyclic[rn] = true;
            } else {
                let flag = cyclic[rn] || cyclic[rm];
                let root = dsu.union(rn, rm);
                cyclic[root] = flag;
            }
        }

        for area in cavities.areas() {
            let first = area.nodes()[0].origin;
            // Membership: every cell of the area belongs to one wrapped
            // component.
            let component = wrapped_of[&(first.x, first.y, first.z)];
            for cell in area.nodes().iter().flat_map(cells_of) {
                assert_eq!(wrapped_of[&cell], component);
            }

            let root = dsu.find(piece_of[&(first.x, first.y, first.z)]);
            assert_eq!(
                area.is_cyclic(),
                cyclic[root],
                "cyclic flag mismatch in round {round}"
            );
        }
    }
}

#[test]
fn test_translated_areas_are_contiguous() {
    let mut rng = StdRng::seed_from_u64(41);
    for _ in 0..15 {
        let dims = (5, 5, 6);
        let mask = z_ring_mask(dims);
        let grid = Array3::from_shape_fn(dims, |_| i64::from(rng.gen_range(0..100) < 55));

        let cavities =
            Cavities::build(grid.view(), mask.view(), &vacant, &z_translation, None).unwrap();

        for area in cavities.areas() {
            assert!(connected(area.translated_nodes()));
            for (stored, translated) in area.nodes().iter().zip(area.translated_nodes()) {
                assert_eq!(stored.extent, translated.extent);
                let offset = translated.origin - stored.origin;
                assert_eq!(offset.x, 0);
                assert_eq!(offset.y, 0);
                assert_eq!(offset.z % Z_PERIOD, 0);
            }
        }
    }
}

#[test]
fn test_write_labels_marks_area_cells() {
    let mut grid = Array3::<i64>::from_elem((4, 4, 4), 1);
    for x in 1..3 {
        for y in 1..3 {
            for z in 1..3 {
                grid[[x, y, z]] = 0;
            }
        }
    }
    let mask = Array3::<i8>::zeros((4, 4, 4));

    let cavities =
        Cavities::build(grid.view(), mask.view(), &vacant, &no_translation, None).unwrap();
    cavities.write_labels(&mut grid.view_mut());

    for ((x, y, z), &value) in grid.indexed_iter() {
        let inside_block = (1..3).contains(&x) && (1..3).contains(&y) && (1..3).contains(&z);
        if inside_block {
            assert_eq!(value, -1);
        } else {
            assert_eq!(value, 1);
        }
    }
}

#[test]
fn test_progress_is_reported_and_monotonic() {
    let dims = (4, 4, 6);
    let mut grid = Array3::<i64>::from_elem(dims, 1);
    for x in 1..3 {
        grid[[x, 1, 1]] = 0;
        grid[[x, 2, 4]] = 0;
    }
    let mask = z_ring_mask(dims);

    let mut reports = vec![];
    let mut record = |percent: u32| reports.push(percent);
    Cavities::build(
        grid.view(),
        mask.view(),
        &vacant,
        &z_translation,
        Some(&mut record),
    )
    .unwrap();

    assert_eq!(reports.last(), Some(&100));
    assert!(reports.windows(2).all(|w| w[0] <= w[1]));
}
