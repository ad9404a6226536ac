//! Split-and-merge decomposition of a periodic voxel grid.
//!
//! One run proceeds through four strictly ordered phases:
//!
//! 1. *Split*: recursively subdivide the grid into homogeneous boxes,
//!    keeping the ones made of relevant material inside the simulation
//!    volume.
//! 2. *Merge*: unite directly adjacent boxes of compatible material into
//!    groups.
//! 3. *Border detection*: find boxes touching the volume boundary and the
//!    periodic translation vectors reachable from them, then record which
//!    pairs of border boxes are adjacent through a periodic image.
//! 4. *Periodic merge*: unite groups across periodic images, flagging
//!    groups that reconnect to themselves as cyclic.
//!
//! [`Cavities::build`] runs the whole pipeline; the phase methods on
//! [`Decomposition`] are public for callers that want to drive (or
//! inspect) individual phases.

use glam::IVec3;
use log::debug;
use ndarray::{s, ArrayView3, ArrayViewMut3};

use crate::error::{Error, Phase};
use crate::geometry::Cuboid;
use crate::graph::NeighborGraph;
use crate::groups::{GroupArena, GroupId};
use crate::scan::{Homogeneity, ScanStrategy};


/// One box of the decomposition. Nodes are append-only; whether a node is
/// live is tracked by its membership in the neighbor graph, and `group` is
/// set exactly for the kept leaves.
#[derive(Clone, Debug)]
struct Node {
    cuboid: Cuboid,
    group: Option<GroupId>,
    /// Index of this node's subgroup within its group's chain.
    subgroup: usize,
}

/// Cut a box into up to 8 octants at the given relative offset. The
/// boolean marks octants lying entirely before the offset's axis-0 plane:
/// those were fully covered by the scan that found the difference and are
/// therefore known to be homogeneous. Degenerate octants are filtered out.
fn octants(cuboid: &Cuboid, at: IVec3) -> Vec<(Cuboid, bool)> {
    let extent = cuboid.extent;
    let cuts = [
        [(0, at.x), (at.x, extent.x)],
        [(0, at.y), (at.y, extent.y)],
        [(0, at.z), (at.z, extent.z)],
    ];

    let mut parts = Vec::with_capacity(8);
    for (xi, &(x0, x1)) in cuts[0].iter().enumerate() {
        for &(y0, y1) in &cuts[1] {
            for &(z0, z1) in &cuts[2] {
                let part = Cuboid::new(
                    cuboid.origin + IVec3::new(x0, y0, z0),
                    IVec3::new(x1 - x0, y1 - y0, z1 - z0),
                );
                if !part.is_empty() {
                    parts.push((part, xi == 0));
                }
            }
        }
    }
    parts
}

/// State of one decomposition run over a caller-owned grid and mask.
pub struct Decomposition<'a> {
    grid: ArrayView3<'a, i64>,
    mask: ArrayView3<'a, i8>,
    is_relevant: &'a dyn Fn(ArrayView3<'_, i64>) -> bool,
    get_translation_vector: &'a dyn Fn(IVec3) -> IVec3,
    strategy: ScanStrategy,
    phase: Phase,
    nodes: Vec<Node>,
    graph: NeighborGraph,
    groups: GroupArena,
    /// Translation vectors reachable from each border node, in discovery
    /// order.
    border_vectors: ahash::AHashMap<usize, Vec<IVec3>>,
    /// Recorded periodic edges, both directions: `(n, m) -> t` means the
    /// box of `m`, translated by `t`, touches the box of `n`.
    edge_vectors: ahash::AHashMap<(usize, usize), IVec3>,
    /// One canonical entry per recorded pair, in discovery order.
    edges: Vec<(usize, usize, IVec3)>,
}

impl<'a> Decomposition<'a> {
    /// Set up a run over a grid and its volume mask.
    ///
    /// * `grid` - Cell ownership: `0` undetermined, positive `v` claimed by
    ///   source `v - 1`, negative `v` already labeled as area `-v - 1`.
    /// * `mask` - `0` inside the simulation volume, nonzero outside. Must
    ///   have the same shape as `grid`.
    /// * `is_relevant` - Classifies a homogeneous box (passed as a grid
    ///   view) as material of interest, e.g. `v == 0` when searching for
    ///   domains or `v < 0` when searching for cavities.
    /// * `get_translation_vector` - Lattice translation applicable at an
    ///   outside cell; must be defined for every outside cell adjacent to
    ///   the volume.
    pub fn new(
        grid: ArrayView3<'a, i64>,
        mask: ArrayView3<'a, i8>,
        is_relevant: &'a dyn Fn(ArrayView3<'_, i64>) -> bool,
        get_translation_vector: &'a dyn Fn(IVec3) -> IVec3,
    ) -> Self {
        assert_eq!(
            grid.dim(),
            mask.dim(),
            "grid and mask must have the same shape"
        );
        let (dx, dy, dz) = grid.dim();
        assert!(dx > 0 && dy > 0 && dz > 0, "grid must not be empty");

        let strategy = ScanStrategy::detect(&grid, &mask);
        debug!("scanning with {strategy:?} strategy");

        Self {
            grid,
            mask,
            is_relevant,
            get_translation_vector,
            strategy,
            phase: Phase::Split,
            nodes: vec![],
            graph: NeighborGraph::new(),
            groups: GroupArena::new(),
            border_vectors: ahash::AHashMap::new(),
            edge_vectors: ahash::AHashMap::new(),
            edges: vec![],
        }
    }

    /// The phase the pipeline is currently in.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn ensure_phase(&self, expected: Phase, operation: &'static str) -> Result<(), Error> {
        if self.phase != expected {
            return Err(Error::PhaseViolation {
                current: self.phase,
                operation,
            });
        }
        Ok(())
    }

    fn dims(&self) -> IVec3 {
        let (dx, dy, dz) = self.grid.dim();
        IVec3::new(dx as i32, dy as i32, dz as i32)
    }

    fn add_node(&mut self, cuboid: Cuboid) -> usize {
        self.nodes.push(Node {
            cuboid,
            group: None,
            subgroup: 0,
        });
        self.nodes.len() - 1
    }

    /// Whether a homogeneous box should be kept as a merge-eligible leaf:
    /// it must lie inside the simulation volume and the caller's predicate
    /// must accept its material.
    fn keep(&self, cuboid: &Cuboid) -> bool {
        let o = cuboid.origin;
        if self.mask[[o.x as usize, o.y as usize, o.z as usize]] != 0 {
            // Void or occupied space outside the cell is not interesting.
            return false;
        }
        let max = cuboid.max();
        let view = self.grid.slice(s![
            o.x as usize..max.x as usize,
            o.y as usize..max.y as usize,
            o.z as usize..max.z as usize
        ]);
        (self.is_relevant)(view)
    }

    /// Sign of the representative voxel of a node, taken at its box's
    /// first corner.
    fn corner_sign(&self, node: usize) -> i64 {
        let o = self.nodes[node].cuboid.origin;
        self.grid[[o.x as usize, o.y as usize, o.z as usize]].signum()
    }

    fn group_of(&self, node: usize) -> GroupId {
        let id = self.nodes[node]
            .group
            .expect("leaf node must belong to a group");
        self.groups.resolve(id)
    }

    /// Recursively subdivide the whole grid into homogeneous boxes,
    /// keeping relevant inside-volume material as leaves and maintaining
    /// box adjacency incrementally.
    pub fn split(&mut self) -> Result<(), Error> {
        self.ensure_phase(Phase::Split, "split")?;

        let root = self.add_node(Cuboid::new(IVec3::ZERO, self.dims()));
        self.graph.insert(root);
        let mut stack = vec![root];

        while let Some(id) = stack.pop() {
            let cuboid = self.nodes[id].cuboid;
            match self.strategy.scan(&self.grid, &self.mask, &cuboid) {
                Homogeneity::Homogeneous => {
                    if self.keep(&cuboid) {
                        self.nodes[id].group = Some(self.groups.insert_singleton(id));
                    } else {
                        self.graph.remove(id);
                    }
                }
                Homogeneity::InhomogeneousAt(at) => {
                    let former_neighbors = self.graph.remove(id);

                    // Sub-boxes before the difference plane were already
                    // scanned, so they are classified right away; the rest
                    // goes back on the stack. Only the former neighbors of
                    // the split box and its own siblings can be adjacent
                    // to a sub-box, so no wider rescan is needed.
                    let mut survivors: Vec<usize> = vec![];
                    for (part, scanned) in octants(&cuboid, at) {
                        if scanned {
                            if self.keep(&part) {
                                let child = self.add_node(part);
                                self.nodes[child].group =
                                    Some(self.groups.insert_singleton(child));
                                survivors.push(child);
                            }
                        } else {
                            let child = self.add_node(part);
                            survivors.push(child);
                            stack.push(child);
                        }
                    }

                    for (i, &child) in survivors.iter().enumerate() {
                        self.graph.insert(child);
                        let child_cuboid = self.nodes[child].cuboid;
                        for &neighbor in &former_neighbors {
                            if child_cuboid.touches(&self.nodes[neighbor].cuboid) {
                                self.graph.link(child, neighbor);
                            }
                        }
                        for &sibling in &survivors[..i] {
                            if child_cuboid.touches(&self.nodes[sibling].cuboid) {
                                self.graph.link(child, sibling);
                            }
                        }
                    }
                }
            }
        }

        debug!(
            "split kept {} leaves out of {} boxes",
            self.graph.len(),
            self.nodes.len()
        );
        self.phase = Phase::Merge;
        Ok(())
    }

    /// The live leaf boxes, in ascending node order.
    pub fn leaves(&self) -> Vec<usize> {
        self.graph.nodes()
    }

    /// The box of a node.
    pub fn cuboid(&self, node: usize) -> Cuboid {
        self.nodes[node].cuboid
    }

    /// The current neighbors of a node, in ascending order.
    pub fn neighbors(&self, node: usize) -> Vec<usize> {
        self.graph.neighbors(node)
    }

    /// Whether two leaves currently belong to the same merged region.
    pub fn same_region(&self, a: usize, b: usize) -> bool {
        self.group_of(a) == self.group_of(b)
    }

    /// Declare two leaves adjacent. Only allowed before border detection
    /// starts.
    pub fn add_neighbor(&mut self, a: usize, b: usize) -> Result<(), Error> {
        if self.phase > Phase::Merge {
            return Err(Error::PhaseViolation {
                current: self.phase,
                operation: "add_neighbor",
            });
        }
        assert!(
            self.graph.contains(a) && self.graph.contains(b),
            "both nodes must be live"
        );
        self.graph.link(a, b);
        Ok(())
    }

    /// Merge two adjacent leaves if their material is compatible (equal
    /// sign of the representative voxel). Returns whether a merge
    /// happened. Fails without mutating anything if the nodes are not
    /// neighbors or the merge phase is over.
    pub fn merge(&mut self, a: usize, b: usize) -> Result<bool, Error> {
        self.ensure_phase(Phase::Merge, "merge")?;
        if !self.graph.are_neighbors(a, b) {
            return Err(Error::NotNeighboring { a, b });
        }
        if self.corner_sign(a) != self.corner_sign(b) {
            return Ok(false);
        }
        let group_a = self.group_of(a);
        let group_b = self.group_of(b);
        if group_a == group_b {
            return Ok(false);
        }
        self.groups.fuse(group_a, group_b);
        Ok(true)
    }

    /// Merge every adjacent, sign-compatible pair of leaves. Transitively
    /// connected leaves end up sharing one group even though only adjacent
    /// pairs are merged explicitly.
    pub fn merge_neighbors(&mut self) -> Result<(), Error> {
        self.ensure_phase(Phase::Merge, "merge_neighbors")?;
        let mut merged = 0;
        for a in self.graph.nodes() {
            for b in self.graph.neighbors(a) {
                if b > a && self.merge(a, b)? {
                    merged += 1;
                }
            }
        }
        debug!("merged {merged} adjacent pairs");
        Ok(())
    }

    /// Whether the cell is inside the array but outside the simulation
    /// volume. Cells beyond the array do not belong to the discretization
    /// and are never probed.
    fn is_outside(&self, cell: IVec3) -> bool {
        let dims = self.dims();
        if cell.x < 0 || cell.y < 0 || cell.z < 0 {
            return false;
        }
        if cell.x >= dims.x || cell.y >= dims.y || cell.z >= dims.z {
            return false;
        }
        self.mask[[cell.x as usize, cell.y as usize, cell.z as usize]] != 0
    }

    /// Whether any cell one beyond one of the node's 6 faces lies outside
    /// the volume.
    fn is_border(&self, node: usize) -> bool {
        let cuboid = self.nodes[node].cuboid;
        let min = cuboid.origin;
        let max = cuboid.max();

        for y in min.y..max.y {
            for z in min.z..max.z {
                if self.is_outside(IVec3::new(min.x - 1, y, z))
                    || self.is_outside(IVec3::new(max.x, y, z))
                {
                    return true;
                }
            }
        }
        for x in min.x..max.x {
            for z in min.z..max.z {
                if self.is_outside(IVec3::new(x, min.y - 1, z))
                    || self.is_outside(IVec3::new(x, max.y, z))
                {
                    return true;
                }
            }
        }
        for x in min.x..max.x {
            for y in min.y..max.y {
                if self.is_outside(IVec3::new(x, y, min.z - 1))
                    || self.is_outside(IVec3::new(x, y, max.z))
                {
                    return true;
                }
            }
        }
        false
    }

    /// Translation vectors reachable from the outside cells of the node's
    /// one-cell surrounding shell, deduplicated but in scan order. The
    /// applicable vector depends on the position for non-orthorhombic
    /// lattices, so every shell cell is asked individually.
    fn reachable_vectors(&self, node: usize) -> Vec<IVec3> {
        let cuboid = self.nodes[node].cuboid;
        let shell = Cuboid::new(cuboid.origin - IVec3::ONE, cuboid.extent + 2 * IVec3::ONE);
        let min = shell.origin;
        let max = shell.max();

        let mut vectors: Vec<IVec3> = vec![];
        for x in min.x..max.x {
            for y in min.y..max.y {
                for z in min.z..max.z {
                    let cell = IVec3::new(x, y, z);
                    if cuboid.contains(cell) || !self.is_outside(cell) {
                        continue;
                    }
                    let vector = (self.get_translation_vector)(cell);
                    if !vectors.contains(&vector) {
                        vectors.push(vector);
                    }
                }
            }
        }
        vectors
    }

    /// Find border nodes and record which pairs of them become adjacent
    /// under a periodic translation. For each pair the *first* applicable
    /// vector in enumeration order is recorded, in both directions; later
    /// vectors are ignored even if they would also produce adjacency.
    ///
    /// The optional callback receives a coarse progress percentage; it is
    /// advisory only.
    pub fn detect_borders(
        &mut self,
        mut progress: Option<&mut dyn FnMut(u32)>,
    ) -> Result<(), Error> {
        self.ensure_phase(Phase::Merge, "detect_borders")?;
        self.phase = Phase::Border;

        for node in self.graph.nodes() {
            if self.is_border(node) {
                let vectors = self.reachable_vectors(node);
                if !vectors.is_empty() {
                    self.border_vectors.insert(node, vectors);
                }
            }
        }

        let mut border_nodes: Vec<usize> = self.border_vectors.keys().copied().collect();
        border_nodes.sort_unstable();
        let total = border_nodes.len();

        for (done, &n) in border_nodes.iter().enumerate() {
            if let Some(report) = progress.as_mut() {
                report((done * 100 / total.max(1)) as u32);
            }
            for &m in &border_nodes {
                if self.edge_vectors.contains_key(&(n, m)) {
                    continue;
                }
                let target = self.nodes[n].cuboid;
                for &t in &self.border_vectors[&m] {
                    // A node may meet its own periodic image; the zero
                    // vector never counts as an image.
                    if n == m && t == IVec3::ZERO {
                        continue;
                    }
                    if self.nodes[m].cuboid.translated(t).touches(&target) {
                        self.edge_vectors.insert((n, m), t);
                        self.edge_vectors.insert((m, n), -t);
                        self.edges.push((n, m, t));
                        break;
                    }
                }
            }
        }
        if let Some(report) = progress.as_mut() {
            report(100);
        }

        debug!(
            "{} border nodes, {} periodic edges",
            total,
            self.edges.len()
        );
        Ok(())
    }

    /// The recorded periodic edges `(n, m, t)`, one per pair, in
    /// discovery order.
    pub fn periodic_edges(&self) -> &[(usize, usize, IVec3)] {
        &self.edges
    }

    /// Merge groups across periodic images. A periodic edge between nodes
    /// already sharing a group means the region wraps around the cell and
    /// reconnects to itself; such groups are flagged cyclic instead of
    /// merged again.
    pub fn merge_periodic(&mut self) -> Result<(), Error> {
        self.ensure_phase(Phase::Border, "merge_periodic")?;
        self.phase = Phase::Periodic;

        let edges = self.edges.clone();
        let mut chained = 0;
        let mut cycles = 0;
        for (n, m, t) in edges {
            if self.corner_sign(n) != self.corner_sign(m) {
                continue;
            }
            let group_n = self.group_of(n);
            let group_m = self.group_of(m);
            if group_n == group_m {
                self.groups.mark_cyclic(group_n);
                cycles += 1;
                continue;
            }

            // The new connecting vector must express the first subgroup
            // of m's chain in the frame of the last subgroup of n's chain,
            // given that t expresses m's own subgroup in the frame of n's.
            let chain_n = self.groups.get(group_n);
            let to_chain_end = chain_n.link_sum(self.nodes[n].subgroup..chain_n.links().len());
            let chain_m = self.groups.get(group_m);
            let from_chain_start = chain_m.link_sum(0..self.nodes[m].subgroup);
            let link = t - to_chain_end - from_chain_start;

            let offset = self.groups.chain(group_n, group_m, link);
            let mut moved: Vec<(usize, usize)> = vec![];
            for (index, subgroup) in self
                .groups
                .get(group_n)
                .subgroups()
                .iter()
                .enumerate()
                .skip(offset)
            {
                for &node in subgroup {
                    moved.push((node, index));
                }
            }
            for (node, subgroup) in moved {
                self.nodes[node].subgroup = subgroup;
            }
            chained += 1;
        }

        debug!("periodic merge: {chained} chains, {cycles} cyclic reconnections");
        Ok(())
    }

    /// Collect the final areas. Requires the periodic merge phase to have
    /// run.
    pub fn extract(&self) -> Result<Cavities, Error> {
        self.ensure_phase(Phase::Periodic, "extract")?;

        let mut seen = ahash::AHashSet::new();
        let mut areas = vec![];
        let mut cyclic_area_indices = vec![];

        for node in self.graph.nodes() {
            let group_id = self.group_of(node);
            if !seen.insert(group_id) {
                continue;
            }
            let group = self.groups.get(group_id);
            let anchor = group.anchor_subgroup();

            let mut nodes = vec![];
            let mut translated_nodes = vec![];
            for (index, subgroup) in group.subgroups().iter().enumerate() {
                let offset = group.unwrap_offset(anchor, index);
                for &member in subgroup {
                    let cuboid = self.nodes[member].cuboid;
                    nodes.push(cuboid);
                    translated_nodes.push(cuboid.translated(offset));
                }
            }

            if group.is_cyclic() {
                cyclic_area_indices.push(areas.len());
            }
            areas.push(Area {
                nodes,
                translated_nodes,
                cyclic: group.is_cyclic(),
            });
        }

        debug!("extracted {} areas", areas.len());
        Ok(Cavities {
            areas,
            cyclic_area_indices,
        })
    }
}

/// One maximal connected region of the decomposition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Area {
    nodes: Vec<Cuboid>,
    translated_nodes: Vec<Cuboid>,
    cyclic: bool,
}

impl Area {
    /// The boxes of this area at their stored grid positions, for
    /// indexing back into the voxel grid.
    pub fn nodes(&self) -> &[Cuboid] {
        &self.nodes
    }

    /// The boxes of this area with periodic translations applied, forming
    /// one spatially contiguous shape. For a cyclic area this is a finite
    /// slice through an infinite periodic structure.
    pub fn translated_nodes(&self) -> &[Cuboid] {
        &self.translated_nodes
    }

    /// Whether the area wraps around the cell and reconnects to itself.
    pub fn is_cyclic(&self) -> bool {
        self.cyclic
    }
}

/// The result of one decomposition run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cavities {
    areas: Vec<Area>,
    cyclic_area_indices: Vec<usize>,
}

impl Cavities {
    /// Run the whole pipeline: split, merge, border detection, periodic
    /// merge and extraction. See [`Decomposition::new`] for the meaning of
    /// the inputs.
    pub fn build<'a>(
        grid: ArrayView3<'a, i64>,
        mask: ArrayView3<'a, i8>,
        is_relevant: &'a dyn Fn(ArrayView3<'_, i64>) -> bool,
        get_translation_vector: &'a dyn Fn(IVec3) -> IVec3,
        progress: Option<&mut dyn FnMut(u32)>,
    ) -> Result<Self, Error> {
        let mut decomposition =
            Decomposition::new(grid, mask, is_relevant, get_translation_vector);
        decomposition.split()?;
        decomposition.merge_neighbors()?;
        decomposition.detect_borders(progress)?;
        decomposition.merge_periodic()?;
        decomposition.extract()
    }

    /// The detected areas.
    pub fn areas(&self) -> &[Area] {
        &self.areas
    }

    /// Indices of the areas that wrap around the cell.
    pub fn cyclic_area_indices(&self) -> &[usize] {
        &self.cyclic_area_indices
    }

    /// Label every cell of every area in the caller's grid by writing
    /// `-(area_index + 1)` into its as-stored boxes ("domain labeling"
    /// mode).
    pub fn write_labels(&self, grid: &mut ArrayViewMut3<'_, i64>) {
        for (index, area) in self.areas.iter().enumerate() {
            let label = -(index as i64) - 1;
            for cuboid in &area.nodes {
                let o = cuboid.origin;
                let max = cuboid.max();
                grid.slice_mut(s![
                    o.x as usize..max.x as usize,
                    o.y as usize..max.y as usize,
                    o.z as usize..max.z as usize
                ])
                .fill(label);
            }
        }
    }
}
