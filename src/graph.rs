//! Adjacency between the currently live boxes.

use ahash::{AHashMap, AHashSet};

/// Symmetric adjacency between live nodes.
///
/// Two nodes are neighbors iff one of their boxes, expanded by one cell in
/// every direction, intersects the other (face, edge or corner contact).
/// The graph only stores the relation; the geometric test lives with
/// [`Cuboid::touches`](crate::geometry::Cuboid::touches).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NeighborGraph {
    edges: AHashMap<usize, AHashSet<usize>>,
}

impl NeighborGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node without any neighbors yet.
    pub fn insert(&mut self, node: usize) {
        self.edges.entry(node).or_default();
    }

    /// Whether the node is currently part of the graph.
    pub fn contains(&self, node: usize) -> bool {
        self.edges.contains_key(&node)
    }

    /// Connect two registered nodes, in both directions.
    pub fn link(&mut self, a: usize, b: usize) {
        debug_assert!(a != b, "node cannot neighbor itself");
        self.edges
            .get_mut(&a)
            .expect("linking unregistered node")
            .insert(b);
        self.edges
            .get_mut(&b)
            .expect("linking unregistered node")
            .insert(a);
    }

    /// Remove a node, unlinking it from all its neighbors. Returns the
    /// former neighbor set in ascending order.
    pub fn remove(&mut self, node: usize) -> Vec<usize> {
        let neighbors = self.edges.remove(&node).unwrap_or_default();
        for &other in &neighbors {
            if let Some(set) = self.edges.get_mut(&other) {
                set.remove(&node);
            }
        }
        let mut neighbors: Vec<usize> = neighbors.into_iter().collect();
        neighbors.sort_unstable();
        neighbors
    }

    /// Whether `a` and `b` are currently neighbors.
    pub fn are_neighbors(&self, a: usize, b: usize) -> bool {
        self.edges.get(&a).is_some_and(|set| set.contains(&b))
    }

    /// The neighbors of a node, in ascending order.
    pub fn neighbors(&self, node: usize) -> Vec<usize> {
        let mut neighbors: Vec<usize> = self
            .edges
            .get(&node)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        neighbors.sort_unstable();
        neighbors
    }

    /// All registered nodes, in ascending order.
    pub fn nodes(&self) -> Vec<usize> {
        let mut nodes: Vec<usize> = self.edges.keys().copied().collect();
        nodes.sort_unstable();
        nodes
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}
