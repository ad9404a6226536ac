//! Arena of merge groups.
//!
//! A merge group is the record shared by every node of one connected
//! region. It stores an ordered chain of *subgroups* (node lists) plus one
//! connecting translation vector per adjacent pair of subgroups: applying
//! `links[i]` to a box of subgroup `i + 1` expresses it in the spatial
//! frame of subgroup `i`. Before any periodic merge a group has exactly one
//! subgroup and no links.
//!
//! Groups live in an arena and are addressed by stable integer handles.
//! When two groups are united, the absorbed record is replaced by a
//! forward pointer, so stale handles held by nodes keep resolving to the
//! surviving group without touching every node.

use std::ops::Range;

use glam::IVec3;

/// Stable handle of a group record in the arena.
pub type GroupId = usize;

/// One connected region: a chain of subgroups and their connecting
/// translation vectors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    subgroups: Vec<Vec<usize>>,
    links: Vec<IVec3>,
    cyclic: bool,
}

impl Group {
    fn singleton(node: usize) -> Self {
        Self {
            subgroups: vec![vec![node]],
            links: vec![],
            cyclic: false,
        }
    }

    /// The subgroup chain, in merge order.
    pub fn subgroups(&self) -> &[Vec<usize>] {
        &self.subgroups
    }

    /// Connecting vectors; one fewer than the number of subgroups.
    pub fn links(&self) -> &[IVec3] {
        &self.links
    }

    /// Whether the region reconnects to itself through the periodic
    /// boundary.
    pub fn is_cyclic(&self) -> bool {
        self.cyclic
    }

    /// Index of the subgroup used as the unshifted anchor when unwrapping:
    /// the one with the most nodes, ties broken by lowest index.
    pub fn anchor_subgroup(&self) -> usize {
        let mut anchor = 0;
        let mut best = self.subgroups[0].len();
        for (i, subgroup) in self.subgroups.iter().enumerate().skip(1) {
            if subgroup.len() > best {
                anchor = i;
                best = subgroup.len();
            }
        }
        anchor
    }

    /// Sum of the connecting vectors over a range of link indices.
    pub fn link_sum(&self, range: Range<usize>) -> IVec3 {
        self.links[range]
            .iter()
            .fold(IVec3::ZERO, |sum, &link| sum + link)
    }

    /// Translation that expresses a box of subgroup `subgroup` in the
    /// spatial frame of subgroup `anchor`.
    pub fn unwrap_offset(&self, anchor: usize, subgroup: usize) -> IVec3 {
        if subgroup >= anchor {
            self.link_sum(anchor..subgroup)
        } else {
            -self.link_sum(subgroup..anchor)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Slot {
    Live(Group),
    Forwarded(GroupId),
}

/// Arena of group records.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupArena {
    slots: Vec<Slot>,
}

impl GroupArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh single-node group and return its handle.
    pub fn insert_singleton(&mut self, node: usize) -> GroupId {
        self.slots.push(Slot::Live(Group::singleton(node)));
        self.slots.len() - 1
    }

    /// Follow forward pointers to the live record behind a possibly stale
    /// handle.
    pub fn resolve(&self, id: GroupId) -> GroupId {
        let mut id = id;
        while let Slot::Forwarded(next) = self.slots[id] {
            id = next;
        }
        id
    }

    /// The live group behind a possibly stale handle.
    pub fn get(&self, id: GroupId) -> &Group {
        match &self.slots[self.resolve(id)] {
            Slot::Live(group) => group,
            Slot::Forwarded(_) => unreachable!("resolve returns a live slot"),
        }
    }

    fn take(&mut self, id: GroupId, forward_to: GroupId) -> Group {
        match std::mem::replace(&mut self.slots[id], Slot::Forwarded(forward_to)) {
            Slot::Live(group) => group,
            Slot::Forwarded(_) => panic!("absorbing an already forwarded group"),
        }
    }

    fn live_mut(&mut self, id: GroupId) -> &mut Group {
        match &mut self.slots[id] {
            Slot::Live(group) => group,
            Slot::Forwarded(_) => panic!("mutating a forwarded group"),
        }
    }

    /// Unite two distinct single-subgroup groups by splicing one node list
    /// into the other. `a` survives; `b` forwards to it. The smaller list
    /// is moved into the larger one, so no node is copied more than
    /// O(log n) times over a whole run.
    pub fn fuse(&mut self, a: GroupId, b: GroupId) {
        debug_assert!(a != b, "fusing a group with itself");
        let mut absorbed = self.take(b, a);
        debug_assert_eq!(absorbed.subgroups.len(), 1, "fuse is pre-periodic only");
        let survivor = self.live_mut(a);
        debug_assert_eq!(survivor.subgroups.len(), 1, "fuse is pre-periodic only");

        if survivor.subgroups[0].len() < absorbed.subgroups[0].len() {
            std::mem::swap(&mut survivor.subgroups[0], &mut absorbed.subgroups[0]);
        }
        survivor.subgroups[0].append(&mut absorbed.subgroups[0]);
    }

    /// Splice the whole subgroup chain of `b` onto the end of the chain of
    /// `a`, connected by `link` (the vector that expresses the first
    /// subgroup of `b` in the frame of the last subgroup of `a`). Returns
    /// the subgroup index offset that now applies to every node of `b`.
    pub fn chain(&mut self, a: GroupId, b: GroupId, link: IVec3) -> usize {
        debug_assert!(a != b, "chaining a group with itself");
        let mut absorbed = self.take(b, a);
        let survivor = self.live_mut(a);
        let offset = survivor.subgroups.len();

        survivor.links.push(link);
        survivor.links.append(&mut absorbed.links);
        survivor.subgroups.append(&mut absorbed.subgroups);
        survivor.cyclic |= absorbed.cyclic;

        offset
    }

    /// Flag a region as wrapping onto itself through the periodic
    /// boundary.
    pub fn mark_cyclic(&mut self, id: GroupId) {
        let id = self.resolve(id);
        self.live_mut(id).cyclic = true;
    }
}
