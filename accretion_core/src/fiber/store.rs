// Copyright 2026 the Accretion Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Arena storage for fibers with allocation, topology, and double-buffer
//! management.

use alloc::vec::Vec;

use crate::lane::{Lane, Lanes};

use super::id::{FiberId, INVALID, PropsId};
use super::node::{EffectFlags, Fiber, FiberTag, Mode};

/// Arena storage for all fibers of a renderer.
///
/// Fibers are addressed by [`FiberId`] handles. Each fiber occupies a slot in
/// the arena; destroyed fibers are recycled via a free list, and generation
/// counters prevent stale handle access. Tree links (`parent`, `child`,
/// `sibling`, `alternate`) are stored as raw slot indices and exposed only
/// through handle-validating methods.
#[derive(Debug, Default)]
pub struct FiberStore {
    nodes: Vec<Fiber>,
    generation: Vec<u32>,
    free_list: Vec<u32>,
}

impl FiberStore {
    /// Creates an empty fiber store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -- Allocation API --

    /// Creates a new unattached fiber and returns its handle.
    pub fn create_fiber(
        &mut self,
        tag: FiberTag,
        mode: Mode,
        pending_props: Option<PropsId>,
    ) -> FiberId {
        let node = Fiber::new(tag, mode, pending_props);
        let idx = if let Some(idx) = self.free_list.pop() {
            self.generation[idx as usize] += 1;
            self.nodes[idx as usize] = node;
            idx
        } else {
            let idx = u32::try_from(self.nodes.len()).expect("fiber arena exceeds u32 slots");
            self.nodes.push(node);
            self.generation.push(0);
            idx
        };
        FiberId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    /// Destroys a fiber, freeing its slot for reuse.
    ///
    /// The caller must have detached the fiber first: no children, and no
    /// parent or sibling still pointing at it. The paired alternate's
    /// back-link is cleared here.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale or the fiber still has a child.
    pub fn destroy_fiber(&mut self, id: FiberId) {
        self.validate(id);
        let idx = id.idx;
        assert!(
            self.nodes[idx as usize].child == INVALID,
            "cannot destroy fiber with attached children"
        );

        let alt = self.nodes[idx as usize].alternate;
        if alt != INVALID {
            self.nodes[alt as usize].alternate = INVALID;
        }

        // Bump generation so old handles immediately fail validation.
        self.generation[idx as usize] += 1;
        self.free_list.push(idx);
    }

    /// Returns whether the given handle refers to a live fiber.
    #[must_use]
    pub fn is_alive(&self, id: FiberId) -> bool {
        (id.idx as usize) < self.nodes.len()
            && self.generation[id.idx as usize] == id.generation
            && !self.free_list.contains(&id.idx)
    }

    // -- Record access --

    /// Returns the fiber record.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    #[must_use]
    pub fn fiber(&self, id: FiberId) -> &Fiber {
        self.validate(id);
        &self.nodes[id.idx as usize]
    }

    /// Returns the fiber record, mutably.
    ///
    /// Payload slots and flags may be freely written; topology is only
    /// reachable through the link methods below.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    pub fn fiber_mut(&mut self, id: FiberId) -> &mut Fiber {
        self.validate(id);
        &mut self.nodes[id.idx as usize]
    }

    // -- Topology API --

    /// Returns the parent (return) link of a fiber.
    #[must_use]
    pub fn parent(&self, id: FiberId) -> Option<FiberId> {
        self.validate(id);
        self.handle_at(self.nodes[id.idx as usize].parent)
    }

    /// Returns the first child of a fiber.
    #[must_use]
    pub fn child(&self, id: FiberId) -> Option<FiberId> {
        self.validate(id);
        self.handle_at(self.nodes[id.idx as usize].child)
    }

    /// Returns the next sibling of a fiber.
    #[must_use]
    pub fn sibling(&self, id: FiberId) -> Option<FiberId> {
        self.validate(id);
        self.handle_at(self.nodes[id.idx as usize].sibling)
    }

    /// Returns the paired fiber in the other buffer, if one exists.
    #[must_use]
    pub fn alternate(&self, id: FiberId) -> Option<FiberId> {
        self.validate(id);
        self.handle_at(self.nodes[id.idx as usize].alternate)
    }

    /// Sets the parent (return) link of a fiber.
    pub fn set_parent(&mut self, id: FiberId, parent: Option<FiberId>) {
        self.validate(id);
        let raw = self.raw_of(parent);
        self.nodes[id.idx as usize].parent = raw;
    }

    /// Sets the first-child link of a fiber.
    pub fn set_child(&mut self, id: FiberId, child: Option<FiberId>) {
        self.validate(id);
        let raw = self.raw_of(child);
        self.nodes[id.idx as usize].child = raw;
    }

    /// Sets the next-sibling link of a fiber.
    pub fn set_sibling(&mut self, id: FiberId, sibling: Option<FiberId>) {
        self.validate(id);
        let raw = self.raw_of(sibling);
        self.nodes[id.idx as usize].sibling = raw;
    }

    /// Returns an iterator over the direct children of a fiber.
    #[must_use]
    pub fn children(&self, id: FiberId) -> Children<'_> {
        self.validate(id);
        Children {
            store: self,
            current: self.nodes[id.idx as usize].child,
        }
    }

    /// Returns whether `descendant` is `ancestor` or sits below it, following
    /// parent links. Used for the focus-blur containment check before
    /// mutating a subtree away.
    #[must_use]
    pub fn fiber_contains(&self, ancestor: FiberId, descendant: FiberId) -> bool {
        self.validate(ancestor);
        self.validate(descendant);
        let mut cursor = descendant.idx;
        while cursor != INVALID {
            if cursor == ancestor.idx {
                return true;
            }
            cursor = self.nodes[cursor as usize].parent;
        }
        false
    }

    // -- Double buffering --

    /// Creates (or reuses) the work-in-progress pair of `current`.
    ///
    /// On first render there is no alternate yet: a sibling fiber is created
    /// and the mutual `alternate` links are set. Afterwards the existing
    /// alternate is reused with its effect state reset. Either way the
    /// structural and work fields are copied from `current`, so the returned
    /// fiber is ready for `begin_work`.
    ///
    /// `current` itself is never otherwise mutated.
    pub fn create_work_in_progress(
        &mut self,
        current: FiberId,
        pending_props: Option<PropsId>,
    ) -> FiberId {
        self.validate(current);
        let cur = &self.nodes[current.idx as usize];
        let alt = cur.alternate;

        let wip = if alt == INVALID {
            let (tag, mode, key) = (cur.tag, cur.mode, cur.key);
            let wip = self.create_fiber(tag, mode, pending_props);
            let (cur_node, wip_node) = self.pair_mut(current.idx, wip.idx);
            wip_node.key = key;
            wip_node.element_type = cur_node.element_type;
            wip_node.state_node = cur_node.state_node;
            wip_node.alternate = current.idx;
            cur_node.alternate = wip.idx;
            wip
        } else {
            let wip = FiberId {
                idx: alt,
                generation: self.generation[alt as usize],
            };
            let (cur_node, wip_node) = self.pair_mut(current.idx, alt);
            wip_node.pending_props = pending_props;
            wip_node.element_type = cur_node.element_type;
            wip_node.flags = EffectFlags::empty();
            wip_node.first_effect = INVALID;
            wip_node.last_effect = INVALID;
            wip_node.next_effect = INVALID;
            wip
        };

        let (cur_node, wip_node) = self.pair_mut(current.idx, wip.idx);
        wip_node.lanes = cur_node.lanes;
        wip_node.child_lanes = cur_node.child_lanes;
        wip_node.child = cur_node.child;
        wip_node.sibling = cur_node.sibling;
        wip_node.memoized_props = cur_node.memoized_props;
        wip_node.memoized_state = cur_node.memoized_state;
        wip_node.update_queue = cur_node.update_queue;
        wip
    }

    // -- Lane bookkeeping --

    /// Records pending work on a fiber and propagates it upward: ORs `lane`
    /// into the fiber's `lanes` (and its alternate's), then into the
    /// `child_lanes` of every ancestor (and their alternates), until the
    /// host root is reached.
    ///
    /// Returns the host-root fiber, or `None` if the walk ends on a detached
    /// fiber (the update targets an unmounted tree).
    pub fn mark_update_lane_from_fiber(&mut self, fiber: FiberId, lane: Lane) -> Option<FiberId> {
        self.validate(fiber);
        let idx = fiber.idx;
        self.nodes[idx as usize].lanes = self.nodes[idx as usize].lanes.with(lane);
        let alt = self.nodes[idx as usize].alternate;
        if alt != INVALID {
            self.nodes[alt as usize].lanes = self.nodes[alt as usize].lanes.with(lane);
        }

        let mut node = idx;
        let mut parent = self.nodes[idx as usize].parent;
        while parent != INVALID {
            self.nodes[parent as usize].child_lanes =
                self.nodes[parent as usize].child_lanes.with(lane);
            let alt = self.nodes[parent as usize].alternate;
            if alt != INVALID {
                self.nodes[alt as usize].child_lanes =
                    self.nodes[alt as usize].child_lanes.with(lane);
            }
            node = parent;
            parent = self.nodes[parent as usize].parent;
        }

        if self.nodes[node as usize].tag == FiberTag::HostRoot {
            Some(FiberId {
                idx: node,
                generation: self.generation[node as usize],
            })
        } else {
            None
        }
    }

    /// Re-derives `child_lanes` of a completed fiber as the union over its
    /// children of `lanes | child_lanes`.
    pub fn bubble_child_lanes(&mut self, id: FiberId) {
        self.validate(id);
        let mut union = Lanes::NONE;
        let mut child = self.nodes[id.idx as usize].child;
        while child != INVALID {
            let c = &self.nodes[child as usize];
            union = union.union(c.lanes).union(c.child_lanes);
            child = c.sibling;
        }
        self.nodes[id.idx as usize].child_lanes = union;
    }

    // -- Effect list (crate-internal) --
    //
    // The intrusive singly-linked effect list is built during the complete
    // phase and consumed by the commit pipeline. Raw indices are fine here:
    // every id has been validated on entry to the work loop.

    /// Splices the completed fiber's subtree effect list onto its parent's.
    pub(crate) fn append_subtree_effects(&mut self, parent: FiberId, completed: FiberId) {
        let (p, c) = (parent.idx as usize, completed.idx as usize);
        if self.nodes[p].first_effect == INVALID {
            self.nodes[p].first_effect = self.nodes[c].first_effect;
        }
        if self.nodes[c].last_effect != INVALID {
            if self.nodes[p].last_effect != INVALID {
                let tail = self.nodes[p].last_effect as usize;
                self.nodes[tail].next_effect = self.nodes[c].first_effect;
            }
            self.nodes[p].last_effect = self.nodes[c].last_effect;
        }
    }

    /// Appends the completed fiber itself to its parent's effect list.
    pub(crate) fn append_self_effect(&mut self, parent: FiberId, completed: FiberId) {
        let (p, c) = (parent.idx as usize, completed.idx);
        if self.nodes[p].last_effect != INVALID {
            let tail = self.nodes[p].last_effect as usize;
            self.nodes[tail].next_effect = c;
        } else {
            self.nodes[p].first_effect = c;
        }
        self.nodes[p].last_effect = c;
    }

    /// Clears the subtree effect list of a fiber (used when unwinding).
    pub(crate) fn clear_effect_list(&mut self, id: FiberId) {
        let n = &mut self.nodes[id.idx as usize];
        n.first_effect = INVALID;
        n.last_effect = INVALID;
    }

    /// Returns the head of a fiber's effect list.
    pub(crate) fn first_effect(&self, id: FiberId) -> Option<FiberId> {
        self.handle_at(self.nodes[id.idx as usize].first_effect)
    }

    /// Returns the effect after `id` in the commit traversal.
    pub(crate) fn next_effect(&self, id: FiberId) -> Option<FiberId> {
        self.handle_at(self.nodes[id.idx as usize].next_effect)
    }

    /// Severs the `next_effect` chain starting at `head` so committed fibers
    /// do not retain each other.
    pub(crate) fn sever_effect_chain(&mut self, head: FiberId) {
        let mut cursor = head.idx;
        while cursor != INVALID {
            let next = self.nodes[cursor as usize].next_effect;
            self.nodes[cursor as usize].next_effect = INVALID;
            cursor = next;
        }
    }

    // -- Internal helpers --

    /// Panics if the handle is stale.
    fn validate(&self, id: FiberId) {
        assert!(
            (id.idx as usize) < self.nodes.len()
                && self.generation[id.idx as usize] == id.generation,
            "stale FiberId: {id:?} (current gen: {})",
            if (id.idx as usize) < self.nodes.len() {
                self.generation[id.idx as usize]
            } else {
                u32::MAX
            }
        );
    }

    fn handle_at(&self, idx: u32) -> Option<FiberId> {
        if idx == INVALID {
            None
        } else {
            Some(FiberId {
                idx,
                generation: self.generation[idx as usize],
            })
        }
    }

    fn raw_of(&self, id: Option<FiberId>) -> u32 {
        match id {
            Some(id) => {
                self.validate(id);
                id.idx
            }
            None => INVALID,
        }
    }

    fn pair_mut(&mut self, a: u32, b: u32) -> (&mut Fiber, &mut Fiber) {
        assert!(a != b, "fiber cannot pair with itself");
        let (a, b) = (a as usize, b as usize);
        if a < b {
            let (lo, hi) = self.nodes.split_at_mut(b);
            (&mut lo[a], &mut hi[0])
        } else {
            let (lo, hi) = self.nodes.split_at_mut(a);
            (&mut hi[0], &mut lo[b])
        }
    }
}

/// An iterator over the direct children of a fiber.
///
/// Created by [`FiberStore::children`].
#[derive(Debug)]
pub struct Children<'a> {
    store: &'a FiberStore,
    current: u32,
}

impl Iterator for Children<'_> {
    type Item = FiberId;

    fn next(&mut self) -> Option<FiberId> {
        if self.current == INVALID {
            return None;
        }
        let idx = self.current;
        self.current = self.store.nodes[idx as usize].sibling;
        Some(FiberId {
            idx,
            generation: self.store.generation[idx as usize],
        })
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;

    fn host_fiber(store: &mut FiberStore) -> FiberId {
        store.create_fiber(FiberTag::Host, Mode::BLOCKING | Mode::CONCURRENT, None)
    }

    #[test]
    fn create_and_destroy() {
        let mut store = FiberStore::new();
        let id = host_fiber(&mut store);
        assert!(store.is_alive(id));
        store.destroy_fiber(id);
        assert!(!store.is_alive(id));
    }

    #[test]
    fn generation_prevents_stale_access() {
        let mut store = FiberStore::new();
        let id1 = host_fiber(&mut store);
        store.destroy_fiber(id1);
        let id2 = host_fiber(&mut store);
        // id2 reuses the same slot but has a different generation.
        assert!(!store.is_alive(id1));
        assert!(store.is_alive(id2));
        assert_eq!(id1.index(), id2.index());
        assert_ne!(id1.generation(), id2.generation());
    }

    #[test]
    #[should_panic(expected = "stale FiberId")]
    fn destroyed_handle_panics_on_access() {
        let mut store = FiberStore::new();
        let id = host_fiber(&mut store);
        store.destroy_fiber(id);
        let _ = store.fiber(id);
    }

    #[test]
    #[should_panic(expected = "cannot destroy fiber with attached children")]
    fn destroy_with_children_panics() {
        let mut store = FiberStore::new();
        let parent = host_fiber(&mut store);
        let child = host_fiber(&mut store);
        store.set_child(parent, Some(child));
        store.destroy_fiber(parent);
    }

    #[test]
    fn links_and_children_iteration() {
        let mut store = FiberStore::new();
        let parent = host_fiber(&mut store);
        let a = host_fiber(&mut store);
        let b = host_fiber(&mut store);

        store.set_child(parent, Some(a));
        store.set_sibling(a, Some(b));
        store.set_parent(a, Some(parent));
        store.set_parent(b, Some(parent));

        let kids: Vec<_> = store.children(parent).collect();
        assert_eq!(kids, alloc::vec![a, b]);
        assert_eq!(store.parent(a), Some(parent));
        assert_eq!(store.sibling(a), Some(b));
        assert_eq!(store.sibling(b), None);
    }

    #[test]
    fn first_wip_creates_paired_alternate() {
        let mut store = FiberStore::new();
        let current = host_fiber(&mut store);
        store.fiber_mut(current).lanes = Lanes::DEFAULT;
        store.fiber_mut(current).memoized_props = Some(PropsId(7));

        let wip = store.create_work_in_progress(current, Some(PropsId(9)));
        assert_ne!(wip, current);
        assert_eq!(store.alternate(current), Some(wip));
        assert_eq!(store.alternate(wip), Some(current));
        assert_eq!(store.fiber(wip).lanes, Lanes::DEFAULT);
        assert_eq!(store.fiber(wip).memoized_props, Some(PropsId(7)));
        assert_eq!(store.fiber(wip).pending_props, Some(PropsId(9)));
    }

    #[test]
    fn second_wip_reuses_alternate_and_resets_effects() {
        let mut store = FiberStore::new();
        let current = host_fiber(&mut store);
        let wip1 = store.create_work_in_progress(current, None);

        // Simulate a finished render leaving effect residue on the pair.
        store.fiber_mut(wip1).flags = EffectFlags::UPDATE;
        let other = host_fiber(&mut store);
        store.append_self_effect(wip1, other);

        let wip2 = store.create_work_in_progress(current, Some(PropsId(1)));
        assert_eq!(wip1, wip2, "alternate is reused, not reallocated");
        assert_eq!(store.fiber(wip2).flags, EffectFlags::empty());
        assert_eq!(store.first_effect(wip2), None);
        assert_eq!(store.fiber(wip2).pending_props, Some(PropsId(1)));
    }

    #[test]
    fn mark_update_lane_walks_to_host_root() {
        let mut store = FiberStore::new();
        let root = store.create_fiber(FiberTag::HostRoot, Mode::CONCURRENT | Mode::BLOCKING, None);
        let mid = host_fiber(&mut store);
        let leaf = host_fiber(&mut store);
        store.set_child(root, Some(mid));
        store.set_parent(mid, Some(root));
        store.set_child(mid, Some(leaf));
        store.set_parent(leaf, Some(mid));

        let lane = Lane::from_bits(0x40).unwrap();
        let found = store.mark_update_lane_from_fiber(leaf, lane);
        assert_eq!(found, Some(root));
        assert!(store.fiber(leaf).lanes.contains_lane(lane));
        assert!(store.fiber(mid).child_lanes.contains_lane(lane));
        assert!(store.fiber(root).child_lanes.contains_lane(lane));
        assert!(!store.fiber(mid).lanes.contains_lane(lane));
    }

    #[test]
    fn mark_update_lane_updates_alternates_too() {
        let mut store = FiberStore::new();
        let root = store.create_fiber(FiberTag::HostRoot, Mode::CONCURRENT | Mode::BLOCKING, None);
        let leaf = host_fiber(&mut store);
        store.set_child(root, Some(leaf));
        store.set_parent(leaf, Some(root));
        let root_alt = store.create_work_in_progress(root, None);

        let lane = Lane::SYNC;
        store.mark_update_lane_from_fiber(leaf, lane);
        assert!(store.fiber(root_alt).child_lanes.contains_lane(lane));
    }

    #[test]
    fn mark_update_lane_on_detached_fiber_returns_none() {
        let mut store = FiberStore::new();
        let orphan = host_fiber(&mut store);
        assert_eq!(store.mark_update_lane_from_fiber(orphan, Lane::SYNC), None);
    }

    #[test]
    fn bubble_child_lanes_unions_children() {
        let mut store = FiberStore::new();
        let parent = host_fiber(&mut store);
        let a = host_fiber(&mut store);
        let b = host_fiber(&mut store);
        store.set_child(parent, Some(a));
        store.set_sibling(a, Some(b));

        store.fiber_mut(a).lanes = Lanes::SYNC;
        store.fiber_mut(b).child_lanes = Lanes::DEFAULT;
        store.bubble_child_lanes(parent);
        assert_eq!(
            store.fiber(parent).child_lanes,
            Lanes::SYNC.union(Lanes::DEFAULT)
        );
    }

    #[test]
    fn effect_list_preserves_completion_order() {
        let mut store = FiberStore::new();
        let parent = host_fiber(&mut store);
        let a = host_fiber(&mut store);
        let b = host_fiber(&mut store);

        // Child `a` completed with its own effect list containing just `a`.
        store.append_self_effect(a, a);
        store.append_subtree_effects(parent, a);

        // Then `b` completes effectless, then the parent appends itself.
        store.append_subtree_effects(parent, b);
        store.append_self_effect(parent, parent);

        let mut order = Vec::new();
        let mut cursor = store.first_effect(parent);
        while let Some(f) = cursor {
            order.push(f);
            cursor = store.next_effect(f);
        }
        assert_eq!(order, alloc::vec![a, parent]);
    }

    #[test]
    fn sever_effect_chain_clears_links() {
        let mut store = FiberStore::new();
        let parent = host_fiber(&mut store);
        let a = host_fiber(&mut store);
        store.append_self_effect(parent, a);
        store.append_self_effect(parent, parent);

        let head = store.first_effect(parent).unwrap();
        store.sever_effect_chain(head);
        assert_eq!(store.next_effect(a), None);
    }

    #[test]
    fn fiber_contains_follows_parent_links() {
        let mut store = FiberStore::new();
        let root = host_fiber(&mut store);
        let mid = host_fiber(&mut store);
        let leaf = host_fiber(&mut store);
        let stranger = host_fiber(&mut store);
        store.set_parent(mid, Some(root));
        store.set_parent(leaf, Some(mid));

        assert!(store.fiber_contains(root, leaf));
        assert!(store.fiber_contains(mid, leaf));
        assert!(store.fiber_contains(leaf, leaf));
        assert!(!store.fiber_contains(leaf, root));
        assert!(!store.fiber_contains(root, stranger));
    }
}
