// Copyright 2026 the Accretion Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-root lane bookkeeping and task-binding state.
//!
//! A [`RootState`] describes one mounted tree: its committed fiber
//! ([`current`](RootState::current)), the lane masks summarising its
//! outstanding work, per-lane event and expiration stamps, and the state of
//! the single scheduler task bound to it.
//!
//! # Lane masks
//!
//! - `pending` — every lane with enqueued work; superset of the others.
//! - `suspended` — lanes whose render hit a pending async resource.
//! - `pinged` — suspended lanes whose resource has since resolved.
//! - `expired` — lanes that waited too long and now render synchronously.
//! - `finished` — lanes of a completed render awaiting commit.
//!
//! All mask transitions happen through the `mark_*` methods so the
//! containment invariants hold; [`next_lanes`](RootState::next_lanes) is the
//! single selection function deciding what renders next.

use alloc::vec::Vec;

use hashbrown::HashMap;

use crate::fiber::{FiberId, generational_id};
use crate::host::{ContainerId, TimeoutHandle};
use crate::lane::{Lane, LaneMap, Lanes};
use crate::reconciler::WakeableId;
use crate::sched::TaskHandle;
use crate::time::HostTime;
use crate::work_loop::LoopConfig;

generational_id! {
    /// A handle to a root in a [`RootRegistry`].
    RootId
}

/// Per-tree container: lane masks, stamps, and the bound-task state.
#[derive(Debug)]
pub struct RootState {
    pub(crate) container: ContainerId,
    pub(crate) current: FiberId,

    pending: Lanes,
    suspended: Lanes,
    pinged: Lanes,
    expired: Lanes,

    event_times: LaneMap<Option<HostTime>>,
    expiration_times: LaneMap<Option<HostTime>>,

    pub(crate) callback_handle: Option<TaskHandle>,
    pub(crate) callback_lanes: Lanes,
    pub(crate) callback_is_sync: bool,

    pub(crate) timeout_handle: TimeoutHandle,
    pub(crate) finished_work: Option<FiberId>,
    pub(crate) finished_lanes: Lanes,

    pub(crate) ping_cache: HashMap<WakeableId, Lanes>,
}

impl RootState {
    pub(crate) fn new(container: ContainerId, current: FiberId) -> Self {
        Self {
            container,
            current,
            pending: Lanes::NONE,
            suspended: Lanes::NONE,
            pinged: Lanes::NONE,
            expired: Lanes::NONE,
            event_times: LaneMap::default(),
            expiration_times: LaneMap::default(),
            callback_handle: None,
            callback_lanes: Lanes::NONE,
            callback_is_sync: false,
            timeout_handle: TimeoutHandle::NONE,
            finished_work: None,
            finished_lanes: Lanes::NONE,
            ping_cache: HashMap::new(),
        }
    }

    /// The host container this root is mounted into.
    #[must_use]
    pub fn container(&self) -> ContainerId {
        self.container
    }

    /// The committed host-root fiber.
    #[must_use]
    pub fn current(&self) -> FiberId {
        self.current
    }

    /// Lanes with any enqueued work.
    #[must_use]
    pub fn pending_lanes(&self) -> Lanes {
        self.pending
    }

    /// Lanes blocked on a pending async resource.
    #[must_use]
    pub fn suspended_lanes(&self) -> Lanes {
        self.suspended
    }

    /// Previously suspended lanes whose resource has resolved.
    #[must_use]
    pub fn pinged_lanes(&self) -> Lanes {
        self.pinged
    }

    /// Lanes forced to render synchronously.
    #[must_use]
    pub fn expired_lanes(&self) -> Lanes {
        self.expired
    }

    /// Lanes of a finished render awaiting commit.
    #[must_use]
    pub fn finished_lanes(&self) -> Lanes {
        self.finished_lanes
    }

    /// The event time stamped on a lane's most recent update, if any.
    #[must_use]
    pub fn event_time(&self, lane: Lane) -> Option<HostTime> {
        *self.event_times.get(lane)
    }

    // -- Mask transitions --

    /// Records a new update on `lane` at `event_time`.
    ///
    /// Suspension and ping state of every lane at or below the updated
    /// priority is discarded: the new work supersedes those suspensions,
    /// and their lanes will re-suspend if they still hit a pending
    /// resource.
    pub(crate) fn mark_updated(&mut self, lane: Lane, event_time: HostTime) {
        self.pending = self.pending.with(lane);
        let higher_priority = Lanes::from_bits(lane.bits().wrapping_sub(1));
        self.suspended = self.suspended.intersection(higher_priority);
        self.pinged = self.pinged.intersection(higher_priority);
        *self.event_times.get_mut(lane) = Some(event_time);
    }

    /// Marks `lanes` as blocked on async resources. Pending state is
    /// untouched; expiration stamps are cleared so a suspended lane cannot
    /// be starved into an expired sync render while it waits.
    pub(crate) fn mark_suspended(&mut self, lanes: Lanes) {
        self.suspended = self.suspended.union(lanes);
        self.pinged = self.pinged.minus(lanes);
        for lane in lanes.iter() {
            *self.expiration_times.get_mut(lane) = None;
        }
    }

    /// Moves the intersection of `lanes` with the suspended set into the
    /// pinged set: their resources resolved and they may retry.
    pub(crate) fn mark_pinged(&mut self, lanes: Lanes) {
        let resolved = self.suspended.intersection(lanes);
        self.suspended = self.suspended.minus(resolved);
        self.pinged = self.pinged.union(resolved);
    }

    /// Forces `lanes` (where still pending) to render synchronously.
    pub(crate) fn mark_expired(&mut self, lanes: Lanes) {
        self.expired = self.expired.union(lanes.intersection(self.pending));
    }

    /// Retires every lane not in `remaining` after a commit: clears it from
    /// all masks and drops its stamps.
    pub(crate) fn mark_finished(&mut self, remaining: Lanes) {
        let retired = self.pending.minus(remaining);
        self.pending = remaining;
        self.suspended = Lanes::NONE;
        self.pinged = Lanes::NONE;
        self.expired = self.expired.intersection(remaining);
        for lane in retired.iter() {
            *self.event_times.get_mut(lane) = None;
            *self.expiration_times.get_mut(lane) = None;
        }
    }

    // -- Selection --

    /// Returns the highest-priority renderable lanes, or the empty set.
    ///
    /// Expired lanes preempt everything and render together. Otherwise the
    /// highest non-suspended class wins, falling back to pinged lanes, with
    /// idle-tier lanes considered only when nothing else is pending. When a
    /// render on `wip_lanes` is already in progress and the selection is
    /// not strictly higher priority, the in-progress lanes are returned so
    /// the render continues instead of restarting.
    #[must_use]
    pub fn next_lanes(&self, wip_lanes: Lanes) -> Lanes {
        if self.pending.is_empty() {
            return Lanes::NONE;
        }

        let mut next = Lanes::NONE;
        if !self.expired.is_empty() {
            next = self.expired;
        } else {
            let non_idle = self.pending.intersection(Lanes::NON_IDLE);
            if non_idle.is_empty() {
                let unblocked = self.pending.minus(self.suspended);
                if !unblocked.is_empty() {
                    next = unblocked.highest_priority_class();
                } else if !self.pinged.is_empty() {
                    next = self.pinged.highest_priority_class();
                }
            } else {
                let unblocked = non_idle.minus(self.suspended);
                if !unblocked.is_empty() {
                    next = unblocked.highest_priority_class();
                } else {
                    let pinged = non_idle.intersection(self.pinged);
                    if !pinged.is_empty() {
                        next = pinged.highest_priority_class();
                    }
                }
            }
        }

        if next.is_empty() {
            return Lanes::NONE;
        }

        if !wip_lanes.is_empty()
            && wip_lanes != next
            && !wip_lanes.intersects(self.suspended)
            && let (Some(next_lane), Some(wip_lane)) = (
                next.highest_priority_lane(),
                wip_lanes.highest_priority_lane(),
            )
            // Classes are disjoint and ordered, so comparing their masks
            // compares priorities. Equal or lower priority keeps the
            // in-progress lanes.
            && next_lane.class().bits() >= wip_lane.class().bits()
        {
            return wip_lanes;
        }

        next
    }

    /// Whether the given selection must render synchronously: it contains
    /// the sync lane or an expired lane.
    #[must_use]
    pub(crate) fn selection_is_sync(&self, lanes: Lanes) -> bool {
        lanes.intersects(Lanes::SYNC) || lanes.intersects(self.expired)
    }

    /// Stamps missing expiration deadlines on pending lanes and expires the
    /// ones whose deadline has passed.
    ///
    /// A lane that is suspended (and not pinged) is waiting on data, not
    /// starved; it gets no deadline.
    pub(crate) fn mark_starved_lanes_expired(&mut self, now: HostTime, config: &LoopConfig) {
        for lane in self.pending.iter() {
            match *self.expiration_times.get(lane) {
                None => {
                    let blocked = self.suspended.contains_lane(lane)
                        && !self.pinged.contains_lane(lane);
                    if !blocked
                        && let Some(delta) = config.expiration_delta(lane)
                    {
                        let reference = (*self.event_times.get(lane)).unwrap_or(now);
                        *self.expiration_times.get_mut(lane) =
                            Some(reference.saturating_add(delta));
                    }
                }
                Some(deadline) => {
                    if deadline <= now {
                        self.expired = self.expired.with(lane);
                    }
                }
            }
        }
    }
}

/// Arena of [`RootState`]s addressed by generational [`RootId`] handles.
#[derive(Debug, Default)]
pub struct RootRegistry {
    roots: Vec<Option<RootState>>,
    generation: Vec<u32>,
    free_list: Vec<u32>,
}

impl RootRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, state: RootState) -> RootId {
        let idx = if let Some(idx) = self.free_list.pop() {
            self.generation[idx as usize] += 1;
            self.roots[idx as usize] = Some(state);
            idx
        } else {
            let idx = u32::try_from(self.roots.len()).expect("root arena exceeds u32 slots");
            self.roots.push(Some(state));
            self.generation.push(0);
            idx
        };
        RootId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    /// Returns whether the given handle refers to a live root.
    #[must_use]
    pub fn is_alive(&self, id: RootId) -> bool {
        (id.idx as usize) < self.roots.len()
            && self.generation[id.idx as usize] == id.generation
            && self.roots[id.idx as usize].is_some()
    }

    /// Returns the root state.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    #[must_use]
    pub fn get(&self, id: RootId) -> &RootState {
        self.validate(id);
        self.roots[id.idx as usize].as_ref().expect("validated")
    }

    pub(crate) fn get_mut(&mut self, id: RootId) -> &mut RootState {
        self.validate(id);
        self.roots[id.idx as usize].as_mut().expect("validated")
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (RootId, &RootState)> + '_ {
        self.roots.iter().enumerate().filter_map(|(i, slot)| {
            slot.as_ref().map(|state| {
                #[expect(clippy::cast_possible_truncation, reason = "arena is u32-indexed")]
                let id = RootId {
                    idx: i as u32,
                    generation: self.generation[i],
                };
                (id, state)
            })
        })
    }

    pub(crate) fn remove(&mut self, id: RootId) -> RootState {
        self.validate(id);
        let state = self.roots[id.idx as usize].take().expect("validated");
        self.generation[id.idx as usize] += 1;
        self.free_list.push(id.idx);
        state
    }

    fn validate(&self, id: RootId) {
        assert!(
            (id.idx as usize) < self.roots.len()
                && self.generation[id.idx as usize] == id.generation
                && self.roots[id.idx as usize].is_some(),
            "stale RootId: {id:?}"
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::work_loop::LoopConfig;

    use super::*;

    fn root() -> RootState {
        RootState::new(
            ContainerId(0),
            FiberId {
                idx: 0,
                generation: 0,
            },
        )
    }

    fn lane(bits: u32) -> Lane {
        Lane::from_bits(bits).unwrap()
    }

    #[test]
    fn pending_is_superset_of_other_masks() {
        let mut r = root();
        r.mark_updated(lane(0x100), HostTime(10));
        r.mark_updated(lane(0x40), HostTime(11));
        r.mark_suspended(Lanes::from_bits(0x100));
        r.mark_pinged(Lanes::from_bits(0x100));
        r.mark_expired(Lanes::from_bits(0x40));

        let others = r
            .suspended_lanes()
            .union(r.pinged_lanes())
            .union(r.expired_lanes());
        assert!(r.pending_lanes().contains(others));
    }

    #[test]
    fn update_clears_lower_priority_suspensions() {
        let mut r = root();
        r.mark_updated(lane(0x100), HostTime(1));
        r.mark_updated(lane(0x4), HostTime(1));
        r.mark_suspended(Lanes::from_bits(0x100 | 0x4));

        // A discrete-input update supersedes the transition suspension but
        // not the discrete one (equal priority counts as superseded too).
        r.mark_updated(lane(0x8), HostTime(2));
        assert_eq!(r.suspended_lanes(), Lanes::from_bits(0x4));
    }

    #[test]
    fn ping_moves_bits_out_of_suspended() {
        let mut r = root();
        r.mark_updated(lane(0x100), HostTime(1));
        r.mark_suspended(Lanes::from_bits(0x100));
        assert_eq!(r.suspended_lanes(), Lanes::from_bits(0x100));

        r.mark_pinged(Lanes::from_bits(0x100));
        assert_eq!(r.suspended_lanes(), Lanes::NONE);
        assert_eq!(r.pinged_lanes(), Lanes::from_bits(0x100));

        // Pinging a lane that was never suspended does nothing.
        r.mark_pinged(Lanes::from_bits(0x40));
        assert_eq!(r.pinged_lanes(), Lanes::from_bits(0x100));
    }

    #[test]
    fn finished_lanes_are_fully_retired() {
        let mut r = root();
        r.mark_updated(lane(0x10), HostTime(1));
        r.mark_updated(lane(0x100), HostTime(2));
        r.mark_expired(Lanes::from_bits(0x10));

        r.mark_finished(Lanes::from_bits(0x100));
        assert_eq!(r.pending_lanes(), Lanes::from_bits(0x100));
        assert_eq!(r.expired_lanes(), Lanes::NONE);
        assert_eq!(r.event_time(lane(0x10)), None);
        assert_eq!(r.event_time(lane(0x100)), Some(HostTime(2)));
    }

    #[test]
    fn next_lanes_prefers_highest_priority_class() {
        let mut r = root();
        r.mark_updated(lane(0x40), HostTime(1));
        r.mark_updated(lane(0x10), HostTime(2));
        assert_eq!(r.next_lanes(Lanes::NONE), Lanes::from_bits(0x10));
    }

    #[test]
    fn next_lanes_skips_suspended_falls_back_to_pinged() {
        let mut r = root();
        r.mark_updated(lane(0x100), HostTime(1));
        r.mark_suspended(Lanes::from_bits(0x100));
        assert_eq!(r.next_lanes(Lanes::NONE), Lanes::NONE);

        r.mark_pinged(Lanes::from_bits(0x100));
        assert_eq!(r.next_lanes(Lanes::NONE), Lanes::from_bits(0x100));
    }

    #[test]
    fn next_lanes_expired_preempts() {
        let mut r = root();
        r.mark_updated(lane(0x100), HostTime(1));
        r.mark_updated(lane(0x40), HostTime(2));
        r.mark_expired(Lanes::from_bits(0x100));
        assert_eq!(r.next_lanes(Lanes::NONE), Lanes::from_bits(0x100));
        assert!(r.selection_is_sync(Lanes::from_bits(0x100)));
    }

    #[test]
    fn next_lanes_keeps_in_progress_render_of_equal_priority() {
        let mut r = root();
        r.mark_updated(lane(0x100), HostTime(1));
        r.mark_updated(lane(0x200), HostTime(2));
        // Rendering 0x200 already; newly selected 0x100 is the same class,
        // not strictly higher, so the render continues.
        assert_eq!(
            r.next_lanes(Lanes::from_bits(0x200)),
            Lanes::from_bits(0x200)
        );
        // A discrete-input update preempts.
        r.mark_updated(lane(0x4), HostTime(3));
        assert_eq!(
            r.next_lanes(Lanes::from_bits(0x200)),
            Lanes::from_bits(0x4)
        );
    }

    #[test]
    fn next_lanes_idle_only_when_nothing_else() {
        let mut r = root();
        r.mark_updated(lane(0x0400_0000), HostTime(1));
        assert_eq!(r.next_lanes(Lanes::NONE), Lanes::from_bits(0x0400_0000));

        r.mark_updated(lane(0x80), HostTime(2));
        assert_eq!(r.next_lanes(Lanes::NONE), Lanes::from_bits(0x80));
    }

    #[test]
    fn starved_lanes_expire_after_their_delta() {
        let config = LoopConfig::DEFAULT;
        let mut r = root();
        r.mark_updated(lane(0x10), HostTime(100));

        // First pass stamps the deadline; nothing expires yet.
        r.mark_starved_lanes_expired(HostTime(100), &config);
        assert_eq!(r.expired_lanes(), Lanes::NONE);

        // Interaction lanes expire 250ms after their event time.
        r.mark_starved_lanes_expired(HostTime(349), &config);
        assert_eq!(r.expired_lanes(), Lanes::NONE);
        r.mark_starved_lanes_expired(HostTime(350), &config);
        assert_eq!(r.expired_lanes(), Lanes::from_bits(0x10));
    }

    #[test]
    fn transition_lanes_never_expire() {
        let config = LoopConfig::DEFAULT;
        let mut r = root();
        r.mark_updated(lane(0x100), HostTime(0));
        r.mark_starved_lanes_expired(HostTime(0), &config);
        r.mark_starved_lanes_expired(HostTime(1_000_000), &config);
        assert_eq!(r.expired_lanes(), Lanes::NONE);
    }

    #[test]
    fn suspended_lanes_are_not_starved() {
        let config = LoopConfig::DEFAULT;
        let mut r = root();
        r.mark_updated(lane(0x10), HostTime(0));
        r.mark_suspended(Lanes::from_bits(0x10));
        r.mark_starved_lanes_expired(HostTime(0), &config);
        r.mark_starved_lanes_expired(HostTime(10_000), &config);
        assert_eq!(r.expired_lanes(), Lanes::NONE);
    }

    #[test]
    fn registry_handles_are_generational() {
        let mut reg = RootRegistry::new();
        let id1 = reg.insert(root());
        assert!(reg.is_alive(id1));
        reg.remove(id1);
        assert!(!reg.is_alive(id1));
        let id2 = reg.insert(root());
        assert_eq!(id1.index(), id2.index());
        assert!(!reg.is_alive(id1));
        assert!(reg.is_alive(id2));
    }
}
