// Copyright 2026 the Accretion Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Component-layer contract.
//!
//! The core walks the tree and orders the phases; the *component layer*
//! supplies the per-tag semantics: reconciling elements against fibers in
//! [`begin_work`](Reconciler::begin_work), finalizing host work in
//! [`complete_work`](Reconciler::complete_work), popping context and
//! capturing boundaries in [`unwind_work`](Reconciler::unwind_work), and
//! running lifecycle callbacks during commits.
//!
//! # No exceptions, no re-entrancy
//!
//! Control effects that the source pattern models as thrown values are
//! explicit here: `begin_work`/`complete_work` return a [`WorkStep`] tag and
//! the loop dispatches on it. Hooks never call back into the work loop;
//! anything that would (a `setState` from a layout effect, an update
//! spawned by an unmount) is pushed into the [`UpdateBuffer`] handed to the
//! hook, and the loop drains it when the hook returns.

use alloc::vec::Vec;
use core::fmt;

use crate::fiber::{FiberId, FiberStore};
use crate::lane::{Lane, Lanes};
use crate::suspense::SuspenseConfig;
use crate::time::HostTime;

/// An opaque reference to a pending async resource (a wakeable). Thrown by
/// suspending components; resolved by the embedder via
/// [`WorkLoop::ping_suspended_root`](crate::work_loop::WorkLoop::ping_suspended_root).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WakeableId(pub u32);

impl fmt::Debug for WakeableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WakeableId({})", self.0)
    }
}

/// An opaque reference to a captured error value owned by the component
/// layer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ErrorId(pub u32);

impl fmt::Debug for ErrorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ErrorId({})", self.0)
    }
}

/// The outcome of a begin or complete step, dispatched on by the loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkStep {
    /// The step finished and produced no child to descend into.
    Done,
    /// Descend into (or move to) this fiber next.
    ContinueWith(FiberId),
    /// The component suspended on a pending async resource.
    Suspend(WakeableId),
    /// The component raised an error.
    Fault(ErrorId),
}

/// A value that escaped a render step, routed to
/// [`Reconciler::throw_exception`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Thrown {
    /// A pending async resource; triggers the suspension protocol.
    Wakeable(WakeableId),
    /// An error value; routed to the nearest error boundary.
    Error(ErrorId),
}

/// What `throw_exception` did with a thrown value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThrowOutcome {
    /// A suspense boundary will show a fallback (or retry).
    Suspended {
        /// The boundary can keep showing the previous content for a while
        /// instead of synchronously switching to its fallback.
        delay_possible: bool,
    },
    /// The value was attached as an error update to a boundary or the root.
    ErrorCaptured,
}

/// An update requested by a hook, to be routed through
/// [`WorkLoop::schedule_update_on_fiber`](crate::work_loop::WorkLoop::schedule_update_on_fiber)
/// once the hook returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueuedUpdate {
    /// The fiber the update targets.
    pub fiber: FiberId,
    /// The lane it was requested on.
    pub lane: Lane,
}

/// Command buffer from component hooks back to the work loop.
///
/// Hooks receive `&mut UpdateBuffer` instead of access to the loop itself.
/// Entries are drained after every hook call.
#[derive(Debug, Default)]
pub struct UpdateBuffer {
    pub(crate) updates: Vec<QueuedUpdate>,
    pub(crate) events: Vec<(HostTime, Option<SuspenseConfig>)>,
    pub(crate) skipped: Lanes,
}

impl UpdateBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests an update on `fiber` at `lane`.
    pub fn schedule(&mut self, fiber: FiberId, lane: Lane) {
        self.updates.push(QueuedUpdate { fiber, lane });
    }

    /// Records that an update with the given event time (and suspense
    /// config, for transitions) was processed during the current render.
    /// Feeds the suspended-commit timeout heuristics.
    pub fn mark_event(&mut self, event_time: HostTime, config: Option<SuspenseConfig>) {
        self.events.push((event_time, config));
    }

    /// Records lanes whose queued updates were deliberately skipped because
    /// they are lower priority than the current render.
    pub fn mark_skipped(&mut self, lanes: Lanes) {
        self.skipped = self.skipped.union(lanes);
    }

    /// Returns whether nothing has been queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.events.is_empty() && self.skipped.is_empty()
    }
}

/// The component layer: element reconciliation, lifecycle callbacks, and
/// boundary behavior, dispatched per fiber tag.
///
/// Commit-side hooks default to no-ops so a minimal component layer only
/// implements the render-phase methods.
pub trait Reconciler {
    /// Reconciles `wip` against its current incarnation, creating or
    /// updating its children in `store`. Returns the next unit of work.
    fn begin_work(
        &mut self,
        store: &mut FiberStore,
        current: Option<FiberId>,
        wip: FiberId,
        render_lanes: Lanes,
        updates: &mut UpdateBuffer,
    ) -> WorkStep;

    /// Finalizes a fiber whose subtree has completed (prepares host work,
    /// pops context). [`WorkStep::ContinueWith`] restarts the loop at the
    /// returned fiber (e.g. to render a suspense fallback).
    fn complete_work(
        &mut self,
        store: &mut FiberStore,
        current: Option<FiberId>,
        wip: FiberId,
        render_lanes: Lanes,
    ) -> WorkStep;

    /// Unwinds a fiber marked incomplete. Returns the fiber itself if it
    /// captured the thrown value (a boundary), or `None` to keep
    /// propagating incompleteness upward.
    fn unwind_work(
        &mut self,
        store: &mut FiberStore,
        wip: FiberId,
        render_lanes: Lanes,
    ) -> Option<FiberId> {
        let _ = (store, wip, render_lanes);
        None
    }

    /// Pops the context contributions of an in-progress fiber when a render
    /// is abandoned partway.
    fn unwind_interrupted_work(&mut self, store: &mut FiberStore, wip: FiberId) {
        let _ = (store, wip);
    }

    /// Attaches a thrown value to the tree: marks the source incomplete's
    /// nearest catching boundary (suspense for wakeables, class error
    /// boundary or host root for errors) and enqueues whatever updates that
    /// requires via `updates`.
    ///
    /// An `Err` means handling itself failed; the loop escalates to a fatal
    /// error and discards the render.
    #[allow(clippy::too_many_arguments)]
    fn throw_exception(
        &mut self,
        store: &mut FiberStore,
        root_fiber: FiberId,
        return_fiber: Option<FiberId>,
        source: FiberId,
        value: Thrown,
        render_lanes: Lanes,
        updates: &mut UpdateBuffer,
    ) -> Result<ThrowOutcome, ErrorId>;

    /// Takes the before-mutation snapshot of a fiber flagged
    /// [`SNAPSHOT`](crate::fiber::EffectFlags::SNAPSHOT).
    fn commit_snapshot(&mut self, store: &mut FiberStore, fiber: FiberId) -> Result<(), ErrorId> {
        let _ = (store, fiber);
        Ok(())
    }

    /// Runs layout effects and update callbacks of a committed fiber.
    fn commit_layout(
        &mut self,
        store: &mut FiberStore,
        fiber: FiberId,
        current: Option<FiberId>,
        updates: &mut UpdateBuffer,
    ) -> Result<(), ErrorId> {
        let _ = (store, fiber, current, updates);
        Ok(())
    }

    /// Points the fiber's ref at its committed instance.
    fn attach_ref(&mut self, store: &mut FiberStore, fiber: FiberId) -> Result<(), ErrorId> {
        let _ = (store, fiber);
        Ok(())
    }

    /// Clears the ref of a fiber about to be updated or deleted.
    fn detach_ref(&mut self, store: &mut FiberStore, fiber: FiberId) {
        let _ = (store, fiber);
    }

    /// Runs component unmount lifecycles for a deleted subtree, bottom-up.
    fn commit_deletion(
        &mut self,
        store: &mut FiberStore,
        fiber: FiberId,
        updates: &mut UpdateBuffer,
    ) -> Result<(), ErrorId> {
        let _ = (store, fiber, updates);
        Ok(())
    }

    /// Runs the queued passive destroy functions of a fiber from the
    /// previous commit.
    fn commit_passive_unmount(
        &mut self,
        store: &mut FiberStore,
        fiber: FiberId,
        updates: &mut UpdateBuffer,
    ) -> Result<(), ErrorId> {
        let _ = (store, fiber, updates);
        Ok(())
    }

    /// Runs the queued passive create functions of a fiber; each return
    /// value becomes that effect's next destroy.
    fn commit_passive_mount(
        &mut self,
        store: &mut FiberStore,
        fiber: FiberId,
        updates: &mut UpdateBuffer,
    ) -> Result<(), ErrorId> {
        let _ = (store, fiber, updates);
        Ok(())
    }

    /// Offers a commit-phase error to a potential boundary. Returns `true`
    /// if `boundary` accepted it (enqueued an error update on itself); the
    /// loop then schedules that fiber on the sync lane.
    fn try_capture_error(
        &mut self,
        store: &mut FiberStore,
        boundary: FiberId,
        source: FiberId,
        error: ErrorId,
    ) -> bool {
        let _ = (store, boundary, source, error);
        false
    }

    /// Attaches a commit-phase error to the host root after no boundary
    /// accepted it. The root renders null and the error resurfaces through
    /// [`LoopError::Uncaught`](crate::error::LoopError::Uncaught).
    fn capture_root_error(&mut self, store: &mut FiberStore, root_fiber: FiberId, error: ErrorId) {
        let _ = (store, root_fiber, error);
    }

    /// Subscribes to a wakeable's resolution, exactly once per root. The
    /// embedder must call
    /// [`WorkLoop::ping_suspended_root`](crate::work_loop::WorkLoop::ping_suspended_root)
    /// when it resolves.
    fn attach_ping(&mut self, wakeable: WakeableId) {
        let _ = wakeable;
    }
}
