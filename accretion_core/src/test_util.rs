// Copyright 2026 the Accretion Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! In-crate test doubles: a stub scheduler, host, and component layer small
//! enough for per-module unit tests. The full-featured deterministic fakes
//! live in the harness crate; these only need to drive single work-loop
//! paths.

use alloc::vec::Vec;
use core::cell::Cell;

use crate::fiber::{EffectFlags, FiberId, FiberStore, FiberTag, Mode};
use crate::host::{ContainerId, HostAdapter, TimeoutHandle};
use crate::lane::{Lane, Lanes};
use crate::reconciler::{
    ErrorId, Reconciler, Thrown, ThrowOutcome, UpdateBuffer, WakeableId, WorkStep,
};
use crate::root::RootId;
use crate::sched::{Task, TaskHandle, TaskPriority, TaskScheduler};
use crate::time::{Duration, HostTime};
use crate::trace::Tracer;
use crate::work_loop::{LoopConfig, Platform, WorkLoop};

pub(crate) const CONCURRENT: Mode = Mode::BLOCKING.union(Mode::CONCURRENT);

/// A work loop with one concurrent root, plus the stub platform.
pub(crate) fn loop_with_root() -> (WorkLoop, Rig, RootId) {
    let mut wl = WorkLoop::new(LoopConfig::DEFAULT);
    let root = wl.create_root(ContainerId(1), CONCURRENT);
    (wl, Rig::new(), root)
}

/// Attaches `n` host children under the committed root fiber and returns
/// them in sibling order.
pub(crate) fn attach_children(wl: &mut WorkLoop, root: RootId, n: usize) -> Vec<FiberId> {
    let parent = wl.root_fiber(root);
    let store = wl.fibers_mut();
    let mut out = Vec::new();
    let mut prev: Option<FiberId> = None;
    for _ in 0..n {
        let fiber = store.create_fiber(FiberTag::Host, CONCURRENT, None);
        store.set_parent(fiber, Some(parent));
        match prev {
            Some(p) => store.set_sibling(p, Some(fiber)),
            None => store.set_child(parent, Some(fiber)),
        }
        prev = Some(fiber);
        out.push(fiber);
    }
    out
}

/// Whether `fiber` is `target` or its buffered pair. Tests hold handles
/// from the committed tree, while hooks see the work-in-progress side.
fn is_pair(store: &FiberStore, fiber: FiberId, target: FiberId) -> bool {
    fiber == target || store.alternate(fiber) == Some(target)
}

// ---------------------------------------------------------------------------
// StubScheduler
// ---------------------------------------------------------------------------

pub(crate) struct StubScheduler {
    pub now: HostTime,
    pub priority: TaskPriority,
    pub tasks: Vec<(TaskHandle, TaskPriority, Task)>,
    pub paint_requests: u32,
    yield_budget: Option<u32>,
    yield_polls: Cell<u32>,
    next_handle: u64,
}

impl StubScheduler {
    pub fn new() -> Self {
        Self {
            now: HostTime(0),
            priority: TaskPriority::Normal,
            tasks: Vec::new(),
            paint_requests: 0,
            yield_budget: None,
            yield_polls: Cell::new(0),
            next_handle: 0,
        }
    }

    /// `should_yield` reports true once `units` more polls have passed.
    pub fn yield_after(&mut self, units: u32) {
        self.yield_budget = Some(units);
        self.yield_polls.set(0);
    }

    pub fn clear_yield(&mut self) {
        self.yield_budget = None;
        self.yield_polls.set(0);
    }
}

impl TaskScheduler for StubScheduler {
    fn schedule(&mut self, priority: TaskPriority, task: Task) -> TaskHandle {
        let handle = TaskHandle(self.next_handle);
        self.next_handle += 1;
        self.tasks.push((handle, priority, task));
        handle
    }

    fn cancel(&mut self, handle: TaskHandle) {
        self.tasks.retain(|(h, _, _)| *h != handle);
    }

    fn should_yield(&self) -> bool {
        match self.yield_budget {
            None => false,
            Some(budget) => {
                let polls = self.yield_polls.get() + 1;
                self.yield_polls.set(polls);
                polls > budget
            }
        }
    }

    fn request_paint(&mut self) {
        self.paint_requests += 1;
    }

    fn now(&self) -> HostTime {
        self.now
    }

    fn current_priority(&self) -> TaskPriority {
        self.priority
    }
}

// ---------------------------------------------------------------------------
// StubHost
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum HostCall {
    Prepare,
    ResetAfter,
    BeforeBlur,
    AfterBlur,
    Placement(FiberId),
    Work(FiberId),
    Deletion(FiberId),
    ResetText(FiberId),
    Timeout(u64),
    CancelTimeout,
}

pub(crate) struct StubHost {
    pub calls: Vec<HostCall>,
    pub focused: Option<FiberId>,
    /// Fails `commit_work` once, on the given fiber or its pair.
    pub fail_work_on: Option<(FiberId, ErrorId)>,
    next_timeout: u64,
}

impl StubHost {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            focused: None,
            fail_work_on: None,
            next_timeout: 0,
        }
    }

    pub fn count(&self, f: impl Fn(&HostCall) -> bool) -> usize {
        self.calls.iter().filter(|c| f(c)).count()
    }
}

impl HostAdapter for StubHost {
    fn prepare_for_commit(&mut self, _container: ContainerId) -> Option<FiberId> {
        self.calls.push(HostCall::Prepare);
        self.focused
    }

    fn reset_after_commit(&mut self, _container: ContainerId) {
        self.calls.push(HostCall::ResetAfter);
    }

    fn before_active_instance_blur(&mut self) {
        self.calls.push(HostCall::BeforeBlur);
    }

    fn after_active_instance_blur(&mut self) {
        self.calls.push(HostCall::AfterBlur);
    }

    fn schedule_timeout(&mut self, _root: RootId, delay: Duration) -> TimeoutHandle {
        self.calls.push(HostCall::Timeout(delay.millis()));
        let handle = self.next_timeout;
        self.next_timeout += 1;
        TimeoutHandle(handle)
    }

    fn cancel_timeout(&mut self, _handle: TimeoutHandle) {
        self.calls.push(HostCall::CancelTimeout);
    }

    fn commit_placement(&mut self, _store: &FiberStore, fiber: FiberId) -> Result<(), ErrorId> {
        self.calls.push(HostCall::Placement(fiber));
        Ok(())
    }

    fn commit_work(
        &mut self,
        store: &FiberStore,
        fiber: FiberId,
        _current: Option<FiberId>,
    ) -> Result<(), ErrorId> {
        if let Some((target, error)) = self.fail_work_on
            && is_pair(store, fiber, target)
        {
            self.fail_work_on = None;
            return Err(error);
        }
        self.calls.push(HostCall::Work(fiber));
        Ok(())
    }

    fn commit_deletion(&mut self, _store: &FiberStore, fiber: FiberId) -> Result<(), ErrorId> {
        self.calls.push(HostCall::Deletion(fiber));
        Ok(())
    }

    fn reset_text_content(&mut self, _store: &FiberStore, fiber: FiberId) {
        self.calls.push(HostCall::ResetText(fiber));
    }
}

// ---------------------------------------------------------------------------
// StubTree
// ---------------------------------------------------------------------------

/// A component layer whose tree shape is whatever the test linked under the
/// committed root: `begin_work` clones the current children into the
/// work-in-progress buffer, and per-fiber toggles script suspensions,
/// faults, effect flags, and boundary capture.
pub(crate) struct StubTree {
    pub begin_log: Vec<FiberId>,
    pub complete_log: Vec<FiberId>,
    pub suspend_on: Option<(FiberId, WakeableId)>,
    /// Fires once, then renders normally.
    pub fault_on: Option<(FiberId, ErrorId)>,
    pub fail_throw: bool,
    pub delay_suspense: bool,
    /// The fiber that captures thrown values (render and commit phase).
    pub boundary: Option<FiberId>,
    pub captured: Vec<FiberId>,
    pub root_errors: Vec<ErrorId>,
    pub update_on: Vec<FiberId>,
    pub snapshot_on: Vec<FiberId>,
    pub layout_on: Vec<FiberId>,
    pub passive_on: Vec<FiberId>,
    /// Queues one update from inside the first begin call.
    pub schedule_in_begin: Option<(FiberId, Lane)>,
    pub snapshot_log: Vec<FiberId>,
    pub layout_log: Vec<FiberId>,
    pub passive_unmount_log: Vec<FiberId>,
    pub passive_mount_log: Vec<FiberId>,
    pub pings: Vec<WakeableId>,
}

impl StubTree {
    pub fn new() -> Self {
        Self {
            begin_log: Vec::new(),
            complete_log: Vec::new(),
            suspend_on: None,
            fault_on: None,
            fail_throw: false,
            delay_suspense: false,
            boundary: None,
            captured: Vec::new(),
            root_errors: Vec::new(),
            update_on: Vec::new(),
            snapshot_on: Vec::new(),
            layout_on: Vec::new(),
            passive_on: Vec::new(),
            schedule_in_begin: None,
            snapshot_log: Vec::new(),
            layout_log: Vec::new(),
            passive_unmount_log: Vec::new(),
            passive_mount_log: Vec::new(),
            pings: Vec::new(),
        }
    }

    fn listed(&self, store: &FiberStore, fiber: FiberId, list: &[FiberId]) -> bool {
        list.iter().any(|t| is_pair(store, fiber, *t))
    }
}

impl Reconciler for StubTree {
    fn begin_work(
        &mut self,
        store: &mut FiberStore,
        current: Option<FiberId>,
        wip: FiberId,
        _render_lanes: Lanes,
        updates: &mut UpdateBuffer,
    ) -> WorkStep {
        self.begin_log.push(wip);
        store.fiber_mut(wip).lanes = Lanes::NONE;

        if let Some((target, lane)) = self.schedule_in_begin.take() {
            updates.schedule(target, lane);
        }
        if let Some((target, wakeable)) = self.suspend_on
            && is_pair(store, wip, target)
        {
            return WorkStep::Suspend(wakeable);
        }
        if let Some((target, error)) = self.fault_on
            && is_pair(store, wip, target)
        {
            self.fault_on = None;
            return WorkStep::Fault(error);
        }

        if store.fiber(wip).flags.contains(EffectFlags::DID_CAPTURE) {
            // The boundary shows its fallback: nothing below it.
            store.set_child(wip, None);
            return WorkStep::Done;
        }

        let Some(current) = current else {
            return WorkStep::Done;
        };
        let kids: Vec<FiberId> = store.children(current).collect();
        let mut first = None;
        let mut prev: Option<FiberId> = None;
        for child in kids {
            let wip_child = store.create_work_in_progress(child, None);
            store.set_parent(wip_child, Some(wip));
            store.set_sibling(wip_child, None);
            match prev {
                Some(p) => store.set_sibling(p, Some(wip_child)),
                None => first = Some(wip_child),
            }
            prev = Some(wip_child);
        }
        store.set_child(wip, first);

        match first {
            Some(f) => WorkStep::ContinueWith(f),
            None => WorkStep::Done,
        }
    }

    fn complete_work(
        &mut self,
        store: &mut FiberStore,
        _current: Option<FiberId>,
        wip: FiberId,
        _render_lanes: Lanes,
    ) -> WorkStep {
        self.complete_log.push(wip);
        let mut add = EffectFlags::empty();
        if self.listed(store, wip, &self.update_on) {
            add |= EffectFlags::UPDATE;
        }
        if self.listed(store, wip, &self.snapshot_on) {
            add |= EffectFlags::SNAPSHOT;
        }
        if self.listed(store, wip, &self.layout_on) {
            add |= EffectFlags::CALLBACK;
        }
        if self.listed(store, wip, &self.passive_on) {
            add |= EffectFlags::PASSIVE;
        }
        store.fiber_mut(wip).flags |= add;
        WorkStep::Done
    }

    fn unwind_work(
        &mut self,
        store: &mut FiberStore,
        wip: FiberId,
        _render_lanes: Lanes,
    ) -> Option<FiberId> {
        let flags = store.fiber(wip).flags;
        if flags.contains(EffectFlags::SHOULD_CAPTURE) {
            let fiber = store.fiber_mut(wip);
            fiber.flags.remove(EffectFlags::SHOULD_CAPTURE);
            fiber.flags |= EffectFlags::DID_CAPTURE;
            Some(wip)
        } else {
            None
        }
    }

    fn throw_exception(
        &mut self,
        store: &mut FiberStore,
        root_fiber: FiberId,
        return_fiber: Option<FiberId>,
        _source: FiberId,
        value: Thrown,
        _render_lanes: Lanes,
        _updates: &mut UpdateBuffer,
    ) -> Result<ThrowOutcome, ErrorId> {
        if self.fail_throw {
            return Err(match value {
                Thrown::Error(e) => e,
                Thrown::Wakeable(_) => ErrorId(u32::MAX),
            });
        }
        let mut cursor = return_fiber;
        while let Some(fiber) = cursor {
            if let Some(target) = self.boundary
                && is_pair(store, fiber, target)
            {
                store.fiber_mut(fiber).flags |= EffectFlags::SHOULD_CAPTURE;
                self.captured.push(fiber);
                return Ok(match value {
                    Thrown::Wakeable(_) => ThrowOutcome::Suspended {
                        delay_possible: self.delay_suspense,
                    },
                    Thrown::Error(_) => ThrowOutcome::ErrorCaptured,
                });
            }
            cursor = store.parent(fiber);
        }
        store.fiber_mut(root_fiber).flags |= EffectFlags::SHOULD_CAPTURE;
        Ok(ThrowOutcome::ErrorCaptured)
    }

    fn commit_snapshot(&mut self, _store: &mut FiberStore, fiber: FiberId) -> Result<(), ErrorId> {
        self.snapshot_log.push(fiber);
        Ok(())
    }

    fn commit_layout(
        &mut self,
        _store: &mut FiberStore,
        fiber: FiberId,
        _current: Option<FiberId>,
        _updates: &mut UpdateBuffer,
    ) -> Result<(), ErrorId> {
        self.layout_log.push(fiber);
        Ok(())
    }

    fn commit_passive_unmount(
        &mut self,
        _store: &mut FiberStore,
        fiber: FiberId,
        _updates: &mut UpdateBuffer,
    ) -> Result<(), ErrorId> {
        self.passive_unmount_log.push(fiber);
        Ok(())
    }

    fn commit_passive_mount(
        &mut self,
        _store: &mut FiberStore,
        fiber: FiberId,
        _updates: &mut UpdateBuffer,
    ) -> Result<(), ErrorId> {
        self.passive_mount_log.push(fiber);
        Ok(())
    }

    fn try_capture_error(
        &mut self,
        store: &mut FiberStore,
        boundary: FiberId,
        _source: FiberId,
        _error: ErrorId,
    ) -> bool {
        if let Some(target) = self.boundary
            && is_pair(store, boundary, target)
        {
            self.captured.push(boundary);
            true
        } else {
            false
        }
    }

    fn capture_root_error(
        &mut self,
        _store: &mut FiberStore,
        _root_fiber: FiberId,
        error: ErrorId,
    ) {
        self.root_errors.push(error);
    }

    fn attach_ping(&mut self, wakeable: WakeableId) {
        self.pings.push(wakeable);
    }
}

// ---------------------------------------------------------------------------
// Rig
// ---------------------------------------------------------------------------

/// The three stubs bundled so tests can borrow them as a [`Platform`].
pub(crate) struct Rig {
    pub sched: StubScheduler,
    pub host: StubHost,
    pub tree: StubTree,
}

impl Rig {
    pub fn new() -> Self {
        Self {
            sched: StubScheduler::new(),
            host: StubHost::new(),
            tree: StubTree::new(),
        }
    }

    pub fn plat(&mut self) -> Platform<'_> {
        Platform {
            scheduler: &mut self.sched,
            host: &mut self.host,
            reconciler: &mut self.tree,
            tracer: Tracer::none(),
        }
    }
}
