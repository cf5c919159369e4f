// Copyright 2026 the Accretion Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Deterministic harness for driving the accretion work loop in tests.
//!
//! The harness bundles the three external collaborators with fully scripted
//! fakes — [`VirtualScheduler`] (manual clock, priority queue, scripted
//! yields), [`RecordingHost`] (mutation log, manual timers), and
//! [`ScriptedTree`] (a table-driven component layer) — plus a
//! [`RecordingSink`] capturing trace events, and runs the loop's tasks the
//! way a host driver would:
//!
//! ```text
//!   let mut wl = WorkLoop::new(LoopConfig::DEFAULT);
//!   let mut h = Harness::new();
//!   h.tree.define(APP, NodeScript::host(vec![CHILD]));
//!   let root = wl.create_root(ContainerId(1), Mode::BLOCKING | Mode::CONCURRENT);
//!   wl.fibers_mut().fiber_mut(wl.root_fiber(root)).element_type = Some(APP);
//!   h.schedule_update(&mut wl, wl.root_fiber(root), lane)?;
//!   h.run_until_idle(&mut wl)?;
//! ```

#![no_std]

extern crate alloc;

pub mod host;
pub mod scheduler;
pub mod tree;

use alloc::vec::Vec;

use accretion_core::error::LoopError;
use accretion_core::fiber::{ElementTypeId, FiberId, FiberStore};
use accretion_core::lane::{Lane, Lanes};
use accretion_core::root::RootId;
use accretion_core::sched::Task;
use accretion_core::suspense::SuspenseConfig;
use accretion_core::time::Duration;
use accretion_core::trace::{
    CommitDeferredEvent, CommitPhase, CommitStartedEvent, PassiveFlushedEvent, RenderFinishedEvent,
    RenderStartedEvent, RenderYieldedEvent, RootPingedEvent, TraceSink, Tracer,
    UpdateScheduledEvent,
};
use accretion_core::work_loop::{ExitStatus, Platform, WorkLoop, WorkStatus};

pub use host::{HostOp, PendingTimeout, RecordingHost};
pub use scheduler::{QueuedTask, VirtualScheduler};
pub use tree::{Behavior, NodeScript, ScriptedTree};

/// One captured trace event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceRecord {
    /// A render pass started fresh.
    RenderStarted(RootId, Lanes),
    /// The concurrent loop yielded.
    RenderYielded(RootId),
    /// A render pass finished with the given exit status.
    RenderFinished(RootId, Lanes, ExitStatus),
    /// A commit started on the given lanes.
    CommitStarted(RootId, Lanes),
    /// A commit phase was entered.
    Phase(CommitPhase),
    /// A commit was parked behind a host timer.
    CommitDeferred(RootId, u64),
    /// Passive effects flushed.
    PassiveFlushed(RootId, usize, usize),
    /// An update was recorded on a root.
    UpdateScheduled(Lane),
    /// A wakeable pinged a suspended root.
    RootPinged(RootId, Lanes, bool),
    /// Warning: update on an unmounted fiber.
    UpdateOnUnmounted,
    /// Warning: cascading passive effects hit the limit.
    NestedPassiveOverflow,
    /// Warning: sync flush requested during render/commit.
    SyncFlushInRender,
}

/// A [`TraceSink`] that stores every event for later assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    /// Captured events, in emission order.
    pub records: Vec<TraceRecord>,
}

impl RecordingSink {
    /// The subset of records matching a filter.
    pub fn matching(&self, f: impl Fn(&TraceRecord) -> bool) -> Vec<TraceRecord> {
        self.records.iter().copied().filter(f).collect()
    }
}

impl TraceSink for RecordingSink {
    fn on_render_started(&mut self, e: &RenderStartedEvent) {
        self.records.push(TraceRecord::RenderStarted(e.root, e.lanes));
    }

    fn on_render_yielded(&mut self, e: &RenderYieldedEvent) {
        self.records.push(TraceRecord::RenderYielded(e.root));
    }

    fn on_render_finished(&mut self, e: &RenderFinishedEvent) {
        self.records
            .push(TraceRecord::RenderFinished(e.root, e.lanes, e.exit));
    }

    fn on_commit_started(&mut self, e: &CommitStartedEvent) {
        self.records.push(TraceRecord::CommitStarted(e.root, e.lanes));
    }

    fn on_commit_phase(&mut self, phase: CommitPhase) {
        self.records.push(TraceRecord::Phase(phase));
    }

    fn on_commit_deferred(&mut self, e: &CommitDeferredEvent) {
        self.records
            .push(TraceRecord::CommitDeferred(e.root, e.delay.millis()));
    }

    fn on_passive_flushed(&mut self, e: &PassiveFlushedEvent) {
        self.records
            .push(TraceRecord::PassiveFlushed(e.root, e.unmounts, e.mounts));
    }

    fn on_update_scheduled(&mut self, e: &UpdateScheduledEvent) {
        self.records.push(TraceRecord::UpdateScheduled(e.lane));
    }

    fn on_root_pinged(&mut self, e: &RootPingedEvent) {
        self.records
            .push(TraceRecord::RootPinged(e.root, e.lanes, e.restarted));
    }

    fn on_update_on_unmounted(&mut self, _fiber: FiberId) {
        self.records.push(TraceRecord::UpdateOnUnmounted);
    }

    fn on_nested_passive_overflow(&mut self, _root: RootId) {
        self.records.push(TraceRecord::NestedPassiveOverflow);
    }

    fn on_sync_flush_in_render(&mut self) {
        self.records.push(TraceRecord::SyncFlushInRender);
    }
}

/// The assembled fakes plus a task driver.
#[derive(Debug, Default)]
pub struct Harness {
    /// The virtual scheduler.
    pub scheduler: VirtualScheduler,
    /// The recording host adapter.
    pub host: RecordingHost,
    /// The scripted component layer.
    pub tree: ScriptedTree,
    /// Captured trace events.
    pub sink: RecordingSink,
}

impl Harness {
    /// Creates a harness with everything empty and the clock at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrows the fakes as a [`Platform`] for direct work-loop calls.
    pub fn platform(&mut self) -> Platform<'_> {
        Platform {
            scheduler: &mut self.scheduler,
            host: &mut self.host,
            reconciler: &mut self.tree,
            tracer: Tracer::new(&mut self.sink),
        }
    }

    /// Schedules an update on `fiber` at `lane`, the way an embedder
    /// `set_state` would: the component layer remembers the event time, then
    /// the update enters the loop.
    ///
    /// # Errors
    ///
    /// See [`WorkLoop::schedule_update_on_fiber`].
    pub fn schedule_update(
        &mut self,
        wl: &mut WorkLoop,
        fiber: FiberId,
        lane: Lane,
    ) -> Result<(), LoopError> {
        self.schedule_update_with_config(wl, fiber, lane, None)
    }

    /// Like [`schedule_update`](Self::schedule_update), carrying a
    /// transition's suspense config.
    ///
    /// # Errors
    ///
    /// See [`WorkLoop::schedule_update_on_fiber`].
    pub fn schedule_update_with_config(
        &mut self,
        wl: &mut WorkLoop,
        fiber: FiberId,
        lane: Lane,
        config: Option<SuspenseConfig>,
    ) -> Result<(), LoopError> {
        let time = {
            let mut plat = self.platform();
            wl.request_event_time(&mut plat)
        };
        if let Some(ty) = wl.fibers().fiber(fiber).element_type {
            self.tree.note_update(ty, lane.as_lanes(), time, config);
        }
        let mut plat = self.platform();
        wl.schedule_update_on_fiber(&mut plat, fiber, lane, time)
    }

    /// Pops and runs the highest-priority scheduler task. Returns `None`
    /// when the queue is empty. A task that yields is re-queued under its
    /// original handle.
    pub fn run_one(&mut self, wl: &mut WorkLoop) -> Option<Result<WorkStatus, LoopError>> {
        let task = self.scheduler.pop_highest()?;
        self.scheduler.begin_task(task.priority);
        let result = {
            let mut plat = Platform {
                scheduler: &mut self.scheduler,
                host: &mut self.host,
                reconciler: &mut self.tree,
                tracer: Tracer::new(&mut self.sink),
            };
            match task.task {
                Task::PerformWork(root) => {
                    wl.perform_concurrent_work_on_root(&mut plat, root, false)
                }
                Task::FlushPassive => wl
                    .flush_passive_effects(&mut plat)
                    .map(|_| WorkStatus::Done),
                Task::FlushSyncQueue => wl.flush_sync_queue(&mut plat).map(|()| WorkStatus::Done),
            }
        };
        self.scheduler.end_task();
        if matches!(result, Ok(WorkStatus::Yielded)) {
            self.scheduler.reinsert(task);
        }
        Some(result)
    }

    /// Runs tasks until the scheduler queue is empty.
    ///
    /// # Errors
    ///
    /// Propagates the first task error.
    ///
    /// # Panics
    ///
    /// Panics after 1000 tasks, which always indicates a scheduling loop.
    pub fn run_until_idle(&mut self, wl: &mut WorkLoop) -> Result<(), LoopError> {
        for _ in 0..1000 {
            match self.run_one(wl) {
                None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e),
            }
        }
        panic!("scheduler did not go idle within 1000 tasks");
    }

    /// Advances the virtual clock, firing any host commit timers that come
    /// due.
    ///
    /// # Errors
    ///
    /// Propagates errors from deferred commits.
    pub fn advance(&mut self, wl: &mut WorkLoop, ms: u64) -> Result<(), LoopError> {
        self.scheduler.advance(Duration::from_millis(ms));
        let due = self.host.take_due(Duration::from_millis(ms));
        for timer in due {
            let mut plat = Platform {
                scheduler: &mut self.scheduler,
                host: &mut self.host,
                reconciler: &mut self.tree,
                tracer: Tracer::new(&mut self.sink),
            };
            wl.on_commit_timeout(&mut plat, timer.root)?;
        }
        Ok(())
    }
}

/// Finds the fiber with the given element type in the committed tree of
/// `root`.
#[must_use]
pub fn find_fiber(wl: &WorkLoop, root: RootId, ty: ElementTypeId) -> Option<FiberId> {
    fn walk(store: &FiberStore, fiber: FiberId, ty: ElementTypeId) -> Option<FiberId> {
        if store.fiber(fiber).element_type == Some(ty) {
            return Some(fiber);
        }
        let mut child = store.child(fiber);
        while let Some(c) = child {
            if let Some(found) = walk(store, c, ty) {
                return Some(found);
            }
            child = store.sibling(c);
        }
        None
    }
    walk(wl.fibers(), wl.root_fiber(root), ty)
}
