// Copyright 2026 the Accretion Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-renderer work loop: update intake, lane selection, and task
//! binding.
//!
//! [`WorkLoop`] owns the fiber arena, the root registry, and every piece of
//! renderer-wide mutable state: the execution-context bitmask, the
//! work-in-progress pointers, per-render scratch, the sync callback queue,
//! and the passive-effect queues. All of it is single-threaded; entry points
//! take `&mut self` plus a [`Platform`] bundling the three external
//! collaborators.
//!
//! The flow for one update:
//!
//! ```text
//!   schedule_update_on_fiber ──► mark lanes up the tree ──► mark_updated
//!          │                                                     │
//!          ▼                                                     ▼
//!   ensure_root_is_scheduled ──► next_lanes ──► bind task (sync queue or
//!          │                                     external scheduler)
//!          ▼
//!   perform_{sync,concurrent}_work_on_root ──► render ──► commit
//! ```
//!
//! Render-phase mechanics live in [`render`](crate::render) and the commit
//! pipeline in [`commit`](crate::commit); both are `impl WorkLoop` blocks
//! over the state defined here.

use alloc::vec::Vec;

use bitflags::bitflags;
use hashbrown::HashSet;

use crate::error::LoopError;
use crate::fiber::{FiberId, FiberStore, FiberTag, InstanceId, Mode};
use crate::host::{ContainerId, HostAdapter};
use crate::lane::{self, Lane, Lanes};
use crate::reconciler::{ErrorId, Reconciler, UpdateBuffer};
use crate::root::{RootId, RootRegistry, RootState};
use crate::sched::{Task, TaskHandle, TaskPriority, TaskScheduler};
use crate::suspense::SuspenseConfig;
use crate::time::{Duration, HostTime};
use crate::trace::{Tracer, UpdateScheduledEvent};

/// Hard cap on consecutive synchronous commits to one root.
pub const NESTED_UPDATE_LIMIT: u32 = 50;

/// Cap on cascading passive-effect rounds before the warning fires.
pub const NESTED_PASSIVE_UPDATE_LIMIT: u32 = 50;

/// Minimum spacing between consecutive suspense-fallback commits.
pub const FALLBACK_THROTTLE_MS: u64 = 500;

/// Suspense timeout applied when a config provides none.
pub const DEFAULT_SUSPENSE_TIMEOUT_MS: u64 = 5000;

bitflags! {
    /// Where on the call stack the loop currently is.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ExecutionContext: u8 {
        /// Inside a batching wrapper; sync work defers to the outermost one.
        const BATCHED = 1 << 0;
        /// Inside a host event handler.
        const EVENT = 1 << 1;
        /// Inside a discrete host event (click, keypress).
        const DISCRETE_EVENT = 1 << 2;
        /// Inside a legacy synchronous mount.
        const LEGACY_UNBATCHED = 1 << 3;
        /// Inside the render phase.
        const RENDER = 1 << 4;
        /// Inside the commit pipeline.
        const COMMIT = 1 << 5;
    }
}

/// How a render pass left the work loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExitStatus {
    /// Still in progress (the concurrent loop yielded).
    Incomplete,
    /// Error handling itself failed; the render was discarded.
    FatalErrored,
    /// An error was captured by a boundary; the tree is committable.
    Errored,
    /// Something suspended and a fallback is ready to show.
    Suspended,
    /// Something suspended but the boundary prefers waiting over showing
    /// its fallback.
    SuspendedWithDelay,
    /// The whole tree rendered.
    Completed,
}

/// What a concurrent task accomplished, reported back to the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkStatus {
    /// The task is finished; any remaining work was bound to a new task.
    Done,
    /// The task yielded mid-render; run the same task again to continue.
    Yielded,
}

/// Tunables of the work loop. [`LoopConfig::DEFAULT`] matches the exported
/// constants.
#[derive(Clone, Copy, Debug)]
pub struct LoopConfig {
    /// Minimum ms between consecutive fallback commits on one renderer.
    pub fallback_throttle_ms: u64,
    /// Suspense timeout used when a config supplies none.
    pub default_suspense_timeout_ms: u64,
    /// Consecutive sync commits on one root before
    /// [`LoopError::NestedUpdateOverflow`].
    pub nested_update_limit: u32,
    /// Cascading passive rounds on one root before the trace warning.
    pub nested_passive_update_limit: u32,
    /// How long user-interaction lanes may starve before going sync.
    pub interaction_expiration_ms: u64,
    /// How long default-priority lanes may starve before going sync.
    pub default_expiration_ms: u64,
}

impl LoopConfig {
    /// The stock configuration.
    pub const DEFAULT: Self = Self {
        fallback_throttle_ms: FALLBACK_THROTTLE_MS,
        default_suspense_timeout_ms: DEFAULT_SUSPENSE_TIMEOUT_MS,
        nested_update_limit: NESTED_UPDATE_LIMIT,
        nested_passive_update_limit: NESTED_PASSIVE_UPDATE_LIMIT,
        interaction_expiration_ms: 250,
        default_expiration_ms: 5000,
    };

    /// Returns how long a lane may sit pending before it expires into a
    /// synchronous render, or `None` for lanes that never expire
    /// (transitions and below wait on data, not CPU).
    #[must_use]
    pub fn expiration_delta(&self, lane: Lane) -> Option<Duration> {
        let class = lane.class();
        let interaction = Lanes::SYNC
            .union(Lanes::SYNC_BATCHED)
            .union(Lanes::INPUT_DISCRETE)
            .union(Lanes::INPUT_CONTINUOUS);
        if interaction.contains(class) {
            Some(Duration::from_millis(self.interaction_expiration_ms))
        } else if class == Lanes::DEFAULT {
            Some(Duration::from_millis(self.default_expiration_ms))
        } else {
            None
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Borrowed bundle of the external collaborators the loop drives: the
/// priority scheduler, the host adapter, the component layer, and the trace
/// sink.
pub struct Platform<'a> {
    /// The external priority scheduler.
    pub scheduler: &'a mut dyn TaskScheduler,
    /// The host adapter (tree mutation, timers, focus).
    pub host: &'a mut dyn HostAdapter,
    /// The component layer.
    pub reconciler: &'a mut dyn Reconciler,
    /// Instrumentation sink.
    pub tracer: Tracer<'a>,
}

/// The reconciler core: one instance per renderer.
pub struct WorkLoop {
    pub(crate) fibers: FiberStore,
    pub(crate) roots: RootRegistry,
    pub(crate) config: LoopConfig,

    pub(crate) execution_context: ExecutionContext,
    pub(crate) priority_override: Option<TaskPriority>,

    // -- In-progress render --
    pub(crate) wip_root: Option<RootId>,
    pub(crate) wip: Option<FiberId>,
    pub(crate) wip_root_fiber: Option<FiberId>,
    pub(crate) wip_render_lanes: Lanes,
    pub(crate) wip_exit_status: ExitStatus,
    pub(crate) wip_fatal_error: Option<ErrorId>,
    pub(crate) wip_latest_event_time: Option<HostTime>,
    pub(crate) wip_latest_suspense_timeout: Option<HostTime>,
    pub(crate) wip_suspense_config: Option<SuspenseConfig>,
    pub(crate) wip_skipped_lanes: Lanes,
    pub(crate) wip_updated_lanes: Lanes,
    pub(crate) wip_pinged_lanes: Lanes,

    // -- Per-event caches --
    pub(crate) current_event_time: Option<HostTime>,
    pub(crate) current_event_wip_lanes: Lanes,
    pub(crate) current_event_pending_lanes: Lanes,
    pub(crate) most_recently_updated_root: Option<RootId>,

    // -- Sync callback queue --
    pub(crate) sync_queue: Vec<RootId>,
    pub(crate) sync_queue_handle: Option<TaskHandle>,
    pub(crate) flushing_sync_queue: bool,

    // -- Passive effects --
    pub(crate) passive_root: Option<RootId>,
    pub(crate) passive_lanes: Lanes,
    pub(crate) passive_unmounts: Vec<FiberId>,
    pub(crate) passive_mounts: Vec<FiberId>,
    pub(crate) passive_scheduled: bool,

    // -- Cascade accounting --
    pub(crate) nested_update_count: u32,
    pub(crate) nested_update_root: Option<RootId>,
    pub(crate) nested_passive_count: u32,

    // -- Error bookkeeping --
    pub(crate) failed_boundaries: HashSet<InstanceId>,
    pub(crate) uncaught_error: Option<ErrorId>,

    // -- Misc singletons --
    pub(crate) discrete_pending_roots: Vec<RootId>,
    pub(crate) last_fallback_time: HostTime,
}

impl WorkLoop {
    /// Creates a work loop with the given configuration.
    #[must_use]
    pub fn new(config: LoopConfig) -> Self {
        Self {
            fibers: FiberStore::new(),
            roots: RootRegistry::new(),
            config,
            execution_context: ExecutionContext::empty(),
            priority_override: None,
            wip_root: None,
            wip: None,
            wip_root_fiber: None,
            wip_render_lanes: Lanes::NONE,
            wip_exit_status: ExitStatus::Incomplete,
            wip_fatal_error: None,
            wip_latest_event_time: None,
            wip_latest_suspense_timeout: None,
            wip_suspense_config: None,
            wip_skipped_lanes: Lanes::NONE,
            wip_updated_lanes: Lanes::NONE,
            wip_pinged_lanes: Lanes::NONE,
            current_event_time: None,
            current_event_wip_lanes: Lanes::NONE,
            current_event_pending_lanes: Lanes::NONE,
            most_recently_updated_root: None,
            sync_queue: Vec::new(),
            sync_queue_handle: None,
            flushing_sync_queue: false,
            passive_root: None,
            passive_lanes: Lanes::NONE,
            passive_unmounts: Vec::new(),
            passive_mounts: Vec::new(),
            passive_scheduled: false,
            nested_update_count: 0,
            nested_update_root: None,
            nested_passive_count: 0,
            failed_boundaries: HashSet::new(),
            uncaught_error: None,
            discrete_pending_roots: Vec::new(),
            last_fallback_time: HostTime(0),
        }
    }

    // -- Setup and access --

    /// Creates a new root mounted into `container`, with the given mode for
    /// its tree. Returns its handle; the host-root fiber is reachable via
    /// [`root_fiber`](Self::root_fiber).
    pub fn create_root(&mut self, container: ContainerId, mode: Mode) -> RootId {
        let fiber = self.fibers.create_fiber(FiberTag::HostRoot, mode, None);
        self.roots.insert(RootState::new(container, fiber))
    }

    /// Tears down a root. Updates against its fibers become warnings.
    pub fn dispose_root(&mut self, plat: &mut Platform<'_>, root: RootId) {
        let state = self.roots.remove(root);
        if let Some(handle) = state.callback_handle {
            plat.scheduler.cancel(handle);
        }
        if state.timeout_handle.is_some() {
            plat.host.cancel_timeout(state.timeout_handle);
        }
        if self.wip_root == Some(root) {
            self.wip_root = None;
            self.wip = None;
            self.wip_root_fiber = None;
            self.wip_render_lanes = Lanes::NONE;
        }
        self.sync_queue.retain(|r| *r != root);
        self.discrete_pending_roots.retain(|r| *r != root);
    }

    /// The fiber arena.
    #[must_use]
    pub fn fibers(&self) -> &FiberStore {
        &self.fibers
    }

    /// The fiber arena, mutably (for embedder setup and inspection).
    pub fn fibers_mut(&mut self) -> &mut FiberStore {
        &mut self.fibers
    }

    /// The state of a root.
    #[must_use]
    pub fn root(&self, id: RootId) -> &RootState {
        self.roots.get(id)
    }

    /// The committed host-root fiber of a root.
    #[must_use]
    pub fn root_fiber(&self, id: RootId) -> FiberId {
        self.roots.get(id).current
    }

    /// The loop configuration.
    #[must_use]
    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// The fiber the next unit of work will process, if a render is paused.
    #[must_use]
    pub fn work_in_progress(&self) -> Option<FiberId> {
        self.wip
    }

    /// The root with an in-progress render, if any.
    #[must_use]
    pub fn work_in_progress_root(&self) -> Option<RootId> {
        self.wip_root
    }

    /// Exit status of the in-progress (or most recently abandoned) render.
    #[must_use]
    pub fn render_exit_status(&self) -> ExitStatus {
        self.wip_exit_status
    }

    // -- Event time and lane requests --

    /// Returns the event time for an update being scheduled now.
    ///
    /// Inside the render or commit phase this reads the clock directly.
    /// Outside, the first call in a host task caches the clock so every
    /// update born from the same event shares one time; the cache clears
    /// when the loop next runs a task.
    pub fn request_event_time(&mut self, plat: &mut Platform<'_>) -> HostTime {
        if self
            .execution_context
            .intersects(ExecutionContext::RENDER | ExecutionContext::COMMIT)
        {
            return plat.scheduler.now();
        }
        if let Some(t) = self.current_event_time {
            return t;
        }
        let t = plat.scheduler.now();
        self.current_event_time = Some(t);
        t
    }

    /// Chooses the lane for an update on `fiber`, optionally born inside a
    /// transition.
    pub fn request_update_lane(
        &mut self,
        plat: &mut Platform<'_>,
        fiber: FiberId,
        transition: Option<&SuspenseConfig>,
    ) -> Lane {
        let mode = self.fibers.fiber(fiber).mode;
        if mode.contains(Mode::CONCURRENT) && transition.is_some() {
            // Lanes rendered or pending when this event began; cached so a
            // batch of transition updates in one event spreads over
            // distinct free bits.
            if self.current_event_wip_lanes.is_empty() {
                self.current_event_wip_lanes = self.wip_render_lanes;
            }
            if self.current_event_pending_lanes.is_empty() {
                self.current_event_pending_lanes = self
                    .most_recently_updated_root
                    .filter(|r| self.roots.is_alive(*r))
                    .map_or(Lanes::NONE, |r| self.roots.get(r).pending_lanes());
            }
        }
        lane::request_update_lane(
            mode,
            transition,
            self.current_priority(plat),
            self.execution_context
                .contains(ExecutionContext::DISCRETE_EVENT),
            self.current_event_wip_lanes,
            self.current_event_pending_lanes,
        )
    }

    // -- Update intake --

    /// Records an update on `fiber` at `lane` and schedules the owning root.
    ///
    /// This is the single entry through which all updates flow: embedder
    /// `setState`-style calls, error updates, and retries.
    ///
    /// # Errors
    ///
    /// [`LoopError::NestedUpdateOverflow`] when sync commits have cascaded
    /// past the configured limit.
    pub fn schedule_update_on_fiber(
        &mut self,
        plat: &mut Platform<'_>,
        fiber: FiberId,
        lane: Lane,
        event_time: HostTime,
    ) -> Result<(), LoopError> {
        self.check_for_nested_updates(plat)?;

        let Some(root_fiber) = self.fibers.mark_update_lane_from_fiber(fiber, lane) else {
            plat.tracer.update_on_unmounted(fiber);
            return Ok(());
        };
        let Some(root) = self.root_of_fiber(root_fiber) else {
            plat.tracer.update_on_unmounted(fiber);
            return Ok(());
        };

        self.roots.get_mut(root).mark_updated(lane, event_time);
        self.most_recently_updated_root = Some(root);
        plat.tracer
            .update_scheduled(UpdateScheduledEvent { fiber, lane });

        if self.wip_root == Some(root) {
            self.wip_updated_lanes = self.wip_updated_lanes.with(lane);
            if self.wip_exit_status == ExitStatus::SuspendedWithDelay {
                // The render already decided to delay behind a suspended
                // boundary. Interleaved work means it is out of date; mark
                // it suspended now so the next selection restarts fresh.
                let lanes = self.wip_render_lanes;
                self.mark_root_suspended_filtered(root, lanes);
            }
        }

        if lane == Lane::SYNC {
            if self
                .execution_context
                .contains(ExecutionContext::LEGACY_UNBATCHED)
                && !self
                    .execution_context
                    .intersects(ExecutionContext::RENDER | ExecutionContext::COMMIT)
            {
                // Legacy mount: render synchronously, right now, inside the
                // caller's frame.
                self.perform_sync_work_on_root(plat, root)?;
            } else {
                self.ensure_root_is_scheduled(plat, root);
                if self.execution_context.is_empty() {
                    self.flush_sync_queue(plat)?;
                }
            }
        } else {
            if self
                .execution_context
                .contains(ExecutionContext::DISCRETE_EVENT)
                && self.current_priority(plat) == TaskPriority::UserBlocking
                && !self.discrete_pending_roots.contains(&root)
            {
                // Remember the root so flush_discrete_updates can promote
                // this work before the event handler returns.
                self.discrete_pending_roots.push(root);
            }
            self.ensure_root_is_scheduled(plat, root);
        }
        Ok(())
    }

    // -- Task binding --

    /// Binds `root` into the scheduler according to its next lanes.
    ///
    /// The single place a root's task is created, kept, or cancelled:
    ///
    /// 1. No next lanes → cancel and clear the binding.
    /// 2. Same lanes and same sync/async flavour → keep the existing task.
    /// 3. Otherwise cancel and bind anew: sync selections go through the
    ///    in-process immediate queue, everything else to the external
    ///    scheduler at the translated priority.
    pub fn ensure_root_is_scheduled(&mut self, plat: &mut Platform<'_>, root: RootId) {
        let now = plat.scheduler.now();
        let config = self.config;
        let wip_lanes = if self.wip_root == Some(root) {
            self.wip_render_lanes
        } else {
            Lanes::NONE
        };

        let (next, is_sync, existing) = {
            let state = self.roots.get_mut(root);
            state.mark_starved_lanes_expired(now, &config);
            let next = state.next_lanes(wip_lanes);
            (next, state.selection_is_sync(next), state.callback_handle)
        };

        if next.is_empty() {
            if let Some(handle) = existing {
                plat.scheduler.cancel(handle);
            }
            let state = self.roots.get_mut(root);
            state.callback_handle = None;
            state.callback_lanes = Lanes::NONE;
            state.callback_is_sync = false;
            return;
        }

        {
            let state = self.roots.get(root);
            let bound = state.callback_is_sync || state.callback_handle.is_some();
            if bound && state.callback_lanes == next && state.callback_is_sync == is_sync {
                return;
            }
        }

        if let Some(handle) = existing {
            plat.scheduler.cancel(handle);
        }
        let handle = if is_sync {
            self.push_sync_root(plat, root);
            None
        } else {
            Some(
                plat.scheduler
                    .schedule(lane::lanes_to_task_priority(next), Task::PerformWork(root)),
            )
        };
        let state = self.roots.get_mut(root);
        state.callback_handle = handle;
        state.callback_lanes = next;
        state.callback_is_sync = is_sync;
    }

    /// Drains the in-process sync queue, rendering each queued root
    /// synchronously. Idempotent while already flushing.
    ///
    /// # Errors
    ///
    /// Propagates the first [`LoopError`] raised by a sync render or its
    /// commit; the queue keeps its remaining entries in that case.
    pub fn flush_sync_queue(&mut self, plat: &mut Platform<'_>) -> Result<(), LoopError> {
        if self.flushing_sync_queue {
            return Ok(());
        }
        if let Some(handle) = self.sync_queue_handle.take() {
            plat.scheduler.cancel(handle);
        }
        self.flushing_sync_queue = true;
        while !self.sync_queue.is_empty() {
            let root = self.sync_queue.remove(0);
            // A root whose binding moved back to the external scheduler no
            // longer belongs to the sync queue.
            if !self.roots.is_alive(root) || !self.roots.get(root).callback_is_sync {
                continue;
            }
            if let Err(e) = self.perform_sync_work_on_root(plat, root) {
                self.flushing_sync_queue = false;
                return Err(e);
            }
        }
        self.flushing_sync_queue = false;
        Ok(())
    }

    // -- Error-boundary memory --

    /// Remembers that a legacy error boundary instance already failed once;
    /// a second error in the same boundary propagates past it.
    pub fn mark_legacy_error_boundary_as_failed(&mut self, instance: InstanceId) {
        self.failed_boundaries.insert(instance);
    }

    /// Whether the boundary instance has already failed since the last time
    /// this root's queue fully drained.
    #[must_use]
    pub fn is_legacy_error_boundary_failed(&self, instance: InstanceId) -> bool {
        self.failed_boundaries.contains(&instance)
    }

    /// Records an error that reached the host root with no boundary to
    /// absorb it. Called by the component layer when the root's error
    /// update commits; the value resurfaces as
    /// [`LoopError::Uncaught`] from the surrounding commit.
    pub fn note_uncaught_error(&mut self, error: ErrorId) {
        if self.uncaught_error.is_none() {
            self.uncaught_error = Some(error);
        }
    }

    // -- Internal helpers --

    pub(crate) fn current_priority(&self, plat: &Platform<'_>) -> TaskPriority {
        self.priority_override
            .unwrap_or_else(|| plat.scheduler.current_priority())
    }

    pub(crate) fn root_of_fiber(&self, host_root_fiber: FiberId) -> Option<RootId> {
        let alternate = self.fibers.alternate(host_root_fiber);
        self.roots
            .iter()
            .find(|(_, state)| {
                state.current == host_root_fiber || Some(state.current) == alternate
            })
            .map(|(id, _)| id)
    }

    /// Marks the render's lanes suspended on the root, excluding lanes that
    /// were pinged or updated while the render was in progress (those must
    /// render again, not wait).
    pub(crate) fn mark_root_suspended_filtered(&mut self, root: RootId, lanes: Lanes) {
        let filtered = lanes
            .minus(self.wip_pinged_lanes)
            .minus(self.wip_updated_lanes);
        self.roots.get_mut(root).mark_suspended(filtered);
    }

    pub(crate) fn check_for_nested_updates(
        &mut self,
        plat: &mut Platform<'_>,
    ) -> Result<(), LoopError> {
        if self.nested_update_count > self.config.nested_update_limit {
            self.nested_update_count = 0;
            self.nested_update_root = None;
            return Err(LoopError::NestedUpdateOverflow);
        }
        if self.nested_passive_count > self.config.nested_passive_update_limit {
            self.nested_passive_count = 0;
            if let Some(root) = self.passive_root {
                plat.tracer.nested_passive_overflow(root);
            }
        }
        Ok(())
    }

    /// Routes hook-queued commands into the loop: processed-event notes into
    /// the render scratch, update requests through
    /// [`schedule_update_on_fiber`](Self::schedule_update_on_fiber).
    pub(crate) fn drain_buffer(
        &mut self,
        plat: &mut Platform<'_>,
        buf: &mut UpdateBuffer,
    ) -> Result<(), LoopError> {
        for (event_time, config) in buf.events.drain(..) {
            self.note_render_event(event_time, config);
        }
        if !buf.skipped.is_empty() {
            self.wip_skipped_lanes = self.wip_skipped_lanes.union(buf.skipped);
            buf.skipped = Lanes::NONE;
        }
        while !buf.updates.is_empty() {
            let update = buf.updates.remove(0);
            let event_time = self.request_event_time(plat);
            self.schedule_update_on_fiber(plat, update.fiber, update.lane, event_time)?;
        }
        Ok(())
    }

    fn note_render_event(&mut self, event_time: HostTime, config: Option<SuspenseConfig>) {
        self.wip_latest_event_time = Some(match self.wip_latest_event_time {
            Some(t) => t.max(event_time),
            None => event_time,
        });
        if let Some(config) = config {
            self.wip_suspense_config = Some(config);
            let timeout_ms = if config.timeout_ms == 0 {
                self.config.default_suspense_timeout_ms
            } else {
                config.timeout_ms
            };
            let deadline = event_time.saturating_add(Duration::from_millis(timeout_ms));
            self.wip_latest_suspense_timeout = Some(match self.wip_latest_suspense_timeout {
                Some(t) => t.max(deadline),
                None => deadline,
            });
        }
    }

    fn push_sync_root(&mut self, plat: &mut Platform<'_>, root: RootId) {
        if !self.sync_queue.contains(&root) {
            self.sync_queue.push(root);
        }
        if self.sync_queue_handle.is_none() && !self.flushing_sync_queue {
            self.sync_queue_handle = Some(
                plat.scheduler
                    .schedule(TaskPriority::Immediate, Task::FlushSyncQueue),
            );
        }
    }
}

impl core::fmt::Debug for WorkLoop {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkLoop")
            .field("execution_context", &self.execution_context)
            .field("wip_root", &self.wip_root)
            .field("wip", &self.wip)
            .field("wip_render_lanes", &self.wip_render_lanes)
            .field("wip_exit_status", &self.wip_exit_status)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiration_deltas_by_class() {
        let config = LoopConfig::DEFAULT;
        let discrete = Lane::from_bits(0x10).unwrap();
        let default = Lane::from_bits(0x80).unwrap();
        let transition = Lane::from_bits(0x100).unwrap();
        let idle = Lane::from_bits(0x0400_0000).unwrap();

        assert_eq!(
            config.expiration_delta(discrete),
            Some(Duration::from_millis(250))
        );
        assert_eq!(
            config.expiration_delta(default),
            Some(Duration::from_millis(5000))
        );
        assert_eq!(config.expiration_delta(transition), None);
        assert_eq!(config.expiration_delta(idle), None);
    }

    #[test]
    fn default_config_matches_exported_constants() {
        let config = LoopConfig::default();
        assert_eq!(config.nested_update_limit, NESTED_UPDATE_LIMIT);
        assert_eq!(config.nested_passive_update_limit, NESTED_PASSIVE_UPDATE_LIMIT);
        assert_eq!(config.fallback_throttle_ms, FALLBACK_THROTTLE_MS);
        assert_eq!(
            config.default_suspense_timeout_ms,
            DEFAULT_SUSPENSE_TIMEOUT_MS
        );
    }

    #[test]
    fn create_root_registers_host_root_fiber() {
        let mut wl = WorkLoop::new(LoopConfig::DEFAULT);
        let root = wl.create_root(ContainerId(1), Mode::BLOCKING | Mode::CONCURRENT);
        let fiber = wl.root_fiber(root);
        assert_eq!(wl.fibers().fiber(fiber).tag, FiberTag::HostRoot);
        assert_eq!(wl.root_of_fiber(fiber), Some(root));
        assert_eq!(wl.root(root).pending_lanes(), Lanes::NONE);
    }

    #[test]
    fn root_of_fiber_resolves_the_alternate_too() {
        let mut wl = WorkLoop::new(LoopConfig::DEFAULT);
        let root = wl.create_root(ContainerId(1), Mode::BLOCKING | Mode::CONCURRENT);
        let fiber = wl.root_fiber(root);
        let alt = wl.fibers_mut().create_work_in_progress(fiber, None);
        assert_eq!(wl.root_of_fiber(alt), Some(root));
    }
}
