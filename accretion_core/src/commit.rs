// Copyright 2026 the Accretion Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The commit pipeline: installing a finished work-in-progress tree.
//!
//! A commit walks the root's effect list three times, strictly in order:
//!
//! 1. **Before-mutation** — snapshot hooks; the first passive effect
//!    schedules a single deferred flush.
//! 2. **Mutation** — host placements, updates, and deletions, dispatched on
//!    the primary flag subset; detached refs first. Ends with the atomic
//!    buffer swap (`root.current = finished`).
//! 3. **Layout** — layout effects, lifecycle callbacks, and ref
//!    attachment, now against the committed tree.
//!
//! Passive effects run later, in their own scheduler task, destroys before
//! creates.
//!
//! Every per-effect step is a *guarded call*: a failure is attributed to
//! that effect's fiber via [`capture_commit_phase_error`], the walk moves to
//! the next effect, and the first failure resurfaces from
//! [`commit_root`](WorkLoop::commit_root) after the commit finishes.
//!
//! [`capture_commit_phase_error`]: WorkLoop::capture_commit_phase_error

use core::mem;

use crate::error::LoopError;
use crate::fiber::{EffectFlags, FiberId, FiberTag};
use crate::lane::{Lane, Lanes};
use crate::reconciler::{ErrorId, UpdateBuffer};
use crate::root::RootId;
use crate::sched::{Task, TaskPriority};
use crate::trace::{CommitPhase, CommitStartedEvent, PassiveFlushedEvent};
use crate::work_loop::{ExecutionContext, Platform, WorkLoop};

impl WorkLoop {
    /// Commits the root's finished work-in-progress tree, if one is ready.
    ///
    /// Runs at immediate priority regardless of the caller's.
    ///
    /// # Errors
    ///
    /// [`LoopError::Uncaught`] if a root-level error update committed with
    /// no boundary; [`LoopError::CommitPhase`] if a guarded sub-step failed
    /// (already attributed; the commit itself completed);
    /// [`LoopError::NestedUpdateOverflow`] propagated from a cascading sync
    /// update scheduled by a commit hook.
    pub(crate) fn commit_root(
        &mut self,
        plat: &mut Platform<'_>,
        root: RootId,
    ) -> Result<(), LoopError> {
        let prev = self.priority_override;
        self.priority_override = Some(TaskPriority::Immediate);
        let result = self.commit_root_impl(plat, root);
        self.priority_override = prev;
        result
    }

    fn commit_root_impl(&mut self, plat: &mut Platform<'_>, root: RootId) -> Result<(), LoopError> {
        // 1. All previously deferred passive effects run before their next
        // commit, in case they schedule work that belongs in it.
        while self.passive_root.is_some() {
            self.flush_passive_effects(plat)?;
        }

        // 2.
        assert!(
            !self
                .execution_context
                .intersects(ExecutionContext::RENDER | ExecutionContext::COMMIT),
            "commit cannot start inside the render or commit phase"
        );

        // 3.
        let (finished, lanes) = {
            let state = self.roots.get_mut(root);
            let finished = state.finished_work.take();
            let lanes = mem::replace(&mut state.finished_lanes, Lanes::NONE);
            (finished, lanes)
        };
        let Some(finished) = finished else {
            return Ok(());
        };
        {
            let state = self.roots.get_mut(root);
            debug_assert!(
                state.current != finished,
                "cannot commit the already-committed tree"
            );
            state.callback_handle = None;
            state.callback_lanes = Lanes::NONE;
            state.callback_is_sync = false;
        }

        // 4.
        let remaining = {
            let f = self.fibers.fiber(finished);
            f.lanes.union(f.child_lanes)
        };
        self.roots.get_mut(root).mark_finished(remaining);

        // 5.
        if self.wip_root == Some(root) {
            self.wip_root = None;
            self.wip = None;
            self.wip_root_fiber = None;
            self.wip_render_lanes = Lanes::NONE;
        }

        plat.tracer.commit_started(CommitStartedEvent { root, lanes });

        // 6. The finished root participates in its own effect list when it
        // has effects of its own.
        if self.fibers.fiber(finished).flags.is_effectful() {
            self.fibers.append_self_effect(finished, finished);
        }
        let first = self.fibers.first_effect(finished);

        let mut first_error: Option<ErrorId> = None;
        let mut deferred: Option<LoopError> = None;

        if let Some(first) = first {
            let prev_ctx = self.execution_context;
            self.execution_context |= ExecutionContext::COMMIT;

            // 7. Before-mutation phase.
            plat.tracer.commit_phase(CommitPhase::BeforeMutation);
            let mut cursor = Some(first);
            while let Some(fiber) = cursor {
                let flags = self.fibers.fiber(fiber).flags;
                if flags.contains(EffectFlags::SNAPSHOT)
                    && let Err(e) = plat.reconciler.commit_snapshot(&mut self.fibers, fiber)
                {
                    self.attribute_commit_error(plat, fiber, e, &mut first_error, &mut deferred);
                }
                if flags.contains(EffectFlags::PASSIVE) && !self.passive_scheduled {
                    self.passive_scheduled = true;
                    plat.scheduler
                        .schedule(TaskPriority::Normal, Task::FlushPassive);
                }
                cursor = self.fibers.next_effect(fiber);
            }

            // 8.
            let container = self.roots.get(root).container;
            let focused = plat.host.prepare_for_commit(container);
            let mut fired_blur = false;

            // 9. Mutation phase.
            plat.tracer.commit_phase(CommitPhase::Mutation);
            cursor = Some(first);
            while let Some(fiber) = cursor {
                self.commit_mutation_effect(
                    plat,
                    fiber,
                    focused,
                    &mut fired_blur,
                    &mut first_error,
                    &mut deferred,
                );
                cursor = self.fibers.next_effect(fiber);
            }

            // 10. Atomic buffer swap: `finished` is the current tree from
            // here on.
            self.roots.get_mut(root).current = finished;

            // 11.
            plat.host.reset_after_commit(container);
            if fired_blur {
                plat.host.after_active_instance_blur();
            }

            // 12. Layout phase.
            plat.tracer.commit_phase(CommitPhase::Layout);
            cursor = Some(first);
            while let Some(fiber) = cursor {
                let flags = self.fibers.fiber(fiber).flags;
                if flags.intersects(EffectFlags::UPDATE | EffectFlags::CALLBACK) {
                    let current = self.fibers.alternate(fiber);
                    let mut buf = UpdateBuffer::new();
                    if let Err(e) =
                        plat.reconciler
                            .commit_layout(&mut self.fibers, fiber, current, &mut buf)
                    {
                        self.attribute_commit_error(
                            plat,
                            fiber,
                            e,
                            &mut first_error,
                            &mut deferred,
                        );
                    }
                    self.drain_deferred(plat, &mut buf, &mut deferred);
                }
                if flags.contains(EffectFlags::REF)
                    && let Err(e) = plat.reconciler.attach_ref(&mut self.fibers, fiber)
                {
                    self.attribute_commit_error(plat, fiber, e, &mut first_error, &mut deferred);
                }
                if flags.contains(EffectFlags::PASSIVE) {
                    // Destroys from the previous commit run before this
                    // commit's creates, in queued order.
                    self.passive_unmounts.push(fiber);
                    self.passive_mounts.push(fiber);
                }
                cursor = self.fibers.next_effect(fiber);
            }

            // 13.
            plat.scheduler.request_paint();
            self.execution_context = prev_ctx;

            // 14.
            if self.passive_scheduled {
                self.passive_scheduled = false;
                self.passive_root = Some(root);
                self.passive_lanes = lanes;
            } else {
                self.fibers.sever_effect_chain(first);
                self.fibers.clear_effect_list(finished);
            }
        } else {
            // No effects; the swap is the whole commit.
            self.roots.get_mut(root).current = finished;
        }

        // 15.
        let remaining_now = self.roots.get(root).pending_lanes();
        if remaining_now.is_empty() {
            self.failed_boundaries.clear();
        }

        // 16. Cascading-sync accounting; the limit trips in
        // schedule_update_on_fiber.
        if remaining_now == Lanes::SYNC {
            if self.nested_update_root == Some(root) {
                self.nested_update_count += 1;
            } else {
                self.nested_update_count = 0;
                self.nested_update_root = Some(root);
            }
        } else {
            self.nested_update_count = 0;
        }

        self.ensure_root_is_scheduled(plat, root);

        // 17. Work scheduled by commit hooks flushes before control returns
        // to the host, except during a legacy mount where the outer batch
        // owns the flush.
        if !self
            .execution_context
            .contains(ExecutionContext::LEGACY_UNBATCHED)
            && let Err(e) = self.flush_sync_queue(plat)
            && deferred.is_none()
        {
            deferred = Some(e);
        }

        if let Some(error) = self.uncaught_error.take() {
            return Err(LoopError::Uncaught(error));
        }
        if let Some(error) = deferred {
            return Err(error);
        }
        if let Some(error) = first_error {
            return Err(LoopError::CommitPhase(error));
        }
        Ok(())
    }

    /// Dispatches one effect's mutation work on its primary flag subset.
    fn commit_mutation_effect(
        &mut self,
        plat: &mut Platform<'_>,
        fiber: FiberId,
        focused: Option<FiberId>,
        fired_blur: &mut bool,
        first_error: &mut Option<ErrorId>,
        deferred: &mut Option<LoopError>,
    ) {
        let flags = self.fibers.fiber(fiber).flags;

        if flags.contains(EffectFlags::CONTENT_RESET) {
            plat.host.reset_text_content(&self.fibers, fiber);
        }
        if flags.contains(EffectFlags::REF) && self.fibers.alternate(fiber).is_some() {
            plat.reconciler.detach_ref(&mut self.fibers, fiber);
        }

        let primary = flags.primary_mutation();
        if primary.contains(EffectFlags::PLACEMENT) {
            if let Err(e) = plat.host.commit_placement(&self.fibers, fiber) {
                self.attribute_commit_error(plat, fiber, e, first_error, deferred);
            }
            // The placement is recorded as done even if the layout phase
            // later throws; it must not re-run on an error retry.
            self.fibers.fiber_mut(fiber).flags.remove(EffectFlags::PLACEMENT);
            if primary.contains(EffectFlags::UPDATE) {
                let current = self.fibers.alternate(fiber);
                if let Err(e) = plat.host.commit_work(&self.fibers, fiber, current) {
                    self.attribute_commit_error(plat, fiber, e, first_error, deferred);
                }
            }
        } else if primary.contains(EffectFlags::HYDRATING) {
            self.fibers.fiber_mut(fiber).flags.remove(EffectFlags::HYDRATING);
            if primary.contains(EffectFlags::UPDATE) {
                let current = self.fibers.alternate(fiber);
                if let Err(e) = plat.host.commit_work(&self.fibers, fiber, current) {
                    self.attribute_commit_error(plat, fiber, e, first_error, deferred);
                }
            }
        } else if primary.contains(EffectFlags::UPDATE) {
            let current = self.fibers.alternate(fiber);
            if let Err(e) = plat.host.commit_work(&self.fibers, fiber, current) {
                self.attribute_commit_error(plat, fiber, e, first_error, deferred);
            }
        } else if primary.contains(EffectFlags::DELETION) {
            if let Some(focused) = focused
                && !*fired_blur
                && self.fibers.is_alive(focused)
                && self.fibers.fiber_contains(fiber, focused)
            {
                *fired_blur = true;
                plat.host.before_active_instance_blur();
            }

            // Component unmount lifecycles run before the host subtree is
            // detached, so they can still reach their instances.
            let mut buf = UpdateBuffer::new();
            if let Err(e) = plat
                .reconciler
                .commit_deletion(&mut self.fibers, fiber, &mut buf)
            {
                self.attribute_commit_error(plat, fiber, e, first_error, deferred);
            }
            self.drain_deferred(plat, &mut buf, deferred);
            if let Err(e) = plat.host.commit_deletion(&self.fibers, fiber) {
                self.attribute_commit_error(plat, fiber, e, first_error, deferred);
            }
            self.passive_unmounts.push(fiber);

            // Sever the return links so the deleted subtree stops keeping
            // the committed tree reachable.
            self.fibers.set_parent(fiber, None);
            if let Some(alternate) = self.fibers.alternate(fiber) {
                self.fibers.set_parent(alternate, None);
            }
        }
    }

    // -- Passive effects ----------------------------------------------------

    /// Runs all deferred passive effects: queued destroys from the previous
    /// commit first, then queued creates. Returns whether anything ran.
    ///
    /// # Errors
    ///
    /// Same contract as [`commit_root`](Self::commit_root): failures are
    /// attributed per effect, and the first resurfaces after the flush.
    ///
    /// # Panics
    ///
    /// Panics if called from inside the render or commit phase.
    pub fn flush_passive_effects(&mut self, plat: &mut Platform<'_>) -> Result<bool, LoopError> {
        let Some(root) = self.passive_root.take() else {
            return Ok(false);
        };
        let lanes = mem::replace(&mut self.passive_lanes, Lanes::NONE);
        assert!(
            !self
                .execution_context
                .intersects(ExecutionContext::RENDER | ExecutionContext::COMMIT),
            "cannot flush passive effects inside the render or commit phase"
        );

        // Run at or below normal priority, whatever the caller's.
        let prev_priority = self.priority_override;
        let base = self.current_priority(plat);
        self.priority_override = Some(core::cmp::max(base, TaskPriority::Normal));
        let prev_ctx = self.execution_context;
        self.execution_context |= ExecutionContext::COMMIT;

        let unmounts = mem::take(&mut self.passive_unmounts);
        let mounts = mem::take(&mut self.passive_mounts);
        let mut first_error: Option<ErrorId> = None;
        let mut deferred: Option<LoopError> = None;

        for &fiber in &unmounts {
            if !self.fibers.is_alive(fiber) {
                continue;
            }
            let mut buf = UpdateBuffer::new();
            if let Err(e) = plat
                .reconciler
                .commit_passive_unmount(&mut self.fibers, fiber, &mut buf)
            {
                self.attribute_commit_error(plat, fiber, e, &mut first_error, &mut deferred);
            }
            self.drain_deferred(plat, &mut buf, &mut deferred);
        }
        for &fiber in &mounts {
            if !self.fibers.is_alive(fiber) {
                continue;
            }
            let mut buf = UpdateBuffer::new();
            if let Err(e) = plat
                .reconciler
                .commit_passive_mount(&mut self.fibers, fiber, &mut buf)
            {
                self.attribute_commit_error(plat, fiber, e, &mut first_error, &mut deferred);
            }
            self.drain_deferred(plat, &mut buf, &mut deferred);
        }

        self.execution_context = prev_ctx;
        self.priority_override = prev_priority;

        // The committed tree's effect links were retained for this flush;
        // release them now.
        if self.roots.is_alive(root) {
            let current = self.roots.get(root).current;
            if let Some(head) = self.fibers.first_effect(current) {
                self.fibers.sever_effect_chain(head);
            }
            self.fibers.clear_effect_list(current);
        }

        plat.tracer.passive_flushed(PassiveFlushedEvent {
            root,
            lanes,
            unmounts: unmounts.len(),
            mounts: mounts.len(),
        });

        // Effects commonly schedule follow-up state; flush any sync portion
        // before returning to the scheduler.
        let flush_result = self.flush_sync_queue(plat);

        // Cascade accounting: another pending passive root right after a
        // flush means effects are feeding effects.
        if self.passive_root.is_some() {
            self.nested_passive_count += 1;
        } else {
            self.nested_passive_count = 0;
        }

        if let Some(error) = deferred {
            return Err(error);
        }
        flush_result?;
        if let Some(error) = first_error {
            return Err(LoopError::CommitPhase(error));
        }
        Ok(true)
    }

    // -- Commit-phase error capture -----------------------------------------

    /// Attaches a commit-phase error to the nearest class error boundary
    /// above `source`, or to the host root, via a sync-lane update.
    ///
    /// # Errors
    ///
    /// Propagates [`LoopError::NestedUpdateOverflow`] from the scheduled
    /// error update.
    pub fn capture_commit_phase_error(
        &mut self,
        plat: &mut Platform<'_>,
        source: FiberId,
        error: ErrorId,
    ) -> Result<(), LoopError> {
        if !self.fibers.is_alive(source) {
            return Ok(());
        }
        if self.fibers.fiber(source).tag == FiberTag::HostRoot {
            return self.capture_on_root(plat, source, error);
        }

        let mut cursor = self.fibers.parent(source);
        while let Some(fiber) = cursor {
            match self.fibers.fiber(fiber).tag {
                FiberTag::HostRoot => {
                    return self.capture_on_root(plat, fiber, error);
                }
                FiberTag::Class => {
                    let already_failed = self
                        .fibers
                        .fiber(fiber)
                        .state_node
                        .is_some_and(|instance| self.failed_boundaries.contains(&instance));
                    if !already_failed
                        && plat
                            .reconciler
                            .try_capture_error(&mut self.fibers, fiber, source, error)
                    {
                        let event_time = self.request_event_time(plat);
                        return self.schedule_update_on_fiber(plat, fiber, Lane::SYNC, event_time);
                    }
                }
                _ => {}
            }
            cursor = self.fibers.parent(fiber);
        }
        Ok(())
    }

    fn capture_on_root(
        &mut self,
        plat: &mut Platform<'_>,
        root_fiber: FiberId,
        error: ErrorId,
    ) -> Result<(), LoopError> {
        plat.reconciler
            .capture_root_error(&mut self.fibers, root_fiber, error);
        let event_time = self.request_event_time(plat);
        self.schedule_update_on_fiber(plat, root_fiber, Lane::SYNC, event_time)
    }

    // -- Shared guarded-call plumbing ---------------------------------------

    /// Records a guarded sub-step failure: remembers the first error for the
    /// caller's return value and attributes it to the fiber's nearest
    /// boundary.
    pub(crate) fn attribute_commit_error(
        &mut self,
        plat: &mut Platform<'_>,
        fiber: FiberId,
        error: ErrorId,
        first_error: &mut Option<ErrorId>,
        deferred: &mut Option<LoopError>,
    ) {
        if first_error.is_none() {
            *first_error = Some(error);
        }
        if let Err(e) = self.capture_commit_phase_error(plat, fiber, error)
            && deferred.is_none()
        {
            *deferred = Some(e);
        }
    }

    /// Drains a hook's update buffer, deferring (not propagating) any error
    /// so the surrounding phase walk continues.
    pub(crate) fn drain_deferred(
        &mut self,
        plat: &mut Platform<'_>,
        buf: &mut UpdateBuffer,
        deferred: &mut Option<LoopError>,
    ) {
        if let Err(e) = self.drain_buffer(plat, buf)
            && deferred.is_none()
        {
            *deferred = Some(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::LoopError;
    use crate::test_util::{CONCURRENT, HostCall, attach_children, loop_with_root};

    use super::*;

    #[test]
    fn phases_run_in_order_and_swap_buffers() {
        let (mut wl, mut rig, root) = loop_with_root();
        let kids = attach_children(&mut wl, root, 1);
        rig.tree.update_on = kids.clone();
        rig.tree.snapshot_on = kids.clone();
        rig.tree.layout_on = kids.clone();
        rig.tree.passive_on = kids;

        let old_root_fiber = wl.root_fiber(root);
        {
            let mut plat = rig.plat();
            let t = wl.request_event_time(&mut plat);
            wl.schedule_update_on_fiber(&mut plat, old_root_fiber, Lane::SYNC, t)
                .unwrap();
        }

        // Snapshot and layout hooks each ran once, around the mutation.
        assert_eq!(rig.tree.snapshot_log.len(), 1);
        assert_eq!(rig.tree.layout_log.len(), 1);
        let position = |f: fn(&HostCall) -> bool| rig.host.calls.iter().position(|c| f(c));
        let prepare = position(|c| matches!(c, HostCall::Prepare)).unwrap();
        let work = position(|c| matches!(c, HostCall::Work(_))).unwrap();
        let reset = position(|c| matches!(c, HostCall::ResetAfter)).unwrap();
        assert!(prepare < work && work < reset, "host calls follow the phases");
        assert_eq!(rig.sched.paint_requests, 1);

        // The buffer swap installed the work-in-progress root.
        let new_root_fiber = wl.root_fiber(root);
        assert_ne!(new_root_fiber, old_root_fiber);
        assert_eq!(wl.fibers().alternate(new_root_fiber), Some(old_root_fiber));

        // Passive effects were deferred into their own task and run
        // destroys before creates, exactly once.
        assert!(
            rig.sched
                .tasks
                .iter()
                .any(|(_, _, task)| *task == Task::FlushPassive)
        );
        {
            let mut plat = rig.plat();
            assert!(wl.flush_passive_effects(&mut plat).unwrap());
            assert!(!wl.flush_passive_effects(&mut plat).unwrap());
        }
        assert_eq!(rig.tree.passive_unmount_log.len(), 1);
        assert_eq!(rig.tree.passive_mount_log.len(), 1);
    }

    #[test]
    fn guarded_failure_is_attributed_and_the_commit_continues() {
        let (mut wl, mut rig, root) = loop_with_root();
        let root_fiber = wl.root_fiber(root);
        let (boundary, first, second) = {
            let store = wl.fibers_mut();
            let boundary = store.create_fiber(FiberTag::Class, CONCURRENT, None);
            let first = store.create_fiber(FiberTag::Host, CONCURRENT, None);
            let second = store.create_fiber(FiberTag::Host, CONCURRENT, None);
            store.set_child(root_fiber, Some(boundary));
            store.set_parent(boundary, Some(root_fiber));
            store.set_child(boundary, Some(first));
            store.set_parent(first, Some(boundary));
            store.set_sibling(first, Some(second));
            store.set_parent(second, Some(boundary));
            (boundary, first, second)
        };
        rig.tree.update_on = alloc::vec![first, second];
        rig.tree.boundary = Some(boundary);
        rig.host.fail_work_on = Some((first, ErrorId(5)));

        let result = {
            let mut plat = rig.plat();
            let t = wl.request_event_time(&mut plat);
            wl.schedule_update_on_fiber(&mut plat, root_fiber, Lane::SYNC, t)
        };
        // The first effect's failure was attributed; the commit still ran
        // the next effect and reported the error at the end.
        assert_eq!(result, Err(LoopError::CommitPhase(ErrorId(5))));
        assert_eq!(rig.host.count(|c| matches!(c, HostCall::Work(_))), 1);
        assert_eq!(rig.tree.captured.len(), 1);

        // The boundary's error update sits on the sync lane; flushing it
        // commits cleanly.
        assert!(wl.root(root).pending_lanes().contains(Lanes::SYNC));
        {
            let mut plat = rig.plat();
            wl.flush_sync_queue(&mut plat).unwrap();
        }
        assert_eq!(wl.root(root).pending_lanes(), Lanes::NONE);
        assert_eq!(rig.host.count(|c| matches!(c, HostCall::Work(_))), 3);
    }

    #[test]
    fn commit_without_finished_work_is_a_noop() {
        let (mut wl, mut rig, root) = loop_with_root();
        let mut plat = rig.plat();
        wl.commit_root(&mut plat, root).unwrap();
        drop(plat);
        assert!(rig.host.calls.is_empty());
        assert!(rig.tree.layout_log.is_empty());
    }

    #[test]
    fn commit_phase_error_walks_to_the_root_without_a_boundary() {
        let (mut wl, mut rig, root) = loop_with_root();
        let kids = attach_children(&mut wl, root, 1);

        {
            let mut plat = rig.plat();
            wl.capture_commit_phase_error(&mut plat, kids[0], ErrorId(3))
                .unwrap();
        }
        // No class boundary above the child: the root took the error and
        // its sync re-render already flushed.
        assert_eq!(rig.tree.root_errors, [ErrorId(3)]);
        assert!(!rig.tree.begin_log.is_empty());
        assert_eq!(wl.root(root).pending_lanes(), Lanes::NONE);
    }

    #[test]
    fn uncaught_root_error_resurfaces_from_commit() {
        let (mut wl, mut rig, root) = loop_with_root();
        let root_fiber = wl.root_fiber(root);
        wl.note_uncaught_error(ErrorId(9));

        let result = {
            let mut plat = rig.plat();
            let t = wl.request_event_time(&mut plat);
            wl.schedule_update_on_fiber(&mut plat, root_fiber, Lane::SYNC, t)
        };
        assert_eq!(result, Err(LoopError::Uncaught(ErrorId(9))));
        // The commit itself still happened before the rethrow.
        assert_ne!(wl.root_fiber(root), root_fiber);
    }
}
