// Copyright 2026 the Accretion Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The render phase: a restartable, cooperative walk of the
//! work-in-progress tree.
//!
//! Each *unit of work* is one `begin_work` call on a fiber. A unit that
//! produces a child descends; one that does not triggers the complete phase,
//! which walks back up finalizing fibers, bubbling `child_lanes`, and
//! splicing effect lists, until a sibling offers the next unit. The
//! concurrent loop polls [`TaskScheduler::should_yield`] between units and
//! can park the whole walk in [`WorkLoop::work_in_progress`] to be resumed
//! by a later task.
//!
//! Thrown values arrive as [`WorkStep::Suspend`]/[`WorkStep::Fault`] tags
//! rather than unwinding: the loop marks the source fiber incomplete, lets
//! the component layer attach the value to a boundary, and then completes
//! the erroring unit, which unwinds to the boundary.
//!
//! [`TaskScheduler::should_yield`]: crate::sched::TaskScheduler::should_yield

use crate::error::LoopError;
use crate::fiber::{EffectFlags, FiberId};
use crate::lane::Lanes;
use crate::reconciler::{Thrown, ThrowOutcome, UpdateBuffer, WorkStep};
use crate::root::RootId;
use crate::time::Duration;
use crate::trace::{
    CommitDeferredEvent, RenderFinishedEvent, RenderStartedEvent, RenderYieldedEvent,
};
use crate::work_loop::{ExecutionContext, ExitStatus, Platform, WorkLoop, WorkStatus};

impl WorkLoop {
    // -- Entry points -------------------------------------------------------

    /// Renders and commits `root` synchronously, without yielding.
    ///
    /// Suspended renders commit their fallbacks immediately; only a fatal
    /// error (or a nested-update overflow) aborts.
    ///
    /// # Errors
    ///
    /// See [`LoopError`].
    ///
    /// # Panics
    ///
    /// Panics if called from inside the render or commit phase.
    pub fn perform_sync_work_on_root(
        &mut self,
        plat: &mut Platform<'_>,
        root: RootId,
    ) -> Result<(), LoopError> {
        assert!(
            !self
                .execution_context
                .intersects(ExecutionContext::RENDER | ExecutionContext::COMMIT),
            "sync work cannot start inside the render or commit phase"
        );
        self.flush_passive_effects(plat)?;

        let mut lanes = if self.wip_root == Some(root)
            && self
                .roots
                .get(root)
                .expired_lanes()
                .intersects(self.wip_render_lanes)
        {
            // A partial render's lanes expired; finish that render
            // synchronously rather than restarting.
            self.wip_render_lanes
        } else {
            self.roots.get(root).next_lanes(Lanes::NONE)
        };
        if lanes.is_empty() {
            self.ensure_root_is_scheduled(plat, root);
            return Ok(());
        }

        let mut exit = self.render_root_sync(plat, root, lanes)?;

        if exit != ExitStatus::FatalErrored && lanes.intersects(self.wip_updated_lanes) {
            // Updates interleaved with the render; re-render so the commit
            // includes them.
            lanes = self.roots.get(root).next_lanes(lanes);
            exit = self.render_root_sync(plat, root, lanes)?;
        }

        if exit == ExitStatus::Errored {
            let retry = self.lanes_to_retry_synchronously_on_error(root);
            if !retry.is_empty() {
                lanes = retry;
                exit = self.render_root_sync(plat, root, retry)?;
            }
        }

        if exit == ExitStatus::FatalErrored {
            let error = self
                .wip_fatal_error
                .take()
                .expect("fatal exit records its error");
            self.prepare_fresh_stack(plat, root, Lanes::NONE);
            self.roots.get_mut(root).mark_suspended(lanes);
            self.ensure_root_is_scheduled(plat, root);
            return Err(LoopError::FatalRender(error));
        }

        if matches!(
            exit,
            ExitStatus::Suspended | ExitStatus::SuspendedWithDelay
        ) {
            // A synchronous render commits its fallbacks immediately.
            self.last_fallback_time = plat.scheduler.now();
        }
        {
            let finished = self.fibers.alternate(self.roots.get(root).current);
            let state = self.roots.get_mut(root);
            state.finished_work = finished;
            state.finished_lanes = lanes;
        }
        self.commit_root(plat, root)?;
        self.ensure_root_is_scheduled(plat, root);
        Ok(())
    }

    /// Runs (or resumes) a concurrent render task for `root`.
    ///
    /// `did_timeout` is the scheduler's report that the task is overdue; it
    /// expires the lanes so they re-render synchronously.
    ///
    /// # Errors
    ///
    /// See [`LoopError`].
    ///
    /// # Panics
    ///
    /// Panics if called from inside the render or commit phase.
    pub fn perform_concurrent_work_on_root(
        &mut self,
        plat: &mut Platform<'_>,
        root: RootId,
        did_timeout: bool,
    ) -> Result<WorkStatus, LoopError> {
        // A scheduler task is a new host task: the per-event caches are gone.
        self.current_event_time = None;
        self.current_event_wip_lanes = Lanes::NONE;
        self.current_event_pending_lanes = Lanes::NONE;

        assert!(
            !self
                .execution_context
                .intersects(ExecutionContext::RENDER | ExecutionContext::COMMIT),
            "concurrent work cannot start inside the render or commit phase"
        );

        let original = self.roots.get(root).callback_handle;
        self.flush_passive_effects(plat)?;
        if self.roots.get(root).callback_handle != original {
            // Passive effects scheduled higher-priority work and rebound the
            // root; this task is obsolete.
            return Ok(WorkStatus::Done);
        }

        let wip_lanes = if self.wip_root == Some(root) {
            self.wip_render_lanes
        } else {
            Lanes::NONE
        };
        let now = plat.scheduler.now();
        let config = self.config;
        let lanes = {
            let state = self.roots.get_mut(root);
            state.mark_starved_lanes_expired(now, &config);
            state.next_lanes(wip_lanes)
        };
        if lanes.is_empty() {
            let state = self.roots.get_mut(root);
            state.callback_handle = None;
            state.callback_lanes = Lanes::NONE;
            state.callback_is_sync = false;
            return Ok(WorkStatus::Done);
        }

        if did_timeout || lanes.intersects(self.roots.get(root).expired_lanes()) {
            // Overdue: downgrade to a synchronous render on the next turn.
            self.roots.get_mut(root).mark_expired(lanes);
            self.ensure_root_is_scheduled(plat, root);
            return Ok(WorkStatus::Done);
        }

        let mut exit = self.render_root_concurrent(plat, root, lanes)?;

        if exit == ExitStatus::Incomplete {
            // Yielded; the same task continues later.
            return Ok(WorkStatus::Yielded);
        }

        if exit != ExitStatus::FatalErrored && lanes.intersects(self.wip_updated_lanes) {
            // Updates interleaved with this render; the tree it built is
            // stale. Throw it away and let the next task start over.
            self.prepare_fresh_stack(plat, root, Lanes::NONE);
        } else {
            let mut lanes = lanes;
            if exit == ExitStatus::Errored {
                // Give error boundaries a second, synchronous attempt.
                let retry = self.lanes_to_retry_synchronously_on_error(root);
                if !retry.is_empty() {
                    lanes = retry;
                    exit = self.render_root_sync(plat, root, retry)?;
                }
            }

            if exit == ExitStatus::FatalErrored {
                let error = self
                    .wip_fatal_error
                    .take()
                    .expect("fatal exit records its error");
                self.prepare_fresh_stack(plat, root, Lanes::NONE);
                self.roots.get_mut(root).mark_suspended(lanes);
                self.ensure_root_is_scheduled(plat, root);
                return Err(LoopError::FatalRender(error));
            }

            {
                let finished = self.fibers.alternate(self.roots.get(root).current);
                let state = self.roots.get_mut(root);
                state.finished_work = finished;
                state.finished_lanes = lanes;
            }
            self.finish_concurrent_render(plat, root, lanes, exit)?;
        }

        self.ensure_root_is_scheduled(plat, root);
        if original.is_some() && self.roots.get(root).callback_handle == original {
            // Same binding: continue on this task.
            Ok(WorkStatus::Yielded)
        } else {
            Ok(WorkStatus::Done)
        }
    }

    /// Host timer callback for a commit that was deferred by
    /// [`finish_concurrent_render`](Self::finish_concurrent_render)'s
    /// suspense policy.
    ///
    /// # Errors
    ///
    /// See [`LoopError`].
    pub fn on_commit_timeout(
        &mut self,
        plat: &mut Platform<'_>,
        root: RootId,
    ) -> Result<(), LoopError> {
        self.roots.get_mut(root).timeout_handle = crate::host::TimeoutHandle::NONE;
        self.commit_root(plat, root)
    }

    // -- Fresh stack --------------------------------------------------------

    /// Resets the work loop to start rendering `root` at `lanes` from the
    /// top: cancels any pending delayed commit, unwinds the interrupted
    /// fiber stack, creates a fresh work-in-progress root, and clears every
    /// per-render scratch field.
    pub(crate) fn prepare_fresh_stack(
        &mut self,
        plat: &mut Platform<'_>,
        root: RootId,
        lanes: Lanes,
    ) {
        {
            let state = self.roots.get_mut(root);
            state.finished_work = None;
            state.finished_lanes = Lanes::NONE;
            let timeout = state.timeout_handle;
            if timeout.is_some() {
                state.timeout_handle = crate::host::TimeoutHandle::NONE;
                plat.host.cancel_timeout(timeout);
            }
        }

        if let Some(wip) = self.wip {
            // Pop the side stacks of everything between the paused unit and
            // the root.
            let mut cursor = self.fibers.parent(wip);
            while let Some(fiber) = cursor {
                plat.reconciler.unwind_interrupted_work(&mut self.fibers, fiber);
                cursor = self.fibers.parent(fiber);
            }
        }

        let current = self.roots.get(root).current;
        let wip_root_fiber = self.fibers.create_work_in_progress(current, None);
        self.wip_root = Some(root);
        self.wip = Some(wip_root_fiber);
        self.wip_root_fiber = Some(wip_root_fiber);
        self.wip_render_lanes = lanes;
        self.wip_exit_status = ExitStatus::Incomplete;
        self.wip_fatal_error = None;
        self.wip_latest_event_time = None;
        self.wip_latest_suspense_timeout = None;
        self.wip_suspense_config = None;
        self.wip_skipped_lanes = Lanes::NONE;
        self.wip_updated_lanes = Lanes::NONE;
        self.wip_pinged_lanes = Lanes::NONE;
    }

    // -- Render loops -------------------------------------------------------

    fn render_root_sync(
        &mut self,
        plat: &mut Platform<'_>,
        root: RootId,
        lanes: Lanes,
    ) -> Result<ExitStatus, LoopError> {
        let prev = self.execution_context;
        self.execution_context |= ExecutionContext::RENDER;

        if self.wip_root != Some(root) || self.wip_render_lanes != lanes {
            self.prepare_fresh_stack(plat, root, lanes);
            plat.tracer.render_started(RenderStartedEvent { root, lanes });
        }

        let mut result = Ok(());
        while self.wip.is_some() {
            if let Err(e) = self.work_step(plat, root) {
                result = Err(e);
                break;
            }
        }
        self.execution_context = prev;
        result?;

        let exit = self.wip_exit_status;
        plat.tracer.render_finished(RenderFinishedEvent { root, lanes, exit });
        self.wip_root = None;
        self.wip_render_lanes = Lanes::NONE;
        Ok(exit)
    }

    fn render_root_concurrent(
        &mut self,
        plat: &mut Platform<'_>,
        root: RootId,
        lanes: Lanes,
    ) -> Result<ExitStatus, LoopError> {
        let prev = self.execution_context;
        self.execution_context |= ExecutionContext::RENDER;

        if self.wip_root != Some(root) || self.wip_render_lanes != lanes {
            self.prepare_fresh_stack(plat, root, lanes);
            plat.tracer.render_started(RenderStartedEvent { root, lanes });
        }

        let mut result = Ok(());
        while self.wip.is_some() {
            if plat.scheduler.should_yield() {
                break;
            }
            if let Err(e) = self.work_step(plat, root) {
                result = Err(e);
                break;
            }
        }
        self.execution_context = prev;
        result?;

        if self.wip.is_some() {
            plat.tracer.render_yielded(RenderYieldedEvent { root });
            Ok(ExitStatus::Incomplete)
        } else {
            let exit = self.wip_exit_status;
            plat.tracer.render_finished(RenderFinishedEvent { root, lanes, exit });
            self.wip_root = None;
            self.wip_render_lanes = Lanes::NONE;
            Ok(exit)
        }
    }

    /// Performs one unit of work: `begin_work` on the current fiber, then
    /// either descend, complete, or route a thrown value.
    fn work_step(&mut self, plat: &mut Platform<'_>, root: RootId) -> Result<(), LoopError> {
        let unit = self.wip.expect("work_step requires a unit");
        let current = self.fibers.alternate(unit);
        let mut buf = UpdateBuffer::new();
        let step = plat.reconciler.begin_work(
            &mut self.fibers,
            current,
            unit,
            self.wip_render_lanes,
            &mut buf,
        );
        self.drain_buffer(plat, &mut buf)?;
        match step {
            WorkStep::ContinueWith(next) => {
                let fiber = self.fibers.fiber_mut(unit);
                fiber.memoized_props = fiber.pending_props;
                self.wip = Some(next);
            }
            WorkStep::Done => {
                let fiber = self.fibers.fiber_mut(unit);
                fiber.memoized_props = fiber.pending_props;
                self.complete_unit_of_work(plat, root, unit)?;
            }
            WorkStep::Suspend(wakeable) => {
                self.handle_thrown(plat, root, unit, Thrown::Wakeable(wakeable))?;
            }
            WorkStep::Fault(error) => {
                self.handle_thrown(plat, root, unit, Thrown::Error(error))?;
            }
        }
        Ok(())
    }

    /// Walks upward from a fiber whose begin phase produced no child,
    /// finalizing each completed fiber and unwinding incomplete ones.
    fn complete_unit_of_work(
        &mut self,
        plat: &mut Platform<'_>,
        root: RootId,
        from: FiberId,
    ) -> Result<(), LoopError> {
        let mut completed = from;
        loop {
            let current = self.fibers.alternate(completed);
            let parent = self.fibers.parent(completed);

            if !self
                .fibers
                .fiber(completed)
                .flags
                .contains(EffectFlags::INCOMPLETE)
            {
                let step = plat.reconciler.complete_work(
                    &mut self.fibers,
                    current,
                    completed,
                    self.wip_render_lanes,
                );
                match step {
                    WorkStep::Done => {}
                    WorkStep::ContinueWith(next) => {
                        // Completing this fiber spawned new work (e.g. a
                        // fallback subtree); resume the begin phase there.
                        self.wip = Some(next);
                        return Ok(());
                    }
                    WorkStep::Suspend(wakeable) => {
                        return self.handle_thrown(
                            plat,
                            root,
                            completed,
                            Thrown::Wakeable(wakeable),
                        );
                    }
                    WorkStep::Fault(error) => {
                        return self.handle_thrown(plat, root, completed, Thrown::Error(error));
                    }
                }

                self.fibers.bubble_child_lanes(completed);

                if let Some(parent) = parent
                    && !self
                        .fibers
                        .fiber(parent)
                        .flags
                        .contains(EffectFlags::INCOMPLETE)
                {
                    self.fibers.append_subtree_effects(parent, completed);
                    if self.fibers.fiber(completed).flags.is_effectful() {
                        self.fibers.append_self_effect(parent, completed);
                    }
                }
            } else {
                // This fiber did not finish. Pop its context; a boundary
                // that captured the thrown value restarts the begin phase
                // on itself with commit-safe flags only.
                let next =
                    plat.reconciler
                        .unwind_work(&mut self.fibers, completed, self.wip_render_lanes);
                if let Some(boundary) = next {
                    let fiber = self.fibers.fiber_mut(boundary);
                    fiber.flags &= EffectFlags::HOST_MASK;
                    self.wip = Some(boundary);
                    return Ok(());
                }

                if let Some(parent) = parent {
                    // Propagate incompleteness; the parent's effects are
                    // invalid too.
                    self.fibers.clear_effect_list(parent);
                    self.fibers.fiber_mut(parent).flags |= EffectFlags::INCOMPLETE;
                }
            }

            if let Some(sibling) = self.fibers.sibling(completed) {
                self.wip = Some(sibling);
                return Ok(());
            }
            match parent {
                Some(parent) => {
                    self.wip = Some(parent);
                    completed = parent;
                }
                None => break,
            }
        }

        // Reached the root with nothing left to do.
        if self.wip_exit_status == ExitStatus::Incomplete {
            self.wip_exit_status = ExitStatus::Completed;
        }
        self.wip = None;
        Ok(())
    }

    // -- Thrown values ------------------------------------------------------

    /// Routes a value thrown by a begin or complete step: marks the source
    /// incomplete, lets the component layer attach it to a boundary,
    /// records suspension state, and unwinds by completing the source.
    fn handle_thrown(
        &mut self,
        plat: &mut Platform<'_>,
        root: RootId,
        source: FiberId,
        value: Thrown,
    ) -> Result<(), LoopError> {
        let root_fiber = self.wip_root_fiber.expect("render in progress");
        let return_fiber = self.fibers.parent(source);

        self.fibers.fiber_mut(source).flags |= EffectFlags::INCOMPLETE;
        self.fibers.clear_effect_list(source);

        let mut buf = UpdateBuffer::new();
        let outcome = plat.reconciler.throw_exception(
            &mut self.fibers,
            root_fiber,
            return_fiber,
            source,
            value,
            self.wip_render_lanes,
            &mut buf,
        );
        match outcome {
            Ok(ThrowOutcome::Suspended { delay_possible }) => {
                if let Thrown::Wakeable(wakeable) = value {
                    let lanes = self.wip_render_lanes;
                    self.attach_ping_listener(plat, root, wakeable, lanes);
                }
                if delay_possible {
                    self.render_did_suspend_delay_if_possible(root);
                } else {
                    self.render_did_suspend();
                }
            }
            Ok(ThrowOutcome::ErrorCaptured) => self.render_did_error(),
            Err(error) => {
                // Handling the thrown value threw. Abandon the render; the
                // caller resets the stack and reports the fatal error.
                self.wip_exit_status = ExitStatus::FatalErrored;
                self.wip_fatal_error = Some(error);
                self.wip = None;
                return Ok(());
            }
        }
        self.drain_buffer(plat, &mut buf)?;
        self.complete_unit_of_work(plat, root, source)
    }

    fn render_did_suspend(&mut self) {
        if self.wip_exit_status == ExitStatus::Incomplete {
            self.wip_exit_status = ExitStatus::Suspended;
        }
    }

    fn render_did_suspend_delay_if_possible(&mut self, root: RootId) {
        if matches!(
            self.wip_exit_status,
            ExitStatus::Incomplete | ExitStatus::Suspended
        ) {
            self.wip_exit_status = ExitStatus::SuspendedWithDelay;
        }
        if self.wip_skipped_lanes.intersects(Lanes::NON_IDLE)
            || self.wip_updated_lanes.intersects(Lanes::NON_IDLE)
        {
            // The render left work behind; suspend its lanes on the root now
            // so the next selection interleaves that work instead of waiting.
            let lanes = self.wip_render_lanes;
            self.mark_root_suspended_filtered(root, lanes);
        }
    }

    fn render_did_error(&mut self) {
        if !matches!(
            self.wip_exit_status,
            ExitStatus::Completed | ExitStatus::FatalErrored
        ) {
            self.wip_exit_status = ExitStatus::Errored;
        }
    }

    fn lanes_to_retry_synchronously_on_error(&self, root: RootId) -> Lanes {
        self.roots.get(root).pending_lanes().minus(Lanes::OFFSCREEN)
    }

    // -- Post-render policy -------------------------------------------------

    /// Decides what to do with a finished concurrent render: commit now,
    /// commit after a delay, or park the lanes as suspended.
    fn finish_concurrent_render(
        &mut self,
        plat: &mut Platform<'_>,
        root: RootId,
        lanes: Lanes,
        exit: ExitStatus,
    ) -> Result<(), LoopError> {
        match exit {
            ExitStatus::Incomplete | ExitStatus::FatalErrored => {
                unreachable!("finish_concurrent_render requires a finished render")
            }

            // The error boundary attempt already re-rendered synchronously;
            // commit whatever it produced.
            ExitStatus::Errored => self.commit_root(plat, root),

            ExitStatus::Completed => {
                let now = plat.scheduler.now();
                if let (Some(config), Some(event_time)) =
                    (self.wip_suspense_config, self.wip_latest_event_time)
                    && config.busy_min_duration_ms > 0
                {
                    // The transition promised to keep showing the previous
                    // state for a minimum duration once it was busy longer
                    // than the delay threshold.
                    let elapsed = now.saturating_duration_since(event_time).millis();
                    if elapsed >= config.busy_delay_ms {
                        let wait = (config.busy_delay_ms + config.busy_min_duration_ms)
                            .saturating_sub(elapsed);
                        if wait > 10 {
                            self.mark_root_suspended_filtered(root, lanes);
                            let delay = Duration::from_millis(wait);
                            let handle = plat.host.schedule_timeout(root, delay);
                            self.roots.get_mut(root).timeout_handle = handle;
                            plat.tracer.commit_deferred(CommitDeferredEvent { root, delay });
                            return Ok(());
                        }
                    }
                }
                self.commit_root(plat, root)
            }

            ExitStatus::Suspended => {
                self.mark_root_suspended_filtered(root, lanes);
                let now = plat.scheduler.now();

                // Only throttle when the render processed no updates: a
                // retry of an already-shown fallback. Back-to-back fallback
                // flashes are worse than a short wait.
                if self.wip_latest_event_time.is_none() {
                    let next_deadline = self
                        .last_fallback_time
                        .saturating_add(Duration::from_millis(self.config.fallback_throttle_ms));
                    let wait = next_deadline.saturating_duration_since(now);
                    if wait.millis() > 10 {
                        if !self.roots.get(root).next_lanes(Lanes::NONE).is_empty() {
                            // Other work is pending; render that first and
                            // leave this commit parked.
                            return Ok(());
                        }
                        let suspended = self.roots.get(root).suspended_lanes();
                        if !lanes.contains(suspended) {
                            // Lower-priority suspended lanes exist; ping them
                            // so they retry instead of sitting out the wait.
                            self.roots.get_mut(root).mark_pinged(suspended);
                            return Ok(());
                        }
                        let handle = plat.host.schedule_timeout(root, wait);
                        self.roots.get_mut(root).timeout_handle = handle;
                        plat.tracer
                            .commit_deferred(CommitDeferredEvent { root, delay: wait });
                        return Ok(());
                    }
                }
                self.last_fallback_time = now;
                self.commit_root(plat, root)
            }

            ExitStatus::SuspendedWithDelay => {
                self.mark_root_suspended_filtered(root, lanes);
                let now = plat.scheduler.now();

                if !self.roots.get(root).next_lanes(Lanes::NONE).is_empty() {
                    return Ok(());
                }
                let suspended = self.roots.get(root).suspended_lanes();
                if !lanes.contains(suspended) {
                    self.roots.get_mut(root).mark_pinged(suspended);
                    return Ok(());
                }

                // How long may the previous content stay up before the
                // fallback must show? An explicit suspense timeout wins;
                // otherwise use a just-noticeable-difference step so brief
                // loading states are invisible.
                let wait = if let Some(deadline) = self.wip_latest_suspense_timeout {
                    deadline.saturating_duration_since(now)
                } else if let Some(event_time) = self.wip_latest_event_time {
                    let elapsed = now.saturating_duration_since(event_time).millis();
                    Duration::from_millis(
                        crate::suspense::jnd_timeout_ms(elapsed).saturating_sub(elapsed),
                    )
                } else {
                    Duration::ZERO
                };
                if wait.millis() > 10 {
                    let handle = plat.host.schedule_timeout(root, wait);
                    self.roots.get_mut(root).timeout_handle = handle;
                    plat.tracer
                        .commit_deferred(CommitDeferredEvent { root, delay: wait });
                    return Ok(());
                }
                self.last_fallback_time = now;
                self.commit_root(plat, root)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::fiber::FiberTag;
    use crate::lane::Lane;
    use crate::reconciler::{ErrorId, WakeableId};
    use crate::test_util::{CONCURRENT, HostCall, attach_children, loop_with_root};

    use super::*;

    fn lane(bits: u32) -> Lane {
        Lane::from_bits(bits).unwrap()
    }

    #[test]
    fn sync_render_completes_depth_first_and_commits() {
        let (mut wl, mut rig, root) = loop_with_root();
        let kids = attach_children(&mut wl, root, 2);
        rig.tree.update_on = kids;

        let root_fiber = wl.root_fiber(root);
        {
            let mut plat = rig.plat();
            let t = wl.request_event_time(&mut plat);
            wl.schedule_update_on_fiber(&mut plat, root_fiber, Lane::SYNC, t)
                .unwrap();
        }

        // Root, then both children, each begun once; the root completes last.
        assert_eq!(rig.tree.begin_log.len(), 3);
        assert_eq!(rig.tree.complete_log.len(), 3);
        assert_eq!(rig.tree.complete_log[2], rig.tree.begin_log[0]);
        assert_eq!(wl.render_exit_status(), ExitStatus::Completed);

        // Both updated children committed inside one prepare/reset pair.
        assert_eq!(rig.host.count(|c| matches!(c, HostCall::Work(_))), 2);
        assert_eq!(rig.host.calls.first(), Some(&HostCall::Prepare));
        assert!(rig.host.calls.contains(&HostCall::ResetAfter));
        assert_eq!(wl.root(root).pending_lanes(), Lanes::NONE);
    }

    #[test]
    fn concurrent_render_yields_between_units_and_resumes() {
        let (mut wl, mut rig, root) = loop_with_root();
        attach_children(&mut wl, root, 2);
        let root_fiber = wl.root_fiber(root);
        {
            let mut plat = rig.plat();
            let t = wl.request_event_time(&mut plat);
            wl.schedule_update_on_fiber(&mut plat, root_fiber, lane(0x40), t)
                .unwrap();
        }

        rig.sched.yield_after(2);
        let status = {
            let mut plat = rig.plat();
            wl.perform_concurrent_work_on_root(&mut plat, root, false).unwrap()
        };
        assert_eq!(status, WorkStatus::Yielded);
        assert_eq!(rig.tree.begin_log.len(), 2, "two units before the yield");
        assert!(wl.work_in_progress().is_some(), "the walk parks mid-tree");

        rig.sched.clear_yield();
        let status = {
            let mut plat = rig.plat();
            wl.perform_concurrent_work_on_root(&mut plat, root, false).unwrap()
        };
        assert_eq!(status, WorkStatus::Done);
        assert_eq!(
            rig.tree.begin_log.len(),
            3,
            "the continuation does not re-enter completed units"
        );
        assert_eq!(wl.root(root).pending_lanes(), Lanes::NONE);
    }

    #[test]
    fn suspension_unwinds_to_boundary_and_defers_commit() {
        let (mut wl, mut rig, root) = loop_with_root();
        let root_fiber = wl.root_fiber(root);
        let (boundary, leaf) = {
            let store = wl.fibers_mut();
            let boundary = store.create_fiber(FiberTag::Suspense, CONCURRENT, None);
            let leaf = store.create_fiber(FiberTag::Host, CONCURRENT, None);
            store.set_child(root_fiber, Some(boundary));
            store.set_parent(boundary, Some(root_fiber));
            store.set_child(boundary, Some(leaf));
            store.set_parent(leaf, Some(boundary));
            (boundary, leaf)
        };
        rig.tree.suspend_on = Some((leaf, WakeableId(7)));
        rig.tree.boundary = Some(boundary);

        {
            let mut plat = rig.plat();
            let t = wl.request_event_time(&mut plat);
            wl.schedule_update_on_fiber(&mut plat, root_fiber, lane(0x100), t)
                .unwrap();
        }
        let status = {
            let mut plat = rig.plat();
            wl.perform_concurrent_work_on_root(&mut plat, root, false).unwrap()
        };
        assert_eq!(status, WorkStatus::Done);

        // The boundary captured and re-rendered as a fallback.
        let boundary_wip = wl.fibers().alternate(boundary).unwrap();
        let boundary_begins = rig
            .tree
            .begin_log
            .iter()
            .filter(|f| **f == boundary_wip)
            .count();
        assert_eq!(boundary_begins, 2);

        // Lanes parked, wakeable subscribed, commit waiting out the
        // fallback throttle; nothing reached the host.
        assert_eq!(wl.root(root).suspended_lanes(), Lanes::from_bits(0x100));
        assert_eq!(wl.root(root).pending_lanes(), Lanes::from_bits(0x100));
        assert_eq!(rig.tree.pings, [WakeableId(7)]);
        assert!(rig.host.calls.contains(&HostCall::Timeout(500)));
        assert_eq!(rig.host.count(|c| matches!(c, HostCall::Prepare)), 0);
    }

    #[test]
    fn errored_render_retries_synchronously_once() {
        let (mut wl, mut rig, root) = loop_with_root();
        let root_fiber = wl.root_fiber(root);
        let (boundary, leaf) = {
            let store = wl.fibers_mut();
            let boundary = store.create_fiber(FiberTag::Class, CONCURRENT, None);
            let leaf = store.create_fiber(FiberTag::Host, CONCURRENT, None);
            store.set_child(root_fiber, Some(boundary));
            store.set_parent(boundary, Some(root_fiber));
            store.set_child(boundary, Some(leaf));
            store.set_parent(leaf, Some(boundary));
            (boundary, leaf)
        };
        rig.tree.fault_on = Some((leaf, ErrorId(3)));
        rig.tree.boundary = Some(boundary);

        {
            let mut plat = rig.plat();
            let t = wl.request_event_time(&mut plat);
            wl.schedule_update_on_fiber(&mut plat, root_fiber, lane(0x80), t)
                .unwrap();
        }
        let status = {
            let mut plat = rig.plat();
            wl.perform_concurrent_work_on_root(&mut plat, root, false).unwrap()
        };
        assert_eq!(status, WorkStatus::Done);

        // First pass: root, boundary, leaf (faults), boundary again as the
        // error UI. Retry pass: all three, clean.
        assert_eq!(rig.tree.begin_log.len(), 7);
        assert_eq!(rig.tree.captured.len(), 1, "the boundary captured once");
        assert_eq!(wl.root(root).pending_lanes(), Lanes::NONE);
    }

    #[test]
    fn failing_throw_handler_escalates_to_fatal() {
        let (mut wl, mut rig, root) = loop_with_root();
        let root_fiber = wl.root_fiber(root);
        attach_children(&mut wl, root, 1);
        let leaf = wl.fibers().child(root_fiber).unwrap();
        rig.tree.fault_on = Some((leaf, ErrorId(9)));
        rig.tree.fail_throw = true;

        {
            let mut plat = rig.plat();
            let t = wl.request_event_time(&mut plat);
            wl.schedule_update_on_fiber(&mut plat, root_fiber, lane(0x80), t)
                .unwrap();
        }
        let result = {
            let mut plat = rig.plat();
            wl.perform_concurrent_work_on_root(&mut plat, root, false)
        };
        assert_eq!(result, Err(LoopError::FatalRender(ErrorId(9))));

        // The render was discarded with its lanes parked; nothing committed.
        assert_eq!(wl.root(root).suspended_lanes(), Lanes::from_bits(0x80));
        assert_eq!(rig.host.count(|c| matches!(c, HostCall::Prepare)), 0);
    }

    #[test]
    fn interleaved_update_discards_the_finished_render() {
        let (mut wl, mut rig, root) = loop_with_root();
        let root_fiber = wl.root_fiber(root);
        rig.tree.schedule_in_begin = Some((root_fiber, lane(0x40)));

        {
            let mut plat = rig.plat();
            let t = wl.request_event_time(&mut plat);
            wl.schedule_update_on_fiber(&mut plat, root_fiber, lane(0x40), t)
                .unwrap();
        }
        let status = {
            let mut plat = rig.plat();
            wl.perform_concurrent_work_on_root(&mut plat, root, false).unwrap()
        };

        // The finished tree is stale; it is dropped, the work stays
        // pending, and the same task continues.
        assert_eq!(status, WorkStatus::Yielded);
        assert_eq!(rig.host.count(|c| matches!(c, HostCall::Prepare)), 0);
        assert!(wl.work_in_progress().is_some(), "a fresh stack is prepared");
        assert!(wl.root(root).pending_lanes().contains(Lanes::from_bits(0x40)));
    }
}
