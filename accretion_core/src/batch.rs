// Copyright 2026 the Accretion Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Batching and execution-context wrappers.
//!
//! Each wrapper pushes a bit onto the execution-context mask, runs the
//! caller's closure (under an overridden scheduler priority where the
//! semantics require one), restores the mask, and — when it was the
//! outermost frame — flushes the synchronous callback queue. Nesting is
//! free: only the outermost wrapper triggers a flush.

use alloc::vec::Vec;
use core::mem;

use crate::error::LoopError;
use crate::lane::Lanes;
use crate::root::RootId;
use crate::sched::TaskPriority;
use crate::work_loop::{ExecutionContext, Platform, WorkLoop};

impl WorkLoop {
    /// Runs `f` with sync flushes deferred to the end of the outermost
    /// batch.
    ///
    /// # Errors
    ///
    /// Propagates [`LoopError`] from the trailing sync flush.
    pub fn batched_updates<T>(
        &mut self,
        plat: &mut Platform<'_>,
        f: impl FnOnce(&mut Self, &mut Platform<'_>) -> T,
    ) -> Result<T, LoopError> {
        let prev = self.execution_context;
        self.execution_context |= ExecutionContext::BATCHED;
        let value = f(self, plat);
        self.execution_context = prev;
        if self.execution_context.is_empty() {
            self.flush_sync_queue(plat)?;
        }
        Ok(value)
    }

    /// Like [`batched_updates`](Self::batched_updates), marking the frame
    /// as a host event handler.
    ///
    /// # Errors
    ///
    /// Propagates [`LoopError`] from the trailing sync flush.
    pub fn batched_event_updates<T>(
        &mut self,
        plat: &mut Platform<'_>,
        f: impl FnOnce(&mut Self, &mut Platform<'_>) -> T,
    ) -> Result<T, LoopError> {
        let prev = self.execution_context;
        self.execution_context |= ExecutionContext::EVENT;
        let value = f(self, plat);
        self.execution_context = prev;
        if self.execution_context.is_empty() {
            self.flush_sync_queue(plat)?;
        }
        Ok(value)
    }

    /// Runs a discrete-event handler: user-blocking priority, with updates
    /// recorded so [`flush_discrete_updates`](Self::flush_discrete_updates)
    /// can promote them before the event returns.
    ///
    /// # Errors
    ///
    /// Propagates [`LoopError`] from the trailing sync flush.
    pub fn discrete_updates<T>(
        &mut self,
        plat: &mut Platform<'_>,
        f: impl FnOnce(&mut Self, &mut Platform<'_>) -> T,
    ) -> Result<T, LoopError> {
        let prev = self.execution_context;
        self.execution_context |= ExecutionContext::EVENT | ExecutionContext::DISCRETE_EVENT;
        let prev_priority = self.priority_override;
        self.priority_override = Some(TaskPriority::UserBlocking);
        let value = f(self, plat);
        self.priority_override = prev_priority;
        self.execution_context = prev;
        if self.execution_context.is_empty() {
            self.flush_sync_queue(plat)?;
        }
        Ok(value)
    }

    /// Runs `f` outside any batch, as a legacy synchronous mount: sync
    /// updates inside it render inline rather than queueing.
    ///
    /// # Errors
    ///
    /// Propagates [`LoopError`] from the trailing sync flush.
    pub fn unbatched_updates<T>(
        &mut self,
        plat: &mut Platform<'_>,
        f: impl FnOnce(&mut Self, &mut Platform<'_>) -> T,
    ) -> Result<T, LoopError> {
        let prev = self.execution_context;
        self.execution_context &= !ExecutionContext::BATCHED;
        self.execution_context |= ExecutionContext::LEGACY_UNBATCHED;
        let value = f(self, plat);
        self.execution_context = prev;
        if self.execution_context.is_empty() {
            self.flush_sync_queue(plat)?;
        }
        Ok(value)
    }

    /// Runs `f` at immediate priority and synchronously flushes the work it
    /// scheduled before returning.
    ///
    /// Calling this from inside the render or commit phase cannot flush;
    /// the closure still runs, a warning is traced, and no flush happens.
    ///
    /// # Errors
    ///
    /// Propagates [`LoopError`] from the flush.
    pub fn flush_sync<T>(
        &mut self,
        plat: &mut Platform<'_>,
        f: impl FnOnce(&mut Self, &mut Platform<'_>) -> T,
    ) -> Result<T, LoopError> {
        if self
            .execution_context
            .intersects(ExecutionContext::RENDER | ExecutionContext::COMMIT)
        {
            plat.tracer.sync_flush_in_render();
            return Ok(f(self, plat));
        }
        let prev = self.execution_context;
        self.execution_context |= ExecutionContext::BATCHED;
        let prev_priority = self.priority_override;
        self.priority_override = Some(TaskPriority::Immediate);
        let value = f(self, plat);
        self.priority_override = prev_priority;
        self.execution_context = prev;
        self.flush_sync_queue(plat)?;
        Ok(value)
    }

    /// Runs `f` batched at immediate priority; flushes only when outermost.
    ///
    /// # Errors
    ///
    /// Propagates [`LoopError`] from the trailing sync flush.
    pub fn flush_controlled<T>(
        &mut self,
        plat: &mut Platform<'_>,
        f: impl FnOnce(&mut Self, &mut Platform<'_>) -> T,
    ) -> Result<T, LoopError> {
        let prev = self.execution_context;
        self.execution_context |= ExecutionContext::BATCHED;
        let prev_priority = self.priority_override;
        self.priority_override = Some(TaskPriority::Immediate);
        let value = f(self, plat);
        self.priority_override = prev_priority;
        self.execution_context = prev;
        if self.execution_context.is_empty() {
            self.flush_sync_queue(plat)?;
        }
        Ok(value)
    }

    /// Runs `f` at normal priority, demoting any updates it schedules out
    /// of the user-blocking tiers.
    pub fn deferred_updates<T>(
        &mut self,
        plat: &mut Platform<'_>,
        f: impl FnOnce(&mut Self, &mut Platform<'_>) -> T,
    ) -> T {
        let prev_priority = self.priority_override;
        self.priority_override = Some(TaskPriority::Normal);
        let value = f(self, plat);
        self.priority_override = prev_priority;
        value
    }

    /// Promotes every root with pending discrete-input updates to a
    /// synchronous flush, so a discrete event's effects are visible before
    /// the next event dispatches.
    ///
    /// A no-op inside a batch, render, or commit; the outer frame flushes.
    ///
    /// # Errors
    ///
    /// See [`LoopError`].
    pub fn flush_discrete_updates(&mut self, plat: &mut Platform<'_>) -> Result<(), LoopError> {
        if self.execution_context.intersects(
            ExecutionContext::BATCHED | ExecutionContext::RENDER | ExecutionContext::COMMIT,
        ) {
            return Ok(());
        }
        let roots: Vec<RootId> = mem::take(&mut self.discrete_pending_roots);
        for root in roots {
            if !self.roots.is_alive(root) {
                continue;
            }
            let discrete = self
                .roots
                .get(root)
                .pending_lanes()
                .intersection(Lanes::INPUT_DISCRETE);
            self.roots.get_mut(root).mark_expired(discrete);
            self.ensure_root_is_scheduled(plat, root);
        }
        self.flush_sync_queue(plat)?;
        self.flush_passive_effects(plat)?;
        Ok(())
    }

    /// Forces `lanes` on `root` to render synchronously, now.
    ///
    /// # Errors
    ///
    /// See [`LoopError`].
    pub fn flush_root(
        &mut self,
        plat: &mut Platform<'_>,
        root: RootId,
        lanes: Lanes,
    ) -> Result<(), LoopError> {
        self.roots.get_mut(root).mark_expired(lanes);
        self.ensure_root_is_scheduled(plat, root);
        if !self
            .execution_context
            .intersects(ExecutionContext::RENDER | ExecutionContext::COMMIT)
        {
            self.flush_sync_queue(plat)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::lane::Lane;
    use crate::test_util::loop_with_root;

    use super::*;

    #[test]
    fn only_the_outermost_batch_flushes() {
        let (mut wl, mut rig, root) = loop_with_root();
        let root_fiber = wl.root_fiber(root);
        let mut plat = rig.plat();

        wl.batched_updates(&mut plat, |wl, plat| {
            wl.batched_updates(plat, |wl, plat| {
                let t = wl.request_event_time(plat);
                wl.schedule_update_on_fiber(plat, root_fiber, Lane::SYNC, t)
                    .unwrap();
            })
            .unwrap();
            // The inner batch ended; the outer one still owns the flush.
            assert!(wl.root(root).pending_lanes().contains(Lanes::SYNC));
        })
        .unwrap();
        assert_eq!(wl.root(root).pending_lanes(), Lanes::NONE);
    }

    #[test]
    fn wrappers_push_and_restore_the_context_mask() {
        let (mut wl, mut rig, _root) = loop_with_root();
        let mut plat = rig.plat();

        wl.batched_updates(&mut plat, |wl, plat| {
            assert!(wl.execution_context.contains(ExecutionContext::BATCHED));
            wl.unbatched_updates(plat, |wl, _plat| {
                assert!(!wl.execution_context.contains(ExecutionContext::BATCHED));
                assert!(
                    wl.execution_context
                        .contains(ExecutionContext::LEGACY_UNBATCHED)
                );
            })
            .unwrap();
            assert!(wl.execution_context.contains(ExecutionContext::BATCHED));
            assert!(
                !wl.execution_context
                    .contains(ExecutionContext::LEGACY_UNBATCHED)
            );
        })
        .unwrap();
        assert!(wl.execution_context.is_empty());
    }

    #[test]
    fn flush_sync_flushes_before_returning() {
        let (mut wl, mut rig, root) = loop_with_root();
        let old_root_fiber = wl.root_fiber(root);
        {
            let mut plat = rig.plat();
            wl.flush_sync(&mut plat, |wl, plat| {
                let t = wl.request_event_time(plat);
                wl.schedule_update_on_fiber(plat, old_root_fiber, Lane::SYNC, t)
                    .unwrap();
                // Batched inside the wrapper: not yet flushed.
                assert!(wl.root(root).pending_lanes().contains(Lanes::SYNC));
            })
            .unwrap();
        }
        assert_eq!(wl.root(root).pending_lanes(), Lanes::NONE);
        assert_ne!(wl.root_fiber(root), old_root_fiber, "the commit landed");
    }

    #[test]
    fn flush_sync_declines_inside_render_and_commit() {
        let (mut wl, mut rig, _root) = loop_with_root();
        wl.execution_context |= ExecutionContext::RENDER;
        let value = {
            let mut plat = rig.plat();
            wl.flush_sync(&mut plat, |_, _| 42).unwrap()
        };
        assert_eq!(value, 42, "the closure still runs");
        assert!(rig.host.calls.is_empty(), "nothing flushed");
        wl.execution_context = ExecutionContext::empty();
    }

    #[test]
    fn discrete_updates_record_roots_and_flush_promotes_them() {
        let (mut wl, mut rig, root) = loop_with_root();
        let root_fiber = wl.root_fiber(root);
        let mut plat = rig.plat();

        wl.discrete_updates(&mut plat, |wl, plat| {
            let lane = wl.request_update_lane(plat, root_fiber, None);
            assert!(Lanes::INPUT_DISCRETE.contains_lane(lane));
            let t = wl.request_event_time(plat);
            wl.schedule_update_on_fiber(plat, root_fiber, lane, t).unwrap();
        })
        .unwrap();
        assert!(
            wl.root(root)
                .pending_lanes()
                .intersects(Lanes::INPUT_DISCRETE)
        );

        // Promotion expires the discrete lanes and flushes them
        // synchronously.
        wl.flush_discrete_updates(&mut plat).unwrap();
        assert_eq!(wl.root(root).pending_lanes(), Lanes::NONE);
    }

    #[test]
    fn deferred_updates_demote_the_request_priority() {
        let (mut wl, mut rig, _root) = loop_with_root();
        let root_fiber = wl.root_fiber(_root);
        rig.sched.priority = TaskPriority::UserBlocking;
        let mut plat = rig.plat();

        let outside = wl.request_update_lane(&mut plat, root_fiber, None);
        assert!(Lanes::INPUT_CONTINUOUS.contains_lane(outside));

        let inside = wl.deferred_updates(&mut plat, |wl, plat| {
            wl.request_update_lane(plat, root_fiber, None)
        });
        assert!(Lanes::DEFAULT.contains_lane(inside));
    }
}
