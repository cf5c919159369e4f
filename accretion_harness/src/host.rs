// Copyright 2026 the Accretion Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A host adapter that records every mutation instead of applying one.

use alloc::vec::Vec;

use accretion_core::fiber::{ElementTypeId, FiberId, FiberStore};
use accretion_core::host::{ContainerId, HostAdapter, TimeoutHandle};
use accretion_core::reconciler::ErrorId;
use accretion_core::root::RootId;
use accretion_core::time::Duration;

/// One recorded host operation, in call order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostOp {
    /// `prepare_for_commit` was called.
    PrepareForCommit(ContainerId),
    /// `reset_after_commit` was called.
    ResetAfterCommit(ContainerId),
    /// The focused instance was about to be hidden or deleted.
    BeforeBlur,
    /// The mutation that hid or deleted the focused instance finished.
    AfterBlur,
    /// A host node was placed.
    Placement(FiberId),
    /// A host node's property diff was applied.
    Work(FiberId),
    /// A host subtree was detached.
    Deletion(FiberId),
    /// A host node's text content was cleared.
    ResetText(FiberId),
    /// A commit timer was scheduled.
    TimeoutScheduled {
        /// The root the timer belongs to.
        root: RootId,
        /// Delay in milliseconds.
        delay_ms: u64,
    },
    /// A commit timer was cancelled before firing.
    TimeoutCancelled(u64),
}

/// A timer the work loop has scheduled and not yet cancelled.
#[derive(Clone, Copy, Debug)]
pub struct PendingTimeout {
    /// Raw handle value.
    pub handle: u64,
    /// The root to commit when it fires.
    pub root: RootId,
    /// Milliseconds until it fires.
    pub remaining_ms: u64,
}

/// A [`HostAdapter`] that logs operations and keeps timers on a manual
/// clock.
///
/// Mutation primitives can be scripted to fail by element type, exercising
/// the commit pipeline's guarded-call path.
#[derive(Debug, Default)]
pub struct RecordingHost {
    /// Every host call, in order.
    pub ops: Vec<HostOp>,
    /// What `prepare_for_commit` reports as the focused fiber.
    pub focused: Option<FiberId>,
    /// When set, `commit_work` fails on fibers of this element type.
    pub fail_work_on: Option<(ElementTypeId, ErrorId)>,
    /// When set, `commit_placement` fails on fibers of this element type.
    pub fail_placement_on: Option<(ElementTypeId, ErrorId)>,
    timeouts: Vec<PendingTimeout>,
    next_timeout: u64,
}

impl RecordingHost {
    /// Creates an empty recording host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The timers currently pending.
    #[must_use]
    pub fn pending_timeouts(&self) -> &[PendingTimeout] {
        &self.timeouts
    }

    /// Advances timer clocks by `elapsed` and returns the timers that fired.
    pub fn take_due(&mut self, elapsed: Duration) -> Vec<PendingTimeout> {
        for t in &mut self.timeouts {
            t.remaining_ms = t.remaining_ms.saturating_sub(elapsed.millis());
        }
        let (due, rest): (Vec<_>, Vec<_>) =
            self.timeouts.iter().copied().partition(|t| t.remaining_ms == 0);
        self.timeouts = rest;
        due
    }

    /// The recorded operations of the given kind-filter, for terse asserts.
    pub fn ops_matching(&self, f: impl Fn(&HostOp) -> bool) -> Vec<HostOp> {
        self.ops.iter().copied().filter(f).collect()
    }

    fn fails(
        target: Option<(ElementTypeId, ErrorId)>,
        store: &FiberStore,
        fiber: FiberId,
    ) -> Result<(), ErrorId> {
        if let Some((ty, error)) = target
            && store.fiber(fiber).element_type == Some(ty)
        {
            return Err(error);
        }
        Ok(())
    }
}

impl HostAdapter for RecordingHost {
    fn prepare_for_commit(&mut self, container: ContainerId) -> Option<FiberId> {
        self.ops.push(HostOp::PrepareForCommit(container));
        self.focused
    }

    fn reset_after_commit(&mut self, container: ContainerId) {
        self.ops.push(HostOp::ResetAfterCommit(container));
    }

    fn before_active_instance_blur(&mut self) {
        self.ops.push(HostOp::BeforeBlur);
    }

    fn after_active_instance_blur(&mut self) {
        self.ops.push(HostOp::AfterBlur);
    }

    fn schedule_timeout(&mut self, root: RootId, delay: Duration) -> TimeoutHandle {
        let handle = self.next_timeout;
        self.next_timeout += 1;
        self.timeouts.push(PendingTimeout {
            handle,
            root,
            remaining_ms: delay.millis(),
        });
        self.ops.push(HostOp::TimeoutScheduled {
            root,
            delay_ms: delay.millis(),
        });
        TimeoutHandle(handle)
    }

    fn cancel_timeout(&mut self, handle: TimeoutHandle) {
        let before = self.timeouts.len();
        self.timeouts.retain(|t| t.handle != handle.0);
        if self.timeouts.len() != before {
            self.ops.push(HostOp::TimeoutCancelled(handle.0));
        }
    }

    fn commit_placement(&mut self, store: &FiberStore, fiber: FiberId) -> Result<(), ErrorId> {
        Self::fails(self.fail_placement_on, store, fiber)?;
        self.ops.push(HostOp::Placement(fiber));
        Ok(())
    }

    fn commit_work(
        &mut self,
        store: &FiberStore,
        fiber: FiberId,
        _current: Option<FiberId>,
    ) -> Result<(), ErrorId> {
        Self::fails(self.fail_work_on, store, fiber)?;
        self.ops.push(HostOp::Work(fiber));
        Ok(())
    }

    fn commit_deletion(&mut self, _store: &FiberStore, fiber: FiberId) -> Result<(), ErrorId> {
        self.ops.push(HostOp::Deletion(fiber));
        Ok(())
    }

    fn reset_text_content(&mut self, _store: &FiberStore, fiber: FiberId) {
        self.ops.push(HostOp::ResetText(fiber));
    }
}
