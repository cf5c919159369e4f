// Copyright 2026 the Accretion Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host adapter contract.
//!
//! The host adapter owns the real presentation tree (DOM nodes, native
//! views) and the platform timer. The commit pipeline drives it in a strict
//! shape:
//!
//! 1. [`prepare_for_commit`](HostAdapter::prepare_for_commit) once, before
//!    any mutation, returning the currently focused fiber so the loop can
//!    fire blur notifications if the focused subtree is hidden or deleted.
//! 2. Mutation primitives ([`commit_placement`](HostAdapter::commit_placement),
//!    [`commit_work`](HostAdapter::commit_work),
//!    [`commit_deletion`](HostAdapter::commit_deletion),
//!    [`reset_text_content`](HostAdapter::reset_text_content)) once per
//!    effect, in effect-list order. Each may fail with an opaque
//!    [`ErrorId`]; the loop attributes the failure to the effect's fiber
//!    and continues with the next effect.
//! 3. [`reset_after_commit`](HostAdapter::reset_after_commit) once, after
//!    the buffer swap.
//!
//! Timers ([`schedule_timeout`](HostAdapter::schedule_timeout)) carry the
//! delayed-commit path for suspended renders: when a scheduled timeout
//! fires, the embedder calls
//! [`WorkLoop::on_commit_timeout`](crate::work_loop::WorkLoop::on_commit_timeout).

use core::fmt;

use crate::fiber::{FiberId, FiberStore};
use crate::reconciler::ErrorId;
use crate::root::RootId;
use crate::time::Duration;

/// An opaque reference to a host container (the mount point of a root).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerId(pub u64);

impl fmt::Debug for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContainerId({})", self.0)
    }
}

/// A handle to a pending host timeout.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeoutHandle(pub u64);

impl TimeoutHandle {
    /// Sentinel meaning "no timeout scheduled".
    pub const NONE: Self = Self(u64::MAX);

    /// Returns whether this handle refers to a scheduled timeout.
    #[inline]
    #[must_use]
    pub const fn is_some(self) -> bool {
        self.0 != Self::NONE.0
    }
}

impl fmt::Debug for TimeoutHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_some() {
            write!(f, "TimeoutHandle({})", self.0)
        } else {
            write!(f, "TimeoutHandle(none)")
        }
    }
}

/// Tree mutation, focus, and timer primitives provided by the platform
/// backend.
pub trait HostAdapter {
    /// Called once before the mutation phase. Returns the fiber owning the
    /// currently focused host instance, if any, so the loop can detect when
    /// a commit hides or deletes it.
    fn prepare_for_commit(&mut self, container: ContainerId) -> Option<FiberId>;

    /// Called once after the mutation phase and buffer swap.
    fn reset_after_commit(&mut self, container: ContainerId);

    /// The focused instance is about to be hidden or deleted by the
    /// upcoming mutation phase.
    fn before_active_instance_blur(&mut self);

    /// The mutation phase that hid or deleted the focused instance has
    /// finished.
    fn after_active_instance_blur(&mut self);

    /// Schedules a timer; when it elapses the embedder must call
    /// [`WorkLoop::on_commit_timeout`](crate::work_loop::WorkLoop::on_commit_timeout)
    /// with the same root.
    fn schedule_timeout(&mut self, root: RootId, delay: Duration) -> TimeoutHandle;

    /// Cancels a pending timer. Cancelling an elapsed handle is a no-op.
    fn cancel_timeout(&mut self, handle: TimeoutHandle);

    /// Inserts (or moves) the fiber's host node into its host parent.
    fn commit_placement(&mut self, store: &FiberStore, fiber: FiberId) -> Result<(), ErrorId>;

    /// Applies the prepared property diff of an updated fiber to its host
    /// node. `current` is the fiber's previous incarnation, if any.
    fn commit_work(
        &mut self,
        store: &FiberStore,
        fiber: FiberId,
        current: Option<FiberId>,
    ) -> Result<(), ErrorId>;

    /// Detaches the fiber's host subtree from the host tree.
    fn commit_deletion(&mut self, store: &FiberStore, fiber: FiberId) -> Result<(), ErrorId>;

    /// Clears the text content of a host node before children are placed.
    fn reset_text_content(&mut self, store: &FiberStore, fiber: FiberId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_handle_sentinel() {
        assert!(!TimeoutHandle::NONE.is_some());
        assert!(TimeoutHandle(0).is_some());
        assert_eq!(alloc::format!("{:?}", TimeoutHandle::NONE), "TimeoutHandle(none)");
    }
}
