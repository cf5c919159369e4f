// Copyright 2026 the Accretion Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! External scheduler contract.
//!
//! The work loop does not own an event loop; it binds *tasks* into a
//! priority scheduler provided by the embedder. A task is a token: when the
//! scheduler decides a task should run, the embedder's driver calls back
//! into the matching [`WorkLoop`](crate::work_loop::WorkLoop) entry point
//! ([`perform_concurrent_work_on_root`], [`flush_passive_effects`], or
//! [`flush_sync_queue`]).
//!
//! The loop owns exactly one scheduled task per root; rebinding cancels the
//! prior handle first. Cooperative yielding is polled through
//! [`TaskScheduler::should_yield`] between units of work, never inside one.
//!
//! [`perform_concurrent_work_on_root`]: crate::work_loop::WorkLoop::perform_concurrent_work_on_root
//! [`flush_passive_effects`]: crate::work_loop::WorkLoop::flush_passive_effects
//! [`flush_sync_queue`]: crate::work_loop::WorkLoop::flush_sync_queue

use core::fmt;

use crate::root::RootId;
use crate::time::HostTime;

/// Priority levels of the external scheduler, highest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskPriority {
    /// Runs before returning control to the host.
    Immediate,
    /// User-blocking work (input handling).
    UserBlocking,
    /// Ordinary asynchronous work.
    Normal,
    /// Deprioritized work.
    Low,
    /// Runs only when the scheduler is otherwise idle.
    Idle,
}

/// The unit of scheduling: what the embedder's driver should invoke when the
/// scheduler runs this task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Task {
    /// Call [`WorkLoop::perform_concurrent_work_on_root`] for this root,
    /// passing whether the scheduler considers the task overdue.
    ///
    /// [`WorkLoop::perform_concurrent_work_on_root`]: crate::work_loop::WorkLoop::perform_concurrent_work_on_root
    PerformWork(RootId),
    /// Call [`WorkLoop::flush_passive_effects`].
    ///
    /// [`WorkLoop::flush_passive_effects`]: crate::work_loop::WorkLoop::flush_passive_effects
    FlushPassive,
    /// Call [`WorkLoop::flush_sync_queue`].
    ///
    /// [`WorkLoop::flush_sync_queue`]: crate::work_loop::WorkLoop::flush_sync_queue
    FlushSyncQueue,
}

/// A handle to a scheduled task, used for cancellation and identity checks.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(pub u64);

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskHandle({})", self.0)
    }
}

/// The priority scheduler the work loop binds its tasks into.
///
/// Implementations must be single-threaded with respect to the loop: tasks
/// run only when the embedder's driver invokes the corresponding entry
/// point, never re-entrantly.
pub trait TaskScheduler {
    /// Enqueues a task at the given priority and returns its handle.
    fn schedule(&mut self, priority: TaskPriority, task: Task) -> TaskHandle;

    /// Cancels a previously scheduled task. Cancelling an already-run or
    /// already-cancelled handle is a no-op.
    fn cancel(&mut self, handle: TaskHandle);

    /// Returns whether the current task should yield back to the host.
    /// Polled between units of work in the concurrent loop.
    fn should_yield(&self) -> bool;

    /// Hints that meaningful output is ready and the host should paint at
    /// the next opportunity.
    fn request_paint(&mut self);

    /// Reads the monotonic clock, in milliseconds.
    fn now(&self) -> HostTime;

    /// Returns the priority of the task currently being run by the
    /// scheduler, or [`TaskPriority::Normal`] outside any task.
    fn current_priority(&self) -> TaskPriority;
}
