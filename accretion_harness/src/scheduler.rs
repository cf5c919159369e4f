// Copyright 2026 the Accretion Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Deterministic in-memory task scheduler with a virtual clock.

use alloc::vec::Vec;
use core::cell::Cell;

use accretion_core::sched::{Task, TaskHandle, TaskPriority, TaskScheduler};
use accretion_core::time::{Duration, HostTime};

/// A task sitting in the [`VirtualScheduler`] queue.
#[derive(Clone, Copy, Debug)]
pub struct QueuedTask {
    /// Handle returned to the work loop.
    pub handle: TaskHandle,
    /// Priority it was scheduled at.
    pub priority: TaskPriority,
    /// FIFO tie-breaker within a priority.
    pub seq: u64,
    /// What to invoke.
    pub task: Task,
}

/// A [`TaskScheduler`] whose clock and queue are driven manually.
///
/// Time only moves through [`advance`](Self::advance). Yielding is scripted:
/// [`yield_after`](Self::yield_after) makes `should_yield` report true once
/// the given number of polls has passed, which corresponds to that many
/// units of work in the concurrent loop.
#[derive(Debug, Default)]
pub struct VirtualScheduler {
    now: HostTime,
    queue: Vec<QueuedTask>,
    next_handle: u64,
    next_seq: u64,
    running_priority: Option<TaskPriority>,
    yield_budget: Option<u32>,
    yield_polls: Cell<u32>,
    paint_requests: u32,
}

impl VirtualScheduler {
    /// Creates a scheduler at time zero with an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the virtual clock forward.
    pub fn advance(&mut self, by: Duration) {
        self.now = self.now.saturating_add(by);
    }

    /// Makes `should_yield` return true after `units` more polls, emulating
    /// a time slice that ends mid-render.
    pub fn yield_after(&mut self, units: u32) {
        self.yield_budget = Some(units);
        self.yield_polls.set(0);
    }

    /// Clears any scripted yield; `should_yield` returns false again.
    pub fn clear_yield(&mut self) {
        self.yield_budget = None;
        self.yield_polls.set(0);
    }

    /// Removes and returns the highest-priority queued task (FIFO within a
    /// priority).
    pub fn pop_highest(&mut self) -> Option<QueuedTask> {
        let best = self
            .queue
            .iter()
            .enumerate()
            .min_by_key(|(_, t)| (t.priority, t.seq))
            .map(|(i, _)| i)?;
        Some(self.queue.remove(best))
    }

    /// Re-inserts a task that yielded, preserving its handle and ordering,
    /// so the work loop's "same callback" identity checks hold across
    /// continuations.
    pub fn reinsert(&mut self, task: QueuedTask) {
        self.queue.push(task);
    }

    /// The queued tasks, in insertion order.
    #[must_use]
    pub fn queue(&self) -> &[QueuedTask] {
        &self.queue
    }

    /// How many times the work loop asked for a paint.
    #[must_use]
    pub fn paint_requests(&self) -> u32 {
        self.paint_requests
    }

    /// Marks the priority the driver is about to run a task at.
    pub fn begin_task(&mut self, priority: TaskPriority) {
        self.running_priority = Some(priority);
    }

    /// Clears the running-task priority.
    pub fn end_task(&mut self) {
        self.running_priority = None;
    }
}

impl TaskScheduler for VirtualScheduler {
    fn schedule(&mut self, priority: TaskPriority, task: Task) -> TaskHandle {
        let handle = TaskHandle(self.next_handle);
        self.next_handle += 1;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(QueuedTask {
            handle,
            priority,
            seq,
            task,
        });
        handle
    }

    fn cancel(&mut self, handle: TaskHandle) {
        self.queue.retain(|t| t.handle != handle);
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
        self.running_priority.unwrap_or(TaskPriority::Normal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_orders_by_priority_then_fifo() {
        let mut sched = VirtualScheduler::new();
        let a = sched.schedule(TaskPriority::Normal, Task::FlushPassive);
        let b = sched.schedule(TaskPriority::Immediate, Task::FlushSyncQueue);
        let c = sched.schedule(TaskPriority::Immediate, Task::FlushPassive);

        assert_eq!(sched.pop_highest().unwrap().handle, b);
        assert_eq!(sched.pop_highest().unwrap().handle, c);
        assert_eq!(sched.pop_highest().unwrap().handle, a);
        assert!(sched.pop_highest().is_none());
    }

    #[test]
    fn cancel_removes_task() {
        let mut sched = VirtualScheduler::new();
        let a = sched.schedule(TaskPriority::Normal, Task::FlushPassive);
        sched.cancel(a);
        assert!(sched.pop_highest().is_none());
        // Cancelling twice is a no-op.
        sched.cancel(a);
    }

    #[test]
    fn scripted_yield_fires_after_budget() {
        let mut sched = VirtualScheduler::new();
        assert!(!sched.should_yield());

        sched.yield_after(2);
        assert!(!sched.should_yield(), "poll 1");
        assert!(!sched.should_yield(), "poll 2");
        assert!(sched.should_yield(), "poll 3 exceeds the budget");

        sched.clear_yield();
        assert!(!sched.should_yield());
    }

    #[test]
    fn clock_only_moves_on_advance() {
        let mut sched = VirtualScheduler::new();
        assert_eq!(sched.now(), HostTime(0));
        sched.advance(Duration::from_millis(16));
        sched.advance(Duration::from_millis(4));
        assert_eq!(sched.now(), HostTime(20));
    }
}
