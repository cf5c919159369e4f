// Copyright 2026 the Accretion Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the work loop.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that the
//! work loop calls at each stage. All method bodies default to no-ops, so
//! implementing only the events you care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace`
//! feature is **off**, every `Tracer` method compiles to nothing (zero
//! overhead). When **on**, each method performs a single `Option` branch
//! before dispatching.
//!
//! Warnings the loop never turns into hard errors (an update scheduled on an
//! unmounted fiber, a cascading passive-effect loop hitting its limit) are
//! also delivered here.

use crate::fiber::FiberId;
use crate::lane::{Lane, Lanes};
use crate::root::RootId;
use crate::time::Duration;
use crate::work_loop::ExitStatus;

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Which commit phase is being entered or left.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommitPhase {
    /// Snapshot hooks and passive-effect scheduling, before any mutation.
    BeforeMutation,
    /// Host tree mutations.
    Mutation,
    /// Layout effects, lifecycle callbacks, and refs.
    Layout,
}

/// Emitted when a render pass starts on a fresh stack.
#[derive(Clone, Copy, Debug)]
pub struct RenderStartedEvent {
    /// The root being rendered.
    pub root: RootId,
    /// The lanes included in this pass.
    pub lanes: Lanes,
}

/// Emitted when the concurrent loop yields to the scheduler mid-render.
#[derive(Clone, Copy, Debug)]
pub struct RenderYieldedEvent {
    /// The root whose render was paused.
    pub root: RootId,
}

/// Emitted when a render pass leaves the work loop.
#[derive(Clone, Copy, Debug)]
pub struct RenderFinishedEvent {
    /// The root that was rendered.
    pub root: RootId,
    /// The lanes that were rendered.
    pub lanes: Lanes,
    /// How the pass ended.
    pub exit: ExitStatus,
}

/// Emitted once per commit, before the before-mutation phase.
#[derive(Clone, Copy, Debug)]
pub struct CommitStartedEvent {
    /// The root being committed.
    pub root: RootId,
    /// The lanes being committed.
    pub lanes: Lanes,
}

/// Emitted when a suspended render defers its commit behind a host timer.
#[derive(Clone, Copy, Debug)]
pub struct CommitDeferredEvent {
    /// The root whose commit was deferred.
    pub root: RootId,
    /// How long the commit will wait.
    pub delay: Duration,
}

/// Emitted after a passive-effect flush.
#[derive(Clone, Copy, Debug)]
pub struct PassiveFlushedEvent {
    /// The root whose effects were flushed.
    pub root: RootId,
    /// The lanes of the commit that scheduled these effects.
    pub lanes: Lanes,
    /// Number of destroy functions run.
    pub unmounts: usize,
    /// Number of create functions run.
    pub mounts: usize,
}

/// Emitted when an update is recorded on a root.
#[derive(Clone, Copy, Debug)]
pub struct UpdateScheduledEvent {
    /// The fiber the update targets.
    pub fiber: FiberId,
    /// The lane the update was assigned.
    pub lane: Lane,
}

/// Emitted when a resolved wakeable pings a suspended root.
#[derive(Clone, Copy, Debug)]
pub struct RootPingedEvent {
    /// The pinged root.
    pub root: RootId,
    /// The lanes that may retry.
    pub lanes: Lanes,
    /// Whether the in-progress render was thrown away to restart fresh.
    pub restarted: bool,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the work loop.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called when a render pass starts on a fresh stack.
    fn on_render_started(&mut self, e: &RenderStartedEvent) {
        _ = e;
    }

    /// Called when the concurrent loop yields mid-render.
    fn on_render_yielded(&mut self, e: &RenderYieldedEvent) {
        _ = e;
    }

    /// Called when a render pass finishes or is abandoned.
    fn on_render_finished(&mut self, e: &RenderFinishedEvent) {
        _ = e;
    }

    /// Called at the start of a commit.
    fn on_commit_started(&mut self, e: &CommitStartedEvent) {
        _ = e;
    }

    /// Called when entering a commit phase.
    fn on_commit_phase(&mut self, phase: CommitPhase) {
        _ = phase;
    }

    /// Called when a commit is deferred behind a host timer.
    fn on_commit_deferred(&mut self, e: &CommitDeferredEvent) {
        _ = e;
    }

    /// Called after a passive-effect flush.
    fn on_passive_flushed(&mut self, e: &PassiveFlushedEvent) {
        _ = e;
    }

    /// Called when an update is recorded on a root.
    fn on_update_scheduled(&mut self, e: &UpdateScheduledEvent) {
        _ = e;
    }

    /// Called when a resolved wakeable pings a suspended root.
    fn on_root_pinged(&mut self, e: &RootPingedEvent) {
        _ = e;
    }

    /// Warning: an update targeted a fiber that is no longer mounted.
    fn on_update_on_unmounted(&mut self, fiber: FiberId) {
        _ = fiber;
    }

    /// Warning: passive effects kept scheduling more passive work on the
    /// same root past the configured limit.
    fn on_nested_passive_overflow(&mut self, root: RootId) {
        _ = root;
    }

    /// Warning: a sync flush was requested from inside the render or commit
    /// phase and was ignored.
    fn on_sync_flush_in_render(&mut self) {}
}

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

macro_rules! tracer_event {
    ($(#[$doc:meta])* $name:ident, $hook:ident, $event:ty) => {
        $(#[$doc])*
        #[inline]
        pub fn $name(&mut self, e: $event) {
            #[cfg(feature = "trace")]
            if let Some(s) = &mut self.sink {
                s.$hook(&e);
            }
            #[cfg(not(feature = "trace"))]
            {
                _ = e;
            }
        }
    };
}

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing.
/// When **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    tracer_event! {
        /// Emits a [`RenderStartedEvent`].
        render_started, on_render_started, RenderStartedEvent
    }

    tracer_event! {
        /// Emits a [`RenderYieldedEvent`].
        render_yielded, on_render_yielded, RenderYieldedEvent
    }

    tracer_event! {
        /// Emits a [`RenderFinishedEvent`].
        render_finished, on_render_finished, RenderFinishedEvent
    }

    tracer_event! {
        /// Emits a [`CommitStartedEvent`].
        commit_started, on_commit_started, CommitStartedEvent
    }

    tracer_event! {
        /// Emits a [`CommitDeferredEvent`].
        commit_deferred, on_commit_deferred, CommitDeferredEvent
    }

    tracer_event! {
        /// Emits a [`PassiveFlushedEvent`].
        passive_flushed, on_passive_flushed, PassiveFlushedEvent
    }

    tracer_event! {
        /// Emits an [`UpdateScheduledEvent`].
        update_scheduled, on_update_scheduled, UpdateScheduledEvent
    }

    tracer_event! {
        /// Emits a [`RootPingedEvent`].
        root_pinged, on_root_pinged, RootPingedEvent
    }

    /// Emits a commit-phase marker.
    #[inline]
    pub fn commit_phase(&mut self, phase: CommitPhase) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_commit_phase(phase);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = phase;
        }
    }

    /// Emits the update-on-unmounted-fiber warning.
    #[inline]
    pub fn update_on_unmounted(&mut self, fiber: FiberId) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_update_on_unmounted(fiber);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = fiber;
        }
    }

    /// Emits the nested-passive-overflow warning.
    #[inline]
    pub fn nested_passive_overflow(&mut self, root: RootId) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_nested_passive_overflow(root);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = root;
        }
    }

    /// Emits the sync-flush-in-render warning.
    #[inline]
    pub fn sync_flush_in_render(&mut self) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_sync_flush_in_render();
        }
    }
}
