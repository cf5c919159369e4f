// Copyright 2026 the Accretion Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per
//! event to a [`Write`](std::io::Write) destination (default: stderr).

use std::io::Write;

use accretion_core::fiber::FiberId;
use accretion_core::root::RootId;
use accretion_core::trace::{
    CommitDeferredEvent, CommitPhase, CommitStartedEvent, PassiveFlushedEvent,
    RenderFinishedEvent, RenderStartedEvent, RenderYieldedEvent, RootPingedEvent, TraceSink,
    UpdateScheduledEvent,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write)
/// destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink").finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
        }
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>) -> Self {
        Self { writer }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }
}

fn phase_name(phase: CommitPhase) -> &'static str {
    match phase {
        CommitPhase::BeforeMutation => "before-mutation",
        CommitPhase::Mutation => "mutation",
        CommitPhase::Layout => "layout",
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_render_started(&mut self, e: &RenderStartedEvent) {
        let _ = writeln!(
            self.writer,
            "[render:start] root={} lanes={:#x}",
            e.root.index(),
            e.lanes.bits(),
        );
    }

    fn on_render_yielded(&mut self, e: &RenderYieldedEvent) {
        let _ = writeln!(self.writer, "[render:yield] root={}", e.root.index());
    }

    fn on_render_finished(&mut self, e: &RenderFinishedEvent) {
        let _ = writeln!(
            self.writer,
            "[render:finish] root={} lanes={:#x} exit={:?}",
            e.root.index(),
            e.lanes.bits(),
            e.exit,
        );
    }

    fn on_commit_started(&mut self, e: &CommitStartedEvent) {
        let _ = writeln!(
            self.writer,
            "[commit] root={} lanes={:#x}",
            e.root.index(),
            e.lanes.bits(),
        );
    }

    fn on_commit_phase(&mut self, phase: CommitPhase) {
        let _ = writeln!(self.writer, "[commit:phase] {}", phase_name(phase));
    }

    fn on_commit_deferred(&mut self, e: &CommitDeferredEvent) {
        let _ = writeln!(
            self.writer,
            "[commit:deferred] root={} delay={}ms",
            e.root.index(),
            e.delay.millis(),
        );
    }

    fn on_passive_flushed(&mut self, e: &PassiveFlushedEvent) {
        let _ = writeln!(
            self.writer,
            "[passive] root={} lanes={:#x} unmounts={} mounts={}",
            e.root.index(),
            e.lanes.bits(),
            e.unmounts,
            e.mounts,
        );
    }

    fn on_update_scheduled(&mut self, e: &UpdateScheduledEvent) {
        let _ = writeln!(
            self.writer,
            "[update] fiber={} lane={:#x}",
            e.fiber.index(),
            e.lane.bits(),
        );
    }

    fn on_root_pinged(&mut self, e: &RootPingedEvent) {
        let _ = writeln!(
            self.writer,
            "[ping] root={} lanes={:#x} restarted={}",
            e.root.index(),
            e.lanes.bits(),
            e.restarted,
        );
    }

    fn on_update_on_unmounted(&mut self, fiber: FiberId) {
        let _ = writeln!(
            self.writer,
            "[warn] update on unmounted fiber={}",
            fiber.index(),
        );
    }

    fn on_nested_passive_overflow(&mut self, root: RootId) {
        let _ = writeln!(
            self.writer,
            "[warn] nested passive-effect limit reached on root={}",
            root.index(),
        );
    }

    fn on_sync_flush_in_render(&mut self) {
        let _ = writeln!(self.writer, "[warn] sync flush requested during render/commit");
    }
}
