// Copyright 2026 the Accretion Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as fixed-size little-endian records. [`decode`] reads them back
//! as an iterator of [`RecordedEvent`]. Decoded events use raw root and
//! fiber slot indices, since generational handles only have meaning inside
//! the originating work loop.

use accretion_core::fiber::FiberId;
use accretion_core::root::RootId;
use accretion_core::trace::{
    CommitDeferredEvent, CommitPhase, CommitStartedEvent, PassiveFlushedEvent,
    RenderFinishedEvent, RenderStartedEvent, RenderYieldedEvent, RootPingedEvent, TraceSink,
    UpdateScheduledEvent,
};
use accretion_core::work_loop::ExitStatus;

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_RENDER_STARTED: u8 = 1;
const TAG_RENDER_YIELDED: u8 = 2;
const TAG_RENDER_FINISHED: u8 = 3;
const TAG_COMMIT_STARTED: u8 = 4;
const TAG_COMMIT_PHASE: u8 = 5;
const TAG_COMMIT_DEFERRED: u8 = 6;
const TAG_PASSIVE_FLUSHED: u8 = 7;
const TAG_UPDATE_SCHEDULED: u8 = 8;
const TAG_ROOT_PINGED: u8 = 9;
const TAG_WARN_UNMOUNTED: u8 = 10;
const TAG_WARN_PASSIVE_OVERFLOW: u8 = 11;
const TAG_WARN_SYNC_IN_RENDER: u8 = 12;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_phase(&mut self, p: CommitPhase) {
        self.write_u8(match p {
            CommitPhase::BeforeMutation => 0,
            CommitPhase::Mutation => 1,
            CommitPhase::Layout => 2,
        });
    }

    fn write_exit(&mut self, e: ExitStatus) {
        self.write_u8(match e {
            ExitStatus::Incomplete => 0,
            ExitStatus::FatalErrored => 1,
            ExitStatus::Errored => 2,
            ExitStatus::Suspended => 3,
            ExitStatus::SuspendedWithDelay => 4,
            ExitStatus::Completed => 5,
        });
    }
}

impl TraceSink for RecorderSink {
    fn on_render_started(&mut self, e: &RenderStartedEvent) {
        self.write_u8(TAG_RENDER_STARTED);
        self.write_u32(e.root.index());
        self.write_u32(e.lanes.bits());
    }

    fn on_render_yielded(&mut self, e: &RenderYieldedEvent) {
        self.write_u8(TAG_RENDER_YIELDED);
        self.write_u32(e.root.index());
    }

    fn on_render_finished(&mut self, e: &RenderFinishedEvent) {
        self.write_u8(TAG_RENDER_FINISHED);
        self.write_u32(e.root.index());
        self.write_u32(e.lanes.bits());
        self.write_exit(e.exit);
    }

    fn on_commit_started(&mut self, e: &CommitStartedEvent) {
        self.write_u8(TAG_COMMIT_STARTED);
        self.write_u32(e.root.index());
        self.write_u32(e.lanes.bits());
    }

    fn on_commit_phase(&mut self, phase: CommitPhase) {
        self.write_u8(TAG_COMMIT_PHASE);
        self.write_phase(phase);
    }

    fn on_commit_deferred(&mut self, e: &CommitDeferredEvent) {
        self.write_u8(TAG_COMMIT_DEFERRED);
        self.write_u32(e.root.index());
        self.write_u64(e.delay.millis());
    }

    fn on_passive_flushed(&mut self, e: &PassiveFlushedEvent) {
        self.write_u8(TAG_PASSIVE_FLUSHED);
        self.write_u32(e.root.index());
        self.write_u32(e.lanes.bits());
        self.write_u32(u32::try_from(e.unmounts).unwrap_or(u32::MAX));
        self.write_u32(u32::try_from(e.mounts).unwrap_or(u32::MAX));
    }

    fn on_update_scheduled(&mut self, e: &UpdateScheduledEvent) {
        self.write_u8(TAG_UPDATE_SCHEDULED);
        self.write_u32(e.fiber.index());
        self.write_u32(e.lane.bits());
    }

    fn on_root_pinged(&mut self, e: &RootPingedEvent) {
        self.write_u8(TAG_ROOT_PINGED);
        self.write_u32(e.root.index());
        self.write_u32(e.lanes.bits());
        self.write_u8(u8::from(e.restarted));
    }

    fn on_update_on_unmounted(&mut self, fiber: FiberId) {
        self.write_u8(TAG_WARN_UNMOUNTED);
        self.write_u32(fiber.index());
    }

    fn on_nested_passive_overflow(&mut self, root: RootId) {
        self.write_u8(TAG_WARN_PASSIVE_OVERFLOW);
        self.write_u32(root.index());
    }

    fn on_sync_flush_in_render(&mut self) {
        self.write_u8(TAG_WARN_SYNC_IN_RENDER);
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// A decoded trace event. Roots and fibers are raw slot indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordedEvent {
    /// A render pass started.
    RenderStarted {
        /// Root slot index.
        root: u32,
        /// Rendered lane bits.
        lanes: u32,
    },
    /// The concurrent loop yielded.
    RenderYielded {
        /// Root slot index.
        root: u32,
    },
    /// A render pass finished.
    RenderFinished {
        /// Root slot index.
        root: u32,
        /// Rendered lane bits.
        lanes: u32,
        /// Exit status discriminant (see the recorder's encoding).
        exit: u8,
    },
    /// A commit started.
    CommitStarted {
        /// Root slot index.
        root: u32,
        /// Committed lane bits.
        lanes: u32,
    },
    /// A commit phase marker.
    CommitPhase {
        /// Phase discriminant (0 before-mutation, 1 mutation, 2 layout).
        phase: u8,
    },
    /// A commit was deferred behind a timer.
    CommitDeferred {
        /// Root slot index.
        root: u32,
        /// Delay in milliseconds.
        delay_ms: u64,
    },
    /// Passive effects flushed.
    PassiveFlushed {
        /// Root slot index.
        root: u32,
        /// Lane bits of the scheduling commit.
        lanes: u32,
        /// Destroy count.
        unmounts: u32,
        /// Create count.
        mounts: u32,
    },
    /// An update was recorded.
    UpdateScheduled {
        /// Fiber slot index.
        fiber: u32,
        /// Lane bit.
        lane: u32,
    },
    /// A suspended root was pinged.
    RootPinged {
        /// Root slot index.
        root: u32,
        /// Pinged lane bits.
        lanes: u32,
        /// Whether the in-progress render restarted.
        restarted: bool,
    },
    /// Warning: update on an unmounted fiber.
    UpdateOnUnmounted {
        /// Fiber slot index.
        fiber: u32,
    },
    /// Warning: cascading passive effects.
    NestedPassiveOverflow {
        /// Root slot index.
        root: u32,
    },
    /// Warning: sync flush during render/commit.
    SyncFlushInRender,
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn u8(&mut self) -> Option<u8> {
        let v = *self.bytes.get(self.pos)?;
        self.pos += 1;
        Some(v)
    }

    fn u32(&mut self) -> Option<u32> {
        let slice = self.bytes.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        Some(u32::from_le_bytes(slice.try_into().ok()?))
    }

    fn u64(&mut self) -> Option<u64> {
        let slice = self.bytes.get(self.pos..self.pos + 8)?;
        self.pos += 8;
        Some(u64::from_le_bytes(slice.try_into().ok()?))
    }
}

/// Decodes recorded bytes back into events. Stops at the first truncated or
/// unknown record.
pub fn decode(bytes: &[u8]) -> impl Iterator<Item = RecordedEvent> + '_ {
    let mut reader = Reader { bytes, pos: 0 };
    core::iter::from_fn(move || {
        let tag = reader.u8()?;
        match tag {
            TAG_RENDER_STARTED => Some(RecordedEvent::RenderStarted {
                root: reader.u32()?,
                lanes: reader.u32()?,
            }),
            TAG_RENDER_YIELDED => Some(RecordedEvent::RenderYielded {
                root: reader.u32()?,
            }),
            TAG_RENDER_FINISHED => Some(RecordedEvent::RenderFinished {
                root: reader.u32()?,
                lanes: reader.u32()?,
                exit: reader.u8()?,
            }),
            TAG_COMMIT_STARTED => Some(RecordedEvent::CommitStarted {
                root: reader.u32()?,
                lanes: reader.u32()?,
            }),
            TAG_COMMIT_PHASE => Some(RecordedEvent::CommitPhase {
                phase: reader.u8()?,
            }),
            TAG_COMMIT_DEFERRED => Some(RecordedEvent::CommitDeferred {
                root: reader.u32()?,
                delay_ms: reader.u64()?,
            }),
            TAG_PASSIVE_FLUSHED => Some(RecordedEvent::PassiveFlushed {
                root: reader.u32()?,
                lanes: reader.u32()?,
                unmounts: reader.u32()?,
                mounts: reader.u32()?,
            }),
            TAG_UPDATE_SCHEDULED => Some(RecordedEvent::UpdateScheduled {
                fiber: reader.u32()?,
                lane: reader.u32()?,
            }),
            TAG_ROOT_PINGED => Some(RecordedEvent::RootPinged {
                root: reader.u32()?,
                lanes: reader.u32()?,
                restarted: reader.u8()? != 0,
            }),
            TAG_WARN_UNMOUNTED => Some(RecordedEvent::UpdateOnUnmounted {
                fiber: reader.u32()?,
            }),
            TAG_WARN_PASSIVE_OVERFLOW => Some(RecordedEvent::NestedPassiveOverflow {
                root: reader.u32()?,
            }),
            TAG_WARN_SYNC_IN_RENDER => Some(RecordedEvent::SyncFlushInRender),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use accretion_core::trace::Tracer;

    use super::*;

    #[test]
    fn phase_and_warning_round_trip() {
        let mut sink = RecorderSink::new();
        {
            let mut tracer = Tracer::new(&mut sink);
            tracer.commit_phase(CommitPhase::Layout);
            tracer.sync_flush_in_render();
        }
        let events: Vec<RecordedEvent> = decode(sink.as_bytes()).collect();
        assert_eq!(
            events,
            vec![
                RecordedEvent::CommitPhase { phase: 2 },
                RecordedEvent::SyncFlushInRender,
            ]
        );
    }

    #[test]
    fn truncated_input_stops_cleanly() {
        let mut sink = RecorderSink::new();
        {
            let mut tracer = Tracer::new(&mut sink);
            tracer.commit_phase(CommitPhase::Mutation);
        }
        let mut bytes = sink.into_bytes();
        bytes.push(TAG_COMMIT_STARTED);
        bytes.push(0xAB); // half a root index
        let events: Vec<RecordedEvent> = decode(&bytes).collect();
        assert_eq!(events, vec![RecordedEvent::CommitPhase { phase: 1 }]);
    }

    #[test]
    fn unknown_tag_stops_decoding() {
        let bytes = [0xFF_u8, 1, 2, 3];
        assert_eq!(decode(&bytes).count(), 0);
    }
}
