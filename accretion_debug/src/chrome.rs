// Copyright 2026 the Accretion Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a
//! [`RecorderSink`](super::recorder::RecorderSink) and writes [Chrome Trace
//! Event Format][spec] JSON to the given writer, suitable for
//! `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
//!
//! The recorder stores no timestamps (the work loop is driven by an
//! external clock), so events are laid out on a synthetic microsecond
//! timeline, one tick per event, preserving order.
//!
//! [spec]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use crate::recorder::{RecordedEvent, decode};

fn phase_label(phase: u8) -> &'static str {
    match phase {
        0 => "before-mutation",
        1 => "mutation",
        2 => "layout",
        _ => "unknown",
    }
}

fn exit_label(exit: u8) -> &'static str {
    match exit {
        0 => "incomplete",
        1 => "fatal-errored",
        2 => "errored",
        3 => "suspended",
        4 => "suspended-with-delay",
        5 => "completed",
        _ => "unknown",
    }
}

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of instant-event objects, one per
/// recorded event, with the root index as the `pid` so multi-root traces
/// split into separate tracks.
///
/// # Errors
///
/// Propagates I/O errors from the writer.
pub fn export(bytes: &[u8], writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();

    for (ts, recorded) in decode(bytes).enumerate() {
        match recorded {
            RecordedEvent::RenderStarted { root, lanes } => {
                events.push(instant(ts, root, "RenderStarted", "Render", json!({
                    "lanes": format!("{lanes:#x}"),
                })));
            }
            RecordedEvent::RenderYielded { root } => {
                events.push(instant(ts, root, "RenderYielded", "Render", json!({})));
            }
            RecordedEvent::RenderFinished { root, lanes, exit } => {
                events.push(instant(ts, root, "RenderFinished", "Render", json!({
                    "lanes": format!("{lanes:#x}"),
                    "exit": exit_label(exit),
                })));
            }
            RecordedEvent::CommitStarted { root, lanes } => {
                events.push(instant(ts, root, "CommitStarted", "Commit", json!({
                    "lanes": format!("{lanes:#x}"),
                })));
            }
            RecordedEvent::CommitPhase { phase } => {
                events.push(instant(ts, 0, "CommitPhase", "Commit", json!({
                    "phase": phase_label(phase),
                })));
            }
            RecordedEvent::CommitDeferred { root, delay_ms } => {
                events.push(instant(ts, root, "CommitDeferred", "Commit", json!({
                    "delay_ms": delay_ms,
                })));
            }
            RecordedEvent::PassiveFlushed {
                root,
                lanes,
                unmounts,
                mounts,
            } => {
                events.push(instant(ts, root, "PassiveFlushed", "Passive", json!({
                    "lanes": format!("{lanes:#x}"),
                    "unmounts": unmounts,
                    "mounts": mounts,
                })));
            }
            RecordedEvent::UpdateScheduled { fiber, lane } => {
                events.push(instant(ts, 0, "UpdateScheduled", "Update", json!({
                    "fiber": fiber,
                    "lane": format!("{lane:#x}"),
                })));
            }
            RecordedEvent::RootPinged {
                root,
                lanes,
                restarted,
            } => {
                events.push(instant(ts, root, "RootPinged", "Suspense", json!({
                    "lanes": format!("{lanes:#x}"),
                    "restarted": restarted,
                })));
            }
            RecordedEvent::UpdateOnUnmounted { fiber } => {
                events.push(instant(ts, 0, "UpdateOnUnmounted", "Warning", json!({
                    "fiber": fiber,
                })));
            }
            RecordedEvent::NestedPassiveOverflow { root } => {
                events.push(instant(ts, root, "NestedPassiveOverflow", "Warning", json!({})));
            }
            RecordedEvent::SyncFlushInRender => {
                events.push(instant(ts, 0, "SyncFlushInRender", "Warning", json!({})));
            }
        }
    }

    serde_json::to_writer(&mut *writer, &events).map_err(io::Error::other)?;
    writer.flush()
}

fn instant(ts: usize, root: u32, name: &str, category: &str, args: Value) -> Value {
    json!({
        "ph": "i",
        "name": name,
        "cat": category,
        "ts": ts,
        "pid": root,
        "tid": 0,
        "s": "g",
        "args": args,
    })
}

#[cfg(test)]
mod tests {
    use accretion_core::trace::{CommitPhase, Tracer};

    use crate::recorder::RecorderSink;

    use super::*;

    #[test]
    fn export_produces_a_json_array() {
        let mut sink = RecorderSink::new();
        {
            let mut tracer = Tracer::new(&mut sink);
            tracer.commit_phase(CommitPhase::BeforeMutation);
            tracer.commit_phase(CommitPhase::Mutation);
            tracer.commit_phase(CommitPhase::Layout);
        }

        let mut out: Vec<u8> = Vec::new();
        export(sink.as_bytes(), &mut out).unwrap();

        let parsed: Vec<Value> = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0]["name"], "CommitPhase");
        assert_eq!(parsed[0]["args"]["phase"], "before-mutation");
        assert_eq!(parsed[2]["args"]["phase"], "layout");
        // Synthetic timeline preserves order.
        assert_eq!(parsed[0]["ts"], 0);
        assert_eq!(parsed[2]["ts"], 2);
    }
}
