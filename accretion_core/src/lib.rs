// Copyright 2026 the Accretion Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core types and work loop for lane-prioritised tree reconciliation.
//!
//! `accretion_core` is a cooperative, priority-aware reconciler: it
//! incrementally diffs a declarative tree description against the committed
//! tree, builds a replacement in a second buffer, and installs it on an
//! external host in ordered commit phases. It is `no_std` compatible (with
//! `alloc`) and uses arena storage with generational index handles
//! throughout.
//!
//! # Architecture
//!
//! The crate is organized around a loop that turns updates into committed
//! trees:
//!
//! ```text
//!   update ──► schedule_update_on_fiber ──► lane selection (root masks)
//!                                                │
//!                  ┌─────────────────────────────┘
//!                  ▼
//!   ensure_root_is_scheduled ──► TaskScheduler (one task per root)
//!                  │
//!                  ▼
//!   perform_*_work_on_root ──► begin/complete walk ──► effect list
//!                  │                   │
//!                  │             Suspend/Fault ──► boundary unwind, pings
//!                  ▼
//!   commit: before-mutation ── mutation ── swap ── layout ── passive
//! ```
//!
//! **[`lane`]** — Bitmask priority classes: selection, transition-lane
//! distribution, starvation expiry, and scheduler-priority translation.
//!
//! **[`fiber`]** — Arena-stored fiber tree with generational handles,
//! double-buffered via `alternate` links, carrying lanes, effect flags, and
//! opaque component payloads.
//!
//! **[`root`]** — Per-root lane masks (pending/suspended/pinged/expired),
//! per-lane stamps, and bound-task state.
//!
//! **[`work_loop`]** — The per-renderer context owning all of the above
//! plus the execution-context mask, sync queue, and passive queues.
//!
//! **[`render`]** — The cooperative begin/complete walk, thrown-value
//! routing, and post-render commit policy.
//!
//! **[`commit`]** — The three-phase commit pipeline and deferred passive
//! effects, with per-effect error attribution.
//!
//! **[`suspense`]** — Wakeable ping/retry protocol and the
//! just-noticeable-difference timeout staircase.
//!
//! **[`batch`]** — Execution-context wrappers (`batched_updates`,
//! `flush_sync`, `discrete_updates`, …).
//!
//! **[`sched`]**, **[`host`]**, **[`reconciler`]** — The three consumed
//! contracts: the priority scheduler, the host adapter, and the
//! component layer.
//!
//! **[`trace`]** — [`TraceSink`](trace::TraceSink) trait and event types
//! for work-loop instrumentation, with zero-overhead
//! [`Tracer`](trace::Tracer) wrapper.
//!
//! # Crate features
//!
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one
//!   branch per call site).

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod batch;
pub mod commit;
pub mod error;
pub mod fiber;
pub mod host;
pub mod lane;
pub mod reconciler;
pub mod render;
pub mod root;
pub mod sched;
pub mod suspense;
pub mod time;
pub mod trace;
pub mod work_loop;

#[cfg(test)]
mod test_util;

pub use error::LoopError;
pub use work_loop::{
    DEFAULT_SUSPENSE_TIMEOUT_MS, ExecutionContext, ExitStatus, FALLBACK_THROTTLE_MS, LoopConfig,
    NESTED_PASSIVE_UPDATE_LIMIT, NESTED_UPDATE_LIMIT, Platform, WorkLoop, WorkStatus,
};
