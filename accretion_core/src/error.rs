// Copyright 2026 the Accretion Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors surfaced by the work loop's public entry points.
//!
//! Render- and commit-phase errors are normally *captured*: attached to a
//! boundary as a sync-lane error update and never seen by the embedder.
//! [`LoopError`] covers what remains — failures with no boundary left to
//! absorb them, and runaway update cascades.

use thiserror::Error;

use crate::reconciler::ErrorId;

/// A failure that escaped the capture machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LoopError {
    /// More than the configured limit of consecutive synchronous commits
    /// landed on the same root without the queue draining; some effect is
    /// scheduling updates in an unconditional loop.
    #[error("maximum update depth exceeded: a cascading sync update loop was cut off")]
    NestedUpdateOverflow,

    /// Handling a thrown value itself threw; the render was discarded and
    /// its lanes marked suspended.
    #[error("fatal render error {0:?}: error handling failed while unwinding")]
    FatalRender(ErrorId),

    /// A root-level error update committed with no boundary above it; the
    /// original value is rethrown to the embedder.
    #[error("uncaught error {0:?} committed at the root")]
    Uncaught(ErrorId),

    /// A guarded commit sub-step failed. The error was already attributed
    /// to the nearest boundary and the commit completed; the first such
    /// error is returned for reporting.
    #[error("commit-phase error {0:?} (captured and attributed)")]
    CommitPhase(ErrorId),
}
