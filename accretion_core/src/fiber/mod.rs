// Copyright 2026 the Accretion Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fiber tree data model.
//!
//! A *fiber* is a node in the reconciliation tree. Each fiber has:
//!
//! - An identity ([`FiberId`]) — a generational handle that becomes stale
//!   when the fiber is destroyed, preventing use-after-free bugs at the API
//!   level.
//! - Topology — parent (return), first-child, and sibling links forming an
//!   ordered tree, plus an `alternate` link pairing it with its counterpart
//!   in the other buffer.
//! - **Work state** maintained by the loop: `lanes` (pending work on the
//!   fiber itself), `child_lanes` (union of pending work below it), and
//!   [`EffectFlags`] describing what the next commit must do here.
//! - **Payload slots** owned by the component layer: opaque handles for
//!   props, memoized state, the update queue, and the host instance. The
//!   core shuttles these between slots but never dereferences them.
//!
//! # Double buffering
//!
//! At most two fibers exist per logical tree node: the `current` one,
//! belonging to the committed tree, and its `alternate`, the work-in-progress
//! being built by the render phase. [`FiberStore::create_work_in_progress`]
//! creates or recycles the alternate; a commit swaps the buffers atomically
//! by repointing the root's `current`. Whenever `alternate` is non-null,
//! `alternate.alternate` points back at the fiber itself.
//!
//! # Effect list
//!
//! During the complete phase each fiber contributes an intrusive singly
//! linked list (`first_effect`/`last_effect`/`next_effect`) of its effectful
//! descendants in completion order; the commit pipeline walks the root's
//! list exactly once per commit.

mod id;
mod node;
mod store;

pub(crate) use id::generational_id;
pub use id::{
    ElementTypeId, FiberId, INVALID, InstanceId, KeyId, PropsId, StateId, UpdateQueueId,
};
pub use node::{EffectFlags, Fiber, FiberTag, Mode};
pub use store::{Children, FiberStore};
