// Copyright 2026 the Accretion Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The fiber record and its tag, mode, and effect-flag vocabularies.

use bitflags::bitflags;

use crate::lane::Lanes;

use super::id::{ElementTypeId, INVALID, InstanceId, KeyId, PropsId, StateId, UpdateQueueId};

/// The structural variant of a fiber.
///
/// The core never interprets component semantics; it dispatches begin,
/// complete, and unwind work to the component layer, which keys its behavior
/// off this tag. The tags the core itself inspects are [`HostRoot`]
/// (terminates upward walks) and the host tags (eligible for host mutation
/// effects).
///
/// [`HostRoot`]: FiberTag::HostRoot
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FiberTag {
    /// The root of a fiber tree, paired with a
    /// [`RootState`](crate::root::RootState).
    HostRoot,
    /// A host container instance (e.g. an element).
    Host,
    /// A host text instance.
    HostText,
    /// A class component.
    Class,
    /// A function component.
    Function,
    /// A ref-forwarding wrapper.
    ForwardRef,
    /// A memoized component wrapper.
    Memo,
    /// A block component.
    Block,
    /// A suspense boundary: catches suspended descendants and shows a
    /// fallback.
    Suspense,
    /// A coordinator for the reveal order of several suspense boundaries.
    SuspenseList,
    /// A hidden (or hideable) subtree.
    Offscreen,
}

bitflags! {
    /// Rendering mode bits, inherited from a fiber's parent at creation.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct Mode: u8 {
        /// Updates may be batched before flushing.
        const BLOCKING = 1 << 0;
        /// Updates may render asynchronously on non-sync lanes.
        const CONCURRENT = 1 << 1;
        /// Extra invariant checking in the component layer.
        const STRICT = 1 << 2;
        /// Timing collection for this subtree.
        const PROFILE = 1 << 3;
    }
}

bitflags! {
    /// Side-effect flags accumulated on a fiber during the render phase and
    /// consumed by the commit pipeline.
    ///
    /// The low bits (through [`HYDRATING`](Self::HYDRATING)) describe work a
    /// commit performs; [`HOST_MASK`](Self::HOST_MASK) selects exactly those.
    /// The bits above are render-phase bookkeeping that must never survive
    /// into a committed tree.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct EffectFlags: u16 {
        /// The component layer did work here (memo bailout bookkeeping).
        /// A fiber whose only flag is this is skipped by the effect list.
        const PERFORMED_WORK = 1 << 0;
        /// Insert (or move) the host node into its parent.
        const PLACEMENT = 1 << 1;
        /// Apply a host property diff or run update lifecycles.
        const UPDATE = 1 << 2;
        /// Remove the subtree from the host.
        const DELETION = 1 << 3;
        /// Clear host text content before children are placed.
        const CONTENT_RESET = 1 << 4;
        /// Run enqueued update callbacks in the layout phase.
        const CALLBACK = 1 << 5;
        /// A boundary captured a thrown value this render.
        const DID_CAPTURE = 1 << 6;
        /// Attach (and first detach) a ref.
        const REF = 1 << 7;
        /// Take a before-mutation snapshot.
        const SNAPSHOT = 1 << 8;
        /// Schedule passive effects for after paint.
        const PASSIVE = 1 << 9;
        /// The fiber is adopting existing host nodes.
        const HYDRATING = 1 << 10;
        /// The fiber's render did not finish; unwind instead of complete.
        const INCOMPLETE = 1 << 11;
        /// A boundary below threw; this fiber should capture on unwind.
        const SHOULD_CAPTURE = 1 << 12;

        /// The flags a commit is allowed to see. Unwinding a captured
        /// boundary masks its flags to this set.
        const HOST_MASK = (1 << 11) - 1;
    }
}

impl EffectFlags {
    /// Returns whether the fiber must appear on the effect list: any flag
    /// beyond the bare [`PERFORMED_WORK`](Self::PERFORMED_WORK) marker.
    #[inline]
    #[must_use]
    pub fn is_effectful(self) -> bool {
        !self.difference(Self::PERFORMED_WORK).is_empty()
    }

    /// Returns whether any of Placement, Update, Deletion, or Hydrating is
    /// set (the mutation-phase dispatch subset).
    #[inline]
    #[must_use]
    pub fn primary_mutation(self) -> Self {
        self.intersection(Self::PLACEMENT | Self::UPDATE | Self::DELETION | Self::HYDRATING)
    }
}

/// A node of the reconciliation tree.
///
/// Payload slots are opaque handles owned by the component layer; the core
/// moves them around (e.g. `memoized_props = pending_props` on completion of
/// a unit) but never looks inside. Tree links are private to the store:
/// mutate topology through [`FiberStore`](super::FiberStore) methods so the
/// alternate and effect-list invariants hold.
#[derive(Clone, Debug)]
pub struct Fiber {
    /// Structural variant.
    pub tag: FiberTag,
    /// Diffing identity within a sibling list.
    pub key: Option<KeyId>,
    /// Diffing identity of the component type.
    pub element_type: Option<ElementTypeId>,
    /// Inherited rendering mode.
    pub mode: Mode,
    /// Lanes on which this fiber itself has pending work.
    pub lanes: Lanes,
    /// Union of `lanes | child_lanes` over all descendants.
    pub child_lanes: Lanes,
    /// Side effects accumulated this render.
    pub flags: EffectFlags,
    /// Props for the in-progress render.
    pub pending_props: Option<PropsId>,
    /// Props of the last finished render.
    pub memoized_props: Option<PropsId>,
    /// State of the last finished render.
    pub memoized_state: Option<StateId>,
    /// Queue of not-yet-applied updates.
    pub update_queue: Option<UpdateQueueId>,
    /// Host instance or bookkeeping payload.
    pub state_node: Option<InstanceId>,

    pub(crate) parent: u32,
    pub(crate) child: u32,
    pub(crate) sibling: u32,
    pub(crate) alternate: u32,
    pub(crate) first_effect: u32,
    pub(crate) last_effect: u32,
    pub(crate) next_effect: u32,
}

impl Fiber {
    pub(crate) fn new(tag: FiberTag, mode: Mode, pending_props: Option<PropsId>) -> Self {
        Self {
            tag,
            key: None,
            element_type: None,
            mode,
            lanes: Lanes::NONE,
            child_lanes: Lanes::NONE,
            flags: EffectFlags::empty(),
            pending_props,
            memoized_props: None,
            memoized_state: None,
            update_queue: None,
            state_node: None,
            parent: INVALID,
            child: INVALID,
            sibling: INVALID,
            alternate: INVALID,
            first_effect: INVALID,
            last_effect: INVALID,
            next_effect: INVALID,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn performed_work_alone_is_not_effectful() {
        assert!(!EffectFlags::PERFORMED_WORK.is_effectful());
        assert!(!EffectFlags::empty().is_effectful());
        assert!((EffectFlags::PERFORMED_WORK | EffectFlags::UPDATE).is_effectful());
        assert!(EffectFlags::PLACEMENT.is_effectful());
    }

    #[test]
    fn host_mask_stops_below_incomplete() {
        assert!(EffectFlags::HOST_MASK.contains(EffectFlags::HYDRATING));
        assert!(!EffectFlags::HOST_MASK.contains(EffectFlags::INCOMPLETE));
        assert!(!EffectFlags::HOST_MASK.contains(EffectFlags::SHOULD_CAPTURE));

        let captured = EffectFlags::SHOULD_CAPTURE | EffectFlags::UPDATE | EffectFlags::INCOMPLETE;
        let masked = captured & EffectFlags::HOST_MASK;
        assert_eq!(masked, EffectFlags::UPDATE);
    }

    #[test]
    fn primary_mutation_selects_dispatch_bits() {
        let flags = EffectFlags::PLACEMENT | EffectFlags::UPDATE | EffectFlags::REF;
        assert_eq!(
            flags.primary_mutation(),
            EffectFlags::PLACEMENT | EffectFlags::UPDATE
        );
    }
}
