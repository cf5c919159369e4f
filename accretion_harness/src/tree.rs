// Copyright 2026 the Accretion Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A scripted component layer.
//!
//! [`ScriptedTree`] implements [`Reconciler`] from a table of
//! [`NodeScript`]s keyed by element type. Each script names the node's tag,
//! its children, and its behavior: suspend until a wakeable resolves, fault
//! once, carry update/layout/passive effects. Reconciliation matches
//! children by element type and is append-only (scripts don't shrink), which
//! keeps the harness small while still exercising double buffering,
//! placement flags, boundary capture, and effect scheduling.

use alloc::vec::Vec;

use hashbrown::{HashMap, HashSet};

use accretion_core::fiber::{EffectFlags, ElementTypeId, FiberId, FiberStore, FiberTag};
use accretion_core::lane::{Lane, Lanes};
use accretion_core::reconciler::{
    ErrorId, Reconciler, Thrown, ThrowOutcome, UpdateBuffer, WakeableId, WorkStep,
};
use accretion_core::suspense::SuspenseConfig;
use accretion_core::time::HostTime;

/// What a scripted node does when its begin phase runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Behavior {
    /// Render normally.
    Normal,
    /// Suspend on the wakeable until [`ScriptedTree::resolve`] is called
    /// for it.
    SuspendUntilResolved(WakeableId),
    /// Raise the error the first time this node renders.
    FaultOnce(ErrorId),
}

/// The script for one logical tree node, keyed by its element type.
#[derive(Clone, Debug)]
pub struct NodeScript {
    /// Fiber tag to create the node with.
    pub tag: FiberTag,
    /// Children, rendered in order.
    pub children: Vec<ElementTypeId>,
    /// Begin-phase behavior.
    pub behavior: Behavior,
    /// Carry an `UPDATE` effect whenever the node re-renders.
    pub update_on_rerender: bool,
    /// Carry a `SNAPSHOT` effect.
    pub snapshot: bool,
    /// Carry a `CALLBACK` effect (runs `commit_layout`).
    pub layout: bool,
    /// Carry a `PASSIVE` effect.
    pub passive: bool,
    /// Each `commit_layout` schedules a sync update on the node itself.
    pub layout_schedules_sync: bool,
    /// The node is a class error boundary.
    pub error_boundary: bool,
}

impl NodeScript {
    /// A plain host node with the given children.
    #[must_use]
    pub fn host(children: Vec<ElementTypeId>) -> Self {
        Self {
            tag: FiberTag::Host,
            children,
            behavior: Behavior::Normal,
            update_on_rerender: false,
            snapshot: false,
            layout: false,
            passive: false,
            layout_schedules_sync: false,
            error_boundary: false,
        }
    }

    /// A suspense boundary around the given children.
    #[must_use]
    pub fn suspense(children: Vec<ElementTypeId>) -> Self {
        Self {
            tag: FiberTag::Suspense,
            ..Self::host(children)
        }
    }

    /// A class component; `error_boundary` decides whether it captures.
    #[must_use]
    pub fn class(children: Vec<ElementTypeId>, error_boundary: bool) -> Self {
        Self {
            tag: FiberTag::Class,
            error_boundary,
            ..Self::host(children)
        }
    }

    /// Sets the begin-phase behavior.
    #[must_use]
    pub fn with_behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }
}

/// An update the embedder scheduled, remembered so the begin phase can
/// report its event time (and transition config) when it consumes it.
#[derive(Clone, Copy, Debug)]
struct UpdateNote {
    fiber_type: ElementTypeId,
    lanes: Lanes,
    time: HostTime,
    config: Option<SuspenseConfig>,
}

/// A [`Reconciler`] driven by [`NodeScript`]s.
#[derive(Debug, Default)]
pub struct ScriptedTree {
    scripts: HashMap<ElementTypeId, NodeScript>,
    resolved: HashSet<WakeableId>,
    faulted: HashSet<ElementTypeId>,
    notes: Vec<UpdateNote>,
    commit_error_ui: HashSet<ElementTypeId>,

    /// Boundaries capturing a wakeable report it as delay-capable.
    pub delay_suspense: bool,
    /// When set, handling a thrown error fails with that same error,
    /// exercising the fatal path.
    pub fail_throw_handling: bool,

    /// Element types visited by the begin phase, in order.
    pub begin_log: Vec<ElementTypeId>,
    /// Element types whose snapshot hook ran.
    pub snapshot_log: Vec<ElementTypeId>,
    /// Element types whose layout hook ran.
    pub layout_log: Vec<ElementTypeId>,
    /// Element types whose passive destroy ran.
    pub passive_unmount_log: Vec<ElementTypeId>,
    /// Element types whose passive create ran.
    pub passive_mount_log: Vec<ElementTypeId>,
    /// Render-phase captures: (boundary element type if any, error).
    pub captured_render_errors: Vec<(Option<ElementTypeId>, ErrorId)>,
    /// Commit-phase captures accepted by a class boundary.
    pub captured_commit_errors: Vec<(ElementTypeId, ErrorId)>,
    /// Suspense boundaries that captured a wakeable.
    pub suspended_at: Vec<(ElementTypeId, WakeableId)>,
    /// Error/fallback UIs rendered after a capture.
    pub error_ui_rendered: Vec<ElementTypeId>,
    /// Wakeables the loop subscribed to (deduplicated by the ping cache).
    pub pings_attached: Vec<WakeableId>,
}

impl ScriptedTree {
    /// Creates an empty tree with no scripts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the script for an element type.
    pub fn define(&mut self, ty: ElementTypeId, script: NodeScript) {
        self.scripts.insert(ty, script);
    }

    /// Marks a wakeable resolved; nodes suspending on it render normally
    /// from now on.
    pub fn resolve(&mut self, wakeable: WakeableId) {
        self.resolved.insert(wakeable);
    }

    /// Remembers an update's event time (and transition config) so the
    /// begin phase reports it when the update is consumed.
    pub fn note_update(
        &mut self,
        fiber_type: ElementTypeId,
        lanes: Lanes,
        time: HostTime,
        config: Option<SuspenseConfig>,
    ) {
        self.notes.push(UpdateNote {
            fiber_type,
            lanes,
            time,
            config,
        });
    }

    fn is_error_boundary(&self, store: &FiberStore, fiber: FiberId) -> Option<ElementTypeId> {
        let ty = store.fiber(fiber).element_type?;
        self.scripts
            .get(&ty)
            .filter(|s| s.error_boundary)
            .map(|_| ty)
    }
}

impl Reconciler for ScriptedTree {
    fn begin_work(
        &mut self,
        store: &mut FiberStore,
        current: Option<FiberId>,
        wip: FiberId,
        render_lanes: Lanes,
        updates: &mut UpdateBuffer,
    ) -> WorkStep {
        let Some(ty) = store.fiber(wip).element_type else {
            store.fiber_mut(wip).lanes = Lanes::NONE;
            return WorkStep::Done;
        };
        self.begin_log.push(ty);
        let Some(script) = self.scripts.get(&ty).cloned() else {
            store.fiber_mut(wip).lanes = Lanes::NONE;
            return WorkStep::Done;
        };

        // Consume the updates included in this render; report skipped ones.
        let fiber_lanes = store.fiber(wip).lanes;
        let consumed = fiber_lanes.intersection(render_lanes);
        if consumed.is_empty() {
            if !fiber_lanes.is_empty() {
                updates.mark_skipped(fiber_lanes);
            }
        } else {
            store.fiber_mut(wip).lanes = fiber_lanes.minus(render_lanes);
            let mut kept = Vec::new();
            for note in self.notes.drain(..) {
                if note.fiber_type == ty && note.lanes.intersects(render_lanes) {
                    updates.mark_event(note.time, note.config);
                } else {
                    kept.push(note);
                }
            }
            self.notes = kept;
        }

        match script.behavior {
            Behavior::SuspendUntilResolved(w) => {
                if !self.resolved.contains(&w) {
                    return WorkStep::Suspend(w);
                }
            }
            Behavior::FaultOnce(e) => {
                if self.faulted.insert(ty) {
                    return WorkStep::Fault(e);
                }
            }
            Behavior::Normal => {}
        }

        // A boundary that captured renders its fallback (or error UI)
        // instead of its scripted children.
        let did_capture = store.fiber(wip).flags.contains(EffectFlags::DID_CAPTURE);
        let commit_capture = self.commit_error_ui.remove(&ty);
        if commit_capture || (did_capture && script.error_boundary) {
            self.error_ui_rendered.push(ty);
        }
        let children: Vec<ElementTypeId> = if did_capture || commit_capture {
            Vec::new()
        } else {
            script.children.clone()
        };

        // Reconcile by element type against the current incarnation.
        let mut first = None;
        let mut prev: Option<FiberId> = None;
        for child_ty in &children {
            let existing = current.and_then(|c| {
                store
                    .children(c)
                    .find(|k| store.fiber(*k).element_type == Some(*child_ty))
            });
            let child = match existing {
                Some(c) => store.create_work_in_progress(c, None),
                None => {
                    let tag = self
                        .scripts
                        .get(child_ty)
                        .map_or(FiberTag::Host, |s| s.tag);
                    let mode = store.fiber(wip).mode;
                    let f = store.create_fiber(tag, mode, None);
                    store.fiber_mut(f).element_type = Some(*child_ty);
                    store.fiber_mut(f).flags |= EffectFlags::PLACEMENT;
                    f
                }
            };
            store.set_parent(child, Some(wip));
            store.set_sibling(child, None);
            match prev {
                Some(p) => store.set_sibling(p, Some(child)),
                None => first = Some(child),
            }
            prev = Some(child);
        }
        store.set_child(wip, first);

        match first {
            Some(f) => WorkStep::ContinueWith(f),
            None => WorkStep::Done,
        }
    }

    fn complete_work(
        &mut self,
        store: &mut FiberStore,
        current: Option<FiberId>,
        wip: FiberId,
        _render_lanes: Lanes,
    ) -> WorkStep {
        if let Some(ty) = store.fiber(wip).element_type
            && let Some(script) = self.scripts.get(&ty)
        {
            let mut add = EffectFlags::empty();
            if script.update_on_rerender && current.is_some() {
                add |= EffectFlags::UPDATE;
            }
            if script.snapshot {
                add |= EffectFlags::SNAPSHOT;
            }
            if script.layout {
                add |= EffectFlags::CALLBACK;
            }
            if script.passive {
                add |= EffectFlags::PASSIVE;
            }
            store.fiber_mut(wip).flags |= add;
        }
        WorkStep::Done
    }

    fn unwind_work(
        &mut self,
        store: &mut FiberStore,
        wip: FiberId,
        _render_lanes: Lanes,
    ) -> Option<FiberId> {
        let flags = store.fiber(wip).flags;
        if flags.contains(EffectFlags::SHOULD_CAPTURE) {
            let fiber = store.fiber_mut(wip);
            fiber.flags.remove(EffectFlags::SHOULD_CAPTURE);
            fiber.flags |= EffectFlags::DID_CAPTURE;
            Some(wip)
        } else {
            None
        }
    }

    fn throw_exception(
        &mut self,
        store: &mut FiberStore,
        root_fiber: FiberId,
        return_fiber: Option<FiberId>,
        _source: FiberId,
        value: Thrown,
        _render_lanes: Lanes,
        _updates: &mut UpdateBuffer,
    ) -> Result<ThrowOutcome, ErrorId> {
        match value {
            Thrown::Wakeable(wakeable) => {
                let mut cursor = return_fiber;
                while let Some(fiber) = cursor {
                    if store.fiber(fiber).tag == FiberTag::Suspense {
                        store.fiber_mut(fiber).flags |= EffectFlags::SHOULD_CAPTURE;
                        if let Some(ty) = store.fiber(fiber).element_type {
                            self.suspended_at.push((ty, wakeable));
                        }
                        return Ok(ThrowOutcome::Suspended {
                            delay_possible: self.delay_suspense,
                        });
                    }
                    cursor = store.parent(fiber);
                }
                // No boundary above: the root absorbs it as an error.
                store.fiber_mut(root_fiber).flags |= EffectFlags::SHOULD_CAPTURE;
                Ok(ThrowOutcome::ErrorCaptured)
            }
            Thrown::Error(error) => {
                if self.fail_throw_handling {
                    return Err(error);
                }
                let mut cursor = return_fiber;
                while let Some(fiber) = cursor {
                    if let Some(ty) = self.is_error_boundary(store, fiber) {
                        store.fiber_mut(fiber).flags |= EffectFlags::SHOULD_CAPTURE;
                        self.captured_render_errors.push((Some(ty), error));
                        return Ok(ThrowOutcome::ErrorCaptured);
                    }
                    cursor = store.parent(fiber);
                }
                store.fiber_mut(root_fiber).flags |= EffectFlags::SHOULD_CAPTURE;
                self.captured_render_errors.push((None, error));
                Ok(ThrowOutcome::ErrorCaptured)
            }
        }
    }

    fn commit_snapshot(&mut self, store: &mut FiberStore, fiber: FiberId) -> Result<(), ErrorId> {
        if let Some(ty) = store.fiber(fiber).element_type {
            self.snapshot_log.push(ty);
        }
        Ok(())
    }

    fn commit_layout(
        &mut self,
        store: &mut FiberStore,
        fiber: FiberId,
        _current: Option<FiberId>,
        updates: &mut UpdateBuffer,
    ) -> Result<(), ErrorId> {
        let Some(ty) = store.fiber(fiber).element_type else {
            return Ok(());
        };
        self.layout_log.push(ty);
        if self
            .scripts
            .get(&ty)
            .is_some_and(|s| s.layout_schedules_sync)
        {
            updates.schedule(fiber, Lane::SYNC);
        }
        Ok(())
    }

    fn commit_passive_unmount(
        &mut self,
        store: &mut FiberStore,
        fiber: FiberId,
        _updates: &mut UpdateBuffer,
    ) -> Result<(), ErrorId> {
        if let Some(ty) = store.fiber(fiber).element_type {
            self.passive_unmount_log.push(ty);
        }
        Ok(())
    }

    fn commit_passive_mount(
        &mut self,
        store: &mut FiberStore,
        fiber: FiberId,
        _updates: &mut UpdateBuffer,
    ) -> Result<(), ErrorId> {
        if let Some(ty) = store.fiber(fiber).element_type {
            self.passive_mount_log.push(ty);
        }
        Ok(())
    }

    fn try_capture_error(
        &mut self,
        store: &mut FiberStore,
        boundary: FiberId,
        _source: FiberId,
        error: ErrorId,
    ) -> bool {
        let Some(ty) = self.is_error_boundary(store, boundary) else {
            return false;
        };
        self.captured_commit_errors.push((ty, error));
        self.commit_error_ui.insert(ty);
        true
    }

    fn attach_ping(&mut self, wakeable: WakeableId) {
        self.pings_attached.push(wakeable);
    }
}
