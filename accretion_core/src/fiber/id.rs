// Copyright 2026 the Accretion Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Identity types: generational arena handles and opaque payload ids.
//!
//! Two macro-generated families cover every identity in the crate:
//!
//! - `generational_id!` handles pair an arena slot index with a
//!   generation counter. A destroyed slot bumps its generation, so every
//!   outstanding handle to it goes stale and fails validation instead of
//!   silently addressing the slot's next occupant. Both [`FiberId`] and
//!   [`RootId`](crate::root::RootId) come from this macro.
//! - `opaque_id!` ids are bare `u32` newtypes whose meaning lives entirely
//!   in the component layer; the core only stores and compares them.

use core::fmt;

/// Sentinel value indicating "no fiber" in index fields.
pub const INVALID: u32 = u32::MAX;

macro_rules! generational_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        ///
        /// Carries an arena slot index plus the generation the slot had when
        /// the handle was issued; a mismatch after the slot is recycled makes
        /// the handle stale, and stale handles panic at the access site
        /// rather than aliasing the slot's new occupant.
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name {
            pub(crate) idx: u32,
            pub(crate) generation: u32,
        }

        impl $name {
            /// Returns the raw slot index (for diagnostics only).
            #[inline]
            #[must_use]
            pub const fn index(self) -> u32 {
                self.idx
            }

            /// Returns the generation counter the handle was issued under.
            #[inline]
            #[must_use]
            pub const fn generation(self) -> u32 {
                self.generation
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, concat!(stringify!($name), "({}v{})"), self.idx, self.generation)
            }
        }
    };
}

pub(crate) use generational_id;

generational_id! {
    /// A handle to a fiber in a [`FiberStore`](super::FiberStore).
    FiberId
}

macro_rules! opaque_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

opaque_id! {
    /// An opaque reference to a component type, used as diffing identity.
    ///
    /// Element types are created and managed by the component layer; the core
    /// only compares them.
    ElementTypeId
}

opaque_id! {
    /// An opaque reconciliation key, used as diffing identity within a
    /// sibling list.
    KeyId
}

opaque_id! {
    /// An opaque reference to a props record owned by the component layer.
    ///
    /// The work loop moves these between the `pending` and `memoized` slots
    /// of a fiber but never inspects them.
    PropsId
}

opaque_id! {
    /// An opaque reference to a memoized-state record owned by the component
    /// layer.
    StateId
}

opaque_id! {
    /// An opaque reference to a fiber's update queue, owned by the component
    /// layer.
    UpdateQueueId
}

opaque_id! {
    /// An opaque reference to a host instance or other bookkeeping payload
    /// attached to a fiber (the `state_node` slot).
    InstanceId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_formats_are_compact() {
        let id = FiberId {
            idx: 3,
            generation: 2,
        };
        assert_eq!(alloc::format!("{id:?}"), "FiberId(3v2)");
        assert_eq!(alloc::format!("{:?}", PropsId(7)), "PropsId(7)");
    }

    #[test]
    fn handles_compare_by_slot_and_generation() {
        let a = FiberId {
            idx: 3,
            generation: 2,
        };
        let reused = FiberId {
            idx: 3,
            generation: 3,
        };
        assert_ne!(a, reused, "a recycled slot is a different identity");
        assert_eq!(a.index(), reused.index());
        assert_ne!(a.generation(), reused.generation());
    }
}
