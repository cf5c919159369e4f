// Copyright 2026 the Accretion Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Suspension, ping, and retry protocol.
//!
//! A suspending component surfaces a [`WakeableId`]; the render loop marks
//! the rendered lanes suspended on the root and subscribes to the wakeable
//! once (the ping cache dedupes per root). When the embedder reports the
//! wakeable resolved via [`WorkLoop::ping_suspended_root`], the suspended
//! lanes move to the pinged set and become selectable again; a render still
//! parked on that very data restarts from the top instead of finishing
//! stale.

use alloc::vec::Vec;

use crate::error::LoopError;
use crate::fiber::FiberId;
use crate::lane::{Lane, Lanes};
use crate::reconciler::WakeableId;
use crate::root::RootId;
use crate::trace::RootPingedEvent;
use crate::work_loop::{ExitStatus, Platform, WorkLoop};

/// Per-transition suspense tuning, carried by updates born inside a
/// transition.
///
/// All durations are milliseconds; zero means "unset".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SuspenseConfig {
    /// How long suspended content may hold back its fallback.
    pub timeout_ms: u64,
    /// Grace period before the transition counts as busy.
    pub busy_delay_ms: u64,
    /// Once busy, the minimum time the previous state stays visible, to
    /// avoid a flash of intermediate content.
    pub busy_min_duration_ms: u64,
}

impl SuspenseConfig {
    /// A config with every field unset.
    pub const DEFAULT: Self = Self {
        timeout_ms: 0,
        busy_delay_ms: 0,
        busy_min_duration_ms: 0,
    };
}

impl Default for SuspenseConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Maps time already spent waiting to the total delay worth waiting for.
///
/// Loading states that resolve within a just-noticeable-difference step of
/// when they began are perceived as instantaneous, so the fallback is held
/// back until the next step boundary. The staircase coarsens as more time
/// passes.
#[must_use]
pub fn jnd_timeout_ms(elapsed_ms: u64) -> u64 {
    if elapsed_ms < 120 {
        120
    } else if elapsed_ms < 480 {
        480
    } else if elapsed_ms < 1080 {
        1080
    } else if elapsed_ms < 1920 {
        1920
    } else if elapsed_ms < 3000 {
        3000
    } else if elapsed_ms < 4320 {
        4320
    } else {
        elapsed_ms.div_ceil(1960) * 1960
    }
}

impl WorkLoop {
    /// Subscribes to a wakeable's resolution on behalf of `root`, at most
    /// once per (wakeable, lanes) combination.
    pub(crate) fn attach_ping_listener(
        &mut self,
        plat: &mut Platform<'_>,
        root: RootId,
        wakeable: WakeableId,
        lanes: Lanes,
    ) {
        let state = self.roots.get_mut(root);
        let subscribe = match state.ping_cache.get_mut(&wakeable) {
            Some(existing) => {
                if existing.contains(lanes) {
                    false
                } else {
                    *existing = existing.union(lanes);
                    true
                }
            }
            None => {
                state.ping_cache.insert(wakeable, lanes);
                true
            }
        };
        if subscribe {
            plat.reconciler.attach_ping(wakeable);
        }
    }

    /// Reports that a wakeable a render suspended on has resolved.
    ///
    /// Moves `pinged_lanes` from the root's suspended set to its pinged set
    /// and reschedules. If those lanes are a subset of an in-progress
    /// render that is itself parked on suspended data (delayed, or
    /// fallback-throttled with no updates processed), the partial render is
    /// discarded so the retry starts from the top with fresh data.
    pub fn ping_suspended_root(
        &mut self,
        plat: &mut Platform<'_>,
        root: RootId,
        wakeable: WakeableId,
        pinged_lanes: Lanes,
    ) {
        {
            let state = self.roots.get_mut(root);
            state.ping_cache.remove(&wakeable);
            state.mark_pinged(pinged_lanes);
        }

        let mut restarted = false;
        if self.wip_root == Some(root) && self.wip_render_lanes.contains(pinged_lanes) {
            let now = plat.scheduler.now();
            let since_fallback = now
                .saturating_duration_since(self.last_fallback_time)
                .millis();
            let throttled_retry = self.wip_exit_status == ExitStatus::Suspended
                && self.wip_latest_event_time.is_none()
                && since_fallback < self.config.fallback_throttle_ms;
            if self.wip_exit_status == ExitStatus::SuspendedWithDelay || throttled_retry {
                self.prepare_fresh_stack(plat, root, Lanes::NONE);
                restarted = true;
            } else {
                self.wip_pinged_lanes = self.wip_pinged_lanes.union(pinged_lanes);
            }
        }

        plat.tracer.root_pinged(RootPingedEvent {
            root,
            lanes: pinged_lanes,
            restarted,
        });
        self.ensure_root_is_scheduled(plat, root);
    }

    /// Schedules a retry render for a suspense boundary whose fallback
    /// committed. With no explicit lane, a fresh one is chosen as for any
    /// other update on the boundary.
    ///
    /// # Errors
    ///
    /// See [`WorkLoop::schedule_update_on_fiber`].
    pub fn retry_timed_out_boundary(
        &mut self,
        plat: &mut Platform<'_>,
        boundary: FiberId,
        retry_lane: Option<Lane>,
    ) -> Result<(), LoopError> {
        let lane = match retry_lane {
            Some(lane) => lane,
            None => self.request_update_lane(plat, boundary, None),
        };
        let event_time = self.request_event_time(plat);
        self.schedule_update_on_fiber(plat, boundary, lane, event_time)
    }

    /// Reports that the wakeable a committed fallback is waiting on has
    /// resolved: evicts it from every ping cache and retries the boundary.
    ///
    /// # Errors
    ///
    /// See [`WorkLoop::schedule_update_on_fiber`].
    pub fn resolve_retry_wakeable(
        &mut self,
        plat: &mut Platform<'_>,
        boundary: FiberId,
        wakeable: WakeableId,
    ) -> Result<(), LoopError> {
        let ids: Vec<RootId> = self.roots.iter().map(|(id, _)| id).collect();
        for id in ids {
            self.roots.get_mut(id).ping_cache.remove(&wakeable);
        }
        self.retry_timed_out_boundary(plat, boundary, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jnd_staircase_matches_steps() {
        assert_eq!(jnd_timeout_ms(0), 120);
        assert_eq!(jnd_timeout_ms(119), 120);
        assert_eq!(jnd_timeout_ms(120), 480);
        assert_eq!(jnd_timeout_ms(479), 480);
        assert_eq!(jnd_timeout_ms(480), 1080);
        assert_eq!(jnd_timeout_ms(1080), 1920);
        assert_eq!(jnd_timeout_ms(1920), 3000);
        assert_eq!(jnd_timeout_ms(3000), 4320);
        assert_eq!(jnd_timeout_ms(4320), 5880, "ceil(4320/1960)*1960");
        assert_eq!(jnd_timeout_ms(5880), 5880);
        assert_eq!(jnd_timeout_ms(5881), 7840);
    }

    #[test]
    fn default_config_is_unset() {
        let config = SuspenseConfig::default();
        assert_eq!(config.timeout_ms, 0);
        assert_eq!(config.busy_delay_ms, 0);
        assert_eq!(config.busy_min_duration_ms, 0);
    }
}
