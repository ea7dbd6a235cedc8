// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 Tessel Systems

//! Timing violation monitor
//!
//! Runs on every host tick for the currently running task and applies two
//! independent, individually configurable checks with deliberately
//! different recovery philosophies:
//!
//! - **WCET overrun** is a transient, recoverable anomaly: the task is
//!   suspended and released again at `release_time + period`, skipping
//!   the remainder of the overrunning instance.
//! - **Deadline overrun** is a fatal scheduling failure for that task:
//!   under EDF a miss means the task set is infeasible as scheduled, so
//!   the task is evicted and deleted, never retried.
//!
//! One-shot bandwidth-server instances are exempt from both checks unless
//! the corresponding `*_oneshot` switches are enabled.

use heapless::Vec;
use ts_common::constants::TOTAL_TASKS;
use ts_common::{MonitorConfig, Ticks};

use crate::event::{EV_DEADLINE_OVERFLOW, EV_WCET_OVERFLOW, EV_WCET_WAKEUP};
use crate::list::{DeadlineLists, ListKind};
use crate::task::{TaskId, TaskStatus, TaskStore};

/// What a single tick inspection produced
#[derive(Debug, Default, Clone, Copy)]
pub struct TickOutcome {
    /// Event bits to raise towards the engine
    pub events: u32,
    /// Task flagged for WCET overrun this tick
    pub wcet_overrun: Option<TaskId>,
    /// Task flagged for deadline overrun this tick
    pub deadline_overrun: Option<TaskId>,
}

/// Per-tick WCET/deadline checker and WCET-recovery bookkeeper
pub struct TimingMonitor {
    cfg: MonitorConfig,
    recheck_period: u64,
    earliest_wakeup: Option<Ticks>,
    suspended_for_wcet: usize,
}

impl TimingMonitor {
    /// Create a monitor with the given switches and re-check cadence
    #[must_use]
    pub fn new(cfg: MonitorConfig, recheck_period: u64) -> Self {
        Self {
            cfg,
            recheck_period: recheck_period.max(1),
            earliest_wakeup: None,
            suspended_for_wcet: 0,
        }
    }

    /// Inspect the currently running task on a timer tick
    ///
    /// `running` must be `None` when a pseudo task (idle, the engine
    /// itself, the aperiodic server) holds the CPU; those are never
    /// monitored. Execution time accounting happens here as well.
    pub fn on_tick(
        &mut self,
        store: &mut TaskStore,
        running: Option<TaskId>,
        now: Ticks,
    ) -> TickOutcome {
        let mut out = TickOutcome::default();

        if let Some(id) = running {
            if let Some(tcb) = store.get_mut(id) {
                tcb.measured_exec += 1;

                let wcet_applies = tcb.is_periodic || self.cfg.wcet_checks_oneshot;
                if self.cfg.wcet_checks
                    && wcet_applies
                    && tcb.status == TaskStatus::Running
                    && !tcb.wcet_exceeded
                    && tcb.measured_exec > tcb.wcet
                {
                    tcb.wcet_exceeded = true;
                    tcb.status = TaskStatus::Suspended;
                    tcb.next_unblock_time = tcb.rel_arrival + tcb.period;

                    let unblock = tcb.next_unblock_time;
                    self.earliest_wakeup = Some(match self.earliest_wakeup {
                        Some(t) if t <= unblock => t,
                        _ => unblock,
                    });
                    self.suspended_for_wcet += 1;

                    out.wcet_overrun = Some(id);
                    out.events |= EV_WCET_OVERFLOW;
                }

                let deadline_applies = tcb.is_periodic || self.cfg.deadline_checks_oneshot;
                if self.cfg.deadline_checks
                    && deadline_applies
                    && tcb.status == TaskStatus::Running
                    && tcb.abs_deadline < now
                {
                    tcb.deadline_exceeded = true;
                    out.deadline_overrun = Some(id);
                    out.events |= EV_DEADLINE_OVERFLOW;
                }
            }
        }

        if self.recovery_due(now) {
            out.events |= EV_WCET_WAKEUP;
        }

        out
    }

    fn recovery_due(&self, now: Ticks) -> bool {
        if self.suspended_for_wcet == 0 {
            return false;
        }
        match self.earliest_wakeup {
            Some(t) => now >= t || now.as_u64() % self.recheck_period == 0,
            None => now.as_u64() % self.recheck_period == 0,
        }
    }

    /// Release every WCET-suspended task whose recovery time has passed
    ///
    /// Due tasks move Suspended -> Ready with a fresh arrival at `now`
    /// and `abs_deadline = now + period`; the flag is cleared. The
    /// earliest pending recovery time is then recomputed over the tasks
    /// still suspended. Returns the released IDs so the engine can issue
    /// host resume directives.
    pub fn wake_due(
        &mut self,
        store: &mut TaskStore,
        lists: &mut DeadlineLists,
        now: Ticks,
    ) -> Vec<TaskId, TOTAL_TASKS> {
        let mut woken: Vec<TaskId, TOTAL_TASKS> = Vec::new();

        let suspended: Vec<TaskId, TOTAL_TASKS> =
            lists.ids(ListKind::Suspended).iter().copied().collect();
        for id in suspended {
            let due = store
                .get(id)
                .is_some_and(|t| t.wcet_exceeded && t.next_unblock_time <= now);
            if !due {
                continue;
            }

            if let Some(tcb) = store.get_mut(id) {
                tcb.wcet_exceeded = false;
                tcb.rel_arrival = now;
                tcb.abs_deadline = now + tcb.period;
                tcb.status = TaskStatus::Ready;
            }
            let _ = lists.remove(store, id);
            let _ = lists.insert(store, ListKind::Ready, id);
            self.suspended_for_wcet = self.suspended_for_wcet.saturating_sub(1);
            let _ = woken.push(id);
        }

        self.earliest_wakeup = lists
            .ids(ListKind::Suspended)
            .iter()
            .filter_map(|&id| store.get(id))
            .filter(|t| t.wcet_exceeded)
            .map(|t| t.next_unblock_time)
            .min();

        woken
    }

    /// Earliest pending recovery time across all WCET-suspended tasks
    #[must_use]
    pub const fn earliest_wakeup(&self) -> Option<Ticks> {
        self.earliest_wakeup
    }

    /// Forget all recovery state (full-system teardown only)
    pub fn reset(&mut self) {
        self.earliest_wakeup = None;
        self.suspended_for_wcet = 0;
    }
}
