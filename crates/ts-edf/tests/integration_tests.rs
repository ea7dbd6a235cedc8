// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 Tessel Systems

//! Integration tests for ts-edf
//!
//! These drive the decision engine end-to-end on the host platform
//! against a recording host port: registration and admission, EDF
//! dispatch with lazy Init migration, WCET suspend-and-recover, deadline
//! eviction, both aperiodic strategies and full teardown.

use ts_common::log::LogLevel;
use ts_common::{AperiodicPolicy, MonitorConfig, Result, SchedConfig, Ticks};
use ts_edf::{
    AperiodicTaskSpec, EdfScheduler, HostHandle, HostPort, ListKind, PeriodicTaskSpec,
    PriorityBand, TaskId, TaskStatus,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Directive {
    Create(u16, String, PriorityBand),
    SetPriority(u16, PriorityBand),
    Suspend(u16),
    Resume(u16),
    Delete(u16),
}

#[derive(Default)]
struct RecordingHost {
    next_handle: u16,
    directives: Vec<Directive>,
}

impl RecordingHost {
    fn count(&self, pred: impl Fn(&Directive) -> bool) -> usize {
        self.directives.iter().filter(|d| pred(d)).count()
    }
}

impl HostPort for RecordingHost {
    fn create_task(&mut self, name: &str, _stack_hint: u32, band: PriorityBand) -> Result<HostHandle> {
        let h = HostHandle(self.next_handle);
        self.next_handle += 1;
        self.directives
            .push(Directive::Create(h.0, name.to_string(), band));
        Ok(h)
    }

    fn set_priority(&mut self, task: HostHandle, band: PriorityBand) -> Result<()> {
        self.directives.push(Directive::SetPriority(task.0, band));
        Ok(())
    }

    fn suspend(&mut self, task: HostHandle) -> Result<()> {
        self.directives.push(Directive::Suspend(task.0));
        Ok(())
    }

    fn resume(&mut self, task: HostHandle) -> Result<()> {
        self.directives.push(Directive::Resume(task.0));
        Ok(())
    }

    fn delete(&mut self, task: HostHandle) -> Result<()> {
        self.directives.push(Directive::Delete(task.0));
        Ok(())
    }
}

fn periodic(name: &str, period: u64, wcet: u64) -> PeriodicTaskSpec<'_> {
    PeriodicTaskSpec {
        name,
        stack_hint: 2048,
        period,
        rel_deadline: period,
        phase: 0,
        wcet,
    }
}

/// Ready/Blocked/Suspended must stay sorted by non-decreasing deadline
fn assert_lists_sorted(sched: &EdfScheduler) {
    for kind in [ListKind::Ready, ListKind::Blocked, ListKind::Suspended] {
        let deadlines: Vec<u64> = sched
            .lists()
            .ids(kind)
            .iter()
            .map(|&id| sched.task(id).unwrap().abs_deadline.as_u64())
            .collect();
        assert!(
            deadlines.windows(2).all(|w| w[0] <= w[1]),
            "{:?} list out of order: {:?}",
            kind,
            deadlines
        );
    }
}

/// Every record sits in exactly one list
fn assert_single_membership(sched: &EdfScheduler, ids: &[TaskId]) {
    for &id in ids {
        let Some(tcb) = sched.task(id) else { continue };
        let holding: Vec<ListKind> = [
            ListKind::Init,
            ListKind::Ready,
            ListKind::Blocked,
            ListKind::Suspended,
        ]
        .into_iter()
        .filter(|&k| sched.lists().ids(k).contains(&id))
        .collect();
        assert_eq!(holding.len(), 1, "task {:?} in lists {:?}", id, holding);
        assert_eq!(tcb.list, Some(holding[0]));
    }
}

mod admission_tests {
    use super::*;

    #[test]
    fn test_reference_task_pair_is_accepted() {
        let mut sched = EdfScheduler::new(SchedConfig::DEFAULT);
        sched.create_periodic_task(&periodic("a", 100, 20)).unwrap();
        sched.create_periodic_task(&periodic("b", 200, 50)).unwrap();
        // 0.2 + 0.25 = 0.45 <= 0.9
        assert_eq!(sched.utilization_ppm(), 450_000);
    }

    #[test]
    fn test_rejection_preserves_committed_utilization() {
        let mut sched = EdfScheduler::new(SchedConfig::DEFAULT);
        sched.create_periodic_task(&periodic("a", 10, 8)).unwrap();
        assert!(sched.create_periodic_task(&periodic("b", 10, 2)).is_err());
        assert_eq!(sched.utilization_ppm(), 800_000);

        // The rejected task never entered any list
        assert_eq!(sched.lists().len(ListKind::Init), 1);
        // And the rejection is on the log channel
        assert!(sched
            .log()
            .iter()
            .any(|e| e.level == LogLevel::Warn && e.module == "admission"));
    }
}

mod dispatch_tests {
    use super::*;

    /// The end-to-end reference scenario: {period 100, WCET 20} and
    /// {period 200, WCET 50}, implicit deadlines, phase 0. Both released
    /// at time 0; the shorter-deadline task runs first and is not
    /// preempted before tick 100.
    #[test]
    fn test_two_task_reference_schedule() {
        let mut sched = EdfScheduler::new(SchedConfig::DEFAULT);
        let a = sched.create_periodic_task(&periodic("a", 100, 20)).unwrap();
        let b = sched.create_periodic_task(&periodic("b", 200, 50)).unwrap();
        let mut host = RecordingHost::default();
        sched.start_scheduling(&mut host, Ticks::ZERO).unwrap();

        // The host starts the pre-promoted earliest-deadline task
        assert_eq!(sched.task(a).unwrap().band, PriorityBand::Running);

        // A completes its first instance at t=20; B moves in
        for t in 1..=20 {
            sched.tick(Some(a), Ticks::new(t));
        }
        sched.task_will_block();
        sched.service(&mut host, Ticks::new(20)).unwrap();
        assert_eq!(sched.current_task(), Some(b));
        assert_lists_sorted(&sched);

        // B runs its 50 ticks; nothing preempts it
        for t in 21..=70 {
            sched.tick(Some(b), Ticks::new(t));
            sched.service(&mut host, Ticks::new(t)).unwrap();
            assert_eq!(sched.current_task(), Some(b), "no preemption before t=100");
        }
        sched.task_will_block();
        sched.service(&mut host, Ticks::new(70)).unwrap();
        assert_eq!(sched.current_task(), None);

        // A's second release at t=100 takes the idle slot
        sched.task_moved_to_ready(a);
        sched.service(&mut host, Ticks::new(100)).unwrap();
        assert_eq!(sched.current_task(), Some(a));
        assert_eq!(sched.task(a).unwrap().abs_deadline.as_u64(), 200);
        assert_single_membership(&sched, &[a, b]);
    }

    #[test]
    fn test_promotion_directives_keep_single_running_band() {
        let mut sched = EdfScheduler::new(SchedConfig::DEFAULT);
        let a = sched.create_periodic_task(&periodic("a", 100, 10)).unwrap();
        let _b = sched.create_periodic_task(&periodic("b", 200, 10)).unwrap();
        let mut host = RecordingHost::default();
        sched.start_scheduling(&mut host, Ticks::ZERO).unwrap();

        sched.task_will_block();
        sched.service(&mut host, Ticks::new(10)).unwrap();

        // One demotion of the outgoing task, one promotion of the incoming
        let a_handle = sched.task(a).unwrap().host.unwrap().0;
        assert_eq!(
            host.count(|d| *d == Directive::SetPriority(a_handle, PriorityBand::Waiting)),
            1
        );
        assert_eq!(
            host.count(|d| matches!(d, Directive::SetPriority(_, PriorityBand::Running))),
            1
        );
    }

    #[test]
    fn test_lazy_init_migration_anchors_deadlines() {
        let mut sched = EdfScheduler::new(SchedConfig::DEFAULT);
        let a = sched.create_periodic_task(&periodic("a", 100, 10)).unwrap();
        let b = sched.create_periodic_task(&periodic("b", 200, 10)).unwrap();
        let mut host = RecordingHost::default();

        // System starts late; Init-resident deadlines must be corrected
        // relative to the actual start time when first considered
        sched.start_scheduling(&mut host, Ticks::new(5000)).unwrap();
        assert_eq!(sched.task(a).unwrap().abs_deadline.as_u64(), 5100);
        // b has not been considered yet: still provisional, still in Init
        assert_eq!(sched.task(b).unwrap().list, Some(ListKind::Init));

        sched.task_will_block();
        sched.service(&mut host, Ticks::new(5010)).unwrap();
        // b was pulled out of Init with an anchored deadline
        assert_eq!(sched.task(b).unwrap().list, Some(ListKind::Ready));
        assert_eq!(sched.task(b).unwrap().abs_deadline.as_u64(), 5200);
        assert_eq!(sched.current_task(), Some(b));
    }
}

mod wcet_tests {
    use super::*;

    fn overrun_setup() -> (EdfScheduler, RecordingHost, TaskId, TaskId) {
        let mut sched = EdfScheduler::new(SchedConfig::DEFAULT);
        let a = sched.create_periodic_task(&periodic("a", 100, 6)).unwrap();
        let b = sched.create_periodic_task(&periodic("b", 200, 50)).unwrap();
        let mut host = RecordingHost::default();
        sched.start_scheduling(&mut host, Ticks::ZERO).unwrap();

        // Adopt `a` as the running task without blocking it: b's release
        // report arrives, a's deadline is earlier, no preemption
        sched.task_moved_to_ready(b);
        sched.service(&mut host, Ticks::new(1)).unwrap();
        assert_eq!(sched.current_task(), Some(a));
        (sched, host, a, b)
    }

    /// A WCET=6 task must be suspended at tick 7, not keep running
    #[test]
    fn test_budget_overrun_suspends_at_tick_seven() {
        let (mut sched, mut host, a, b) = overrun_setup();

        for t in 1..=6 {
            sched.tick(Some(a), Ticks::new(t));
            sched.service(&mut host, Ticks::new(t)).unwrap();
            assert_eq!(sched.task(a).unwrap().status, TaskStatus::Running, "tick {}", t);
        }

        sched.tick(Some(a), Ticks::new(7));
        sched.service(&mut host, Ticks::new(7)).unwrap();

        let tcb = sched.task(a).unwrap();
        assert_eq!(tcb.status, TaskStatus::Suspended);
        assert_eq!(tcb.list, Some(ListKind::Suspended));
        // Recovery at release + period: the instance's remainder is skipped
        assert_eq!(tcb.next_unblock_time.as_u64(), 100);

        // The host was told to suspend it, and the other task moved in
        let a_handle = sched.task(a).unwrap().host.unwrap().0;
        assert_eq!(host.count(|d| *d == Directive::Suspend(a_handle)), 1);
        assert_eq!(sched.current_task(), Some(b));
        assert_eq!(sched.stats().wcet_overruns, 1);
        assert_lists_sorted(&sched);
    }

    /// The periodic re-check returns the task exactly at or after its
    /// recovery time, never before
    #[test]
    fn test_recovery_not_before_unblock_time() {
        let (mut sched, mut host, a, _b) = overrun_setup();
        for t in 1..=7 {
            sched.tick(Some(a), Ticks::new(t));
        }
        sched.service(&mut host, Ticks::new(7)).unwrap();
        assert_eq!(sched.task(a).unwrap().status, TaskStatus::Suspended);

        // The fallback re-check fires before the recovery time but must
        // not release the task early
        sched.tick(None, Ticks::new(90));
        sched.service(&mut host, Ticks::new(90)).unwrap();
        assert_eq!(sched.task(a).unwrap().status, TaskStatus::Suspended);

        // At t=100 the task returns to Ready with corrected timing
        sched.tick(None, Ticks::new(100));
        sched.service(&mut host, Ticks::new(100)).unwrap();

        let tcb = sched.task(a).unwrap();
        assert_eq!(tcb.status, TaskStatus::Ready);
        assert!(!tcb.wcet_exceeded);
        assert_eq!(tcb.rel_arrival.as_u64(), 100);
        assert_eq!(tcb.abs_deadline.as_u64(), 200);
        assert_eq!(tcb.list, Some(ListKind::Ready));

        let a_handle = tcb.host.unwrap().0;
        assert_eq!(host.count(|d| *d == Directive::Resume(a_handle)), 1);

        // The overrun and the recovery both reached the log channel
        assert!(sched.log().iter().any(|e| e.module == "monitor" && e.level == LogLevel::Warn));
        assert!(sched.log().iter().any(|e| e.module == "monitor" && e.level == LogLevel::Info));
    }
}

mod deadline_tests {
    use super::*;

    /// Deadline overrun evicts: the task is deleted, appears in no list
    /// and receives no further scheduling signals
    #[test]
    fn test_deadline_miss_evicts_task() {
        let cfg = SchedConfig {
            monitor: MonitorConfig {
                wcet_checks: false,
                deadline_checks: true,
                wcet_checks_oneshot: false,
                deadline_checks_oneshot: false,
            },
            ..SchedConfig::DEFAULT
        };
        let mut sched = EdfScheduler::new(cfg);
        let a = sched.create_periodic_task(&periodic("a", 50, 40)).unwrap();
        let b = sched.create_periodic_task(&periodic("b", 200, 20)).unwrap();
        let mut host = RecordingHost::default();
        sched.start_scheduling(&mut host, Ticks::ZERO).unwrap();

        sched.task_moved_to_ready(b);
        sched.service(&mut host, Ticks::new(1)).unwrap();
        assert_eq!(sched.current_task(), Some(a));
        let a_handle = sched.task(a).unwrap().host.unwrap().0;

        // a is still running past its absolute deadline of 50
        for t in 2..=50 {
            sched.tick(Some(a), Ticks::new(t));
        }
        sched.service(&mut host, Ticks::new(50)).unwrap();
        assert!(sched.task(a).is_some(), "no overrun at the deadline itself");

        sched.tick(Some(a), Ticks::new(51));
        sched.service(&mut host, Ticks::new(51)).unwrap();

        // Evicted: record gone, host task deleted, not revocable
        assert!(sched.task(a).is_none());
        assert_eq!(host.count(|d| *d == Directive::Delete(a_handle)), 1);
        assert_eq!(sched.stats().deadline_misses, 1);
        for kind in [ListKind::Init, ListKind::Ready, ListKind::Blocked, ListKind::Suspended] {
            assert!(!sched.lists().ids(kind).contains(&a));
        }
        assert!(sched.log().iter().any(|e| e.level == LogLevel::Error && e.module == "monitor"));

        // Further signals for the dead task are ignored, scheduling goes on
        sched.tick(Some(a), Ticks::new(52));
        sched.task_moved_to_ready(a);
        sched.service(&mut host, Ticks::new(52)).unwrap();
        assert_eq!(sched.current_task(), Some(b));

        // The rest of the system lost exactly one task
        assert_eq!(sched.stats().deadline_misses, 1);
    }
}

mod aperiodic_tests {
    use super::*;

    #[test]
    fn test_total_bandwidth_deadline_chain() {
        let mut sched = EdfScheduler::new(SchedConfig::with_total_bandwidth());
        sched.create_periodic_task(&periodic("p", 100, 50)).unwrap();

        // U_accepted = 0.5: d_1 = max(10, 0) + ceil(2/0.5) = 14
        let ap1 = sched
            .create_aperiodic_task(&AperiodicTaskSpec {
                name: "ap1",
                stack_hint: 1024,
                wcet: 2,
                arrival: 10,
            })
            .unwrap();
        assert_eq!(sched.task(ap1).unwrap().abs_deadline.as_u64(), 14);

        // Chained: d_2 = max(12, 14) + ceil(3/0.5) = 20
        let ap2 = sched
            .create_aperiodic_task(&AperiodicTaskSpec {
                name: "ap2",
                stack_hint: 1024,
                wcet: 3,
                arrival: 12,
            })
            .unwrap();
        assert_eq!(sched.task(ap2).unwrap().abs_deadline.as_u64(), 20);

        // Both share the Init list with the periodic task, deadline order
        let mut host = RecordingHost::default();
        sched.start_scheduling(&mut host, Ticks::ZERO).unwrap();
        // ap1 (14) was pre-promoted; ap2 (20) precedes p (100) in Init
        assert_eq!(sched.current_task(), None);
        assert_eq!(sched.lists().ids(ListKind::Init), &[ap2, TaskId::new(0)]);
    }

    #[test]
    fn test_oneshot_lifecycle_ends_in_deletion() {
        let mut sched = EdfScheduler::new(SchedConfig::with_total_bandwidth());
        let p = sched.create_periodic_task(&periodic("p", 100, 50)).unwrap();
        let ap = sched
            .create_aperiodic_task(&AperiodicTaskSpec {
                name: "ap",
                stack_hint: 1024,
                wcet: 2,
                arrival: 0,
            })
            .unwrap();

        let mut host = RecordingHost::default();
        sched.start_scheduling(&mut host, Ticks::ZERO).unwrap();

        // The one-shot has the earlier deadline (4 vs 100) and runs first
        sched.tick(Some(ap), Ticks::new(1));
        sched.tick(Some(ap), Ticks::new(2));
        sched.task_will_block();
        sched.service(&mut host, Ticks::new(2)).unwrap();

        // Deleted the instant its single execution completed
        assert!(sched.task(ap).is_none());
        assert_eq!(host.count(|d| matches!(d, Directive::Delete(_))), 1);
        assert_eq!(sched.current_task(), Some(p));
    }

    #[test]
    fn test_background_server_lifecycle() {
        let mut sched = EdfScheduler::new(SchedConfig {
            aperiodic_policy: AperiodicPolicy::BackgroundServer,
            ..SchedConfig::DEFAULT
        });
        sched.create_periodic_task(&periodic("p", 100, 10)).unwrap();
        sched
            .create_aperiodic_task(&AperiodicTaskSpec {
                name: "ap1",
                stack_hint: 1024,
                wcet: 5,
                arrival: 200,
            })
            .unwrap();
        sched
            .create_aperiodic_task(&AperiodicTaskSpec {
                name: "ap2",
                stack_hint: 1024,
                wcet: 4,
                arrival: 1400,
            })
            .unwrap();

        let mut host = RecordingHost::default();
        sched.start_scheduling(&mut host, Ticks::ZERO).unwrap();

        // The server task was created in the idle-gap band
        assert_eq!(
            host.count(|d| matches!(d, Directive::Create(_, _, PriorityBand::AperiodicServer))),
            1
        );
        // Server requests never enter the deadline-ordered lists
        assert_eq!(
            sched.lists().len(ListKind::Init) + sched.lists().len(ListKind::Ready),
            1
        );

        // FIFO service in registration order
        let first = sched.next_aperiodic().unwrap();
        assert_eq!(first.name, "ap1");
        assert_eq!(first.release_at.as_u64(), 200);
        assert!(sched.aperiodic_completed());

        let second = sched.next_aperiodic().unwrap();
        assert_eq!(second.name, "ap2");
        assert!(!sched.aperiodic_completed());
        assert!(sched.next_aperiodic().is_none());

        // Waking the server resumes its host task
        sched.wake_aperiodic_server(&mut host).unwrap();
        assert_eq!(host.count(|d| matches!(d, Directive::Resume(_))), 1);
    }
}

mod teardown_tests {
    use super::*;

    #[test]
    fn test_delete_all_tears_down_everything() {
        let mut sched = EdfScheduler::new(SchedConfig::DEFAULT);
        sched.create_periodic_task(&periodic("a", 100, 20)).unwrap();
        sched.create_periodic_task(&periodic("b", 200, 50)).unwrap();
        sched
            .create_aperiodic_task(&AperiodicTaskSpec {
                name: "ap",
                stack_hint: 1024,
                wcet: 5,
                arrival: 10,
            })
            .unwrap();
        let mut host = RecordingHost::default();
        sched.start_scheduling(&mut host, Ticks::ZERO).unwrap();

        // Put the system into a mixed state first
        sched.task_will_block();
        sched.service(&mut host, Ticks::new(20)).unwrap();

        sched.delete_all_tasks(&mut host).unwrap();

        // Two periodic host tasks + the server task were deleted
        assert_eq!(host.count(|d| matches!(d, Directive::Delete(_))), 3);
        for kind in [ListKind::Init, ListKind::Ready, ListKind::Blocked, ListKind::Suspended] {
            assert!(sched.lists().is_empty(kind), "{:?} not drained", kind);
        }
        assert!(!sched.is_started());
        assert_eq!(sched.utilization_ppm(), 0);
        assert_eq!(sched.current_task(), None);
        assert!(sched.next_aperiodic().is_none());
    }
}
