// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 Tessel Systems

//! Scheduling decision engine
//!
//! The engine owns every piece of scheduler state - records, lists,
//! admission, aperiodic strategy, monitor, pending-event mailboxes - and
//! is the single writer of all of it. Host hooks report state changes
//! through `&mut self` methods that prepare at-most-one-outstanding
//! request slots and raise bits in the shared [`SignalSet`]; the
//! dedicated engine task then drains one event bundle per [`service`]
//! call and handles it in a fixed priority order:
//!
//! block -> ready -> suspend -> WCET overflow -> deadline overflow
//!
//! Each handler contributes to a single shared candidate; after all
//! handlers ran, at most one preemption is enacted by demoting the
//! outgoing task to the waiting band and promoting the incoming task to
//! the running band. Because only the deadline-earliest task ever holds
//! the running band, the host's fixed-priority dispatcher enforces EDF
//! order on the core's behalf.
//!
//! [`service`]: EdfScheduler::service

use heapless::Vec;
use ts_common::constants::{
    APERIODIC_SERVER_STACK_HINT, MAX_APERIODIC_TASKS, MAX_PERIODIC_TASKS, TOTAL_TASKS,
};
use ts_common::log::LogBuffer;
use ts_common::{log_error, log_info, log_warn};
use ts_common::{Error, Result, SchedConfig, Ticks};

use crate::admission::AdmissionController;
use crate::aperiodic::AperiodicManager;
use crate::event::{
    SignalSet, EV_ALL, EV_BLOCK, EV_DEADLINE_OVERFLOW, EV_READY, EV_SUSPEND, EV_WCET_OVERFLOW,
    EV_WCET_WAKEUP,
};
use crate::host::{HostHandle, HostPort, PriorityBand};
use crate::list::{DeadlineLists, ListKind};
use crate::monitor::TimingMonitor;
use crate::task::{ApRequest, TaskId, TaskStatus, TaskStore, Tcb};

pub use crate::task::{AperiodicTaskSpec, PeriodicTaskSpec};

/// Scheduler counters for diagnostics
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedStats {
    /// Event bundles serviced
    pub services: u64,
    /// Preemptions enacted
    pub preemptions: u64,
    /// WCET overruns recovered by suspension
    pub wcet_overruns: u64,
    /// Deadline misses resolved by eviction
    pub deadline_misses: u64,
}

/// A pending aperiodic request as seen by the host server task
#[derive(Debug, Clone, Copy)]
pub struct AperiodicRelease<'a> {
    /// Request identifier
    pub id: TaskId,
    /// Request name
    pub name: &'a str,
    /// WCET budget in ticks
    pub wcet: u64,
    /// Absolute release time (system start + arrival phase)
    pub release_at: Ticks,
}

/// The EDF scheduling core
///
/// One instance per scheduler run. Registration happens strictly before
/// [`start_scheduling`]; afterwards the host feeds state-change hooks and
/// ticks, and the engine task calls [`service`] whenever signals are
/// pending.
///
/// [`start_scheduling`]: EdfScheduler::start_scheduling
/// [`service`]: EdfScheduler::service
pub struct EdfScheduler {
    cfg: SchedConfig,
    store: TaskStore,
    lists: DeadlineLists,
    admission: AdmissionController,
    aperiodic: AperiodicManager,
    monitor: TimingMonitor,
    signals: SignalSet,
    log: LogBuffer,

    // At-most-one-outstanding request mailboxes
    pending_ready: Option<TaskId>,
    pending_suspend: Option<TaskId>,
    pending_wcet: Option<TaskId>,
    pending_deadline: Option<TaskId>,

    current: Option<TaskId>,
    first_to_run: Option<TaskId>,
    server_handle: Option<HostHandle>,
    sys_start: Ticks,
    started: bool,
    periodic_count: usize,
    aperiodic_count: usize,
    stats: SchedStats,
}

impl EdfScheduler {
    /// Create a scheduler from a resolved configuration
    #[must_use]
    pub fn new(cfg: SchedConfig) -> Self {
        Self {
            cfg,
            store: TaskStore::new(),
            lists: DeadlineLists::new(),
            admission: AdmissionController::new(cfg.utilization_bound_ppm),
            aperiodic: AperiodicManager::from_policy(cfg.aperiodic_policy),
            monitor: TimingMonitor::new(cfg.monitor, cfg.recheck_period),
            signals: SignalSet::new(),
            log: LogBuffer::new(),
            pending_ready: None,
            pending_suspend: None,
            pending_wcet: None,
            pending_deadline: None,
            current: None,
            first_to_run: None,
            server_handle: None,
            sys_start: Ticks::ZERO,
            started: false,
            periodic_count: 0,
            aperiodic_count: 0,
            stats: SchedStats::default(),
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register a periodic task
    ///
    /// Subject to the admission test; a rejected task is not created and
    /// the committed utilization is unchanged. Must be called before
    /// [`start_scheduling`](Self::start_scheduling).
    ///
    /// # Panics
    /// Panics on malformed configuration: registration after start, a
    /// relative deadline greater than the period, a zero period or WCET,
    /// or more tasks than the compile-time capacity. These indicate the
    /// static task set itself violates model assumptions.
    ///
    /// # Errors
    /// [`Error::AdmissionRejected`] when the utilization bound would be
    /// exceeded.
    pub fn create_periodic_task(&mut self, spec: &PeriodicTaskSpec<'_>) -> Result<TaskId> {
        assert!(!self.started, "periodic registration after start");
        assert!(
            self.periodic_count < MAX_PERIODIC_TASKS,
            "periodic task capacity exceeded"
        );
        assert!(spec.period > 0 && spec.wcet > 0, "zero period or WCET");
        assert!(
            spec.rel_deadline <= spec.period,
            "relative deadline greater than period"
        );

        match self.admission.check(spec.period, spec.wcet) {
            Ok(utilization) => {
                log_info!(
                    self.log,
                    0,
                    "admission",
                    "'{}' accepted, utilization {} ppm",
                    spec.name,
                    utilization
                );
            }
            Err(e) => {
                log_warn!(
                    self.log,
                    0,
                    "admission",
                    "'{}' rejected, bound {} ppm would be exceeded",
                    spec.name,
                    self.admission.bound_ppm()
                );
                return Err(e);
            }
        }

        let id = self.store.insert(|id| Tcb::new_periodic(id, spec))?;
        self.lists.insert(&mut self.store, ListKind::Init, id)?;
        self.periodic_count += 1;
        Ok(id)
    }

    /// Register an aperiodic task
    ///
    /// Behavior depends on the configured strategy: the request is either
    /// queued for the dedicated background server, or folded into the
    /// deadline-ordered lists as a one-shot instance with a Total
    /// Bandwidth Server deadline. Must be called before
    /// [`start_scheduling`](Self::start_scheduling).
    ///
    /// # Panics
    /// Panics on registration after start, a zero WCET, or more aperiodic
    /// tasks than the compile-time capacity.
    ///
    /// # Errors
    /// Propagates record-store exhaustion as
    /// [`Error::CapacityExceeded`].
    pub fn create_aperiodic_task(&mut self, spec: &AperiodicTaskSpec<'_>) -> Result<TaskId> {
        assert!(!self.started, "aperiodic registration after start");
        assert!(
            self.aperiodic_count < MAX_APERIODIC_TASKS,
            "aperiodic task capacity exceeded"
        );
        assert!(spec.wcet > 0, "zero WCET");

        let id = match &mut self.aperiodic {
            AperiodicManager::Server(queue) => {
                let id = TaskId::new((MAX_PERIODIC_TASKS + queue.len()) as u8);
                queue.push(ApRequest::new(id, spec))?;
                log_info!(
                    self.log,
                    0,
                    "sched",
                    "'{}' queued for background server, arrival {}",
                    spec.name,
                    spec.arrival
                );
                id
            }
            AperiodicManager::Bandwidth(tbs) => {
                let deadline =
                    tbs.assign_deadline(spec.arrival, spec.wcet, self.admission.accepted_ppm());
                let id = self
                    .store
                    .insert(|id| Tcb::new_oneshot(id, spec, deadline))?;
                self.lists.insert(&mut self.store, ListKind::Init, id)?;
                log_info!(
                    self.log,
                    0,
                    "sched",
                    "'{}' assigned bandwidth deadline {}",
                    spec.name,
                    deadline
                );
                id
            }
        };
        self.aperiodic_count += 1;
        Ok(id)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create the host tasks and begin dispatching at `now`
    ///
    /// The earliest-deadline registrant is anchored, promoted to the
    /// running band and will be adopted as the running task on the first
    /// [`service`](Self::service) call. All first-instance timing is
    /// relative to `now`.
    ///
    /// # Panics
    /// Panics when no task was registered.
    ///
    /// # Errors
    /// [`Error::TaskCreationFailed`] (or the host's error) when a host
    /// task cannot be created; every host task created so far is deleted
    /// again and the scheduler stays stopped.
    pub fn start_scheduling(&mut self, host: &mut dyn HostPort, now: Ticks) -> Result<()> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        assert!(
            self.periodic_count + self.aperiodic_count > 0,
            "no tasks registered"
        );

        self.sys_start = now;

        // Pre-promote the earliest-deadline registrant; it leaves Init here,
        // every other record migrates lazily through select_next.
        if let Some(first) = self.lists.head(ListKind::Init) {
            if let Some(tcb) = self.store.get_mut(first) {
                tcb.anchor(now);
                tcb.status = TaskStatus::Ready;
                tcb.band = PriorityBand::Running;
            }
            self.lists.remove(&mut self.store, first)?;
            self.lists.insert(&mut self.store, ListKind::Ready, first)?;
            self.first_to_run = Some(first);
        }

        // Create every host task; roll back on the first failure.
        let ids: Vec<TaskId, TOTAL_TASKS> = self.store.ids().collect();
        let mut created: Vec<(TaskId, HostHandle), TOTAL_TASKS> = Vec::new();
        for &id in ids.iter() {
            let handle = {
                let tcb = self.store.get(id).ok_or(Error::NotFound)?;
                host.create_task(tcb.name_str(), tcb.stack_hint, tcb.band)
            };
            match handle {
                Ok(h) => {
                    let _ = created.push((id, h));
                }
                Err(e) => {
                    for &(_, h) in created.iter() {
                        let _ = host.delete(h);
                    }
                    self.rollback_first_to_run();
                    log_error!(self.log, now.as_u64(), "sched", "host task creation failed");
                    return Err(e);
                }
            }
        }
        for &(id, h) in created.iter() {
            self.store.bind_handle(id, h)?;
        }

        // The background server runs below every registered task and only
        // consumes idle time.
        if let AperiodicManager::Server(queue) = &self.aperiodic {
            if !queue.is_empty() {
                let handle = host.create_task(
                    "aperiodic-server",
                    APERIODIC_SERVER_STACK_HINT,
                    PriorityBand::AperiodicServer,
                )?;
                self.server_handle = Some(handle);
            }
        }

        self.started = true;
        log_info!(
            self.log,
            now.as_u64(),
            "sched",
            "dispatch started, {} periodic / {} aperiodic, {} ppm committed, {} Hz tick",
            self.periodic_count,
            self.aperiodic_count,
            self.admission.accepted_ppm(),
            self.cfg.tick_hz
        );
        Ok(())
    }

    fn rollback_first_to_run(&mut self) {
        if let Some(first) = self.first_to_run.take() {
            let _ = self.lists.remove(&mut self.store, first);
            if let Some(tcb) = self.store.get_mut(first) {
                tcb.status = TaskStatus::Blocked;
                tcb.band = PriorityBand::Waiting;
                // Back to the provisional pre-start ordering key
                tcb.rel_arrival = Ticks::new(tcb.phase);
                tcb.abs_deadline = Ticks::new(tcb.phase + tcb.rel_deadline);
            }
            let _ = self.lists.insert(&mut self.store, ListKind::Init, first);
        }
    }

    /// Tear down every list and host task and reset admission state
    ///
    /// Irreversible for the current run; a scheduler must be fully
    /// re-registered before it can be started again, since elapsed-time
    /// bookkeeping does not survive a teardown.
    ///
    /// # Errors
    /// Teardown always completes; the first host deletion failure, if
    /// any, is reported after the fact.
    pub fn delete_all_tasks(&mut self, host: &mut dyn HostPort) -> Result<()> {
        let mut first_err = None;

        for kind in [
            ListKind::Init,
            ListKind::Ready,
            ListKind::Blocked,
            ListKind::Suspended,
        ] {
            while let Some(id) = self.lists.head(kind) {
                let _ = self.lists.remove(&mut self.store, id);
                if let Some(tcb) = self.store.remove(id) {
                    if let Some(h) = tcb.host {
                        if let Err(e) = host.delete(h) {
                            first_err.get_or_insert(e);
                        }
                    }
                }
            }
        }
        if let Some(h) = self.server_handle.take() {
            if let Err(e) = host.delete(h) {
                first_err.get_or_insert(e);
            }
        }

        self.aperiodic.reset();
        self.admission.reset();
        self.monitor.reset();
        self.signals.take(EV_ALL);
        self.pending_ready = None;
        self.pending_suspend = None;
        self.pending_wcet = None;
        self.pending_deadline = None;
        self.current = None;
        self.first_to_run = None;
        self.periodic_count = 0;
        self.aperiodic_count = 0;
        self.started = false;
        self.stats = SchedStats::default();
        log_info!(self.log, 0, "sched", "all tasks deleted");

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // =========================================================================
    // Inbound host hooks
    // =========================================================================

    /// Hook: the host moved a task to the ready state (release or resume)
    ///
    /// The record enters the Ready list immediately; whether it preempts
    /// is decided by the engine on the next [`service`](Self::service).
    /// If a ready transition is already pending, the earlier deadline
    /// wins the single mailbox slot.
    pub fn task_moved_to_ready(&mut self, id: TaskId) {
        if !self.started {
            return;
        }
        let Some(tcb) = self.store.get_mut(id) else {
            return;
        };
        // The host also reports spurious ready transitions caused by
        // priority changes; a task already in contention is left alone,
        // and a WCET-suspended task stays parked until its recovery time.
        if tcb.status.is_active() || (tcb.status == TaskStatus::Suspended && tcb.wcet_exceeded) {
            return;
        }

        let was_blocked = tcb.status == TaskStatus::Blocked;
        let in_init = tcb.list == Some(ListKind::Init);
        tcb.status = TaskStatus::Ready;
        if was_blocked {
            // A release starts a fresh instance
            tcb.measured_exec = 0;
        }
        if in_init {
            tcb.anchor(self.sys_start);
        }

        let _ = self.lists.remove(&mut self.store, id);
        let _ = self.lists.insert(&mut self.store, ListKind::Ready, id);
        self.pend_ready(id);
    }

    /// Hook: the host resumed a previously suspended task
    pub fn task_resumed(&mut self, id: TaskId) {
        self.task_moved_to_ready(id);
    }

    /// Hook: the running task is about to block until its next release
    ///
    /// The calling context does not know which record is running; the
    /// engine resolves it from its own state when servicing the event.
    pub fn task_will_block(&mut self) {
        if !self.started {
            return;
        }
        self.signals.raise(EV_BLOCK);
    }

    /// Hook: the host suspended a task (not a WCET recovery suspension)
    pub fn task_suspended(&mut self, id: TaskId) {
        if !self.started {
            return;
        }
        let Some(tcb) = self.store.get_mut(id) else {
            return;
        };
        // WCET suspensions are driven by the overflow branch instead
        if tcb.wcet_exceeded || tcb.status == TaskStatus::Suspended {
            return;
        }
        tcb.status = TaskStatus::Suspended;
        let _ = self.lists.remove(&mut self.store, id);
        let _ = self.lists.insert(&mut self.store, ListKind::Suspended, id);
        self.pending_suspend = Some(id);
        self.signals.raise(EV_SUSPEND);
    }

    /// Hook: host timer tick carrying the identity of the running task
    ///
    /// `running` must be `None` while a pseudo task (idle, the engine
    /// task, the aperiodic server) holds the CPU. Runs the timing
    /// monitor and raises any resulting overflow signals.
    pub fn tick(&mut self, running: Option<TaskId>, now: Ticks) {
        if !self.started {
            return;
        }
        let outcome = self.monitor.on_tick(&mut self.store, running, now);
        if let Some(id) = outcome.wcet_overrun {
            self.pending_wcet = Some(id);
        }
        if let Some(id) = outcome.deadline_overrun {
            self.pending_deadline = Some(id);
        }
        if outcome.events != 0 {
            self.signals.raise(outcome.events);
        }
    }

    // =========================================================================
    // Decision engine
    // =========================================================================

    /// Drain the pending event bundle and service it
    ///
    /// Called from the dedicated engine task whenever the host's
    /// notification mechanism reports pending signals. Handlers run in
    /// the fixed order block, ready, suspend, WCET overflow, deadline
    /// overflow; at most one preemption is enacted per bundle.
    ///
    /// # Errors
    /// Propagates host directive failures as [`Error::HostFault`]-class
    /// errors from the port.
    pub fn service(&mut self, host: &mut dyn HostPort, now: Ticks) -> Result<()> {
        if !self.started {
            return Ok(());
        }
        let events = self.signals.take(EV_ALL);
        if events == 0 {
            return Ok(());
        }
        self.stats.services += 1;

        // Adopt the pre-promoted first task on the first bundle
        if let Some(first) = self.first_to_run.take() {
            if let Some(tcb) = self.store.get_mut(first) {
                tcb.status = TaskStatus::Running;
            }
            self.current = Some(first);
        }

        let mut next: Option<TaskId> = None;

        if events & EV_BLOCK != 0 {
            next = self.handle_block(host, now, next)?;
        }
        if events & EV_READY != 0 {
            next = self.handle_ready(next);
        }
        if events & EV_SUSPEND != 0 {
            next = self.handle_suspend(host, next)?;
        }
        if events & EV_WCET_OVERFLOW != 0 {
            next = self.handle_wcet_overflow(host, now, next)?;
        }
        if events & EV_DEADLINE_OVERFLOW != 0 {
            next = self.handle_deadline_overflow(host, now, next)?;
        }

        self.enact_preemption(host, next)?;

        if events & EV_WCET_WAKEUP != 0 {
            self.recover_suspended(host, now)?;
        }

        Ok(())
    }

    /// The running task completed its instance and blocks for the next
    /// release. One-shot bandwidth instances are deleted instead.
    fn handle_block(
        &mut self,
        host: &mut dyn HostPort,
        now: Ticks,
        next: Option<TaskId>,
    ) -> Result<Option<TaskId>> {
        let Some(cur) = self.current else {
            return Ok(next);
        };

        if self.store.get(cur).map(|t| t.status) == Some(TaskStatus::Running) {
            if let Some(tcb) = self.store.get_mut(cur) {
                tcb.status = TaskStatus::Blocked;
                if tcb.is_periodic {
                    tcb.advance_release();
                } else {
                    tcb.executed = true;
                }
            }
            let _ = self.lists.remove(&mut self.store, cur);
            self.lists.insert(&mut self.store, ListKind::Blocked, cur)?;
        }

        // The slot is free; pick the deadline-earliest contender
        let next = self.select_next(next);

        let oneshot_done = self
            .store
            .get(cur)
            .is_some_and(|t| !t.is_periodic && t.executed);
        if oneshot_done {
            let handle = self.store.get(cur).and_then(|t| t.host);
            let _ = self.lists.remove(&mut self.store, cur);
            self.store.remove(cur);
            if let Some(h) = handle {
                host.delete(h)?;
            }
            log_info!(
                self.log,
                now.as_u64(),
                "sched",
                "one-shot instance completed and deleted"
            );
        } else {
            self.demote(host, cur)?;
        }
        self.current = None;
        Ok(next)
    }

    /// A single pending ready transition competes with the running task
    /// by deadline; strictly earlier wins.
    fn handle_ready(&mut self, next: Option<TaskId>) -> Option<TaskId> {
        let Some(ready) = self.pending_ready.take() else {
            return next;
        };
        let Some(ready_deadline) = self.store.get(ready).map(|t| t.abs_deadline) else {
            return next;
        };

        match self.current {
            Some(cur) => {
                let preempts = self
                    .store
                    .get(cur)
                    .is_some_and(|t| t.abs_deadline > ready_deadline);
                if preempts {
                    Some(self.earlier_of(ready, next))
                } else {
                    next
                }
            }
            None => Some(self.earlier_of(ready, next)),
        }
    }

    /// A host-suspended task vacated its slot
    fn handle_suspend(
        &mut self,
        host: &mut dyn HostPort,
        next: Option<TaskId>,
    ) -> Result<Option<TaskId>> {
        let Some(id) = self.pending_suspend.take() else {
            return Ok(next);
        };
        let valid = self
            .store
            .get(id)
            .is_some_and(|t| t.status == TaskStatus::Suspended && !t.wcet_exceeded);
        if !valid {
            return Ok(next);
        }

        // The suspended task can no longer be the bundle's candidate
        let next = next.filter(|&n| n != id);
        self.demote(host, id)?;
        Ok(self.select_next(next))
    }

    /// WCET overrun: suspend the task until `release + period`
    fn handle_wcet_overflow(
        &mut self,
        host: &mut dyn HostPort,
        now: Ticks,
        next: Option<TaskId>,
    ) -> Result<Option<TaskId>> {
        let Some(id) = self.pending_wcet.take() else {
            return Ok(next);
        };
        let valid = self
            .store
            .get(id)
            .is_some_and(|t| t.status == TaskStatus::Suspended && t.wcet_exceeded);
        if !valid {
            return Ok(next);
        }

        // The suspended task can no longer be the bundle's candidate
        let next = next.filter(|&n| n != id);
        let _ = self.lists.remove(&mut self.store, id);
        self.lists
            .insert(&mut self.store, ListKind::Suspended, id)?;

        let (handle, unblock) = {
            let tcb = self.store.get_mut(id).ok_or(Error::NotFound)?;
            tcb.measured_exec = 0;
            tcb.band = PriorityBand::Waiting;
            (tcb.host, tcb.next_unblock_time)
        };
        if let Some(h) = handle {
            host.set_priority(h, PriorityBand::Waiting)?;
            host.suspend(h)?;
        }
        self.stats.wcet_overruns += 1;
        log_warn!(
            self.log,
            now.as_u64(),
            "monitor",
            "WCET overrun, suspended until {}",
            unblock.as_u64()
        );

        let next = self.select_next(next);
        if self.current == Some(id) {
            self.current = None;
        }
        Ok(next)
    }

    /// Deadline overrun: the task set is infeasible as scheduled for this
    /// task; evict it. Not revocable.
    fn handle_deadline_overflow(
        &mut self,
        host: &mut dyn HostPort,
        now: Ticks,
        next: Option<TaskId>,
    ) -> Result<Option<TaskId>> {
        let Some(id) = self.pending_deadline.take() else {
            return Ok(next);
        };
        let valid = self.store.get(id).is_some_and(|t| t.deadline_exceeded);
        if !valid {
            return Ok(next);
        }

        // The evicted task can no longer be the bundle's candidate
        let next = next.filter(|&n| n != id);
        let deadline = self
            .store
            .get(id)
            .map(|t| t.abs_deadline.as_u64())
            .unwrap_or(0);
        log_error!(
            self.log,
            now.as_u64(),
            "monitor",
            "deadline {} missed, task evicted",
            deadline
        );
        self.stats.deadline_misses += 1;

        if self.current == Some(id) {
            self.current = None;
        }
        let handle = self.store.get(id).and_then(|t| t.host);
        let _ = self.lists.remove(&mut self.store, id);
        self.store.remove(id);
        if let Some(h) = handle {
            host.delete(h)?;
        }

        Ok(self.select_next(next))
    }

    /// Compare the Init head (corrected for system start) against the
    /// Ready head, lazily migrating the Init winner, then merge with the
    /// candidate the earlier handlers produced.
    fn select_next(&mut self, candidate: Option<TaskId>) -> Option<TaskId> {
        let mut next = self.lists.head(ListKind::Ready);

        if let Some(init) = self.lists.head(ListKind::Init) {
            let corrected = self
                .store
                .get(init)
                .map(|t| self.sys_start + (t.phase + t.rel_deadline));
            let wins = match (corrected, next.and_then(|r| self.store.get(r))) {
                (Some(c), Some(ready)) => c < ready.abs_deadline,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if wins {
                if let Some(tcb) = self.store.get_mut(init) {
                    tcb.anchor(self.sys_start);
                    tcb.status = TaskStatus::Ready;
                }
                let _ = self.lists.remove(&mut self.store, init);
                let _ = self.lists.insert(&mut self.store, ListKind::Ready, init);
                next = Some(init);
            }
        }

        match (candidate, next) {
            (Some(c), Some(n)) => Some(self.earlier_of(n, Some(c))),
            (Some(c), None) => Some(c),
            (None, n) => n,
        }
    }

    /// Earlier-deadline record of `id` and an optional other; ties keep
    /// the existing candidate
    fn earlier_of(&self, id: TaskId, other: Option<TaskId>) -> TaskId {
        let Some(o) = other else {
            return id;
        };
        if o == id {
            return id;
        }
        let id_deadline = self.store.get(id).map(|t| t.abs_deadline);
        let o_deadline = self.store.get(o).map(|t| t.abs_deadline);
        match (id_deadline, o_deadline) {
            (Some(a), Some(b)) if b > a => id,
            (Some(_), Some(_)) => o,
            (Some(_), None) => id,
            _ => o,
        }
    }

    /// Demote the outgoing task and promote the incoming one. This is
    /// the only place a task is elevated to the running band, keeping
    /// exactly one task there at any instant.
    fn enact_preemption(&mut self, host: &mut dyn HostPort, next: Option<TaskId>) -> Result<()> {
        let Some(next) = next else {
            return Ok(());
        };
        if self.current == Some(next) {
            return Ok(());
        }
        self.stats.preemptions += 1;

        if let Some(cur) = self.current {
            let handle = self.store.get_mut(cur).map(|t| {
                if t.status == TaskStatus::Running {
                    t.status = TaskStatus::Ready;
                }
                t.band = PriorityBand::Waiting;
                t.host
            });
            if let Some(Some(h)) = handle {
                host.set_priority(h, PriorityBand::Waiting)?;
            }
        }

        let handle = self.store.get_mut(next).map(|t| {
            t.status = TaskStatus::Running;
            t.band = PriorityBand::Running;
            t.host
        });
        if let Some(Some(h)) = handle {
            host.set_priority(h, PriorityBand::Running)?;
        }
        self.current = Some(next);
        Ok(())
    }

    fn demote(&mut self, host: &mut dyn HostPort, id: TaskId) -> Result<()> {
        let handle = self.store.get_mut(id).map(|t| {
            t.band = PriorityBand::Waiting;
            t.host
        });
        if let Some(Some(h)) = handle {
            host.set_priority(h, PriorityBand::Waiting)?;
        }
        Ok(())
    }

    /// Return every due WCET-suspended task to contention
    fn recover_suspended(&mut self, host: &mut dyn HostPort, now: Ticks) -> Result<()> {
        let woken = self.monitor.wake_due(&mut self.store, &mut self.lists, now);
        for &id in woken.iter() {
            let handle = self.store.get(id).and_then(|t| t.host);
            if let Some(h) = handle {
                host.resume(h)?;
            }
            log_info!(
                self.log,
                now.as_u64(),
                "monitor",
                "suspended task resumed after WCET recovery"
            );
            self.pend_ready(id);
        }
        Ok(())
    }

    /// Earlier-deadline-wins merge into the single pending-ready slot
    fn pend_ready(&mut self, id: TaskId) {
        let Some(deadline) = self.store.get(id).map(|t| t.abs_deadline) else {
            return;
        };
        let replace = match self.pending_ready {
            None => true,
            Some(p) => self
                .store
                .get(p)
                .map(|t| t.abs_deadline > deadline)
                .unwrap_or(true),
        };
        if replace {
            self.pending_ready = Some(id);
            self.signals.raise(EV_READY);
        }
    }

    // =========================================================================
    // Aperiodic server interface
    // =========================================================================

    /// The request the background server must serve next, if any
    ///
    /// Release times are absolute (`system start + arrival phase`); the
    /// server task sleeps until the release before executing the request.
    #[must_use]
    pub fn next_aperiodic(&self) -> Option<AperiodicRelease<'_>> {
        if !self.started {
            return None;
        }
        let AperiodicManager::Server(queue) = &self.aperiodic else {
            return None;
        };
        queue.current().map(|req| AperiodicRelease {
            id: req.id,
            name: req.name_str(),
            wcet: req.wcet,
            release_at: self.sys_start + req.phase,
        })
    }

    /// Mark the current background request executed; returns `true`
    /// while more requests remain queued
    pub fn aperiodic_completed(&mut self) -> bool {
        match &mut self.aperiodic {
            AperiodicManager::Server(queue) => queue.complete_current(),
            AperiodicManager::Bandwidth(_) => false,
        }
    }

    /// Resume the background server task (new work or periodic check)
    ///
    /// # Errors
    /// Propagates the host resume failure.
    pub fn wake_aperiodic_server(&mut self, host: &mut dyn HostPort) -> Result<()> {
        if !self.started {
            return Err(Error::NotStarted);
        }
        match self.server_handle {
            Some(h) => host.resume(h),
            None => Err(Error::NotFound),
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// The shared signal set (for the host's engine-task wait loop)
    #[must_use]
    pub fn signals(&self) -> &SignalSet {
        &self.signals
    }

    /// Record currently holding the running band
    #[must_use]
    pub fn current_task(&self) -> Option<TaskId> {
        self.current
    }

    /// Check if dispatching has started
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.started
    }

    /// Committed periodic utilization in parts-per-million
    #[must_use]
    pub const fn utilization_ppm(&self) -> u32 {
        self.admission.accepted_ppm()
    }

    /// Access a task record
    #[must_use]
    pub fn task(&self, id: TaskId) -> Option<&Tcb> {
        self.store.get(id)
    }

    /// Resolve a host handle to a record ID
    #[must_use]
    pub fn task_by_handle(&self, handle: HostHandle) -> Option<TaskId> {
        self.store.by_handle(handle)
    }

    /// The deadline-ordered lists (read-only)
    #[must_use]
    pub fn lists(&self) -> &DeadlineLists {
        &self.lists
    }

    /// Scheduler counters
    #[must_use]
    pub const fn stats(&self) -> &SchedStats {
        &self.stats
    }

    /// The status/log channel
    #[must_use]
    pub fn log(&self) -> &LogBuffer {
        &self.log
    }

    /// Mutable access to the log channel (level filtering)
    pub fn log_mut(&mut self) -> &mut LogBuffer {
        &mut self.log
    }

    /// The resolved configuration
    #[must_use]
    pub const fn config(&self) -> &SchedConfig {
        &self.cfg
    }
}
