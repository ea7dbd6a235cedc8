// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 Tessel Systems

//! Task records for the Tessel RT EDF core
//!
//! This module provides the passive bookkeeping records for periodic and
//! aperiodic tasks, and the fixed-capacity store that owns them. Records
//! carry the deadline arithmetic state; all policy lives in the decision
//! engine.

use heapless::FnvIndexMap;
use ts_common::constants::{MAX_TASK_NAME_LEN, TOTAL_TASKS};
use ts_common::{Error, Result, Ticks};

use crate::host::{HostHandle, PriorityBand};
use crate::list::ListKind;

/// Task identifier (index into the record store)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u8);

impl TaskId {
    /// Invalid task ID (used for "no task")
    pub const INVALID: TaskId = TaskId(0xFF);

    /// Create a new task ID
    #[must_use]
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    /// Check if this is a valid task ID
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.0 != 0xFF
    }

    /// Store slot index
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TaskId {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "T{}", self.0);
    }
}

/// Task state machine
///
/// `Blocked -> Ready` on release or resume, `Ready -> Running` on
/// dispatch, `Running -> Blocked` on voluntary wait for the next period,
/// `Running -> Ready` on preemption, `Running -> Suspended` on a WCET
/// overrun, `Suspended -> Ready` when the recovery time is reached.
/// Deletion is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Waiting for the next release
    Blocked,
    /// Released, awaiting dispatch
    Ready,
    /// Currently executing
    Running,
    /// Held back due to a WCET overrun (or host suspension)
    Suspended,
}

impl TaskStatus {
    /// Check if the task is dispatched or dispatchable
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Ready | Self::Running)
    }
}

/// Registration parameters for a periodic task
///
/// All timing values are in host ticks; `rel_deadline` must not exceed
/// `period`.
#[derive(Debug, Clone, Copy)]
pub struct PeriodicTaskSpec<'a> {
    /// Task name (truncated to [`MAX_TASK_NAME_LEN`] bytes)
    pub name: &'a str,
    /// Stack sizing hint forwarded to the host
    pub stack_hint: u32,
    /// Release period in ticks
    pub period: u64,
    /// Relative deadline in ticks (<= period)
    pub rel_deadline: u64,
    /// Release offset of the first instance, in ticks
    pub phase: u64,
    /// Worst-case execution time budget in ticks
    pub wcet: u64,
}

/// Registration parameters for an aperiodic task
#[derive(Debug, Clone, Copy)]
pub struct AperiodicTaskSpec<'a> {
    /// Task name (truncated to [`MAX_TASK_NAME_LEN`] bytes)
    pub name: &'a str,
    /// Stack sizing hint forwarded to the host
    pub stack_hint: u32,
    /// Worst-case execution time budget in ticks
    pub wcet: u64,
    /// Arrival time relative to system start, in ticks
    pub arrival: u64,
}

/// Task control block for periodic and one-shot bandwidth-server tasks
///
/// Absolute times (`rel_arrival`, `abs_deadline`, `next_unblock_time`) are
/// provisional until the record is anchored to the system start time,
/// which happens lazily the first time the record is promoted out of the
/// Init list.
pub struct Tcb {
    /// Record identifier
    pub id: TaskId,
    /// Task name bytes
    pub name: [u8; MAX_TASK_NAME_LEN],
    /// Name length
    pub name_len: usize,
    /// Release period in ticks (synthetic deadline span for one-shots)
    pub period: u64,
    /// First-release offset in ticks
    pub phase: u64,
    /// Relative deadline in ticks
    pub rel_deadline: u64,
    /// WCET budget in ticks
    pub wcet: u64,
    /// Execution time measured since the last release
    pub measured_exec: u64,
    /// Release time of the current instance
    pub rel_arrival: Ticks,
    /// Absolute deadline of the current instance
    pub abs_deadline: Ticks,
    /// Current status
    pub status: TaskStatus,
    /// Host priority band currently assigned
    pub band: PriorityBand,
    /// List currently holding this record
    pub list: Option<ListKind>,
    /// Host task handle, bound at scheduling start
    pub host: Option<HostHandle>,
    /// Stack sizing hint forwarded to the host
    pub stack_hint: u32,
    /// False for one-shot bandwidth-server instances
    pub is_periodic: bool,
    /// One-shot instance has completed its single execution
    pub executed: bool,
    /// WCET budget exceeded in the current instance
    pub wcet_exceeded: bool,
    /// Recovery release time after a WCET overrun
    pub next_unblock_time: Ticks,
    /// Absolute deadline missed while running
    pub deadline_exceeded: bool,
}

impl Tcb {
    /// Create a periodic task record from registration parameters
    ///
    /// The record starts Blocked in the waiting band with a provisional
    /// absolute deadline of `phase + rel_deadline`, used only to order the
    /// Init list before start.
    #[must_use]
    pub fn new_periodic(id: TaskId, spec: &PeriodicTaskSpec<'_>) -> Self {
        let mut tcb = Self::blank(id, spec.stack_hint, true);
        tcb.set_name(spec.name);
        tcb.period = spec.period;
        tcb.phase = spec.phase;
        tcb.rel_deadline = spec.rel_deadline;
        tcb.wcet = spec.wcet;
        tcb.rel_arrival = Ticks::new(spec.phase);
        tcb.abs_deadline = Ticks::new(spec.phase + spec.rel_deadline);
        tcb
    }

    /// Create a one-shot bandwidth-server record
    ///
    /// `deadline` is the TBS-assigned deadline relative to system start.
    /// The stored relative deadline spans from the arrival to that
    /// deadline, so the uniform anchoring formula
    /// `start + phase + rel_deadline` lands exactly on `start + deadline`.
    #[must_use]
    pub fn new_oneshot(id: TaskId, spec: &AperiodicTaskSpec<'_>, deadline: u64) -> Self {
        let span = deadline - spec.arrival;
        let mut tcb = Self::blank(id, spec.stack_hint, false);
        tcb.set_name(spec.name);
        tcb.period = span;
        tcb.phase = spec.arrival;
        tcb.rel_deadline = span;
        tcb.wcet = spec.wcet;
        tcb.rel_arrival = Ticks::new(spec.arrival);
        tcb.abs_deadline = Ticks::new(deadline);
        tcb
    }

    fn blank(id: TaskId, stack_hint: u32, is_periodic: bool) -> Self {
        Self {
            id,
            name: [0u8; MAX_TASK_NAME_LEN],
            name_len: 0,
            period: 0,
            phase: 0,
            rel_deadline: 0,
            wcet: 0,
            measured_exec: 0,
            rel_arrival: Ticks::ZERO,
            abs_deadline: Ticks::ZERO,
            status: TaskStatus::Blocked,
            band: PriorityBand::Waiting,
            list: None,
            host: None,
            stack_hint,
            is_periodic,
            executed: false,
            wcet_exceeded: false,
            next_unblock_time: Ticks::ZERO,
            deadline_exceeded: false,
        }
    }

    /// Set the task name
    pub fn set_name(&mut self, name: &str) {
        let bytes = name.as_bytes();
        let len = bytes.len().min(MAX_TASK_NAME_LEN);
        self.name[..len].copy_from_slice(&bytes[..len]);
        self.name_len = len;
    }

    /// Get the task name as a string slice
    #[must_use]
    pub fn name_str(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len]).unwrap_or("???")
    }

    /// Anchor the first instance to the system start time
    ///
    /// Called exactly once, when the record leaves the Init list.
    pub fn anchor(&mut self, sys_start: Ticks) {
        self.rel_arrival = sys_start + self.phase;
        self.abs_deadline = sys_start + (self.phase + self.rel_deadline);
    }

    /// Advance the release bookkeeping to the next instance
    ///
    /// The completed instance's arrival moves forward by one period and
    /// the absolute deadline follows.
    pub fn advance_release(&mut self) {
        self.rel_arrival = self.rel_arrival + self.period;
        self.abs_deadline = self.rel_arrival + self.rel_deadline;
    }
}

/// Record of an aperiodic request served by the dedicated background
/// server (never enters the deadline-ordered lists)
#[derive(Debug, Clone)]
pub struct ApRequest {
    /// Request identifier
    pub id: TaskId,
    /// Name bytes
    pub name: [u8; MAX_TASK_NAME_LEN],
    /// Name length
    pub name_len: usize,
    /// Arrival time relative to system start, in ticks
    pub phase: u64,
    /// WCET budget in ticks
    pub wcet: u64,
    /// Request has been executed by the server
    pub executed: bool,
}

impl ApRequest {
    /// Create a request record from registration parameters
    #[must_use]
    pub fn new(id: TaskId, spec: &AperiodicTaskSpec<'_>) -> Self {
        let bytes = spec.name.as_bytes();
        let len = bytes.len().min(MAX_TASK_NAME_LEN);
        let mut name = [0u8; MAX_TASK_NAME_LEN];
        name[..len].copy_from_slice(&bytes[..len]);
        Self {
            id,
            name,
            name_len: len,
            phase: spec.arrival,
            wcet: spec.wcet,
            executed: false,
        }
    }

    /// Get the request name as a string slice
    #[must_use]
    pub fn name_str(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len]).unwrap_or("???")
    }
}

/// Map capacity: next power of two above [`TOTAL_TASKS`]
const HANDLE_MAP_CAPACITY: usize = TOTAL_TASKS.next_power_of_two();

/// Fixed-capacity store owning every task record
///
/// Also owns the host-handle lookup that replaces per-task local-storage
/// back-pointers: the host reports state transitions by handle, and the
/// store resolves them to records.
pub struct TaskStore {
    slots: [Option<Tcb>; TOTAL_TASKS],
    handles: FnvIndexMap<u16, TaskId, HANDLE_MAP_CAPACITY>,
}

impl TaskStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        const NONE: Option<Tcb> = None;
        Self {
            slots: [NONE; TOTAL_TASKS],
            handles: FnvIndexMap::new(),
        }
    }

    /// Number of live records
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Check if the store holds no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.is_none())
    }

    /// Allocate a slot and build a record in it
    ///
    /// The builder receives the allocated [`TaskId`]. Fails with
    /// [`Error::CapacityExceeded`] when no slot is free.
    pub fn insert(&mut self, build: impl FnOnce(TaskId) -> Tcb) -> Result<TaskId> {
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(Error::CapacityExceeded)?;
        let id = TaskId::new(slot as u8);
        self.slots[slot] = Some(build(id));
        Ok(id)
    }

    /// Get a record by ID
    #[must_use]
    pub fn get(&self, id: TaskId) -> Option<&Tcb> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    /// Get a mutable record by ID
    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut Tcb> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Remove a record, releasing its slot and handle mapping
    pub fn remove(&mut self, id: TaskId) -> Option<Tcb> {
        let tcb = self.slots.get_mut(id.index()).and_then(Option::take)?;
        if let Some(handle) = tcb.host {
            self.handles.remove(&handle.0);
        }
        Some(tcb)
    }

    /// Bind a host task handle to a record
    pub fn bind_handle(&mut self, id: TaskId, handle: HostHandle) -> Result<()> {
        let tcb = self.get_mut(id).ok_or(Error::NotFound)?;
        tcb.host = Some(handle);
        self.handles
            .insert(handle.0, id)
            .map_err(|_| Error::CapacityExceeded)?;
        Ok(())
    }

    /// Resolve a host handle to a record ID
    #[must_use]
    pub fn by_handle(&self, handle: HostHandle) -> Option<TaskId> {
        self.handles.get(&handle.0).copied()
    }

    /// Iterate over the IDs of live records
    pub fn ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| TaskId::new(i as u8)))
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}
