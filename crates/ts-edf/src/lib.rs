// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 Tessel Systems

//! Tessel RT EDF Scheduling Core
//!
//! An earliest-deadline-first dispatch layer for a host kernel's
//! fixed-priority preemptive scheduler:
//!
//! - **Task records**: deadline-annotated bookkeeping for periodic and
//!   aperiodic tasks
//! - **Deadline-ordered lists**: Init/Ready/Blocked/Suspended collections
//!   sorted by absolute deadline
//! - **Admission control**: utilization-bound schedulability test at
//!   registration
//! - **Aperiodic handling**: dedicated background server or Total
//!   Bandwidth Server deadline assignment
//! - **Timing monitor**: per-tick WCET and deadline overrun detection
//!   with suspend-and-recover / evict policies
//! - **Decision engine**: event-driven next-task selection and preemption
//!   directives
//!
//! The core computes scheduling decisions only. Context switching, stacks
//! and the tick source belong to the host, reached through the
//! [`HostPort`] trait: the engine keeps exactly one task elevated to the
//! `Running` priority band at any instant, so the host's own
//! fixed-priority dispatcher always picks the deadline-earliest task.
//!
//! # Usage
//!
//! ```rust,ignore
//! use ts_edf::{EdfScheduler, PeriodicTaskSpec};
//! use ts_common::{SchedConfig, Ticks};
//!
//! let mut sched = EdfScheduler::new(SchedConfig::DEFAULT);
//! sched.create_periodic_task(&PeriodicTaskSpec {
//!     name: "sensor",
//!     stack_hint: 2048,
//!     period: 100,
//!     rel_deadline: 100,
//!     phase: 0,
//!     wcet: 20,
//! })?;
//! sched.start_scheduling(&mut host, Ticks::ZERO)?;
//! // host hooks feed events; the engine task drains them:
//! sched.service(&mut host, now)?;
//! ```

#![no_std]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod admission;
pub mod aperiodic;
pub mod event;
pub mod host;
pub mod list;
pub mod monitor;
pub mod scheduler;
pub mod task;

// Re-export commonly used types
pub use admission::AdmissionController;
pub use aperiodic::{AperiodicManager, ServerQueue, TbsState};
pub use event::{SignalSet, EV_ALL, EV_BLOCK, EV_DEADLINE_OVERFLOW, EV_READY, EV_SUSPEND, EV_WCET_OVERFLOW, EV_WCET_WAKEUP};
pub use host::{HostHandle, HostPort, PriorityBand};
pub use list::{DeadlineLists, ListKind};
pub use monitor::TimingMonitor;
pub use scheduler::{AperiodicRelease, EdfScheduler, SchedStats};
pub use task::{AperiodicTaskSpec, PeriodicTaskSpec, TaskId, TaskStatus, Tcb};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library build info
pub const BUILD_INFO: &str = concat!(
    env!("CARGO_PKG_NAME"),
    " v",
    env!("CARGO_PKG_VERSION"),
    " - Tessel RT EDF core"
);
