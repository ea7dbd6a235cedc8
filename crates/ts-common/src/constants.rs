// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 Tessel Systems

//! System-wide constants for Tessel RT
//!
//! Compile-time limits of the scheduling core. All capacities are fixed at
//! build time; registration beyond these bounds is a configuration error.

// =============================================================================
// Task Capacity
// =============================================================================

/// Maximum number of periodic tasks
pub const MAX_PERIODIC_TASKS: usize = 10;

/// Maximum number of aperiodic tasks
pub const MAX_APERIODIC_TASKS: usize = 4;

/// Total task record capacity (periodic + aperiodic)
pub const TOTAL_TASKS: usize = MAX_PERIODIC_TASKS + MAX_APERIODIC_TASKS;

/// Maximum task name length in bytes
pub const MAX_TASK_NAME_LEN: usize = 16;

/// Default stack sizing hint passed to the host, in bytes
pub const DEFAULT_STACK_HINT: u32 = 2048;

/// Stack sizing hint for the dedicated aperiodic server task, in bytes
pub const APERIODIC_SERVER_STACK_HINT: u32 = 3072;

// =============================================================================
// Utilization
// =============================================================================

/// Fixed-point scale for utilization values (parts-per-million; 1_000_000 = 1.0)
pub const UTILIZATION_SCALE: u32 = 1_000_000;

/// Default admission bound for periodic utilization (0.9)
pub const DEFAULT_UTILIZATION_BOUND_PPM: u32 = 900_000;

// =============================================================================
// Monitoring
// =============================================================================

/// Default fallback cadence, in ticks, for the WCET-recovery re-check
pub const DEFAULT_RECHECK_PERIOD: u64 = 10;
