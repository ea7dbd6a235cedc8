// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 Tessel Systems

//! Scheduler configuration for Tessel RT
//!
//! Configuration is resolved once at scheduler construction and never
//! changes at runtime. The aperiodic strategy and the timing-violation
//! checks mirror the build switches of classic EDF deployments: exactly
//! one aperiodic strategy is active per scheduler instance, and each
//! monitor check can be disabled independently.

use crate::constants::{DEFAULT_RECHECK_PERIOD, DEFAULT_UTILIZATION_BOUND_PPM};

/// Strategy for handling aperiodic workload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AperiodicPolicy {
    /// A dedicated lowest-band server task drains a FIFO queue of
    /// aperiodic requests in registration order, running only in the idle
    /// gaps left by the periodic set.
    BackgroundServer,
    /// Total Bandwidth Server: each aperiodic request becomes a one-shot
    /// instance with a synthetic deadline carved out of the spare periodic
    /// bandwidth, scheduled through the shared deadline-ordered lists.
    TotalBandwidth,
}

/// Timing-violation monitor switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Enable per-tick WCET budget checking for periodic tasks
    pub wcet_checks: bool,
    /// Enable per-tick absolute-deadline checking for periodic tasks
    pub deadline_checks: bool,
    /// Extend WCET checking to one-shot bandwidth-server instances
    pub wcet_checks_oneshot: bool,
    /// Extend deadline checking to one-shot bandwidth-server instances
    pub deadline_checks_oneshot: bool,
}

impl MonitorConfig {
    /// Default monitor configuration: periodic tasks are fully monitored,
    /// one-shot instances are exempt.
    pub const DEFAULT: Self = Self {
        wcet_checks: true,
        deadline_checks: true,
        wcet_checks_oneshot: false,
        deadline_checks_oneshot: false,
    };

    /// Monitoring fully disabled
    pub const DISABLED: Self = Self {
        wcet_checks: false,
        deadline_checks: false,
        wcet_checks_oneshot: false,
        deadline_checks_oneshot: false,
    };
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Scheduler-wide configuration
#[derive(Debug, Clone, Copy)]
pub struct SchedConfig {
    /// Admission bound for periodic utilization, parts-per-million
    pub utilization_bound_ppm: u32,
    /// Aperiodic workload strategy
    pub aperiodic_policy: AperiodicPolicy,
    /// Timing-violation monitor switches
    pub monitor: MonitorConfig,
    /// Fallback cadence, in ticks, for the WCET-recovery re-check
    pub recheck_period: u64,
    /// Host tick rate in Hz (informational, used for diagnostics)
    pub tick_hz: u32,
}

impl SchedConfig {
    /// Default configuration: 0.9 utilization bound, background server,
    /// full periodic monitoring, 1 kHz tick.
    pub const DEFAULT: Self = Self {
        utilization_bound_ppm: DEFAULT_UTILIZATION_BOUND_PPM,
        aperiodic_policy: AperiodicPolicy::BackgroundServer,
        monitor: MonitorConfig::DEFAULT,
        recheck_period: DEFAULT_RECHECK_PERIOD,
        tick_hz: 1_000,
    };

    /// Default configuration with the Total Bandwidth Server strategy
    #[must_use]
    pub fn with_total_bandwidth() -> Self {
        Self {
            aperiodic_policy: AperiodicPolicy::TotalBandwidth,
            ..Self::DEFAULT
        }
    }
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
