// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 Tessel Systems

//! Admission control
//!
//! The classic EDF utilization test for implicit-deadline periodic task
//! sets: the sum of WCET/period ratios over all accepted tasks must stay
//! within the configured bound. The test runs once per periodic task at
//! registration and is never re-evaluated at runtime.
//!
//! Utilization is fixed-point parts-per-million. The per-task ratio is
//! rounded up, which keeps the test conservative; it also deliberately
//! ignores any deadline < period slack.

use ts_common::constants::UTILIZATION_SCALE;
use ts_common::{Error, Result};

/// Utilization-bound admission test state
#[derive(Debug, Clone, Copy)]
pub struct AdmissionController {
    accepted_ppm: u32,
    bound_ppm: u32,
}

impl AdmissionController {
    /// Create a controller with the given bound (parts-per-million)
    #[must_use]
    pub const fn new(bound_ppm: u32) -> Self {
        Self {
            accepted_ppm: 0,
            bound_ppm,
        }
    }

    /// Utilization share of a single task, rounded up (parts-per-million)
    #[must_use]
    pub fn task_share_ppm(period: u64, wcet: u64) -> u32 {
        debug_assert!(period > 0);
        let num = (wcet as u128) * (UTILIZATION_SCALE as u128);
        let share = (num + (period as u128) - 1) / (period as u128);
        share.min(u32::MAX as u128) as u32
    }

    /// Run the schedulability test for one task and commit on acceptance
    ///
    /// Returns the new cumulative utilization on acceptance. On rejection
    /// the committed utilization is left unchanged and
    /// [`Error::AdmissionRejected`] is returned; the caller must not
    /// create the task.
    pub fn check(&mut self, period: u64, wcet: u64) -> Result<u32> {
        let candidate = self
            .accepted_ppm
            .saturating_add(Self::task_share_ppm(period, wcet));
        if candidate > self.bound_ppm {
            return Err(Error::AdmissionRejected);
        }
        self.accepted_ppm = candidate;
        Ok(candidate)
    }

    /// Cumulative utilization committed so far (parts-per-million)
    #[must_use]
    pub const fn accepted_ppm(&self) -> u32 {
        self.accepted_ppm
    }

    /// Configured bound (parts-per-million)
    #[must_use]
    pub const fn bound_ppm(&self) -> u32 {
        self.bound_ppm
    }

    /// Forget all committed utilization (full-system teardown only)
    pub fn reset(&mut self) {
        self.accepted_ppm = 0;
    }
}
