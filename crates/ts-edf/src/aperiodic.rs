// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 Tessel Systems

//! Aperiodic workload strategies
//!
//! Two mutually exclusive ways to schedule aperiodic requests, chosen at
//! scheduler construction:
//!
//! - [`ServerQueue`]: a FIFO drained in registration order by one
//!   dedicated host task at the lowest scheduling band. The requests
//!   never enter the deadline-ordered lists and only consume idle time.
//! - [`TbsState`]: Total Bandwidth Server deadline assignment. Each
//!   request becomes a one-shot record with a synthetic deadline carved
//!   out of the bandwidth left over by the periodic set, scheduled
//!   through the shared lists like any periodic instance.

use heapless::Vec;
use ts_common::constants::{MAX_APERIODIC_TASKS, UTILIZATION_SCALE};
use ts_common::{AperiodicPolicy, Error, Result};

use crate::task::ApRequest;

/// FIFO queue behind the dedicated background server
///
/// The cursor separates already-served requests from pending ones; the
/// records are kept (marked executed) for post-run inspection until
/// teardown.
pub struct ServerQueue {
    queue: Vec<ApRequest, MAX_APERIODIC_TASKS>,
    cursor: usize,
}

impl ServerQueue {
    /// Create an empty queue
    #[must_use]
    pub const fn new() -> Self {
        Self {
            queue: Vec::new(),
            cursor: 0,
        }
    }

    /// Append a request (strict registration order)
    pub fn push(&mut self, request: ApRequest) -> Result<()> {
        self.queue.push(request).map_err(|_| Error::CapacityExceeded)
    }

    /// The request the server must run next, if any
    #[must_use]
    pub fn current(&self) -> Option<&ApRequest> {
        self.queue.get(self.cursor)
    }

    /// Mark the current request executed and advance the cursor
    ///
    /// Returns `true` while more requests remain.
    pub fn complete_current(&mut self) -> bool {
        if let Some(request) = self.queue.get_mut(self.cursor) {
            request.executed = true;
            self.cursor += 1;
        }
        !self.is_exhausted()
    }

    /// Number of requests not yet served
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.queue.len() - self.cursor
    }

    /// Total number of registered requests
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if no requests were registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Check if every request has been served
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.queue.len()
    }

    /// Drop all requests and reset the cursor
    pub fn clear(&mut self) {
        self.queue.clear();
        self.cursor = 0;
    }
}

impl Default for ServerQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Total Bandwidth Server deadline-assignment state
#[derive(Debug, Clone, Copy, Default)]
pub struct TbsState {
    last_deadline: u64,
}

impl TbsState {
    /// Create with no deadline assigned yet
    #[must_use]
    pub const fn new() -> Self {
        Self { last_deadline: 0 }
    }

    /// Assign the deadline for the next aperiodic request
    ///
    /// `d_k = max(arrival, d_{k-1}) + ceil(wcet / (1 - U_accepted))`,
    /// all relative to system start. The division is exact fixed-point:
    /// the request's bandwidth share never pushes total utilization
    /// above 1, so the periodic set stays schedulable.
    pub fn assign_deadline(&mut self, arrival: u64, wcet: u64, accepted_ppm: u32) -> u64 {
        debug_assert!(accepted_ppm < UTILIZATION_SCALE);
        let spare = (UTILIZATION_SCALE.saturating_sub(accepted_ppm)).max(1) as u128;
        let num = (wcet as u128) * (UTILIZATION_SCALE as u128);
        let service = ((num + spare - 1) / spare) as u64;

        let d_k = arrival.max(self.last_deadline) + service;
        self.last_deadline = d_k;
        d_k
    }

    /// The most recently assigned deadline (0 initially)
    #[must_use]
    pub const fn last_deadline(&self) -> u64 {
        self.last_deadline
    }

    /// Forget the deadline chain (full-system teardown only)
    pub fn reset(&mut self) {
        self.last_deadline = 0;
    }
}

/// The strategy resolved from [`AperiodicPolicy`] at construction
pub enum AperiodicManager {
    /// Dedicated background server with its FIFO queue
    Server(ServerQueue),
    /// Total Bandwidth Server deadline assignment
    Bandwidth(TbsState),
}

impl AperiodicManager {
    /// Instantiate the strategy for a policy
    #[must_use]
    pub fn from_policy(policy: AperiodicPolicy) -> Self {
        match policy {
            AperiodicPolicy::BackgroundServer => Self::Server(ServerQueue::new()),
            AperiodicPolicy::TotalBandwidth => Self::Bandwidth(TbsState::new()),
        }
    }

    /// Reset strategy state for teardown
    pub fn reset(&mut self) {
        match self {
            Self::Server(queue) => queue.clear(),
            Self::Bandwidth(tbs) => tbs.reset(),
        }
    }
}
