// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 Tessel Systems

//! Deadline-ordered task lists
//!
//! Four collections - Init, Ready, Blocked, Suspended - each kept in
//! strictly non-decreasing absolute-deadline order, with FIFO ordering
//! among equal deadlines. A record belongs to at most one list at a time;
//! the record's `list` marker tracks membership so removal never searches
//! the wrong collection.
//!
//! These are pure data-structure operations. No scheduling policy lives
//! here: the engine decides what to insert where, the lists only keep the
//! order.

use heapless::Vec;
use ts_common::constants::TOTAL_TASKS;
use ts_common::{Error, Result};

use crate::task::{TaskId, TaskStore};

/// The list a record currently occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    /// First-instance timing not yet anchored to the system start
    Init,
    /// Released instances awaiting (or holding) the CPU
    Ready,
    /// Instances waiting for their next release
    Blocked,
    /// Instances held back after a WCET overrun or host suspension
    Suspended,
}

/// The four deadline-ordered collections
pub struct DeadlineLists {
    init: Vec<TaskId, TOTAL_TASKS>,
    ready: Vec<TaskId, TOTAL_TASKS>,
    blocked: Vec<TaskId, TOTAL_TASKS>,
    suspended: Vec<TaskId, TOTAL_TASKS>,
}

impl DeadlineLists {
    /// Create four empty lists
    #[must_use]
    pub const fn new() -> Self {
        Self {
            init: Vec::new(),
            ready: Vec::new(),
            blocked: Vec::new(),
            suspended: Vec::new(),
        }
    }

    fn list(&self, kind: ListKind) -> &Vec<TaskId, TOTAL_TASKS> {
        match kind {
            ListKind::Init => &self.init,
            ListKind::Ready => &self.ready,
            ListKind::Blocked => &self.blocked,
            ListKind::Suspended => &self.suspended,
        }
    }

    fn list_mut(&mut self, kind: ListKind) -> &mut Vec<TaskId, TOTAL_TASKS> {
        match kind {
            ListKind::Init => &mut self.init,
            ListKind::Ready => &mut self.ready,
            ListKind::Blocked => &mut self.blocked,
            ListKind::Suspended => &mut self.suspended,
        }
    }

    /// Insert a record into a list, keyed by its current absolute deadline
    ///
    /// Insertion goes after any entries with an equal key, so equal
    /// deadlines resolve in insertion order. The record must not already
    /// be on a list.
    pub fn insert(&mut self, store: &mut TaskStore, kind: ListKind, id: TaskId) -> Result<()> {
        let key = store.get(id).ok_or(Error::NotFound)?.abs_deadline;
        debug_assert!(store.get(id).is_some_and(|t| t.list.is_none()));

        let pos = {
            let list = self.list(kind);
            list.partition_point(|&probe| {
                store.get(probe).is_some_and(|t| t.abs_deadline <= key)
            })
        };
        self.list_mut(kind)
            .insert(pos, id)
            .map_err(|_| Error::CapacityExceeded)?;

        if let Some(tcb) = store.get_mut(id) {
            tcb.list = Some(kind);
        }
        Ok(())
    }

    /// Remove a record from whichever list currently holds it
    pub fn remove(&mut self, store: &mut TaskStore, id: TaskId) -> Result<()> {
        let kind = store
            .get(id)
            .ok_or(Error::NotFound)?
            .list
            .ok_or(Error::NotFound)?;

        let list = self.list_mut(kind);
        let pos = list.iter().position(|&t| t == id).ok_or(Error::NotFound)?;
        list.remove(pos);

        if let Some(tcb) = store.get_mut(id) {
            tcb.list = None;
        }
        Ok(())
    }

    /// Peek the earliest-deadline record of a list
    #[must_use]
    pub fn head(&self, kind: ListKind) -> Option<TaskId> {
        self.list(kind).first().copied()
    }

    /// Check if a list is empty
    #[must_use]
    pub fn is_empty(&self, kind: ListKind) -> bool {
        self.list(kind).is_empty()
    }

    /// Number of records in a list
    #[must_use]
    pub fn len(&self, kind: ListKind) -> usize {
        self.list(kind).len()
    }

    /// The record IDs of a list, earliest deadline first
    #[must_use]
    pub fn ids(&self, kind: ListKind) -> &[TaskId] {
        self.list(kind)
    }
}

impl Default for DeadlineLists {
    fn default() -> Self {
        Self::new()
    }
}
