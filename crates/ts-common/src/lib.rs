// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 Tessel Systems

//! Tessel RT Common Library
//!
//! This crate provides the types shared across the Tessel RT scheduling
//! stack: the unified error type, the in-memory log channel, configuration
//! structures, tick/time utilities and compile-time limits.
//!
//! # Features
//!
//! - `std`: Enable standard library support (disabled by default for embedded)
//! - `defmt`: Enable defmt formatting support for embedded debugging
//!
//! # Design
//!
//! No heap allocations are performed anywhere in this crate - all buffers
//! use fixed-size arrays or heapless collections, and all arithmetic is
//! integer arithmetic (utilization values are fixed-point parts-per-million).

#![no_std]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

#[cfg(feature = "std")]
extern crate std;

pub mod config;
pub mod constants;
pub mod errors;
pub mod log;
pub mod time;
pub mod version;

// Re-export commonly used items
pub use config::{AperiodicPolicy, MonitorConfig, SchedConfig};
pub use errors::{Error, Result};
pub use time::{TickFrequency, Ticks};
pub use version::Version;
