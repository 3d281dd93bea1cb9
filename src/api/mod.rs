//! Public API for guardheap.
//!
//! This module contains all user-facing types and functions.
//! Most users should only interact with [`PoisonHeap`](poison_heap::PoisonHeap)
//! and [`PoisonConfig`](config::PoisonConfig).

pub mod config;
pub mod poison_heap;
pub mod stats;

pub(crate) mod walker;
