//! # guardheap
//!
//! Sentinel-guard corruption detection for fixed-block heap allocators.
//!
//! `guardheap` does not manage memory itself. It wraps a block allocator and
//! inflates every request so the caller's bytes are surrounded by guard
//! regions filled with a sentinel byte:
//!
//! ```text
//! [length field][guard before][user region][guard after]
//! ```
//!
//! The guards are checked when memory is released or resized, on demand, and
//! across the whole heap. Detected corruption is reported, never repaired.
//!
//! ## Features
//!
//! - `poison` (default): guards on. Without it [`PoisonConfig::default`]
//!   produces a pass-through heap
//! - `parking_lot`: faster mutexes for [`BlockHeap`]
//! - `log`: route diagnostics through the log crate
//! - `diagnostics`: diagnostics on stderr in release builds
//! - `debug`: backtraces attached to every [`Violation`]
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use guardheap::{BlockHeap, CollectingSink, GuardSide, PoisonConfig, PoisonHeap};
//!
//! let sink = Arc::new(CollectingSink::new());
//! let heap = PoisonHeap::new(BlockHeap::new(512, 8).unwrap(), PoisonConfig::default())
//!     .with_sink(sink.clone());
//!
//! let p = heap.allocate(10);
//! unsafe { p.add(10).write(0) }; // one byte too far
//!
//! let violation = heap.check_all_used_blocks().unwrap_err();
//! assert_eq!(violation.side(), Some(GuardSide::After));
//! assert_eq!(sink.len(), 1);
//! ```

pub mod allocators;
pub mod api;
pub mod diagnostics;
pub mod poison;

mod debug;
mod sync;

// Re-export public API at crate root for convenience
pub use api::config::{LenWidth, PoisonConfig, DEFAULT_SENTINEL};
pub use api::poison_heap::PoisonHeap;
pub use api::stats::PoisonStats;

// Allocator contract and the reference heap
pub use allocators::block::{BlockAllocator, BlockState, BlockTable, HeapGeometry};
pub use allocators::block_heap::{BlockHeap, HeapError};

// Violation reports
pub use poison::violation::{GuardSide, Violation, ViolationKind};

// Diagnostics
pub use diagnostics::{CollectingSink, Diagnostic, DiagnosticKind, DiagnosticSink};
pub use diagnostics::{set_verbose, suppress_diagnostics};
pub use diagnostics::{GH001, GH002, GH003, GH004, GH005, GH006};
