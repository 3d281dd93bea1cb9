//! Diagnostics for detected corruption and misuse.
//!
//! This module provides:
//! - **Runtime diagnostics**: heap-aware error messages with codes
//! - **Sinks**: callbacks that observe every [`Violation`](crate::Violation)
//!
//! ## Diagnostic Codes
//!
//! | Code  | Meaning                                  |
//! |-------|------------------------------------------|
//! | GH001 | Guard bytes overwritten                  |
//! | GH002 | Length field inconsistent with its block |
//! | GH003 | Poison check on a free block             |
//! | GH004 | Block list corrupt, heap check aborted   |
//! | GH005 | Size overflow with guard overhead        |
//! | GH006 | Pointer does not map to a block          |

pub mod emit;
pub mod kind;
pub mod macros;

pub use emit::{emit, emit_with_context, set_verbose, suppress_diagnostics, CollectingSink, DiagnosticSink};
pub use kind::{Diagnostic, DiagnosticKind};

pub use kind::{GH001, GH002, GH003, GH004, GH005, GH006};
