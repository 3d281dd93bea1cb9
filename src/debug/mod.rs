//! Debug utilities for violation reports.
//!
//! Backtraces are only captured when the `debug` feature is enabled.

pub(crate) mod backtrace;
