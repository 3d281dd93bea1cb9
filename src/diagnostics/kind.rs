//! Diagnostic kinds and core types.
//!
//! Mirrors rustc's diagnostic levels for familiar UX.

/// The severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A hard error - something is definitely wrong.
    Error,
    /// A warning - something is probably wrong or suboptimal.
    Warning,
}

impl DiagnosticKind {
    /// Get the display prefix for this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
        }
    }
}

/// A diagnostic message with code, message, and optional context.
///
/// Diagnostic codes follow the pattern:
/// - `GH00x` - Heap integrity and usage issues
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Severity level.
    pub kind: DiagnosticKind,
    /// Diagnostic code (e.g., "GH001").
    pub code: &'static str,
    /// Primary message.
    pub message: &'static str,
    /// Optional additional context.
    pub note: Option<&'static str>,
    /// Optional fix suggestion.
    pub help: Option<&'static str>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub const fn error(code: &'static str, message: &'static str) -> Self {
        Self {
            kind: DiagnosticKind::Error,
            code,
            message,
            note: None,
            help: None,
        }
    }

    /// Create a new warning diagnostic.
    pub const fn warning(code: &'static str, message: &'static str) -> Self {
        Self {
            kind: DiagnosticKind::Warning,
            code,
            message,
            note: None,
            help: None,
        }
    }

    /// Add a note to this diagnostic.
    pub const fn with_note(mut self, note: &'static str) -> Self {
        self.note = Some(note);
        self
    }

    /// Add a help message to this diagnostic.
    pub const fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }
}

// =============================================================================
// Predefined diagnostics (GH00x - Heap integrity)
// =============================================================================

/// GH001: Guard bytes overwritten.
pub const GH001: Diagnostic = Diagnostic::error(
    "GH001",
    "guard bytes around an allocation were overwritten"
).with_note("something wrote past the start or end of the allocation")
 .with_help("look for out-of-bounds writes through the pointer owning this block");

/// GH002: Length field overwritten.
pub const GH002: Diagnostic = Diagnostic::error(
    "GH002",
    "length field of an allocation is inconsistent with its block"
).with_note("the recorded size is smaller than the guards or larger than the block")
 .with_help("look for an underflow through the pointer owning this block, or a write through a stale pointer");

/// GH003: Poison check on a free block.
pub const GH003: Diagnostic = Diagnostic::warning(
    "GH003",
    "poison check requested for a free block"
).with_note("free blocks carry no guards, so nothing was checked")
 .with_help("this usually means a double free or a pointer used after release");

/// GH004: Heap walk aborted.
pub const GH004: Diagnostic = Diagnostic::error(
    "GH004",
    "heap check aborted: block list is corrupt"
).with_note("a successor link points outside the table or the list does not terminate")
 .with_help("the allocator's own metadata was overwritten; check writes near the reported block");

/// GH005: Size overflow.
pub const GH005: Diagnostic = Diagnostic::warning(
    "GH005",
    "requested size overflows once guard overhead is added"
).with_note("the request was refused and a null pointer returned");

/// GH006: Pointer not at a block boundary.
pub const GH006: Diagnostic = Diagnostic::warning(
    "GH006",
    "pointer does not map to a block of this heap"
).with_note("the poison check was skipped and the pointer handed to the allocator unchanged")
 .with_help("make sure the pointer came from this heap and was not offset");
