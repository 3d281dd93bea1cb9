//! Diagnostic macros for internal and user-facing emission.

/// Emit a predefined diagnostic by code, optionally with formatted context.
///
/// # Example
///
/// ```rust,ignore
/// gh_emit!(GH005);
/// gh_emit!(GH006, "pointer {:p}", ptr);
/// ```
#[macro_export]
macro_rules! gh_emit {
    ($code:ident) => {{
        $crate::diagnostics::emit::emit(&$crate::diagnostics::$code);
    }};
    ($code:ident, $($arg:tt)+) => {{
        if !$crate::diagnostics::emit::is_suppressed() {
            $crate::diagnostics::emit::emit_with_context(
                &$crate::diagnostics::$code,
                &format!($($arg)+),
            );
        }
    }};
}
