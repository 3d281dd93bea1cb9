//! Backtrace capture.

/// Capture the current call stack as text.
///
/// Returns `None` unless the `debug` feature is enabled.
pub fn capture() -> Option<String> {
    #[cfg(feature = "debug")]
    {
        Some(format!("{:?}", ::backtrace::Backtrace::new()))
    }

    #[cfg(not(feature = "debug"))]
    {
        None
    }
}
