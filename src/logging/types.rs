//! The [`Log`] trait shared by every component that reports progress.

/// Abstraction over logging backends.
///
/// [`Logger`](super::logger::Logger) forwards straight to `tracing`;
/// [`BufferedLog`](super::buffered::BufferedLog) additionally keeps every
/// entry in memory so callers can inspect what was reported.  Engine code
/// takes `&dyn Log` and never knows which one it got.
pub trait Log: Send + Sync {
    /// Log a stage header (major section).
    fn stage(&self, msg: &str);
    /// Log an informational message.
    fn info(&self, msg: &str);
    /// Log a debug message (may be suppressed on console).
    fn debug(&self, msg: &str);
    /// Log a warning message.
    fn warn(&self, msg: &str);
    /// Log an error message.
    fn error(&self, msg: &str);
    /// Log an action that would have been taken outside dry-run mode.
    fn dry_run(&self, msg: &str);
}
