//! Logging infrastructure for structured console and file output.

mod buffered;
mod logger;
mod subscriber;
mod types;
mod utils;

pub use buffered::{BufferedLog, LogEntry};
pub use logger::Logger;
pub use subscriber::init_subscriber;
pub use types::Log;

/// Tracing target used for stage headers.
pub(crate) const STAGE_TARGET: &str = "harden::stage";

/// Tracing target used for dry-run action messages.
pub(crate) const DRY_RUN_TARGET: &str = "harden::dry_run";
