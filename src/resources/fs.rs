//! File-system helpers shared by the file primitives.
use std::io;
use std::path::Path;

use crate::logging::Log;

/// What [`write_file`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The content was written to disk.
    Written,
    /// Dry-run: the content was logged, nothing was touched.
    DryRun,
}

/// Ensure the parent directory of `path` exists, creating it (and any
/// ancestors) if necessary.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Write `content` to `path`, or log what would be written in dry-run mode.
///
/// Existing files are truncated in place so their ownership and mode are
/// kept.
///
/// # Errors
///
/// Returns an error if the parent directory cannot be created or the file
/// cannot be written.
pub fn write_file(
    path: &Path,
    content: &str,
    dry_run: bool,
    log: &dyn Log,
) -> io::Result<WriteOutcome> {
    if dry_run {
        log.dry_run(&format!(
            "would write {} ({} lines)",
            path.display(),
            content.lines().count()
        ));
        log.debug(&format!("content for {}:\n{content}", path.display()));
        return Ok(WriteOutcome::DryRun);
    }
    ensure_parent_dir(path)?;
    std::fs::write(path, content)?;
    log.debug(&format!("wrote {}", path.display()));
    Ok(WriteOutcome::Written)
}

/// Read `path`, mapping "does not exist" to `None`.
///
/// A path whose parent is not a directory cannot exist either, so it is
/// treated the same way.
///
/// # Errors
///
/// Returns any other I/O error.
pub fn read_optional(path: &Path) -> io::Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
