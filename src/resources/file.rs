//! A managed file whose desired content has already been rendered.
use std::path::{Path, PathBuf};

use super::backup::BackupManager;
use super::error::ResourceError;
use super::fs::{self, WriteOutcome};
use super::{Resource, ResourceChange, ResourceState, directive};
use crate::logging::Log;

/// How the desired content was produced; selects the write error variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentOrigin {
    /// Existing content reconciled with directives.
    Patched,
    /// Regenerated from scratch.
    Generated,
}

/// A target path plus its complete desired content.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
    content: String,
    origin: ContentOrigin,
}

impl ConfigFile {
    /// A file produced by the directive patcher.
    #[must_use]
    pub fn patched(path: impl Into<PathBuf>, content: String) -> Self {
        Self {
            path: path.into(),
            content,
            origin: ContentOrigin::Patched,
        }
    }

    /// A file regenerated in full.
    #[must_use]
    pub fn generated(path: impl Into<PathBuf>, content: String) -> Self {
        Self {
            path: path.into(),
            content,
            origin: ContentOrigin::Generated,
        }
    }

    /// Target path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Desired content.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    fn write(&self, dry_run: bool, log: &dyn Log) -> Result<WriteOutcome, ResourceError> {
        match self.origin {
            ContentOrigin::Patched => directive::write(&self.path, &self.content, dry_run, log),
            ContentOrigin::Generated => fs::write_file(&self.path, &self.content, dry_run, log)
                .map_err(|source| ResourceError::GenerateWriteFailure {
                    path: self.path.clone(),
                    source,
                }),
        }
    }
}

impl Resource for ConfigFile {
    fn description(&self) -> String {
        self.path.display().to_string()
    }

    fn current_state(&self) -> Result<ResourceState, ResourceError> {
        let current = fs::read_optional(&self.path).map_err(|source| ResourceError::ReadFailure {
            path: self.path.clone(),
            source,
        })?;
        Ok(match current {
            None => ResourceState::Missing,
            Some(current) if current == self.content => ResourceState::Correct,
            Some(current) => {
                let mut differing = current
                    .lines()
                    .zip(self.content.lines())
                    .filter(|(a, b)| a != b)
                    .count();
                differing += current.lines().count().abs_diff(self.content.lines().count());
                ResourceState::Incorrect {
                    differing_lines: differing,
                }
            }
        })
    }

    fn apply(
        &self,
        backups: &mut BackupManager,
        dry_run: bool,
        log: &dyn Log,
    ) -> Result<ResourceChange, ResourceError> {
        match self.current_state()? {
            ResourceState::Correct => {
                log.debug(&format!("{} already up to date", self.path.display()));
                return Ok(ResourceChange::AlreadyCorrect);
            }
            ResourceState::Incorrect { differing_lines } => {
                log.debug(&format!(
                    "{}: {differing_lines} line(s) differ",
                    self.path.display()
                ));
            }
            ResourceState::Missing => {
                log.debug(&format!("{} does not exist yet", self.path.display()));
            }
        }

        backups.ensure_backup(&self.path, log).require()?;

        match self.write(dry_run, log)? {
            WriteOutcome::DryRun => Ok(ResourceChange::DryRun),
            WriteOutcome::Written => {
                log.info(&format!("updated {}", self.path.display()));
                Ok(ResourceChange::Applied)
            }
        }
    }
}
