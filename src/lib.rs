//! Configuration reconciliation engine for OS hardening.
//!
//! Brings `sshd_config`, sysctl drop-ins, `auditd.conf` and audit rule files
//! to a declared desired state, idempotently and with a dry-run mode that
//! touches nothing. Every file is snapshotted before its first change in a
//! run, and every step ends with a persisted JSON report.
//!
//! The public API is organised into layers:
//!
//! - **[`config`]**: built-in defaults deep-merged with a JSON override
//! - **[`resources`]**: file primitives (backup, directive patching,
//!   key/value and rule-set generation)
//! - **[`exec`]**: the dry-run aware gateway for external commands
//! - **[`tasks`]**: steps and the tasks they run
//! - **[`report`]**: per-step results and their persisted form
//! - **[`commands`]**: top-level subcommand orchestration (`apply`, `version`)
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod exec;
pub mod logging;
pub mod report;
pub mod resources;
pub mod tasks;
