use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI entry point for the hardening engine.
#[derive(Parser, Debug)]
#[command(
    name = "harden",
    about = "Declarative OS hardening: reconcile sshd, sysctl and audit configuration",
    version
)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Options accepted by every subcommand.
    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone, Default)]
pub struct GlobalOpts {
    /// JSON document overriding the built-in desired state
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Preview changes without applying
    #[arg(short = 'd', long, global = true)]
    pub dry_run: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Reconcile the system with the desired state
    Apply(ApplyOpts),
    /// Print version information
    Version,
}

/// Options for the `apply` subcommand.
#[derive(Parser, Debug, Clone, Default)]
pub struct ApplyOpts {
    /// Skip specific steps (ssh, sysctl, audit)
    #[arg(long, value_delimiter = ',')]
    pub skip: Vec<String>,

    /// Run only specific steps (ssh, sysctl, audit)
    #[arg(long, value_delimiter = ',', conflicts_with = "skip")]
    pub only: Vec<String>,
}
