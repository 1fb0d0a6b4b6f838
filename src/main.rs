use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use clap::Parser;

use hardening_engine::{cli, commands, logging};

fn main() -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = cli::Cli::parse();

    match args.command {
        cli::Command::Apply(opts) => {
            logging::init_subscriber(args.verbose, "apply");
            let log = Arc::new(logging::Logger::new("apply"));

            let cancelled = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&cancelled);
            if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
                log.warn(&format!("cannot install Ctrl-C handler: {e}"));
            }

            commands::apply::run(&args.global, &opts, &log, cancelled)
        }
        cli::Command::Version => {
            commands::version::run();
            Ok(())
        }
    }
}
