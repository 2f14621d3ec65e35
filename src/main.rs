//! dental-reports: report templates, generated reports and clinic contacts
//! from the command line.
//!
//! Usage:
//!   dental-reports [--config FILE] [--user NAME] [--superuser] <COMMAND>
//!
//! Run `dental-reports --help` for the list of commands.

use std::process;

use clap::Parser;

use dental_reports::cli::{run, Cli};

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("{e}");
        process::exit(1);
    }
}
