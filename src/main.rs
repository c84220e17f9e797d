//! Main entry point for the wytar CLI app

use clap::Parser;
use env_logger::Env;
use wytar::cli::{self, Args};

fn main() -> std::process::ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = cli::run(args) {
        eprintln!("Error: {}", e);
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

/// `WYTAR_LOG` holds the filter; `-v` raises the floor to `info`.
fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::from_env(Env::new().filter_or(cli::LOG_ENV, "warn"));
    if verbose {
        builder.filter_level(log::LevelFilter::Info);
    }
    builder.format_timestamp(None).init();
}
