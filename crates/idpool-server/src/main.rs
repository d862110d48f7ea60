#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use server::commands::dispatch;
use server::config::CliArgs;
use server::telemetry::init_telemetry;
use std::process::ExitCode;

// Using mimalloc for lower allocation overhead, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> ExitCode {
    // Load from .env
    let _ = dotenvy::dotenv();

    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // `help` and `--version` print to stdout and succeed; a missing or
            // unknown command prints usage to stderr and fails.
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    if let Err(err) = init_telemetry() {
        eprintln!("Error initializing logging: {err:#}");
        return ExitCode::FAILURE;
    }

    match dispatch(args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
