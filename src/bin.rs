use std::process::ExitCode;

use clap::Parser;
use ndview::cli::{run, Cli};
use ndview::session::Session;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let session = Session::from(&cli);

    let level = match session.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_module("ndview", level)
        .init();

    match run(&cli, &session) {
        Ok(out) => {
            println!("{out}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
