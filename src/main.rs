use std::process::exit;

use clap::Parser;
use clap::error::ErrorKind;
use tracing::error;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod mpris;
mod recorder;
mod runtime;
mod watcher;

use cli::{Cli, Command};

fn main() {
    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = err.print();
            return;
        }
        Err(err) => {
            let _ = err.print();
            exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tapedeck=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Some(Command::Record(record)) => {
            if let Err(err) = runtime::run(record) {
                error!(%err, "aborting");
                exit(3);
            }
        }
        None => {
            eprintln!("No operation specified.");
            exit(2);
        }
    }
}
