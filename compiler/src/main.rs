use std::process::ExitCode;

use clap::Parser;
use cw2_lang::cli::{report, Cli, CliHandler};

#[tokio::main]
async fn main() -> ExitCode {
    match CliHandler::new().handle(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{}", report(&error));
            ExitCode::FAILURE
        }
    }
}
