mod cli;
mod pipeline;

use clap::Parser;
use cli::{Cli, ResolvedCommand};
use pipeline::{build_image, inspect_image, run_loads};
use std::process;

fn main() {
    let cli = Cli::parse();

    let result = match cli.resolve_command() {
        ResolvedCommand::Build(options) => build_image(&options).map_err(|e| e.to_string()),
        ResolvedCommand::Inspect { file } => inspect_image(&file).map_err(|e| e.to_string()),
        ResolvedCommand::Load(options) => run_loads(&options).map_err(|e| e.to_string()),
    };

    if let Err(error) = result {
        if !error.is_empty() {
            eprintln!("{}", error);
        }
        process::exit(1);
    }
}
