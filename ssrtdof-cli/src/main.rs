mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    env_logger::init();
    let cli = cli::Cli::parse();

    match cli.command {
        cli::Command::Render(args) => commands::render::run(args),
        cli::Command::Samples { seed } => commands::samples::run(seed),
    }
}
