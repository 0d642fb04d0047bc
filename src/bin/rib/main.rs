//! rib - run numbered build scripts to assemble a root filesystem image

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use console::style;
use rib::logging;
use rib::utils;

fn main() {
    let cli = Cli::parse();

    logging::init_logger(cli.verbose, cli.quiet);

    if let Err(e) = utils::refuse_root() {
        eprintln!("{} {}", style("error:").red().bold(), e);
        std::process::exit(1);
    }

    let (context, result) = match cli.command {
        Commands::Init { workdir } => {
            let dir = workdir.unwrap_or(cli.dir);
            let context = format!("failed to initialize '{}'", dir.display());
            (context, commands::init(&dir))
        }
        Commands::Build { buildseq } => ("build failed".to_string(), commands::build(&cli.dir, buildseq)),
        Commands::Shell { args } => (
            "failed to execute shell".to_string(),
            commands::shell(&cli.dir, &args),
        ),
        Commands::Clean { all } => ("failed to clean".to_string(), commands::clean(&cli.dir, all)),
        Commands::List { buildseq, json } => (
            "failed to list build scripts".to_string(),
            commands::list(&cli.dir, buildseq, json),
        ),
    };

    if let Err(e) = result {
        eprintln!("{} {}: {}", style("error:").red().bold(), context, e);
        std::process::exit(1);
    }
}
