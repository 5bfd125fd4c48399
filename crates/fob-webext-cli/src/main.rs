//! `fob-webext` entry point: parse arguments, set up logging, dispatch.

use clap::Parser;
use fob_webext_cli::{cli, commands, error, logger, ui};
use miette::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    logger::init_logger(args.verbose, args.quiet, args.no_color);
    if args.no_color {
        owo_colors::set_override(false);
    } else {
        ui::init_colors();
    }

    let result = match args.command {
        cli::Command::Create(create_args) => commands::create_execute(create_args).await,
        cli::Command::Build(build_args) => commands::build_execute(build_args).await,
        cli::Command::Dev(dev_args) => commands::dev_execute(dev_args).await,
    };

    result.map_err(error::cli_error_to_miette)
}
