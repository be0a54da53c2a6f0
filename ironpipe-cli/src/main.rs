use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;

use ironpipe_cli::cli::{Cli, Commands};
use ironpipe_cli::commands;
use ironpipe_cli::error::CliError;
use ironpipe_cli::logging::init_tracing;
use ironpipe_cli::output::OutputWriter;
use ironpipe_core::config::{GeneralConfig, IronpipeConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // config errors surface later from the command that needs the file
    let general = IronpipeConfig::load(&cli.config)
        .await
        .map(|config| config.general)
        .unwrap_or_else(|_| GeneralConfig::default());
    if let Err(e) = init_tracing(&general, cli.log_level.as_deref()) {
        eprintln!("{} {e:#}", "error:".red().bold());
        return ExitCode::from(1);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);
    tracing::debug!(config = %cli.config.display(), "ironpipe starting");

    match cli.command {
        Commands::Validate(args) => commands::validate::execute(args, &cli.config, &writer).await,
        Commands::Functions(args) => commands::functions::execute(args, &writer),
        Commands::Process(args) => commands::process::execute(args, &cli.config, &writer).await,
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
    }
}
