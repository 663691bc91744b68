//! Rustup layers - cached Rust toolchains for container builds
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use rustup_layers::cli::{Cli, Commands, LogFormat};
use rustup_layers::error::RustupLayersResult;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e.chain());
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> RustupLayersResult<ExitCode> {
    let cli = Cli::parse();

    // 0 = info, 1 = debug, 2+ = trace; RUST_LOG wins when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match cli.verbose {
        0 => EnvFilter::new("rustup_layers=info"),
        1 => EnvFilter::new("rustup_layers=debug"),
        _ => EnvFilter::new("rustup_layers=trace"),
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();
    match cli.log_format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }

    match cli.command {
        Commands::Detect(args) => rustup_layers::cli::commands::detect(args).await,
        Commands::Build(args) => rustup_layers::cli::commands::build(args)
            .await
            .map(|()| ExitCode::SUCCESS),
        Commands::Config(args) => rustup_layers::cli::commands::config(args)
            .await
            .map(|()| ExitCode::SUCCESS),
    }
}
