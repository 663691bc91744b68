//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Rustup layers - cached Rust toolchains for container builds
///
/// Installs rustup-init, rustup and a Rust toolchain into fingerprinted
/// layers, reusing them on later builds while their inputs are unchanged.
#[derive(Parser, Debug)]
#[command(name = "rustup-layers")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Log line format
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decide whether a toolchain should be provided (exit 100 if not)
    Detect(DetectArgs),

    /// Contribute the rustup and toolchain layers
    Build(BuildArgs),

    /// Show the effective configuration
    Config(ConfigArgs),
}

/// Location of the buildpack descriptor
#[derive(clap::Args, Debug, Clone)]
pub struct DescriptorArgs {
    /// Directory containing buildpack.toml (built-in defaults if omitted)
    #[arg(long, env = "CNB_BUILDPACK_DIR")]
    pub buildpack_dir: Option<PathBuf>,
}

impl DescriptorArgs {
    pub fn descriptor_path(&self) -> Option<PathBuf> {
        self.buildpack_dir.as_ref().map(|d| d.join("buildpack.toml"))
    }
}

/// Arguments for the detect command
#[derive(Parser, Debug)]
pub struct DetectArgs {
    #[command(flatten)]
    pub descriptor: DescriptorArgs,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the build command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub descriptor: DescriptorArgs,

    /// Root directory for layers
    #[arg(long, env = "CNB_LAYERS_DIR")]
    pub layers: PathBuf,

    /// Application source directory
    #[arg(long, env = "CNB_APP_DIR", default_value = ".")]
    pub app: PathBuf,

    /// Stack (platform) id used to select dependencies
    #[arg(long, env = "CNB_STACK_ID", default_value = "*")]
    pub stack: String,

    /// Resolved buildpack plan (TOML with [[entries]])
    #[arg(long, env = "CNB_BP_PLAN_PATH")]
    pub plan: Option<PathBuf>,

    /// Directory for downloaded dependencies
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(flatten)]
    pub descriptor: DescriptorArgs,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Output format for command reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON output
    Json,
}

/// Format of log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Plain text lines
    Text,
    /// One JSON object per line
    Json,
}
