//! Config command - show the effective configuration

use crate::cli::args::{ConfigArgs, OutputFormat};
use crate::config::{self, BuildConfig, ConfigResolver};
use crate::error::RustupLayersResult;
use console::style;

/// Execute the config command
pub async fn execute(args: ConfigArgs) -> RustupLayersResult<()> {
    let descriptor = config::load_descriptor(args.descriptor.descriptor_path().as_deref()).await?;
    let resolver = ConfigResolver::from_process_env(&descriptor);
    let resolved = BuildConfig::resolve(&resolver)?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&resolved)?),
        OutputFormat::Text => {
            for option in &descriptor.metadata.configurations {
                let (value, set) = resolver.resolve(&option.name);
                let source = if set {
                    style("set").green()
                } else {
                    style("default").dim()
                };
                println!("{:<24} {:<12} {}", option.name, value, source);
            }
        }
    }
    Ok(())
}
