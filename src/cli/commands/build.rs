//! Build command - contribute layers and report what happened

use crate::build::{self, BuildContext, BuildResult};
use crate::cli::args::{BuildArgs, OutputFormat};
use crate::config::{self, ConfigResolver};
use crate::error::RustupLayersResult;
use crate::exec::CommandExecutor;
use crate::layer::{BuildEnvironment, LayerStatus};
use console::style;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Execute the build command
pub async fn execute(args: BuildArgs) -> RustupLayersResult<()> {
    let descriptor = config::load_descriptor(args.descriptor.descriptor_path().as_deref()).await?;
    let resolver = ConfigResolver::from_process_env(&descriptor);

    let cache_dir = args
        .cache_dir
        .clone()
        .unwrap_or_else(|| default_cache_dir(&args.layers));
    debug!("Dependency cache: {}", cache_dir.display());

    let context = BuildContext {
        layers_dir: args.layers.clone(),
        app_dir: args.app.clone(),
        stack: args.stack.clone(),
        cache_dir,
        plan: build::load_plan(args.plan.as_deref()).await?,
    };

    let result = build::build(
        &context,
        &descriptor,
        &resolver,
        &CommandExecutor,
        BuildEnvironment::from_process_env(),
    )
    .await?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_text(&result),
    }
    Ok(())
}

/// User cache directory, or a directory under the layers root
fn default_cache_dir(layers: &Path) -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join("rustup-layers").join("deps"))
        .unwrap_or_else(|| layers.join(".cache").join("deps"))
}

fn print_text(result: &BuildResult) {
    if !result.layers.is_empty() {
        println!(
            "{:<14} {:<10} {}",
            style("LAYER").bold(),
            style("STATUS").bold(),
            style("VERSION").bold()
        );
        println!("{}", "-".repeat(36));

        for layer in &result.layers {
            let status = match layer.status {
                LayerStatus::Reused => style("reused").green(),
                LayerStatus::Rebuilt => style("rebuilt").yellow(),
                LayerStatus::Failed => style("failed").red(),
                LayerStatus::Unchecked => style("unchecked").dim(),
            };
            let version = layer.bom.as_ref().map(|b| b.version.as_str()).unwrap_or("-");
            println!("{:<14} {:<10} {}", layer.layer, status, version);
        }
    }

    if !result.unmet.is_empty() {
        let names: Vec<&str> = result.unmet.iter().map(|e| e.name.as_str()).collect();
        println!("{} {}", style("Unmet:").yellow(), names.join(", "));
    }
}
