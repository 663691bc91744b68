//! Detect command - decide whether to provide a toolchain

use crate::build;
use crate::cli::args::{DetectArgs, OutputFormat};
use crate::config::{self, ConfigResolver};
use crate::error::RustupLayersResult;
use console::style;
use std::process::ExitCode;

/// Exit status telling the platform this buildpack does not apply
pub const DETECT_FAIL: u8 = 100;

/// Execute the detect command
pub async fn execute(args: DetectArgs) -> RustupLayersResult<ExitCode> {
    let descriptor = config::load_descriptor(args.descriptor.descriptor_path().as_deref()).await?;
    let resolver = ConfigResolver::from_process_env(&descriptor);
    let result = build::detect(&resolver)?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => {
            if result.pass {
                println!("{}", style("pass").green().bold());
                for (i, plan) in result.plans.iter().enumerate() {
                    let names: Vec<&str> = plan.provides.iter().map(|p| p.name.as_str()).collect();
                    println!("plan {}: provides {}", i + 1, names.join(", "));
                }
            } else {
                println!("{}", style("fail").dim());
            }
        }
    }

    Ok(if result.pass {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(DETECT_FAIL)
    })
}
