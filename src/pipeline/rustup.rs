//! Version-manager stage
//!
//! Runs `rustup-init` from `PATH` with `RUSTUP_HOME` pointing at this layer
//! and `CARGO_HOME` at the `cargo` layer. No toolchain is installed here;
//! that is left to the `rust` stage.

use super::{StageContext, StageReport};
use crate::bom::{self, BomEntry};
use crate::config::keys;
use crate::error::{ResultExt, RustupLayersError, RustupLayersResult};
use crate::exec::{version_token, Execution, Executor};
use crate::layer::{BuildEnvironment, Fingerprint, Layer, LayerAction, LayerContributor, LayerTypes};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

pub const LAYER_NAME: &str = "rustup";

/// Flags always passed by us, dropped from user-supplied arguments
const RESERVED_FLAGS: &[&str] = &[
    "-q",
    "--quiet",
    "-y",
    "--no-modify-path",
    "-h",
    "--help",
    "-V",
    "--version",
];

#[derive(Debug, Serialize)]
struct Inputs<'a> {
    rustup_init_version: &'a str,
    profile: &'a str,
    args: &'a [String],
}

/// Split a raw argument string the way a POSIX shell would for plain words
///
/// Supports single quotes, double quotes and backslash escapes; no
/// expansion of any kind is performed.
pub fn tokenize(raw: &str) -> RustupLayersResult<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err(unbalanced(raw)),
                    }
                }
            }
            '"' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\')) => current.push(c),
                            Some(c) => {
                                current.push('\\');
                                current.push(c);
                            }
                            None => return Err(unbalanced(raw)),
                        },
                        Some(c) => current.push(c),
                        None => return Err(unbalanced(raw)),
                    }
                }
            }
            '\\' => {
                in_token = true;
                if let Some(c) = chars.next() {
                    current.push(c);
                }
            }
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                in_token = true;
                current.push(c);
            }
        }
    }

    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

fn unbalanced(raw: &str) -> RustupLayersError {
    RustupLayersError::ConfigParse {
        key: keys::RUSTUP_INIT_ARGS.to_string(),
        value: raw.to_string(),
        expected: "arguments with balanced quotes".to_string(),
    }
}

fn supplies(args: &[String], flag: &str) -> bool {
    args.iter()
        .any(|a| a == flag || a.starts_with(&format!("{}=", flag)))
}

/// Full `rustup-init` argument list for `raw` user arguments
pub fn installer_args(raw: &str, profile: &str) -> RustupLayersResult<Vec<String>> {
    let user: Vec<String> = tokenize(raw)?
        .into_iter()
        .filter(|a| {
            let reserved = RESERVED_FLAGS.contains(&a.as_str());
            if reserved {
                debug!("Ignoring {} in {}", a, keys::RUSTUP_INIT_ARGS);
            }
            !reserved
        })
        .collect();

    let mut args: Vec<String> = ["-q", "-y", "--no-modify-path"]
        .into_iter()
        .map(String::from)
        .collect();
    if !supplies(&user, "--default-toolchain") {
        args.push("--default-toolchain=none".to_string());
    }
    if !supplies(&user, "--profile") {
        args.push(format!("--profile={}", profile));
    }
    args.extend(user);
    Ok(args)
}

struct RunInstaller<'a> {
    executor: &'a dyn Executor,
    env: &'a BuildEnvironment,
    args: &'a [String],
    cargo_home: PathBuf,
}

#[async_trait]
impl LayerAction for RunInstaller<'_> {
    async fn rebuild(&self, layer: &mut Layer) -> RustupLayersResult<()> {
        info!("Installing Rustup");

        self.executor
            .execute(
                &Execution::new("rustup-init")
                    .args(self.args.iter().cloned())
                    .dir(&layer.path)
                    .env(self.env.vars()),
            )
            .await
            .context("running rustup-init")?;

        rename_env_script(&self.cargo_home).await?;

        let output = self
            .executor
            .execute(&Execution::new("rustup").args(["--version"]).env(self.env.vars()))
            .await
            .context("running rustup --version")?;
        let version = version_token("rustup --version", &output.combined())?;

        let entry = BomEntry::generic("rustup", "Rustup", &version, &layer.path.display().to_string());
        bom::write(&layer.sbom_path(), &layer.path, &entry).await
    }
}

/// `<CARGO_HOME>/env` collides with the directory name reserved for layer
/// environment declarations
async fn rename_env_script(cargo_home: &Path) -> RustupLayersResult<()> {
    let script = cargo_home.join("env");
    if fs::metadata(&script).await.is_err() {
        return Ok(());
    }

    let renamed = cargo_home.join("env.sh");
    debug!("Moving {} to {}", script.display(), renamed.display());
    fs::rename(&script, &renamed)
        .await
        .map_err(|e| RustupLayersError::io(format!("renaming {}", script.display()), e))
}

/// Contribute the version-manager layer and export `RUSTUP_HOME`
pub async fn contribute(
    context: &StageContext<'_>,
    rustup_init_version: &str,
    env: &mut BuildEnvironment,
) -> RustupLayersResult<StageReport> {
    let cargo_home = env
        .get("CARGO_HOME")
        .map(PathBuf::from)
        .ok_or_else(|| RustupLayersError::Internal("CARGO_HOME is not set".to_string()))?;

    let args = installer_args(&context.config.rustup_init_args, &context.config.profile)?;

    let mut layer = Layer::new(context.layers_dir, LAYER_NAME);
    layer
        .env
        .set_override("RUSTUP_HOME", layer.path.display().to_string());
    env.apply(&layer.env);

    let inputs = Inputs {
        rustup_init_version,
        profile: &context.config.profile,
        args: &args,
    };
    let contributor = LayerContributor::new(Fingerprint::of(&inputs)?, LayerTypes::BUILD_CACHE)
        .require(cargo_home.join("bin").join("rustup"));

    let action = RunInstaller {
        executor: context.executor,
        env: &*env,
        args: &args,
        cargo_home,
    };
    let status = contributor.contribute(&mut layer, &action).await?;

    StageReport::collect(&layer, status).await
}
