//! Toolchain stage
//!
//! Installs the configured toolchain (and optional cross target) through
//! `rustup`. Toolchains land in `RUSTUP_HOME`, not in this layer, so the
//! layer itself only holds a marker file.
//!
//! Besides the configuration, the fingerprint covers:
//!
//! - `installed`: output of `rustup check`, taken before the reuse decision
//!   so upstream releases are noticed even when nothing else changed
//! - `rust-toolchain`: hash of the project's pinned toolchain file, if any
//!
//! Both are re-read after a rebuild and persisted as they are *after* the
//! install, which is what the next run compares against.

use super::{StageContext, StageReport};
use crate::bom::{self, BomEntry};
use crate::config::BuildConfig;
use crate::error::{ResultExt, RustupLayersError, RustupLayersResult};
use crate::exec::{version_token, Execution, Executor};
use crate::layer::{BuildEnvironment, Fingerprint, Layer, LayerAction, LayerContributor, LayerTypes};
use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

pub const LAYER_NAME: &str = "rust";

/// Pinned toolchain files, in lookup order
pub const TOOLCHAIN_FILES: &[&str] = &["rust-toolchain.toml", "rust-toolchain"];

/// Keeps the otherwise empty layer from looking corrupt
pub const MARKER_FILE: &str = "marker";

/// Proxies rustup refuses to overwrite when left over from a previous install
const STALE_PROXIES: &[&str] = &["rustfmt", "cargo-fmt"];

#[derive(Debug, Serialize)]
struct Inputs<'a> {
    toolchain: &'a str,
    profile: &'a str,
    target: &'a str,
    #[serde(rename = "rust-toolchain")]
    toolchain_file: String,
    installed: String,
}

/// First pinned toolchain file present in `app_dir`
pub async fn find_toolchain_file(app_dir: &Path) -> Option<PathBuf> {
    for name in TOOLCHAIN_FILES {
        let path = app_dir.join(name);
        if fs::metadata(&path).await.is_ok_and(|m| m.is_file()) {
            return Some(path);
        }
    }
    None
}

/// SHA-256 of the pinned file's content, empty when there is none
async fn hash_toolchain_file(path: Option<&Path>) -> RustupLayersResult<String> {
    let Some(path) = path else {
        return Ok(String::new());
    };
    match fs::read(path).await {
        Ok(content) => Ok(hex::encode(Sha256::digest(&content))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(RustupLayersError::io(format!("hashing {}", path.display()), e)),
    }
}

/// What rustup currently reports as installed and available
async fn installed_state(
    executor: &dyn Executor,
    env: &BuildEnvironment,
) -> RustupLayersResult<String> {
    let output = executor
        .execute(&Execution::new("rustup").args(["check"]).env(env.vars()))
        .await
        .context("running rustup check")?;
    Ok(output.combined().trim().to_string())
}

struct InstallToolchain<'a> {
    executor: &'a dyn Executor,
    env: &'a BuildEnvironment,
    config: &'a BuildConfig,
    app_dir: &'a Path,
    toolchain_file: Option<PathBuf>,
}

impl InstallToolchain<'_> {
    async fn rustup(&self, args: &[&str], dir: &Path, operation: &str) -> RustupLayersResult<()> {
        self.executor
            .execute(
                &Execution::new("rustup")
                    .args(args.iter().copied())
                    .dir(dir)
                    .env(self.env.vars()),
            )
            .await
            .context(format!("running rustup {}", operation))?;
        Ok(())
    }

    async fn remove_stale_proxies(&self) -> RustupLayersResult<()> {
        let Some(cargo_home) = self.env.get("CARGO_HOME") else {
            return Ok(());
        };
        let bin = Path::new(cargo_home).join("bin");
        for name in STALE_PROXIES {
            let path = bin.join(name);
            match fs::remove_file(&path).await {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(RustupLayersError::io(
                        format!("removing {}", path.display()),
                        e,
                    ))
                }
            }
        }
        Ok(())
    }

    /// `rustup show` reads the pinned file from the working directory and
    /// installs whatever it names
    async fn apply_pinned(&self) -> RustupLayersResult<()> {
        self.rustup(
            &["-q", "default", self.config.toolchain.as_str()],
            self.app_dir,
            "default",
        )
        .await?;
        self.rustup(&["-q", "show"], self.app_dir, "show").await
    }

    async fn install(&self, layer: &Layer) -> RustupLayersResult<()> {
        let profile = format!("--profile={}", self.config.profile);
        self.rustup(
            &[
                "-q",
                "toolchain",
                "install",
                profile.as_str(),
                self.config.toolchain.as_str(),
            ],
            &layer.path,
            "toolchain install",
        )
        .await
    }

    async fn add_target(&self, layer: &Layer) -> RustupLayersResult<()> {
        let toolchain = format!("--toolchain={}", self.config.toolchain);
        self.rustup(
            &[
                "-q",
                "target",
                "add",
                toolchain.as_str(),
                self.config.target.as_str(),
            ],
            &layer.path,
            "target add",
        )
        .await
    }
}

#[async_trait]
impl LayerAction for InstallToolchain<'_> {
    async fn rebuild(&self, layer: &mut Layer) -> RustupLayersResult<()> {
        info!("Installing Rust");

        let marker = layer.path.join(MARKER_FILE);
        fs::write(&marker, b"")
            .await
            .map_err(|e| RustupLayersError::io(format!("writing {}", marker.display()), e))?;

        self.remove_stale_proxies().await?;

        if let Some(file) = &self.toolchain_file {
            info!("Applying toolchain from {}", file.display());
            self.apply_pinned().await?;
        }

        if self.toolchain_file.is_none() || self.config.profile_set || self.config.toolchain_set {
            self.install(layer).await?;
        }

        if !self.config.target.is_empty() {
            self.add_target(layer).await?;
        }

        let output = self
            .executor
            .execute(
                &Execution::new("rustc")
                    .args(["--version"])
                    .dir(self.app_dir)
                    .env(self.env.vars()),
            )
            .await
            .context("running rustc --version")?;
        let version = version_token("rustc --version", &output.combined())?;

        let entry = BomEntry::generic("rust", "Rust", &version, &layer.path.display().to_string());
        bom::write(&layer.sbom_path(), &layer.path, &entry).await
    }

    async fn refresh(&self, mut expected: Fingerprint) -> RustupLayersResult<Fingerprint> {
        expected.insert("installed", installed_state(self.executor, self.env).await?);
        expected.insert(
            "rust-toolchain",
            hash_toolchain_file(self.toolchain_file.as_deref()).await?,
        );
        Ok(expected)
    }
}

/// Contribute the toolchain layer
pub async fn contribute(
    context: &StageContext<'_>,
    env: &mut BuildEnvironment,
) -> RustupLayersResult<StageReport> {
    let config = context.config;
    let installed = installed_state(context.executor, env).await?;
    let toolchain_file = find_toolchain_file(context.app_dir).await;

    let inputs = Inputs {
        toolchain: &config.toolchain,
        profile: &config.profile,
        target: &config.target,
        toolchain_file: hash_toolchain_file(toolchain_file.as_deref()).await?,
        installed,
    };
    let contributor = LayerContributor::new(Fingerprint::of(&inputs)?, LayerTypes::BUILD_CACHE);

    let mut layer = Layer::new(context.layers_dir, LAYER_NAME);
    let action = InstallToolchain {
        executor: context.executor,
        env: &*env,
        config,
        app_dir: context.app_dir,
        toolchain_file,
    };
    let status = contributor.contribute(&mut layer, &action).await?;

    StageReport::collect(&layer, status).await
}
