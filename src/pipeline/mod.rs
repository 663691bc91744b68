//! Installation pipeline
//!
//! The stages run strictly in order, each one reading the
//! [`BuildEnvironment`] left by its predecessors and extending it for the
//! next:
//!
//! 1. `rustup-init` puts the installer binary on `PATH`
//! 2. `cargo` establishes `CARGO_HOME`, populated later by the installer
//! 3. `rustup` runs the installer with `RUSTUP_HOME` pointing at its layer
//! 4. `rust` installs the configured toolchain and optional cross target

pub mod cargo;
pub mod rustup;
pub mod rustup_init;
pub mod toolchain;

use crate::bom::{self, BomEntry};
use crate::config::BuildConfig;
use crate::dependency::{ArtifactDescriptor, DependencyCache};
use crate::error::RustupLayersResult;
use crate::exec::Executor;
use crate::layer::{BuildEnvironment, Layer, LayerStatus};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Shared inputs for every stage of one build invocation
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub layers_dir: &'a Path,
    pub app_dir: &'a Path,
    pub config: &'a BuildConfig,
    pub executor: &'a dyn Executor,
}

/// Outcome of one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub layer: String,
    pub status: LayerStatus,
    /// Present only for stages that install a binary artifact
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bom: Option<BomEntry>,
}

impl StageReport {
    /// Report for a contributed layer, picking up its SBOM if one exists
    pub(crate) async fn collect(layer: &Layer, status: LayerStatus) -> RustupLayersResult<Self> {
        Ok(Self {
            layer: layer.name.clone(),
            status,
            bom: bom::read(&layer.sbom_path()).await?,
        })
    }
}

/// The ordered stage chain
pub struct Pipeline<'a> {
    context: StageContext<'a>,
    rustup_init: &'a ArtifactDescriptor,
    cache: &'a DependencyCache,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        context: StageContext<'a>,
        rustup_init: &'a ArtifactDescriptor,
        cache: &'a DependencyCache,
    ) -> Self {
        Self {
            context,
            rustup_init,
            cache,
        }
    }

    /// Run every stage, stopping at the first failure
    ///
    /// Stages that already finished are not rolled back when a later one
    /// fails; their layers stay valid for the next invocation.
    pub async fn run(&self, env: &mut BuildEnvironment) -> RustupLayersResult<Vec<StageReport>> {
        let mut reports = Vec::with_capacity(4);

        reports.push(rustup_init::contribute(&self.context, self.rustup_init, self.cache, env).await?);
        reports.push(cargo::contribute(&self.context, env).await?);
        reports.push(rustup::contribute(&self.context, &self.rustup_init.version, env).await?);
        reports.push(toolchain::contribute(&self.context, env).await?);

        for report in &reports {
            info!("{}: {}", report.layer, report.status);
        }
        Ok(reports)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::error::ErrorKind;
    use crate::exec::fake::RecordingExecutor;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        executor: RecordingExecutor,
        config: BuildConfig,
        installer: ArtifactDescriptor,
        cache: DependencyCache,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            std::fs::create_dir_all(temp.path().join("layers")).unwrap();
            std::fs::create_dir_all(temp.path().join("app")).unwrap();

            let executor = RecordingExecutor::new();
            executor
                .respond("rustup --version", RUSTUP_VERSION_OUTPUT)
                .respond("rustup check", CHECK_OUTPUT)
                .respond("rustc --version", RUSTC_VERSION_OUTPUT);

            let installer = installer(temp.path(), "#!/bin/sh\n");
            let cache = DependencyCache::new(temp.path().join("cache"));

            Self {
                executor,
                config: config(),
                installer,
                cache,
                temp,
            }
        }

        fn layers(&self) -> std::path::PathBuf {
            self.temp.path().join("layers")
        }

        /// Stand in for the files the real installer drops into CARGO_HOME
        fn populate_cargo_home(&self) {
            let bin = self.layers().join("cargo").join("bin");
            std::fs::create_dir_all(&bin).unwrap();
            std::fs::write(bin.join("rustup"), "").unwrap();
        }

        async fn try_run(&self, env: &mut BuildEnvironment) -> RustupLayersResult<Vec<StageReport>> {
            let layers = self.layers();
            let app = self.temp.path().join("app");
            let context = StageContext {
                layers_dir: &layers,
                app_dir: &app,
                config: &self.config,
                executor: &self.executor,
            };
            Pipeline::new(context, &self.installer, &self.cache)
                .run(env)
                .await
        }

        async fn run(&self, env: &mut BuildEnvironment) -> Vec<StageReport> {
            self.try_run(env).await.unwrap()
        }
    }

    fn base_env() -> BuildEnvironment {
        BuildEnvironment::new([("PATH".to_string(), "/usr/bin:/bin".to_string())])
    }

    #[tokio::test]
    async fn stages_run_in_order() {
        let fixture = Fixture::new();
        let mut env = base_env();
        let reports = fixture.run(&mut env).await;

        let names: Vec<&str> = reports.iter().map(|r| r.layer.as_str()).collect();
        assert_eq!(names, vec!["rustup-init", "cargo", "rustup", "rust"]);
        assert!(reports.iter().all(|r| r.status == LayerStatus::Rebuilt));

        let lines = fixture.executor.command_lines();
        let installer = lines.iter().position(|l| l.starts_with("rustup-init")).unwrap();
        let install = lines
            .iter()
            .position(|l| l.starts_with("rustup -q toolchain install"))
            .unwrap();
        assert!(installer < install);
    }

    #[tokio::test]
    async fn installer_is_on_path_before_toolchain_install() {
        let fixture = Fixture::new();
        let mut env = base_env();
        fixture.run(&mut env).await;

        let init_bin = fixture.layers().join("rustup-init").join("bin");
        let init_bin = init_bin.display().to_string();
        for execution in fixture.executor.executions() {
            let path = execution.env.get("PATH").unwrap();
            assert!(
                path.split(':').any(|p| p == init_bin),
                "{} ran without the installer on PATH",
                execution
            );
        }
    }

    #[tokio::test]
    async fn environment_accumulates_across_stages() {
        let fixture = Fixture::new();
        let mut env = base_env();
        fixture.run(&mut env).await;

        let layers = fixture.layers();
        assert_eq!(
            env.get("CARGO_HOME"),
            Some(layers.join("cargo").display().to_string().as_str())
        );
        assert_eq!(
            env.get("RUSTUP_HOME"),
            Some(layers.join("rustup").display().to_string().as_str())
        );
        assert!(env
            .get("PATH")
            .unwrap()
            .starts_with(&layers.join("cargo").join("bin").display().to_string()));
    }

    #[tokio::test]
    async fn bom_for_every_installed_artifact() {
        let fixture = Fixture::new();
        let reports = fixture.run(&mut base_env()).await;

        let boms: Vec<(&str, &str)> = reports
            .iter()
            .filter_map(|r| r.bom.as_ref())
            .map(|b| (b.id.as_str(), b.version.as_str()))
            .collect();
        assert_eq!(
            boms,
            vec![("rustup-init-gnu", "1.27.1"), ("rustup", "1.27.1"), ("rust", "1.80.0")]
        );
        assert!(reports[1].bom.is_none());
    }

    #[tokio::test]
    async fn second_run_reuses_everything() {
        let fixture = Fixture::new();
        fixture.run(&mut base_env()).await;
        fixture.populate_cargo_home();
        fixture.executor.clear();

        let reports = fixture.run(&mut base_env()).await;

        assert!(reports.iter().all(|r| r.status == LayerStatus::Reused));
        // Only the live installed-state query runs on a cached build
        assert_eq!(fixture.executor.command_lines(), vec!["rustup check"]);
        assert_eq!(reports[3].bom.as_ref().unwrap().version, "1.80.0");
    }

    #[tokio::test]
    async fn upstream_toolchain_change_rebuilds_only_rust() {
        let fixture = Fixture::new();
        fixture.run(&mut base_env()).await;
        fixture.populate_cargo_home();
        fixture
            .executor
            .respond("rustup check", "stable - Update available : 1.80.0 -> 1.81.0");

        let reports = fixture.run(&mut base_env()).await;

        let statuses: Vec<LayerStatus> = reports.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                LayerStatus::Reused,
                LayerStatus::Reused,
                LayerStatus::Reused,
                LayerStatus::Rebuilt
            ]
        );
    }

    #[tokio::test]
    async fn failed_stage_keeps_earlier_layers() {
        let fixture = Fixture::new();
        fixture
            .executor
            .fail("rustup -q toolchain install", "error: could not download toolchain");

        let err = fixture.try_run(&mut base_env()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Subprocess);

        let layers = fixture.layers();
        for name in ["rustup-init", "cargo", "rustup"] {
            assert!(layers.join(format!("{}.toml", name)).is_file(), "{} was rolled back", name);
        }
        assert!(!layers.join("rust.toml").exists());

        fixture.populate_cargo_home();
        fixture.executor.respond("rustup -q toolchain install", "");
        fixture.executor.clear();

        let reports = fixture.run(&mut base_env()).await;
        let statuses: Vec<LayerStatus> = reports.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                LayerStatus::Reused,
                LayerStatus::Reused,
                LayerStatus::Reused,
                LayerStatus::Rebuilt
            ]
        );
        assert!(!fixture
            .executor
            .command_lines()
            .iter()
            .any(|l| l.starts_with("rustup-init")));
        assert!(layers.join("rust.toml").is_file());
    }
}
