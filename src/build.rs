//! Detect and build phases
//!
//! `detect` decides whether the toolchain should be provided at all;
//! `build` resolves the installer, runs the installation pipeline and
//! collects what it produced. A disabled build runs no stage and reports
//! every requested plan entry as unmet.

use crate::bom::BomEntry;
use crate::config::{keys, BuildConfig, BuildpackDescriptor, ConfigResolver};
use crate::dependency::{DependencyCache, DependencyResolver};
use crate::error::{ResultExt, RustupLayersResult};
use crate::exec::Executor;
use crate::layer::BuildEnvironment;
use crate::pipeline::{Pipeline, StageContext, StageReport};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Plan entry for the version manager
pub const PLAN_ENTRY_RUSTUP: &str = "rustup";
/// Plan entry for the compiler toolchain
pub const PLAN_ENTRY_RUST: &str = "rust";

/// Something a build plan provides
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanProvide {
    pub name: String,
}

/// One alternative build plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPlan {
    pub provides: Vec<PlanProvide>,
}

impl BuildPlan {
    fn providing(names: &[&str]) -> Self {
        Self {
            provides: names
                .iter()
                .map(|n| PlanProvide {
                    name: n.to_string(),
                })
                .collect(),
        }
    }
}

/// Outcome of the detect phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectResult {
    pub pass: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plans: Vec<BuildPlan>,
}

/// Pass iff the feature is enabled
pub fn detect(resolver: &ConfigResolver) -> RustupLayersResult<DetectResult> {
    if !resolver.resolve_bool(keys::ENABLED)? {
        debug!("{} is false, not providing a toolchain", keys::ENABLED);
        return Ok(DetectResult {
            pass: false,
            plans: Vec::new(),
        });
    }

    Ok(DetectResult {
        pass: true,
        plans: vec![
            BuildPlan::providing(&[PLAN_ENTRY_RUSTUP, PLAN_ENTRY_RUST]),
            BuildPlan::providing(&[PLAN_ENTRY_RUSTUP]),
        ],
    })
}

/// Entry of the resolved buildpack plan handed to the build phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
struct PlanFile {
    #[serde(default)]
    entries: Vec<PlanEntry>,
}

/// Read the plan entries requested from this build
///
/// Without a plan file every entry the detect phase can provide is assumed
/// requested.
pub async fn load_plan(path: Option<&Path>) -> RustupLayersResult<Vec<PlanEntry>> {
    let Some(path) = path else {
        return Ok(vec![
            PlanEntry {
                name: PLAN_ENTRY_RUSTUP.to_string(),
            },
            PlanEntry {
                name: PLAN_ENTRY_RUST.to_string(),
            },
        ]);
    };

    let content = fs::read_to_string(path).await.map_err(|e| {
        crate::error::RustupLayersError::io(format!("reading plan {}", path.display()), e)
    })?;
    let plan: PlanFile = toml::from_str(&content)?;
    Ok(plan.entries)
}

/// Everything the build phase needs besides configuration
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub layers_dir: PathBuf,
    pub app_dir: PathBuf,
    pub stack: String,
    pub cache_dir: PathBuf,
    pub plan: Vec<PlanEntry>,
}

/// Outcome of the build phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildResult {
    pub layers: Vec<StageReport>,
    pub bom: Vec<BomEntry>,
    pub unmet: Vec<PlanEntry>,
}

/// Run the build phase
pub async fn build(
    context: &BuildContext,
    descriptor: &BuildpackDescriptor,
    resolver: &ConfigResolver,
    executor: &dyn Executor,
    mut env: BuildEnvironment,
) -> RustupLayersResult<BuildResult> {
    info!(
        "{} {}",
        descriptor.buildpack.name, descriptor.buildpack.version
    );

    if !resolver.resolve_bool(keys::ENABLED)? {
        info!("{} is false, skipping", keys::ENABLED);
        return Ok(BuildResult {
            layers: Vec::new(),
            bom: Vec::new(),
            unmet: context.plan.clone(),
        });
    }

    // Only worth printing once we know the stages will run
    resolver.log_options();
    let config = BuildConfig::resolve(resolver)?;

    let dependencies = DependencyResolver::from_descriptor(descriptor)?;
    let rustup_init = dependencies
        .resolve(
            &config.rustup_init_dependency_id(),
            &config.rustup_init_version,
            &context.stack,
        )
        .context("resolving the rustup-init installer")?;
    info!("Using {} {}", rustup_init.name, rustup_init.version);

    let cache = DependencyCache::new(&context.cache_dir);
    let stage_context = StageContext {
        layers_dir: &context.layers_dir,
        app_dir: &context.app_dir,
        config: &config,
        executor,
    };
    let layers = Pipeline::new(stage_context, &rustup_init, &cache)
        .run(&mut env)
        .await?;

    let bom = layers.iter().filter_map(|l| l.bom.clone()).collect();
    Ok(BuildResult {
        layers,
        bom,
        unmet: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{schema::BuildpackMetadata, DependencyEntry};
    use crate::error::ErrorKind;
    use crate::exec::fake::RecordingExecutor;
    use crate::pipeline::testing;
    use std::collections::HashMap;
    use tempfile::TempDir;

    async fn descriptor(temp: &TempDir) -> BuildpackDescriptor {
        let installer = testing::installer(temp.path(), "#!/bin/sh\n");
        let mut descriptor = crate::config::load_descriptor(None).await.unwrap();
        descriptor.metadata.dependencies.push(DependencyEntry {
            id: installer.id.clone(),
            name: installer.name.clone(),
            version: installer.version.clone(),
            uri: installer.uri.clone(),
            checksum: Some(installer.checksum.to_string()),
            stacks: vec!["io.buildpacks.stacks.jammy".to_string()],
            ..Default::default()
        });
        descriptor
    }

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn context(temp: &TempDir, stack: &str) -> BuildContext {
        let layers_dir = temp.path().join("layers");
        let app_dir = temp.path().join("app");
        std::fs::create_dir_all(&layers_dir).unwrap();
        std::fs::create_dir_all(&app_dir).unwrap();
        BuildContext {
            cache_dir: layers_dir.join(".cache"),
            layers_dir,
            app_dir,
            stack: stack.to_string(),
            plan: vec![
                PlanEntry {
                    name: PLAN_ENTRY_RUST.to_string(),
                },
                PlanEntry {
                    name: PLAN_ENTRY_RUSTUP.to_string(),
                },
            ],
        }
    }

    fn executor() -> RecordingExecutor {
        let executor = RecordingExecutor::new();
        executor
            .respond("rustup --version", testing::RUSTUP_VERSION_OUTPUT)
            .respond("rustup check", testing::CHECK_OUTPUT)
            .respond("rustc --version", testing::RUSTC_VERSION_OUTPUT);
        executor
    }

    #[test]
    fn detect_passes_when_enabled() {
        let descriptor = BuildpackDescriptor {
            metadata: BuildpackMetadata::default(),
            ..Default::default()
        };
        // Undeclared options resolve from the environment alone
        let result = detect(&ConfigResolver::new(&descriptor, env(&[(keys::ENABLED, "true")]))).unwrap();

        assert!(result.pass);
        assert_eq!(result.plans.len(), 2);
        assert_eq!(
            result.plans[0].provides,
            vec![
                PlanProvide {
                    name: "rustup".to_string()
                },
                PlanProvide {
                    name: "rust".to_string()
                }
            ]
        );
        assert_eq!(result.plans[1].provides.len(), 1);
    }

    #[tokio::test]
    async fn detect_fails_when_disabled() {
        let descriptor = crate::config::load_descriptor(None).await.unwrap();
        let resolver = ConfigResolver::new(&descriptor, env(&[(keys::ENABLED, "false")]));
        let result = detect(&resolver).unwrap();
        assert!(!result.pass);
        assert!(result.plans.is_empty());
    }

    #[tokio::test]
    async fn detect_defaults_to_enabled() {
        let descriptor = crate::config::load_descriptor(None).await.unwrap();
        let result = detect(&ConfigResolver::new(&descriptor, HashMap::new())).unwrap();
        assert!(result.pass);
    }

    #[tokio::test]
    async fn detect_rejects_bad_boolean() {
        let descriptor = crate::config::load_descriptor(None).await.unwrap();
        let resolver = ConfigResolver::new(&descriptor, env(&[(keys::ENABLED, "yes")]));
        let err = detect(&resolver).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigParse);
    }

    #[tokio::test]
    async fn disabled_build_does_nothing() {
        let temp = TempDir::new().unwrap();
        let descriptor = descriptor(&temp).await;
        let context = context(&temp, "io.buildpacks.stacks.jammy");
        let executor = executor();
        let resolver = ConfigResolver::new(&descriptor, env(&[(keys::ENABLED, "false")]));

        let result = build(&context, &descriptor, &resolver, &executor, BuildEnvironment::default())
            .await
            .unwrap();

        assert!(result.layers.is_empty());
        assert!(result.bom.is_empty());
        assert_eq!(result.unmet, context.plan);
        assert!(executor.executions().is_empty());
        assert_eq!(std::fs::read_dir(&context.layers_dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn enabled_build_runs_pipeline() {
        let temp = TempDir::new().unwrap();
        let descriptor = descriptor(&temp).await;
        let context = context(&temp, "io.buildpacks.stacks.jammy");
        let executor = executor();
        let resolver = ConfigResolver::new(&descriptor, HashMap::new());

        let result = build(
            &context,
            &descriptor,
            &resolver,
            &executor,
            BuildEnvironment::new([("PATH".to_string(), "/usr/bin".to_string())]),
        )
        .await
        .unwrap();

        assert_eq!(result.layers.len(), 4);
        assert!(result.unmet.is_empty());
        let ids: Vec<&str> = result.bom.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["rustup-init-gnu", "rustup", "rust"]);
        assert!(context
            .layers_dir
            .join("rustup-init")
            .join("bin")
            .join("rustup-init")
            .exists());
    }

    #[tokio::test]
    async fn unsupported_stack_is_a_resolution_error() {
        let temp = TempDir::new().unwrap();
        let descriptor = descriptor(&temp).await;
        let context = context(&temp, "io.buildpacks.stacks.bionic");
        let executor = executor();
        let resolver = ConfigResolver::new(&descriptor, HashMap::new());

        let err = build(&context, &descriptor, &resolver, &executor, BuildEnvironment::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Resolution);
        assert!(executor.executions().is_empty());
    }

    #[tokio::test]
    async fn musl_libc_selects_other_dependency() {
        let temp = TempDir::new().unwrap();
        let descriptor = descriptor(&temp).await;
        let context = context(&temp, "io.buildpacks.stacks.jammy");
        let resolver = ConfigResolver::new(
            &descriptor,
            env(&[(keys::RUSTUP_INIT_LIBC, "musl")]),
        );

        let err = build(&context, &descriptor, &resolver, &executor(), BuildEnvironment::default())
            .await
            .unwrap_err();
        assert!(err.root().to_string().contains("rustup-init-musl"));
    }

    #[tokio::test]
    async fn plan_file_entries() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("plan.toml");
        std::fs::write(&path, "[[entries]]\nname = \"rust\"\n").unwrap();

        let entries = load_plan(Some(&path)).await.unwrap();
        assert_eq!(
            entries,
            vec![PlanEntry {
                name: "rust".to_string()
            }]
        );
        assert_eq!(load_plan(None).await.unwrap().len(), 2);
    }
}
