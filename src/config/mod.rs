//! Configuration for rustup-layers
//!
//! Options are declared in the buildpack descriptor with defaults and
//! overridden through the build environment. Values are read once per
//! invocation and frozen into a [`BuildConfig`].

pub mod schema;

pub use schema::{BuildpackDescriptor, ConfigurationOption, DependencyEntry};

use crate::error::{RustupLayersError, RustupLayersResult};
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

/// Option names understood by the pipeline
pub mod keys {
    pub const ENABLED: &str = "BP_RUSTUP_ENABLED";
    pub const RUSTUP_INIT_VERSION: &str = "BP_RUSTUP_INIT_VERSION";
    pub const RUSTUP_INIT_LIBC: &str = "BP_RUSTUP_INIT_LIBC";
    pub const RUSTUP_INIT_ARGS: &str = "BP_RUSTUP_INIT_ARGS";
    pub const PROFILE: &str = "BP_RUST_PROFILE";
    pub const TOOLCHAIN: &str = "BP_RUST_TOOLCHAIN";
    pub const TARGET: &str = "BP_RUST_TARGET";
}

// Options every descriptor implicitly carries, merged under the file's own
const BUILTIN_DESCRIPTOR: &str = include_str!("../../buildpack.toml");

/// Load a buildpack descriptor, falling back to the built-in one
pub async fn load_descriptor(path: Option<&Path>) -> RustupLayersResult<BuildpackDescriptor> {
    let builtin = parse_descriptor(BUILTIN_DESCRIPTOR, Path::new("<built-in>"))?;

    let Some(path) = path else {
        debug!("No buildpack descriptor given, using built-in");
        return Ok(builtin);
    };

    let content = fs::read_to_string(path).await.map_err(|e| {
        RustupLayersError::io(format!("reading buildpack descriptor {}", path.display()), e)
    })?;
    let mut descriptor = parse_descriptor(&content, path)?;

    for option in builtin.metadata.configurations {
        if !descriptor
            .metadata
            .configurations
            .iter()
            .any(|o| o.name == option.name)
        {
            descriptor.metadata.configurations.push(option);
        }
    }

    Ok(descriptor)
}

fn parse_descriptor(content: &str, path: &Path) -> RustupLayersResult<BuildpackDescriptor> {
    toml::from_str(content).map_err(|e| RustupLayersError::ConfigInvalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Resolves option values from the environment with descriptor defaults
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    options: Vec<ConfigurationOption>,
    env: HashMap<String, String>,
}

impl ConfigResolver {
    /// Create a resolver over an explicit environment snapshot
    pub fn new(descriptor: &BuildpackDescriptor, env: HashMap<String, String>) -> Self {
        Self {
            options: descriptor.metadata.configurations.clone(),
            env,
        }
    }

    /// Create a resolver over the current process environment
    pub fn from_process_env(descriptor: &BuildpackDescriptor) -> Self {
        Self::new(descriptor, std::env::vars().collect())
    }

    /// Resolve an option, returning its value and whether it was explicitly set
    pub fn resolve(&self, name: &str) -> (String, bool) {
        if let Some(value) = self.env.get(name) {
            return (value.clone(), true);
        }

        let default = self
            .options
            .iter()
            .find(|o| o.name == name)
            .and_then(|o| o.default.clone())
            .unwrap_or_default();
        (default, false)
    }

    /// Resolve an option as a boolean
    pub fn resolve_bool(&self, name: &str) -> RustupLayersResult<bool> {
        let (value, _) = self.resolve(name);
        parse_bool(name, &value)
    }

    /// Log every declared build option with its effective value
    pub fn log_options(&self) {
        info!("Build Configuration:");
        for option in self.options.iter().filter(|o| o.build) {
            let (value, set) = self.resolve(&option.name);
            let source = if set { "set" } else { "default" };
            info!(
                "   ${:<24} {:<10} ({}) {}",
                option.name, value, source, option.description
            );
        }
    }
}

/// Parse a boolean option using the accepted spellings
pub fn parse_bool(key: &str, value: &str) -> RustupLayersResult<bool> {
    match value.trim() {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        other => Err(RustupLayersError::ConfigParse {
            key: key.to_string(),
            value: other.to_string(),
            expected: "one of [1, t, T, TRUE, true, True, 0, f, F, FALSE, false, False]"
                .to_string(),
        }),
    }
}

/// Fully resolved configuration for one build invocation
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BuildConfig {
    pub enabled: bool,
    pub rustup_init_version: String,
    pub rustup_init_libc: String,
    pub rustup_init_args: String,
    pub profile: String,
    pub profile_set: bool,
    pub toolchain: String,
    pub toolchain_set: bool,
    pub target: String,
}

impl BuildConfig {
    /// Resolve every option the pipeline consumes
    pub fn resolve(resolver: &ConfigResolver) -> RustupLayersResult<Self> {
        let enabled = resolver.resolve_bool(keys::ENABLED)?;
        let (rustup_init_version, _) = resolver.resolve(keys::RUSTUP_INIT_VERSION);
        let (rustup_init_libc, _) = resolver.resolve(keys::RUSTUP_INIT_LIBC);
        let (rustup_init_args, _) = resolver.resolve(keys::RUSTUP_INIT_ARGS);
        let (profile, profile_set) = resolver.resolve(keys::PROFILE);
        let (toolchain, toolchain_set) = resolver.resolve(keys::TOOLCHAIN);
        let (target, _) = resolver.resolve(keys::TARGET);

        Ok(Self {
            enabled,
            rustup_init_version: rustup_init_version.trim().to_string(),
            rustup_init_libc: rustup_init_libc.trim().to_string(),
            rustup_init_args,
            profile: profile.trim().to_string(),
            profile_set,
            toolchain: toolchain.trim().to_string(),
            toolchain_set,
            target: target.trim().to_string(),
        })
    }

    /// Catalog id of the version-manager installer for the configured libc
    pub fn rustup_init_dependency_id(&self) -> String {
        format!("rustup-init-{}", self.rustup_init_libc)
    }
}
