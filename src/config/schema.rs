//! Buildpack descriptor schema
//!
//! The descriptor is read from `buildpack.toml` and carries both the
//! configuration options (with defaults) and the dependency catalog.

use serde::{Deserialize, Serialize};

/// Root of `buildpack.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildpackDescriptor {
    /// Buildpack identity
    pub buildpack: BuildpackInfo,

    /// Configuration options and dependency catalog
    pub metadata: BuildpackMetadata,
}

/// `[buildpack]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildpackInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub homepage: Option<String>,
}

impl Default for BuildpackInfo {
    fn default() -> Self {
        Self {
            id: "rustup-layers".to_string(),
            name: "Rustup".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            homepage: None,
        }
    }
}

/// `[metadata]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildpackMetadata {
    /// Declared configuration options
    pub configurations: Vec<ConfigurationOption>,

    /// Downloadable dependencies
    pub dependencies: Vec<DependencyEntry>,
}

/// One `[[metadata.configurations]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationOption {
    /// Environment variable name
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Default value when not set in the environment
    #[serde(default)]
    pub default: Option<String>,

    /// Whether the option applies at build time
    #[serde(default)]
    pub build: bool,
}

/// One `[[metadata.dependencies]]` entry as written in the descriptor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyEntry {
    pub id: String,

    #[serde(default)]
    pub name: String,

    pub version: String,

    pub uri: String,

    /// Checksum in `<algorithm>:<hex>` form
    #[serde(default)]
    pub checksum: Option<String>,

    /// Legacy bare SHA-256 field
    #[serde(default)]
    pub sha256: Option<String>,

    /// Stack ids this dependency runs on (`*` matches any)
    #[serde(default)]
    pub stacks: Vec<String>,

    #[serde(default)]
    pub purl: Option<String>,

    #[serde(default)]
    pub cpes: Vec<String>,

    #[serde(default)]
    pub licenses: Vec<String>,
}
