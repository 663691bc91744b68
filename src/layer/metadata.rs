//! Persisted layer metadata
//!
//! Each layer `<layers>/<name>/` is described by `<layers>/<name>.toml`
//! holding its types and the fingerprint it was last built with. The file
//! is replaced atomically so a reader sees either the old or the new
//! content, never a mix.

use crate::error::{RustupLayersError, RustupLayersResult};
use crate::layer::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::warn;

/// Where a layer is visible
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerTypes {
    /// Available to later build steps
    pub build: bool,
    /// Restored on the next build
    pub cache: bool,
    /// Exported into the runtime image
    pub launch: bool,
}

impl LayerTypes {
    /// Kept only between builds
    pub const CACHE: Self = Self {
        build: false,
        cache: true,
        launch: false,
    };

    /// Visible to the build and kept between builds
    pub const BUILD_CACHE: Self = Self {
        build: true,
        cache: true,
        launch: false,
    };
}

/// Content of `<layers>/<name>.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerMetadata {
    pub types: LayerTypes,
    pub metadata: Fingerprint,
}

impl LayerMetadata {
    /// Read metadata, treating a missing or unreadable file as absent
    pub async fn read(path: &Path) -> RustupLayersResult<Option<Self>> {
        let content = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(RustupLayersError::io(
                    format!("reading layer metadata {}", path.display()),
                    e,
                ))
            }
        };

        match toml::from_str(&content) {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) => {
                warn!(
                    "Ignoring unreadable layer metadata {}: {}",
                    path.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    /// Write metadata via a temporary file and rename
    pub async fn write(&self, path: &Path) -> RustupLayersResult<()> {
        let content = toml::to_string_pretty(self)?;
        let tmp = path.with_extension(format!("toml.{}.tmp", uuid::Uuid::new_v4()));

        fs::write(&tmp, content).await.map_err(|e| {
            RustupLayersError::io(format!("writing layer metadata {}", tmp.display()), e)
        })?;
        fs::rename(&tmp, path).await.map_err(|e| {
            RustupLayersError::io(format!("publishing layer metadata {}", path.display()), e)
        })
    }

    /// Remove metadata if present
    pub async fn remove(path: &Path) -> RustupLayersResult<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RustupLayersError::io(
                format!("removing layer metadata {}", path.display()),
                e,
            )),
        }
    }
}
