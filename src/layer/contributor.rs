//! Reuse-or-rebuild for fingerprinted layers
//!
//! # States
//!
//! | State | Meaning |
//! |-------|---------|
//! | Unchecked | fingerprint not yet compared |
//! | Reused | persisted fingerprint matched, layer left untouched |
//! | Rebuilt | rebuild action succeeded, new fingerprint persisted |
//! | Failed | rebuild action failed, no fingerprint persisted |
//!
//! A layer is only reused when its persisted fingerprint equals the
//! expected one *and* its directory is populated. Metadata is deleted
//! before a rebuild starts, so an interrupted or failed rebuild is always
//! retried on the next run.

use crate::error::{RustupLayersError, RustupLayersResult};
use crate::layer::env::LayerEnvironment;
use crate::layer::fingerprint::Fingerprint;
use crate::layer::metadata::{LayerMetadata, LayerTypes};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Outcome of a reuse-or-rebuild call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerStatus {
    Unchecked,
    Reused,
    Rebuilt,
    Failed,
}

impl fmt::Display for LayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unchecked => write!(f, "unchecked"),
            Self::Reused => write!(f, "reused"),
            Self::Rebuilt => write!(f, "rebuilt"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A named layer directory under the layers root
#[derive(Debug, Clone)]
pub struct Layer {
    pub name: String,
    pub path: PathBuf,
    /// Environment declared for later build steps
    pub env: LayerEnvironment,
    layers_dir: PathBuf,
}

impl Layer {
    /// Locate the layer `name` under `layers_dir`
    pub fn new(layers_dir: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: layers_dir.join(name),
            env: LayerEnvironment::default(),
            layers_dir: layers_dir.to_path_buf(),
        }
    }

    /// `<layers>/<name>.toml`
    pub fn metadata_path(&self) -> PathBuf {
        self.layers_dir.join(format!("{}.toml", self.name))
    }

    /// `<layers>/<name>.sbom.syft.json`
    pub fn sbom_path(&self) -> PathBuf {
        self.layers_dir.join(format!("{}.sbom.syft.json", self.name))
    }

    /// Whether the layer directory exists and has any entry
    pub async fn is_populated(&self) -> bool {
        match fs::read_dir(&self.path).await {
            Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
            Err(_) => false,
        }
    }

    async fn reset(&self) -> RustupLayersResult<()> {
        if fs::metadata(&self.path).await.is_ok() {
            fs::remove_dir_all(&self.path)
                .await
                .map_err(|e| RustupLayersError::io(format!("clearing {}", self.path.display()), e))?;
        }
        fs::create_dir_all(&self.path)
            .await
            .map_err(|e| RustupLayersError::io(format!("creating {}", self.path.display()), e))?;

        let sbom = self.sbom_path();
        if fs::metadata(&sbom).await.is_ok() {
            fs::remove_file(&sbom)
                .await
                .map_err(|e| RustupLayersError::io(format!("removing {}", sbom.display()), e))?;
        }
        Ok(())
    }
}

/// What a stage does to (re)populate its layer
#[async_trait]
pub trait LayerAction: Send + Sync {
    /// Populate an emptied layer directory
    async fn rebuild(&self, layer: &mut Layer) -> RustupLayersResult<()>;

    /// Final fingerprint to persist after a successful rebuild
    ///
    /// Stages whose inputs include live external state re-read it here so
    /// the next run compares against what the rebuild actually produced.
    async fn refresh(&self, expected: Fingerprint) -> RustupLayersResult<Fingerprint> {
        Ok(expected)
    }
}

/// Reuse-or-rebuild driver for one layer
#[derive(Debug, Clone)]
pub struct LayerContributor {
    expected: Fingerprint,
    types: LayerTypes,
    required: Vec<PathBuf>,
}

impl LayerContributor {
    pub fn new(expected: Fingerprint, types: LayerTypes) -> Self {
        Self {
            expected,
            types,
            required: Vec::new(),
        }
    }

    /// Also require `path` to exist before reusing
    ///
    /// For layers whose real output is written outside their own directory.
    pub fn require(mut self, path: impl Into<PathBuf>) -> Self {
        self.required.push(path.into());
        self
    }

    pub fn expected(&self) -> &Fingerprint {
        &self.expected
    }

    /// Reuse the layer if its inputs are unchanged, otherwise rebuild it
    pub async fn contribute(
        &self,
        layer: &mut Layer,
        action: &dyn LayerAction,
    ) -> RustupLayersResult<LayerStatus> {
        let mut status = LayerStatus::Unchecked;
        debug!(
            "{} layer: {} (fingerprint {})",
            layer.name,
            status,
            self.expected.digest()
        );

        let metadata_path = layer.metadata_path();
        let persisted = LayerMetadata::read(&metadata_path).await?;

        match self.stale_reason(layer, persisted.as_ref()).await {
            None => {
                status = LayerStatus::Reused;
                info!("Reusing cached layer {}", layer.path.display());
                return Ok(status);
            }
            Some(reason) => info!("Rebuilding {} layer: {}", layer.name, reason),
        }

        LayerMetadata::remove(&metadata_path).await?;
        layer.reset().await?;

        let result = async {
            action.rebuild(layer).await?;
            let fingerprint = action.refresh(self.expected.clone()).await?;
            layer.env.write(&layer.path).await?;
            Ok::<_, RustupLayersError>(fingerprint)
        }
        .await;

        let fingerprint = match result {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                status = LayerStatus::Failed;
                warn!("{} layer {}", layer.name, status);
                return Err(e.context(format!("contributing {} layer", layer.name)));
            }
        };

        LayerMetadata {
            types: self.types,
            metadata: fingerprint,
        }
        .write(&metadata_path)
        .await?;

        status = LayerStatus::Rebuilt;
        debug!("{} layer: {}", layer.name, status);
        Ok(status)
    }

    async fn stale_reason(&self, layer: &Layer, persisted: Option<&LayerMetadata>) -> Option<String> {
        let Some(persisted) = persisted else {
            return Some("no previous metadata".to_string());
        };

        if persisted.metadata != self.expected {
            let changed = persisted.metadata.diff(&self.expected).join(", ");
            return Some(format!("inputs changed ({})", changed));
        }

        if persisted.types != self.types {
            return Some("layer types changed".to_string());
        }

        if !layer.is_populated().await {
            return Some("layer directory is empty".to_string());
        }

        for path in &self.required {
            if fs::metadata(path).await.is_err() {
                return Some(format!("{} is missing", path.display()));
            }
        }

        None
    }
}
