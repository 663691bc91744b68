//! Version-manager installer stage
//!
//! Copies the verified `rustup-init` artifact into `<layer>/bin` and puts
//! that directory on `PATH`. The layer is cached across builds and only
//! rebuilt when the resolved artifact changes.

use super::{StageContext, StageReport};
use crate::bom::{self, BomEntry};
use crate::dependency::{ArtifactDescriptor, DependencyCache};
use crate::error::{RustupLayersError, RustupLayersResult};
use crate::layer::{BuildEnvironment, Fingerprint, Layer, LayerAction, LayerContributor, LayerTypes};
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use tokio::fs;
use tracing::info;

pub const LAYER_NAME: &str = "rustup-init";

#[derive(Debug, Serialize)]
struct Inputs<'a> {
    dependency: DependencyInputs<'a>,
}

#[derive(Debug, Serialize)]
struct DependencyInputs<'a> {
    id: &'a str,
    version: &'a str,
    checksum: String,
}

impl<'a> Inputs<'a> {
    fn new(dependency: &'a ArtifactDescriptor) -> Self {
        Self {
            dependency: DependencyInputs {
                id: &dependency.id,
                version: &dependency.version,
                checksum: dependency.checksum.to_string(),
            },
        }
    }
}

struct InstallInstaller<'a> {
    dependency: &'a ArtifactDescriptor,
    cache: &'a DependencyCache,
}

#[async_trait]
impl LayerAction for InstallInstaller<'_> {
    async fn rebuild(&self, layer: &mut Layer) -> RustupLayersResult<()> {
        let artifact = self.cache.materialize(self.dependency).await?;

        let bin = layer.path.join("bin");
        fs::create_dir_all(&bin)
            .await
            .map_err(|e| RustupLayersError::io(format!("creating {}", bin.display()), e))?;

        let file = bin.join(self.dependency.file_name());
        info!("Copying to {}", bin.display());
        fs::copy(&artifact.path, &file).await.map_err(|e| {
            RustupLayersError::io(
                format!("copying {} to {}", artifact.path.display(), file.display()),
                e,
            )
        })?;
        make_executable(&file).await?;

        let entry = BomEntry::from_dependency(self.dependency, &layer.path.display().to_string());
        bom::write(&layer.sbom_path(), &layer.path, &entry).await
    }
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> RustupLayersResult<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(|e| RustupLayersError::io(format!("chmod {}", path.display()), e))
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> RustupLayersResult<()> {
    Ok(())
}

/// Contribute the installer layer and put it on `PATH`
pub async fn contribute(
    context: &StageContext<'_>,
    dependency: &ArtifactDescriptor,
    cache: &DependencyCache,
    env: &mut BuildEnvironment,
) -> RustupLayersResult<StageReport> {
    let mut layer = Layer::new(context.layers_dir, LAYER_NAME);
    env.prepend_path(&layer.path.join("bin"));

    let contributor = LayerContributor::new(Fingerprint::of(&Inputs::new(dependency))?, LayerTypes::CACHE);
    let action = InstallInstaller { dependency, cache };
    let status = contributor.contribute(&mut layer, &action).await?;

    StageReport::collect(&layer, status).await
}
