//! Bill-of-materials records
//!
//! Every resolved binary artifact is described by one [`BomEntry`], written
//! next to its layer as a Syft-style JSON document so the record survives
//! alongside a cached layer.

use crate::dependency::ArtifactDescriptor;
use crate::error::{RustupLayersError, RustupLayersResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// Tool name recorded as the finder of each artifact
pub const FOUND_BY: &str = "rustup-layers";

/// One resolved dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BomEntry {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(rename = "Type")]
    pub kind: String,
    pub found_by: String,
    pub locations: Vec<BomLocation>,
    pub licenses: Vec<String>,
    #[serde(rename = "CPEs")]
    pub cpes: Vec<String>,
    #[serde(rename = "PURL")]
    pub purl: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BomLocation {
    pub path: String,
}

impl BomEntry {
    /// Entry for a tool whose version was read from the installed binary
    pub fn generic(id: &str, name: &str, version: &str, location: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            kind: "UnknownPackage".to_string(),
            found_by: FOUND_BY.to_string(),
            locations: vec![BomLocation {
                path: location.to_string(),
            }],
            licenses: vec!["Apache-2.0".to_string(), "MIT".to_string()],
            cpes: vec![format!(
                "cpe:2.3:a:{}:{}:{}:*:*:*:*:*:*:*",
                id, id, version
            )],
            purl: format!("pkg:generic/{}@{}", id, version),
        }
    }

    /// Entry for a catalog artifact
    pub fn from_dependency(dependency: &ArtifactDescriptor, location: &str) -> Self {
        Self {
            id: dependency.id.clone(),
            name: dependency.name.clone(),
            version: dependency.version.clone(),
            kind: "UnknownPackage".to_string(),
            found_by: FOUND_BY.to_string(),
            locations: vec![BomLocation {
                path: location.to_string(),
            }],
            licenses: dependency.licenses.clone(),
            cpes: dependency.cpes.clone(),
            purl: dependency
                .purl
                .clone()
                .unwrap_or_else(|| format!("pkg:generic/{}@{}", dependency.id, dependency.version)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SyftDocument {
    artifacts: Vec<BomEntry>,
    source: SyftSource,
    descriptor: SyftDescriptor,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SyftSource {
    #[serde(rename = "Type")]
    kind: String,
    target: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SyftDescriptor {
    name: String,
    version: String,
}

/// Write the record for a layer
pub async fn write(path: &Path, layer_path: &Path, entry: &BomEntry) -> RustupLayersResult<()> {
    let document = SyftDocument {
        artifacts: vec![entry.clone()],
        source: SyftSource {
            kind: "directory".to_string(),
            target: layer_path.display().to_string(),
        },
        descriptor: SyftDescriptor {
            name: FOUND_BY.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    };

    debug!("Writing SBOM at {}: {:?}", path.display(), entry);
    fs::write(path, serde_json::to_string_pretty(&document)?)
        .await
        .map_err(|e| RustupLayersError::io(format!("writing SBOM {}", path.display()), e))
}

/// Read a layer's record, if one was written
pub async fn read(path: &Path) -> RustupLayersResult<Option<BomEntry>> {
    let content = match fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(RustupLayersError::io(
                format!("reading SBOM {}", path.display()),
                e,
            ))
        }
    };

    let document: SyftDocument = serde_json::from_str(&content)?;
    Ok(document.artifacts.into_iter().next())
}
