//! Dependency resolution against the buildpack's static catalog
//!
//! A query names a dependency id, a version constraint and the current
//! stack. Exactly one catalog entry must satisfy all three; anything else
//! is a resolution error and is never retried.

use crate::config::{BuildpackDescriptor, DependencyEntry};
use crate::dependency::checksum::Checksum;
use crate::error::{RustupLayersError, RustupLayersResult};
use semver::{Version, VersionReq};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

/// Stack tag that matches every platform
pub const ANY_STACK: &str = "*";

/// An immutable, fully validated catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactDescriptor {
    pub id: String,
    pub name: String,
    pub version: String,
    pub stacks: BTreeSet<String>,
    pub uri: String,
    pub checksum: Checksum,
    pub purl: Option<String>,
    pub cpes: Vec<String>,
    pub licenses: Vec<String>,
}

impl ArtifactDescriptor {
    /// Validate a raw descriptor entry
    pub fn from_entry(entry: &DependencyEntry) -> RustupLayersResult<Self> {
        let raw_checksum = entry
            .checksum
            .as_deref()
            .or(entry.sha256.as_deref())
            .ok_or_else(|| RustupLayersError::InvalidChecksum {
                checksum: String::new(),
                reason: format!("dependency {} {} has no checksum", entry.id, entry.version),
            })?;

        Ok(Self {
            id: entry.id.clone(),
            name: if entry.name.is_empty() {
                entry.id.clone()
            } else {
                entry.name.clone()
            },
            version: entry.version.trim().to_string(),
            stacks: entry.stacks.iter().cloned().collect(),
            uri: entry.uri.clone(),
            checksum: Checksum::parse(raw_checksum)?,
            purl: entry.purl.clone(),
            cpes: entry.cpes.clone(),
            licenses: entry.licenses.clone(),
        })
    }

    /// Whether this artifact runs on `stack`
    pub fn supports_stack(&self, stack: &str) -> bool {
        self.stacks.contains(ANY_STACK) || self.stacks.contains(stack)
    }

    /// File name the artifact is published under
    pub fn file_name(&self) -> String {
        let path = self.uri.split(['?', '#']).next().unwrap_or(&self.uri);
        path.rsplit('/')
            .find(|s| !s.is_empty())
            .unwrap_or(&self.id)
            .to_string()
    }
}

/// How a requested version is matched
#[derive(Debug, Clone, PartialEq, Eq)]
enum Constraint {
    Latest,
    Exact(String),
    Range(VersionReq),
}

impl Constraint {
    fn parse(raw: &str) -> RustupLayersResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw == "*" {
            return Ok(Self::Latest);
        }

        let numeric: Vec<&str> = raw.split('.').collect();
        let all_numeric = numeric.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));

        if all_numeric && numeric.len() >= 3 {
            return Ok(Self::Exact(raw.to_string()));
        }

        // A partial version like `1` or `1.27` selects the newest in that series
        let req = if all_numeric {
            format!("{}.*", raw)
        } else {
            raw.to_string()
        };

        VersionReq::parse(&req)
            .map(Self::Range)
            .map_err(|e| RustupLayersError::VersionConstraint {
                constraint: raw.to_string(),
                reason: e.to_string(),
            })
    }

    fn matches(&self, version: &str) -> bool {
        match self {
            Self::Latest => true,
            Self::Exact(exact) => {
                version == exact
                    || matches!((lenient_version(version), lenient_version(exact)), (Some(a), Some(b)) if a == b)
            }
            Self::Range(req) => lenient_version(version).is_some_and(|v| req.matches(&v)),
        }
    }
}

/// Parse a version, padding missing minor/patch components with zero
fn lenient_version(raw: &str) -> Option<Version> {
    let raw = raw.trim().trim_start_matches('v');
    if let Ok(v) = Version::parse(raw) {
        return Some(v);
    }
    let parts: Vec<&str> = raw.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let mut padded = parts.clone();
    while padded.len() < 3 {
        padded.push("0");
    }
    Version::parse(&padded.join(".")).ok()
}

/// Pure selection over a pre-loaded catalog
#[derive(Debug, Clone, Default)]
pub struct DependencyResolver {
    catalog: Vec<ArtifactDescriptor>,
}

impl DependencyResolver {
    /// Create a resolver over an already validated catalog
    pub fn new(catalog: Vec<ArtifactDescriptor>) -> Self {
        Self { catalog }
    }

    /// Build the catalog from a buildpack descriptor, validating every entry
    pub fn from_descriptor(descriptor: &BuildpackDescriptor) -> RustupLayersResult<Self> {
        let catalog = descriptor
            .metadata
            .dependencies
            .iter()
            .map(|entry| {
                ArtifactDescriptor::from_entry(entry).map_err(|e| RustupLayersError::ConfigInvalid {
                    path: Path::new("buildpack.toml").to_path_buf(),
                    reason: e.to_string(),
                })
            })
            .collect::<RustupLayersResult<Vec<_>>>()?;
        Ok(Self::new(catalog))
    }

    /// All catalog entries
    pub fn catalog(&self) -> &[ArtifactDescriptor] {
        &self.catalog
    }

    /// Select exactly one descriptor for `id` at `constraint` on `stack`
    ///
    /// An unspecified constraint selects the newest version. Two or more
    /// entries tied on the selected version fail as ambiguous rather than
    /// picking one arbitrarily.
    pub fn resolve(
        &self,
        id: &str,
        constraint: &str,
        stack: &str,
    ) -> RustupLayersResult<ArtifactDescriptor> {
        let parsed = Constraint::parse(constraint)?;

        let candidates: Vec<&ArtifactDescriptor> = self
            .catalog
            .iter()
            .filter(|d| d.id == id && d.supports_stack(stack) && parsed.matches(&d.version))
            .collect();

        debug!(
            "Resolving {} {} on {}: {} candidate(s)",
            id,
            constraint,
            stack,
            candidates.len()
        );

        let not_found = || RustupLayersError::DependencyNotFound {
            id: id.to_string(),
            constraint: constraint.to_string(),
            stack: stack.to_string(),
        };

        let selected: Vec<&ArtifactDescriptor> = match parsed {
            Constraint::Exact(_) => candidates,
            Constraint::Latest | Constraint::Range(_) => {
                let newest = candidates
                    .iter()
                    .filter_map(|d| lenient_version(&d.version))
                    .max();
                match newest {
                    Some(newest) => candidates
                        .into_iter()
                        .filter(|d| lenient_version(&d.version).as_ref() == Some(&newest))
                        .collect(),
                    // Nothing sortable; only a lone candidate is acceptable
                    None => candidates,
                }
            }
        };

        match selected.as_slice() {
            [] => Err(not_found()),
            [only] => Ok((*only).clone()),
            many => Err(RustupLayersError::DependencyAmbiguous {
                id: id.to_string(),
                constraint: constraint.to_string(),
                stack: stack.to_string(),
                candidates: many
                    .iter()
                    .map(|d| format!("{}@{} ({})", d.id, d.version, d.uri))
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }
}
