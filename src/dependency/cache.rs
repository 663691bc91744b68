//! Content-addressed dependency cache
//!
//! Artifacts are stored under `<root>/<checksum>/<file name>` and are only
//! ever published by renaming a fully written, verified temporary file
//! into place. Concurrent builds sharing a cache directory can race on the
//! same checksum safely: each writes its own temporary file and the last
//! rename wins with identical bytes.

use crate::dependency::checksum::Checksum;
use crate::dependency::resolver::ArtifactDescriptor;
use crate::error::{RustupLayersError, RustupLayersResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Suffix of in-flight downloads
const PARTIAL_SUFFIX: &str = ".partial";

/// Downloads left unfinished for this long belong to a dead process
pub const STALE_PARTIAL_AGE: Duration = Duration::from_secs(60 * 60);

/// Moves bytes from a source URI into a writer
///
/// Retry policy, proxies and authentication belong to implementations.
pub trait Transport: Send + Sync {
    /// Copy the content at `uri` into `dest`, returning the byte count
    fn fetch(&self, uri: &str, dest: &mut dyn Write) -> RustupLayersResult<u64>;
}

/// `http(s)://` through ureq, `file://` and bare paths from local disk
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTransport;

impl Transport for DefaultTransport {
    fn fetch(&self, uri: &str, dest: &mut dyn Write) -> RustupLayersResult<u64> {
        let fetch_err = |reason: String| RustupLayersError::Fetch {
            uri: uri.to_string(),
            reason,
        };

        if uri.starts_with("http://") || uri.starts_with("https://") {
            let response = ureq::get(uri).call().map_err(|e| fetch_err(e.to_string()))?;
            let mut reader = response.into_body().into_reader();
            return io::copy(&mut reader, dest).map_err(|e| fetch_err(e.to_string()));
        }

        let path = uri.strip_prefix("file://").unwrap_or(uri);
        let mut file = fs::File::open(path).map_err(|e| fetch_err(e.to_string()))?;
        io::copy(&mut file, dest).map_err(|e| fetch_err(e.to_string()))
    }
}

/// A verified artifact on local disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedArtifact {
    pub checksum: Checksum,
    pub path: PathBuf,
    pub verified: bool,
}

/// Record written next to each cached artifact
#[derive(Debug, Serialize)]
struct CacheRecord<'a> {
    fetched_at: DateTime<Utc>,
    dependency: &'a ArtifactDescriptor,
}

/// Download cache keyed by artifact checksum
#[derive(Clone)]
pub struct DependencyCache {
    root: PathBuf,
    transport: Arc<dyn Transport>,
}

impl DependencyCache {
    /// Create a cache rooted at `root` using the default transport
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_transport(root, Arc::new(DefaultTransport))
    }

    /// Create a cache with a custom transport
    pub fn with_transport(root: impl Into<PathBuf>, transport: Arc<dyn Transport>) -> Self {
        Self {
            root: root.into(),
            transport,
        }
    }

    /// Where the artifact for `descriptor` lives once published
    pub fn artifact_path(&self, descriptor: &ArtifactDescriptor) -> PathBuf {
        self.root
            .join(&descriptor.checksum.value)
            .join(descriptor.file_name())
    }

    /// Return a verified local copy of the artifact, fetching it if needed
    pub async fn materialize(
        &self,
        descriptor: &ArtifactDescriptor,
    ) -> RustupLayersResult<CachedArtifact> {
        let cache = self.clone();
        let descriptor = descriptor.clone();
        tokio::task::spawn_blocking(move || cache.materialize_blocking(&descriptor))
            .await
            .map_err(|e| RustupLayersError::Internal(format!("cache task failed: {}", e)))?
    }

    fn materialize_blocking(
        &self,
        descriptor: &ArtifactDescriptor,
    ) -> RustupLayersResult<CachedArtifact> {
        let path = self.artifact_path(descriptor);

        if path.is_file() {
            if descriptor.checksum.matches_file(&path)? {
                debug!("Reusing cached {} at {}", descriptor.id, path.display());
                return Ok(CachedArtifact {
                    checksum: descriptor.checksum.clone(),
                    path,
                    verified: true,
                });
            }

            // Left in place: the rename below replaces it atomically
            warn!(
                "Cached {} at {} failed verification, fetching again",
                descriptor.id,
                path.display()
            );
        }

        let dir = path
            .parent()
            .ok_or_else(|| RustupLayersError::Internal("artifact path has no parent".to_string()))?;
        fs::create_dir_all(dir)
            .map_err(|e| RustupLayersError::io(format!("creating {}", dir.display()), e))?;
        sweep_stale_partials(dir, STALE_PARTIAL_AGE);

        info!("Downloading from {}", descriptor.uri);
        let tmp = dir.join(format!(
            ".{}.{}{}",
            descriptor.file_name(),
            uuid::Uuid::new_v4(),
            PARTIAL_SUFFIX
        ));

        let result = self.fetch_verified(descriptor, &tmp);
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result?;

        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            RustupLayersError::io(
                format!("publishing {} to {}", tmp.display(), path.display()),
                e,
            )
        })?;

        self.write_record(descriptor)?;
        info!("Verified {}", descriptor.checksum);

        Ok(CachedArtifact {
            checksum: descriptor.checksum.clone(),
            path,
            verified: true,
        })
    }

    fn fetch_verified(&self, descriptor: &ArtifactDescriptor, tmp: &Path) -> RustupLayersResult<()> {
        {
            let mut file = fs::File::create(tmp)
                .map_err(|e| RustupLayersError::io(format!("creating {}", tmp.display()), e))?;
            let bytes = self.transport.fetch(&descriptor.uri, &mut file)?;
            file.sync_all()
                .map_err(|e| RustupLayersError::io(format!("flushing {}", tmp.display()), e))?;
            debug!("Fetched {} bytes from {}", bytes, descriptor.uri);
        }

        let actual = descriptor.checksum.digest_file(tmp)?;
        if actual != descriptor.checksum.value {
            return Err(RustupLayersError::Integrity {
                uri: descriptor.uri.clone(),
                expected: descriptor.checksum.to_string(),
                actual: format!("{}:{}", descriptor.checksum.algorithm, actual),
            });
        }
        Ok(())
    }

    fn write_record(&self, descriptor: &ArtifactDescriptor) -> RustupLayersResult<()> {
        let record = CacheRecord {
            fetched_at: Utc::now(),
            dependency: descriptor,
        };
        let path = self.root.join(format!("{}.json", descriptor.checksum.value));
        let tmp = self
            .root
            .join(format!(".{}.{}.json", descriptor.checksum.value, uuid::Uuid::new_v4()));
        fs::write(&tmp, serde_json::to_string_pretty(&record)?)
            .map_err(|e| RustupLayersError::io(format!("writing {}", tmp.display()), e))?;
        fs::rename(&tmp, &path)
            .map_err(|e| RustupLayersError::io(format!("writing {}", path.display()), e))
    }
}

/// Remove `.*.partial` files in `dir` last modified more than `max_age` ago
///
/// Younger files may still be written by a concurrent build and are kept.
/// Failures are logged and ignored; another build may be sweeping too.
fn sweep_stale_partials(dir: &Path, max_age: Duration) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let now = SystemTime::now();

    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with('.') || !name.ends_with(PARTIAL_SUFFIX) {
            continue;
        }

        let stale = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .is_some_and(|age| age >= max_age);
        if !stale {
            continue;
        }

        match fs::remove_file(entry.path()) {
            Ok(()) => debug!("Removed stale download {}", entry.path().display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", entry.path().display(), e),
        }
    }
}
