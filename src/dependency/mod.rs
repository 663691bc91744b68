//! Binary dependencies: catalog resolution and the download cache
//!
//! Resolution is a pure selection over the buildpack's catalog. The cache
//! materializes a resolved artifact's bytes at most once per checksum.

pub mod cache;
pub mod checksum;
pub mod resolver;

pub use cache::{CachedArtifact, DefaultTransport, DependencyCache, Transport};
pub use checksum::{Checksum, ChecksumAlgorithm};
pub use resolver::{ArtifactDescriptor, DependencyResolver};
