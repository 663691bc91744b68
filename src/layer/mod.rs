//! Fingerprinted build layers
//!
//! A layer is a named directory under the layers root plus a metadata file
//! recording the inputs it was built from. Layers outlive the process that
//! built them; each run rediscovers them by name and re-fingerprints.

pub mod contributor;
pub mod env;
pub mod fingerprint;
pub mod metadata;

pub use contributor::{Layer, LayerAction, LayerContributor, LayerStatus};
pub use env::{BuildEnvironment, LayerEnvironment};
pub use fingerprint::Fingerprint;
pub use metadata::{LayerMetadata, LayerTypes};
