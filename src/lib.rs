//! Rustup layers - cached Rust toolchains for container builds
//!
//! Resolves the `rustup-init` installer from a dependency catalog, fetches
//! it into a content-addressed cache and installs rustup plus a toolchain
//! as fingerprinted layers that are reused while their inputs are unchanged.

pub mod bom;
pub mod build;
pub mod cli;
pub mod config;
pub mod dependency;
pub mod error;
pub mod exec;
pub mod layer;
pub mod pipeline;

pub use error::{RustupLayersError, RustupLayersResult};
