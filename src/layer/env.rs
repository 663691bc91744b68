//! Build environment handling
//!
//! [`LayerEnvironment`] is what a layer declares for later build steps and
//! is written as `env.build/<NAME>.<op>` files inside the layer.
//! [`BuildEnvironment`] is the accumulator threaded through the pipeline:
//! each stage reads it for its subprocesses and extends it for the next.

use crate::error::{RustupLayersError, RustupLayersResult};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;

/// Directory inside a layer holding build-time environment files
pub const BUILD_ENV_DIR: &str = "env.build";

/// Path list separator
pub const PATH_DELIMITER: &str = ":";

/// One environment modification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvOp {
    Override(String),
    Prepend { value: String, delimiter: String },
}

/// Environment declared by a single layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerEnvironment {
    ops: BTreeMap<String, EnvOp>,
}

impl LayerEnvironment {
    /// Replace `name` with `value`
    pub fn set_override(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.ops.insert(name.into(), EnvOp::Override(value.into()));
    }

    /// Prepend `value` to `name` using `delimiter`
    pub fn prepend(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        delimiter: impl Into<String>,
    ) {
        self.ops.insert(
            name.into(),
            EnvOp::Prepend {
                value: value.into(),
                delimiter: delimiter.into(),
            },
        );
    }

    /// Write the declarations under `<layer>/env.build/`
    pub async fn write(&self, layer_path: &Path) -> RustupLayersResult<()> {
        if self.ops.is_empty() {
            return Ok(());
        }

        let dir = layer_path.join(BUILD_ENV_DIR);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| RustupLayersError::io(format!("creating {}", dir.display()), e))?;

        for (name, op) in &self.ops {
            match op {
                EnvOp::Override(value) => {
                    write_file(&dir.join(format!("{}.override", name)), value).await?;
                }
                EnvOp::Prepend { value, delimiter } => {
                    write_file(&dir.join(format!("{}.prepend", name)), value).await?;
                    write_file(&dir.join(format!("{}.delim", name)), delimiter).await?;
                }
            }
        }
        Ok(())
    }
}

async fn write_file(path: &Path, content: &str) -> RustupLayersResult<()> {
    fs::write(path, content)
        .await
        .map_err(|e| RustupLayersError::io(format!("writing {}", path.display()), e))
}

/// Environment accumulated across pipeline stages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildEnvironment {
    vars: BTreeMap<String, String>,
}

impl BuildEnvironment {
    /// Start from an explicit set of variables
    pub fn new(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            vars: vars.into_iter().collect(),
        }
    }

    /// Start from the current process environment
    pub fn from_process_env() -> Self {
        Self::new(std::env::vars())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Put `dir` first on `$PATH`
    pub fn prepend_path(&mut self, dir: &Path) {
        let dir = dir.display().to_string();
        let path = match self.vars.get("PATH") {
            Some(existing) if !existing.is_empty() => {
                if existing.split(PATH_DELIMITER).next() == Some(dir.as_str()) {
                    return;
                }
                format!("{}{}{}", dir, PATH_DELIMITER, existing)
            }
            _ => dir,
        };
        self.vars.insert("PATH".to_string(), path);
    }

    /// Apply a layer's declarations
    pub fn apply(&mut self, env: &LayerEnvironment) {
        for (name, op) in &env.ops {
            match op {
                EnvOp::Override(value) => self.set(name.clone(), value.clone()),
                EnvOp::Prepend { value, delimiter } => {
                    let combined = match self.vars.get(name) {
                        Some(existing) if !existing.is_empty() => {
                            format!("{}{}{}", value, delimiter, existing)
                        }
                        _ => value.clone(),
                    };
                    self.set(name.clone(), combined);
                }
            }
        }
    }

    /// All variables, for passing to a subprocess
    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }
}
