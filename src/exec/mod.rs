//! Subprocess execution
//!
//! External installers are opaque: they get an argument list, a working
//! directory and an environment, and a non-zero exit status is the only
//! failure signal. [`Executor`] is the seam tests replace.

use crate::error::{RustupLayersError, RustupLayersResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

#[cfg(test)]
pub mod fake;

/// Indentation used when echoing subprocess output
pub const OUTPUT_INDENT: usize = 3;

/// One subprocess invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Execution {
    pub command: String,
    pub args: Vec<String>,
    pub dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl Execution {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn env(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env = env.clone();
        self
    }
}

impl fmt::Display for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a successful invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn new(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

/// Runs subprocesses
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run to completion; a non-zero exit is an error carrying the output
    async fn execute(&self, execution: &Execution) -> RustupLayersResult<ExecOutput>;
}

/// Executor backed by real processes
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandExecutor;

#[async_trait]
impl Executor for CommandExecutor {
    async fn execute(&self, execution: &Execution) -> RustupLayersResult<ExecOutput> {
        debug!("Executing: {}", execution);

        let mut command = Command::new(&execution.command);
        command
            .args(&execution.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if !execution.env.is_empty() {
            command.env_clear().envs(&execution.env);
        }
        if let Some(dir) = &execution.dir {
            command.current_dir(dir);
        }

        let output = command
            .output()
            .await
            .map_err(|e| RustupLayersError::command_failed(execution.to_string(), e))?;

        let captured = ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !captured.stdout.trim().is_empty() {
            debug!("{}", indent(captured.stdout.trim_end(), OUTPUT_INDENT));
        }
        if !captured.stderr.trim().is_empty() {
            info!("{}", indent(captured.stderr.trim_end(), OUTPUT_INDENT));
        }

        if !output.status.success() {
            return Err(RustupLayersError::Subprocess {
                command: execution.to_string(),
                status: output.status.to_string(),
                output: captured.combined(),
            });
        }

        Ok(captured)
    }
}

/// Prefix every line of `text` with `width` spaces
pub fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.split('\n')
        .map(|line| format!("{}{}", pad, line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extract the version from `<name> <version> ...` style output
pub fn version_token(command: &str, output: &str) -> RustupLayersResult<String> {
    output
        .split_whitespace()
        .nth(1)
        .map(str::to_string)
        .ok_or_else(|| RustupLayersError::UnexpectedOutput {
            command: command.to_string(),
            output: output.to_string(),
        })
}
