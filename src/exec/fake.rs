//! Scripted executor for tests

use super::{ExecOutput, Execution, Executor};
use crate::error::{RustupLayersError, RustupLayersResult};
use async_trait::async_trait;
use std::sync::Mutex;

/// Records every execution and answers from a script
///
/// Queued one-shot responses are consumed first, in order. Otherwise
/// responses are matched by the longest command-line prefix, the most
/// recently registered winning among equal prefixes; unmatched executions
/// succeed with empty output.
#[derive(Default)]
pub struct RecordingExecutor {
    queued: Mutex<Vec<(String, String)>>,
    responses: Mutex<Vec<(String, Result<String, String>)>>,
    executions: Mutex<Vec<Execution>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer executions starting with `prefix` with `stdout`
    pub fn respond(&self, prefix: &str, stdout: &str) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .push((prefix.to_string(), Ok(stdout.to_string())));
        self
    }

    /// Answer only the next execution starting with `prefix` with `stdout`
    pub fn queue(&self, prefix: &str, stdout: &str) -> &Self {
        self.queued
            .lock()
            .unwrap()
            .push((prefix.to_string(), stdout.to_string()));
        self
    }

    /// Fail executions starting with `prefix`
    pub fn fail(&self, prefix: &str, output: &str) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .push((prefix.to_string(), Err(output.to_string())));
        self
    }

    /// Everything executed so far
    pub fn executions(&self) -> Vec<Execution> {
        self.executions.lock().unwrap().clone()
    }

    /// Executed command lines, in order
    pub fn command_lines(&self) -> Vec<String> {
        self.executions().iter().map(|e| e.to_string()).collect()
    }

    pub fn clear(&self) {
        self.executions.lock().unwrap().clear();
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn execute(&self, execution: &Execution) -> RustupLayersResult<ExecOutput> {
        self.executions.lock().unwrap().push(execution.clone());

        let line = execution.to_string();

        let mut queued = self.queued.lock().unwrap();
        if let Some(i) = queued.iter().position(|(prefix, _)| line.starts_with(prefix.as_str())) {
            let (_, stdout) = queued.remove(i);
            return Ok(ExecOutput::new(stdout));
        }
        drop(queued);

        let responses = self.responses.lock().unwrap();
        let matched = responses
            .iter()
            .filter(|(prefix, _)| line.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len());

        match matched {
            None => Ok(ExecOutput::default()),
            Some((_, Ok(stdout))) => Ok(ExecOutput::new(stdout.clone())),
            Some((_, Err(output))) => Err(RustupLayersError::Subprocess {
                command: line,
                status: "exit status: 1".to_string(),
                output: output.clone(),
            }),
        }
    }
}
