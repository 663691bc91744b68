//! Error types for rustup-layers
//!
//! All modules use `RustupLayersResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for rustup-layers operations
pub type RustupLayersResult<T> = Result<T, RustupLayersError>;

/// All errors that can occur while contributing layers
#[derive(Error, Debug)]
pub enum RustupLayersError {
    // Resolution errors
    #[error("No dependency matches {id} {constraint} for stack {stack}")]
    DependencyNotFound {
        id: String,
        constraint: String,
        stack: String,
    },

    #[error("Dependency {id} {constraint} for stack {stack} is ambiguous: {candidates}")]
    DependencyAmbiguous {
        id: String,
        constraint: String,
        stack: String,
        candidates: String,
    },

    #[error("Invalid version constraint '{constraint}': {reason}")]
    VersionConstraint { constraint: String, reason: String },

    // Fetch errors
    #[error("Failed to fetch {uri}: {reason}")]
    Fetch { uri: String, reason: String },

    #[error("Checksum mismatch for {uri}: expected {expected}, got {actual}")]
    Integrity {
        uri: String,
        expected: String,
        actual: String,
    },

    // Process errors
    #[error("`{command}` exited with {status}\n{output}")]
    Subprocess {
        command: String,
        status: String,
        output: String,
    },

    #[error("Failed to start `{command}`")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unexpected output from `{command}`: {output:?}")]
    UnexpectedOutput { command: String, output: String },

    // Configuration errors
    #[error("Invalid value '{value}' for key '{key}': expected {expected}")]
    ConfigParse {
        key: String,
        value: String,
        expected: String,
    },

    #[error("Invalid checksum '{checksum}': {reason}")]
    InvalidChecksum { checksum: String, reason: String },

    #[error("Invalid buildpack descriptor at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // Wrapping
    #[error("{operation}")]
    Context {
        operation: String,
        #[source]
        source: Box<RustupLayersError>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse failure classes, stable across context wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Resolution,
    Fetch,
    Integrity,
    Subprocess,
    ConfigParse,
    Internal,
}

impl RustupLayersError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Wrap this error with the operation that failed
    pub fn context(self, operation: impl Into<String>) -> Self {
        Self::Context {
            operation: operation.into(),
            source: Box::new(self),
        }
    }

    /// Failure class of the innermost error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Context { source, .. } => source.kind(),
            Self::DependencyNotFound { .. }
            | Self::DependencyAmbiguous { .. }
            | Self::VersionConstraint { .. } => ErrorKind::Resolution,
            Self::Fetch { .. } => ErrorKind::Fetch,
            Self::Integrity { .. } => ErrorKind::Integrity,
            Self::Subprocess { .. } | Self::CommandFailed { .. } | Self::UnexpectedOutput { .. } => {
                ErrorKind::Subprocess
            }
            Self::ConfigParse { .. } | Self::InvalidChecksum { .. } | Self::ConfigInvalid { .. } => {
                ErrorKind::ConfigParse
            }
            Self::Io { .. }
            | Self::Json(_)
            | Self::TomlParse(_)
            | Self::TomlSerialize(_)
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The innermost error, skipping context wrappers
    pub fn root(&self) -> &Self {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Render the error and every wrapped cause, one per line
    pub fn chain(&self) -> String {
        let mut out = self.to_string();
        let mut current: Option<&(dyn std::error::Error + 'static)> =
            std::error::Error::source(self);
        while let Some(cause) = current {
            out.push_str("\n  caused by: ");
            out.push_str(&cause.to_string());
            current = cause.source();
        }
        out
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self.root() {
            Self::DependencyNotFound { .. } => {
                Some("Check BP_RUSTUP_INIT_VERSION and BP_RUSTUP_INIT_LIBC against buildpack.toml")
            }
            Self::Integrity { .. } => {
                Some("The download did not match its checksum; re-run the build to fetch it again")
            }
            Self::ConfigParse { .. } => Some("Boolean options accept true/false, t/f or 1/0"),
            _ => None,
        }
    }
}

/// Attach an operation description to a fallible result
pub trait ResultExt<T> {
    fn context(self, operation: impl Into<String>) -> RustupLayersResult<T>;
}

impl<T> ResultExt<T> for RustupLayersResult<T> {
    fn context(self, operation: impl Into<String>) -> RustupLayersResult<T> {
        self.map_err(|e| e.context(operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = RustupLayersError::ConfigParse {
            key: "BP_RUSTUP_ENABLED".to_string(),
            value: "maybe".to_string(),
            expected: "a boolean".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid value 'maybe' for key 'BP_RUSTUP_ENABLED': expected a boolean"
        );
    }

    #[test]
    fn context_preserves_kind() {
        let err = RustupLayersError::Subprocess {
            command: "rustup check".to_string(),
            status: "exit status: 1".to_string(),
            output: "boom".to_string(),
        }
        .context("querying installed toolchains")
        .context("contributing rust layer");

        assert_eq!(err.kind(), ErrorKind::Subprocess);
        assert_eq!(err.to_string(), "contributing rust layer");
        assert!(err.chain().contains("rustup check"));
        assert!(err.chain().contains("querying installed toolchains"));
    }

    #[test]
    fn error_hint_looks_through_context() {
        let err = RustupLayersError::DependencyNotFound {
            id: "rustup-init-gnu".to_string(),
            constraint: "9.9.9".to_string(),
            stack: "test".to_string(),
        }
        .context("resolving rustup-init");
        assert!(err.hint().unwrap().contains("BP_RUSTUP_INIT_VERSION"));
        assert_eq!(err.kind(), ErrorKind::Resolution);
    }

    #[test]
    fn result_ext_wraps() {
        let result: RustupLayersResult<()> = Err(RustupLayersError::Internal("x".to_string()));
        let err = result.context("doing a thing").unwrap_err();
        assert!(matches!(err, RustupLayersError::Context { .. }));
    }
}
