use common::remote::RemoteError;
use std::fmt;
use thiserror::Error;

use crate::hooks::Phase;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("Attribute is not defined: {0}")]
    Configuration(String),
    #[error("Backup configuration error: {0}")]
    BackupConfiguration(String),
    #[error("Backup execution error: {0}")]
    BackupExecution(String),
    #[error("Unknown {operation} result: {output:?}")]
    UnknownResult { operation: String, output: String },
    #[error("Dependency must be a name or a (name, version) pair, found {0}")]
    InvalidDependency(String),
    #[error("Invalid {field}: {value:?}")]
    InvalidValue { field: String, value: String },
    #[error("Cannot parse version from {0:?}")]
    Version(String),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("{phase} failed: {source}")]
    Phase {
        phase: Phase,
        #[source]
        source: Box<StackError>,
    },
    #[error("Hook for {event} failed: {reason}")]
    Hook { event: String, reason: String },
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl StackError {
    pub fn unknown_result(operation: &str, output: impl fmt::Display) -> Self {
        StackError::UnknownResult {
            operation: operation.to_string(),
            output: output.to_string(),
        }
    }

    pub fn invalid(field: &str, value: &str) -> Self {
        StackError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    /// The innermost error, skipping lifecycle phase wrappers.
    pub fn root(&self) -> &StackError {
        match self {
            StackError::Phase { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, StackError>;
