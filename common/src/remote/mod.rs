//! Remote command execution contract.
//!
//! Everything that touches a target host goes through [`RemoteExecutor`].
//! Commands are built with [`ShellCommand`] and usually issued through a
//! [`Scope`], which carries the working directory, command prefixes and
//! privilege level for a group of calls.

mod command;
mod scope;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

pub use command::{quote, ShellCommand};
pub use scope::{DirOptions, Scope};

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("command `{command}` failed on {host} with exit status {status}: {stderr}")]
    CommandFailed {
        host: String,
        command: String,
        status: i32,
        stderr: String,
    },
    #[error("transfer of {path} failed: {reason}")]
    Transfer { path: String, reason: String },
    #[error("connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Identifier of the target host, used in logs and errors.
    fn host(&self) -> &str;

    /// Runs a command as the connecting user and returns its standard output.
    async fn run(&self, command: &str) -> Result<String, RemoteError>;

    /// Runs a command with privilege escalation, optionally as a specific user.
    async fn run_privileged(&self, command: &str, as_user: Option<&str>)
        -> Result<String, RemoteError>;

    /// Runs a command on the machine driving the deployment.
    async fn run_local(&self, command: &str) -> Result<String, RemoteError>;

    async fn upload_file(&self, local: &Path, remote: &str, privileged: bool)
        -> Result<(), RemoteError>;

    async fn download_file(&self, remote: &str, local: &Path) -> Result<(), RemoteError>;
}
