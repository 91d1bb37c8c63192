//! Snapshot producers ([`BackupManager`]) and persistence targets
//! ([`BackupStorage`]).

pub mod database;
pub mod folder;

use async_trait::async_trait;
use common::remote::{RemoteExecutor, Scope};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Result, StackError};

pub use database::DatabaseBackupManager;
pub use folder::FolderBackupManager;

/// One backup-able resource of a stack.
#[async_trait]
pub trait BackupManager: Send + Sync {
    fn name(&self) -> &str;
    /// Writes a uniquely named artifact into `temp_folder`, returns its path.
    async fn backup(&self, remote: &dyn RemoteExecutor, temp_folder: &str) -> Result<String>;
    /// Restores from the single artifact in `folder` matching this manager.
    async fn restore(&self, remote: &dyn RemoteExecutor, folder: &str) -> Result<()>;
}

/// Where aggregate backup archives are kept.
#[async_trait]
pub trait BackupStorage: Send + Sync {
    fn describe(&self) -> String;
    /// Persists the remote file `file`.
    async fn save(&self, remote: &dyn RemoteExecutor, file: &str) -> Result<()>;
    /// Stored artifact names, sorted lexically (oldest first).
    async fn list(&self, remote: &dyn RemoteExecutor) -> Result<Vec<String>>;
    /// Places artifact `name` on the remote host under `destination` and
    /// returns the resulting path.
    async fn get(&self, remote: &dyn RemoteExecutor, name: &str, destination: &str)
        -> Result<String>;
}

/// Named backup destinations with an optional default.
#[derive(Clone, Default)]
pub struct BackupPlan {
    destinations: BTreeMap<String, Arc<dyn BackupStorage>>,
    default: Option<String>,
}

impl BackupPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_destination(mut self, name: &str, storage: Arc<dyn BackupStorage>) -> Self {
        self.destinations.insert(name.to_string(), storage);
        self
    }

    pub fn with_default(mut self, name: &str) -> Self {
        self.default = Some(name.to_string());
        self
    }

    pub fn default_destination(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub fn resolve(&self, destination: Option<&str>) -> Result<Arc<dyn BackupStorage>> {
        let name = match destination {
            Some(name) => name,
            None => self.default.as_deref().ok_or_else(|| {
                StackError::BackupConfiguration(
                    "no destination given and no default backup storage is configured".into(),
                )
            })?,
        };
        self.destinations
            .get(name)
            .cloned()
            .ok_or_else(|| StackError::BackupConfiguration(format!("unknown destination {}", name)))
    }

    /// Destination names, the default one marked.
    pub fn describe(&self) -> Vec<String> {
        self.destinations
            .iter()
            .map(|(name, storage)| {
                if self.default.as_deref() == Some(name.as_str()) {
                    format!("{} (default): {}", name, storage.describe())
                } else {
                    format!("{}: {}", name, storage.describe())
                }
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }
}

/// The one entry of `folder` matching `pattern`. No match or several
/// matches are both execution errors.
pub async fn find_single_artifact(
    remote: &dyn RemoteExecutor,
    folder: &str,
    pattern: &Regex,
) -> Result<String> {
    let mut matches = Scope::new(remote).sudo().ls_re(folder, pattern).await?;
    match matches.len() {
        1 => Ok(matches.remove(0)),
        0 => Err(StackError::BackupExecution(format!(
            "no file matching {} in {}",
            pattern, folder
        ))),
        n => Err(StackError::BackupExecution(format!(
            "{} files match {} in {}, expected one",
            n, pattern, folder
        ))),
    }
}
