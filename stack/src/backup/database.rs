use async_trait::async_trait;
use common::naming::{artifact_name, artifact_pattern};
use common::remote::RemoteExecutor;
use std::sync::Arc;

use super::{find_single_artifact, BackupManager};
use crate::error::Result;
use crate::managers::DatabaseManager;

/// Database snapshots as gzipped dumps named `<tag>_db_<ts>.sql.gz`,
/// for any [`DatabaseManager`].
pub struct DatabaseBackupManager {
    database: Arc<dyn DatabaseManager>,
    tag: String,
}

impl DatabaseBackupManager {
    pub const KIND: &'static str = "db";
    pub const EXTENSION: &'static str = "sql.gz";

    pub fn new(database: Arc<dyn DatabaseManager>, tag: &str) -> Self {
        Self {
            database,
            tag: tag.to_string(),
        }
    }
}

#[async_trait]
impl BackupManager for DatabaseBackupManager {
    fn name(&self) -> &str {
        "database"
    }

    async fn backup(&self, remote: &dyn RemoteExecutor, temp_folder: &str) -> Result<String> {
        let file_name = artifact_name(&self.tag, Self::KIND, Self::EXTENSION);
        self.database
            .backup_database(remote, &file_name, true, Some(temp_folder))
            .await
    }

    async fn restore(&self, remote: &dyn RemoteExecutor, folder: &str) -> Result<()> {
        let pattern = artifact_pattern(&self.tag, Self::KIND, Self::EXTENSION)?;
        let file = find_single_artifact(remote, folder, &pattern).await?;
        let dump = format!("{}/{}", folder.trim_end_matches('/'), file);
        self.database.init_database(remote, &dump, true, true).await
    }
}
