use async_trait::async_trait;
use common::remote::{RemoteExecutor, Scope, ShellCommand};
use log::info;
use tokio::sync::OnceCell;

use super::{CreateStatus, DatabaseManager};
use crate::error::Result;
use crate::version::{parse_short_version, parse_version};

/// A single-file database. There is no server, so users, grants and
/// network access are no-ops and the database always exists.
pub struct SqliteManager {
    dbfile: String,
    backup_folder: String,
    version: OnceCell<String>,
}

impl SqliteManager {
    pub fn new(dbfile: &str) -> Self {
        Self {
            dbfile: dbfile.to_string(),
            backup_folder: "/tmp".to_string(),
            version: OnceCell::new(),
        }
    }

    /// Folder for dumps when the caller names none.
    pub fn with_backup_folder(mut self, folder: &str) -> Self {
        self.backup_folder = folder.to_string();
        self
    }

    pub fn dbfile(&self) -> &str {
        &self.dbfile
    }
}

#[async_trait]
impl DatabaseManager for SqliteManager {
    async fn create_user(&self, _remote: &dyn RemoteExecutor) -> Result<()> {
        Ok(())
    }

    async fn create_database(
        &self,
        remote: &dyn RemoteExecutor,
        delete_if_exists: bool,
    ) -> Result<CreateStatus> {
        if delete_if_exists {
            self.drop_database(remote).await?;
            return Ok(CreateStatus::Created);
        }
        Ok(CreateStatus::AlreadyExists)
    }

    async fn drop_database(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        if self.dbfile.is_empty() {
            return Ok(());
        }
        info!("Removing sqlite database {}", self.dbfile);
        Scope::new(remote).sudo().file_delete(&self.dbfile).await?;
        Ok(())
    }

    async fn database_exists(&self, _remote: &dyn RemoteExecutor) -> Result<bool> {
        Ok(true)
    }

    async fn configure(&self, _remote: &dyn RemoteExecutor, _enable_remote_access: bool) -> Result<()> {
        Ok(())
    }

    async fn backup_database(
        &self,
        remote: &dyn RemoteExecutor,
        file_name: &str,
        zip: bool,
        folder: Option<&str>,
    ) -> Result<String> {
        let folder = folder.unwrap_or(self.backup_folder.as_str());
        let path = format!("{}/{}", folder.trim_end_matches('/'), file_name);
        let cmd = if zip {
            ShellCommand::new("gzip").arg("-c").arg(&self.dbfile).redirect_to(&path)
        } else {
            ShellCommand::new("cp").arg(&self.dbfile).arg(&path)
        };
        Scope::new(remote).sudo().run(&cmd).await?;
        Ok(path)
    }

    async fn init_database(
        &self,
        remote: &dyn RemoteExecutor,
        sql_file: &str,
        _delete_if_exists: bool,
        unzip: bool,
    ) -> Result<()> {
        let cmd = if unzip {
            ShellCommand::new("gunzip").arg("-c").arg(sql_file).redirect_to(&self.dbfile)
        } else {
            ShellCommand::new("cp").arg(sql_file).arg(&self.dbfile)
        };
        Scope::new(remote).sudo().run(&cmd).await?;
        Ok(())
    }

    async fn version(&self, remote: &dyn RemoteExecutor) -> Result<String> {
        self.version
            .get_or_try_init(|| async {
                let output = Scope::new(remote)
                    .run(&ShellCommand::new("sqlite3").arg("-version"))
                    .await?;
                parse_version(&output)
            })
            .await
            .cloned()
    }

    async fn short_version(&self, remote: &dyn RemoteExecutor) -> Result<String> {
        parse_short_version(&self.version(remote).await?)
    }
}
