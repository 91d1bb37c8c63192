use async_trait::async_trait;
use common::remote::{DirOptions, RemoteExecutor, Scope, ShellCommand};
use log::info;
use stack::backup::BackupStorage;
use stack::Result;

use crate::error::StorageError;
use crate::providers::file_name;

/// Keeps archives in a folder on the target host itself.
pub struct ServerStorage {
    folder: String,
}

impl ServerStorage {
    pub fn new(folder: &str) -> Self {
        Self {
            folder: folder.trim_end_matches('/').to_string(),
        }
    }

    fn path(&self, name: &str) -> String {
        format!("{}/{}", self.folder, name)
    }
}

#[async_trait]
impl BackupStorage for ServerStorage {
    fn describe(&self) -> String {
        format!("server folder {}", self.folder)
    }

    async fn save(&self, remote: &dyn RemoteExecutor, file: &str) -> Result<()> {
        let root = Scope::new(remote).sudo();
        root.dir_ensure(&self.folder, &DirOptions::default()).await?;
        let target = self.path(file_name(file));
        info!("Copying {} to {}", file, target);
        root.run(&ShellCommand::new("cp").arg(file).arg(&target))
            .await?;
        Ok(())
    }

    async fn list(&self, remote: &dyn RemoteExecutor) -> Result<Vec<String>> {
        let scope = Scope::new(remote).sudo();
        if !scope.dir_exists(&self.folder).await? {
            return Ok(Vec::new());
        }
        let mut names = scope.list_dir(&self.folder).await?;
        names.sort();
        Ok(names)
    }

    async fn get(&self, remote: &dyn RemoteExecutor, name: &str, destination: &str) -> Result<String> {
        let root = Scope::new(remote).sudo();
        let source = self.path(name);
        if !root.file_exists(&source).await? {
            return Err(StorageError::NotFound(format!("{}:{}", remote.host(), source)).into());
        }
        let target = format!("{}/{}", destination.trim_end_matches('/'), name);
        root.run(&ShellCommand::new("cp").arg(&source).arg(&target))
            .await?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::remote::testing::RecordingExecutor;
    use stack::StackError;

    #[tokio::test]
    async fn save_copies_into_the_folder() {
        let storage = ServerStorage::new("/var/backups/site/");
        let remote = RecordingExecutor::new("web1");

        storage.save(&remote, "/tmp/backup_site_1.tar.gz").await.unwrap();

        assert_eq!(
            remote.commands(),
            vec![
                "sudo: mkdir -p /var/backups/site",
                "sudo: cp /tmp/backup_site_1.tar.gz /var/backups/site/backup_site_1.tar.gz",
            ]
        );
    }

    #[tokio::test]
    async fn list_is_sorted_and_empty_without_folder() {
        let storage = ServerStorage::new("/var/backups/site");
        let remote = RecordingExecutor::new("web1");
        assert!(storage.list(&remote).await.unwrap().is_empty());

        remote.respond("test -d", "OK");
        remote.respond("ls -1", "backup_site_2.tar.gz\nbackup_site_1.tar.gz\n");
        assert_eq!(
            storage.list(&remote).await.unwrap(),
            vec!["backup_site_1.tar.gz", "backup_site_2.tar.gz"]
        );
    }

    #[tokio::test]
    async fn get_requires_the_archive() {
        let storage = ServerStorage::new("/var/backups/site");
        let remote = RecordingExecutor::new("web1");

        let missing = storage.get(&remote, "backup_site_1.tar.gz", "/tmp").await;
        assert!(matches!(missing, Err(StackError::BackupExecution(_))));

        remote.respond("test -f", "OK");
        let path = storage.get(&remote, "backup_site_1.tar.gz", "/tmp").await.unwrap();
        assert_eq!(path, "/tmp/backup_site_1.tar.gz");
        assert_eq!(
            remote.commands().last().unwrap(),
            "sudo: cp /var/backups/site/backup_site_1.tar.gz /tmp/backup_site_1.tar.gz"
        );
    }
}
