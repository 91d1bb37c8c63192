use async_trait::async_trait;
use common::remote::{RemoteExecutor, Scope};
use log::info;
use stack::backup::BackupStorage;
use stack::Result;
use std::path::{Path, PathBuf};

use crate::error::StorageError;
use crate::providers::file_name;

/// Keeps archives in a folder on the machine running the deployment.
pub struct ClientStorage {
    folder: PathBuf,
}

impl ClientStorage {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }
}

#[async_trait]
impl BackupStorage for ClientStorage {
    fn describe(&self) -> String {
        format!("local folder {}", self.folder.display())
    }

    async fn save(&self, remote: &dyn RemoteExecutor, file: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.folder).await?;
        let local = self.folder.join(file_name(file));
        info!("Downloading {} to {}", file, local.display());
        Scope::new(remote).download(file, &local).await?;
        Ok(())
    }

    async fn list(&self, _remote: &dyn RemoteExecutor) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.folder).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn get(&self, remote: &dyn RemoteExecutor, name: &str, destination: &str) -> Result<String> {
        let local = self.folder.join(name);
        if !tokio::fs::try_exists(&local).await? {
            return Err(StorageError::NotFound(local.display().to_string()).into());
        }
        let target = format!("{}/{}", destination.trim_end_matches('/'), name);
        info!("Uploading {} to {}", local.display(), target);
        Scope::new(remote).upload(&local, &target).await?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::remote::testing::RecordingExecutor;
    use stack::StackError;

    #[tokio::test]
    async fn saves_by_downloading_into_the_folder() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ClientStorage::new(dir.path().join("archives"));
        let remote = RecordingExecutor::new("web1");
        remote.put_file("/tmp/backup_site_1.tar.gz", "archive");

        storage.save(&remote, "/tmp/backup_site_1.tar.gz").await.unwrap();

        let saved = std::fs::read_to_string(dir.path().join("archives/backup_site_1.tar.gz")).unwrap();
        assert_eq!(saved, "archive");
        assert_eq!(remote.commands(), vec!["get: /tmp/backup_site_1.tar.gz"]);
    }

    #[tokio::test]
    async fn lists_sorted_and_tolerates_a_missing_folder() {
        let dir = tempfile::tempdir().unwrap();
        let remote = RecordingExecutor::new("web1");
        assert!(ClientStorage::new(dir.path().join("nothing"))
            .list(&remote)
            .await
            .unwrap()
            .is_empty());

        std::fs::write(dir.path().join("backup_site_20240102_000000000000.tar.gz"), "").unwrap();
        std::fs::write(dir.path().join("backup_site_20240101_000000000000.tar.gz"), "").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let names = ClientStorage::new(dir.path()).list(&remote).await.unwrap();
        assert_eq!(
            names,
            vec![
                "backup_site_20240101_000000000000.tar.gz",
                "backup_site_20240102_000000000000.tar.gz",
            ]
        );
    }

    #[tokio::test]
    async fn get_uploads_to_the_destination() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("backup_site_1.tar.gz"), "archive").unwrap();
        let storage = ClientStorage::new(dir.path());
        let remote = RecordingExecutor::new("web1");

        let path = storage.get(&remote, "backup_site_1.tar.gz", "/tmp/").await.unwrap();

        assert_eq!(path, "/tmp/backup_site_1.tar.gz");
        assert_eq!(remote.file(&path).unwrap(), "archive");

        let missing = storage.get(&remote, "backup_site_2.tar.gz", "/tmp").await;
        assert!(matches!(missing, Err(StackError::BackupExecution(_))));
    }
}
