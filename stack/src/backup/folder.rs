use async_trait::async_trait;
use common::naming::{artifact_name, artifact_pattern};
use common::remote::{DirOptions, RemoteExecutor, Scope, ShellCommand};
use log::info;

use super::{find_single_artifact, BackupManager};
use crate::error::Result;

/// Backs up a remote folder as `<tag>_<kind>_<ts>.tar.gz`.
pub struct FolderBackupManager {
    master_folder: String,
    tag: String,
    kind: String,
}

impl FolderBackupManager {
    pub fn new(master_folder: &str, tag: &str) -> Self {
        Self::with_kind(master_folder, tag, "media")
    }

    pub fn with_kind(master_folder: &str, tag: &str, kind: &str) -> Self {
        Self {
            master_folder: master_folder.trim_end_matches('/').to_string(),
            tag: tag.to_string(),
            kind: kind.to_string(),
        }
    }
}

#[async_trait]
impl BackupManager for FolderBackupManager {
    fn name(&self) -> &str {
        &self.kind
    }

    async fn backup(&self, remote: &dyn RemoteExecutor, temp_folder: &str) -> Result<String> {
        let archive = format!(
            "{}/{}",
            temp_folder.trim_end_matches('/'),
            artifact_name(&self.tag, &self.kind, "tar.gz")
        );
        info!("Archiving {} to {}", self.master_folder, archive);
        Scope::new(remote)
            .sudo()
            .cd(&self.master_folder)
            .run(&ShellCommand::new("tar").arg("-czf").arg(&archive).arg("."))
            .await?;
        Ok(archive)
    }

    async fn restore(&self, remote: &dyn RemoteExecutor, folder: &str) -> Result<()> {
        let pattern = artifact_pattern(&self.tag, &self.kind, "tar.gz")?;
        let file = find_single_artifact(remote, folder, &pattern).await?;
        let archive = format!("{}/{}", folder.trim_end_matches('/'), file);
        info!("Restoring {} from {}", self.master_folder, archive);

        let root = Scope::new(remote).sudo();
        root.dir_ensure(&self.master_folder, &DirOptions::default())
            .await?;
        root.run(
            &ShellCommand::new("tar")
                .arg("-xzf")
                .arg(&archive)
                .arg("-C")
                .arg(&self.master_folder),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StackError;
    use common::remote::testing::RecordingExecutor;

    #[tokio::test]
    async fn backup_archives_the_folder_contents() {
        let remote = RecordingExecutor::new("web1");
        let media = FolderBackupManager::new("/srv/site/media/", "site");

        let archive = media.backup(&remote, "/tmp/backup_site_1").await.unwrap();

        assert!(archive.starts_with("/tmp/backup_site_1/site_media_"));
        assert!(archive.ends_with(".tar.gz"));
        assert_eq!(
            remote.commands(),
            vec![format!("sudo: cd /srv/site/media && tar -czf {} .", archive)]
        );
    }

    #[tokio::test]
    async fn restore_extracts_the_single_match() {
        let remote = RecordingExecutor::new("web1");
        remote.respond(
            "ls -1 /tmp/restore",
            "site_db_20240101_120000000000.sql.gz\nsite_media_20240101_120000000001.tar.gz\n",
        );
        let media = FolderBackupManager::new("/srv/site/media", "site");

        media.restore(&remote, "/tmp/restore").await.unwrap();

        assert_eq!(
            remote.commands().last().unwrap(),
            "sudo: tar -xzf /tmp/restore/site_media_20240101_120000000001.tar.gz -C /srv/site/media"
        );
    }

    #[tokio::test]
    async fn restore_rejects_missing_or_ambiguous_archives() {
        let media = FolderBackupManager::new("/srv/site/media", "site");

        let empty = RecordingExecutor::new("web1");
        empty.respond("ls -1", "site_db_20240101_120000000000.sql.gz\n");
        assert!(matches!(
            media.restore(&empty, "/tmp/restore").await,
            Err(StackError::BackupExecution(_))
        ));

        let ambiguous = RecordingExecutor::new("web1");
        ambiguous.respond(
            "ls -1",
            "site_media_20240101_120000000000.tar.gz\nsite_media_20240102_120000000000.tar.gz\n",
        );
        assert!(matches!(
            media.restore(&ambiguous, "/tmp/restore").await,
            Err(StackError::BackupExecution(_))
        ));
        assert!(ambiguous.position("tar -xzf").is_none());
    }
}
