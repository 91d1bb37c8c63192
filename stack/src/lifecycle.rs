//! Command layer sequencing [`Stack`] operations, bracketed by hooks.
//!
//! Every public operation runs as a [`Phase`]: failures come back wrapped in
//! [`StackError::Phase`] naming the operation that was running.

use log::info;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Result, StackError};
use crate::hooks::{HookEvent, Hooks, Phase};
use crate::stack::Stack;

pub struct Lifecycle {
    stack: Arc<Stack>,
    hooks: Hooks,
}

impl Lifecycle {
    pub fn new(stack: Arc<Stack>, hooks: Hooks) -> Self {
        Self { stack, hooks }
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    fn before(&self, phase: Phase) -> Result<()> {
        self.hooks.fire(self.stack.host(), HookEvent::Before, phase)
    }

    fn after(&self, phase: Phase) -> Result<()> {
        self.hooks.fire(self.stack.host(), HookEvent::After, phase)
    }

    /// Runs `body` between the phase's before and after hooks.
    async fn hooked<T, F>(&self, phase: Phase, body: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.before(phase)?;
        let value = body.await?;
        self.after(phase)?;
        Ok(value)
    }

    async fn phase<T, F>(&self, phase: Phase, body: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        info!("[{}] {}", self.stack.host(), phase);
        body.await.map_err(|source| match source {
            already @ StackError::Phase { .. } => already,
            source => StackError::Phase {
                phase,
                source: Box::new(source),
            },
        })
    }

    async fn stop_webserver_hooked(&self) -> Result<()> {
        self.hooked(Phase::StopWebserver, self.stack.stop_webserver())
            .await
    }

    async fn restart_webserver_hooked(&self) -> Result<()> {
        self.hooked(Phase::RestartWebserver, self.stack.restart_webserver())
            .await
    }

    async fn backup_database_hooked(&self) -> Result<String> {
        self.hooked(Phase::BackupDatabase, self.stack.backup_database())
            .await
    }

    async fn configure_webserver_hooked(&self) -> Result<()> {
        self.hooked(Phase::ConfigureWebserver, self.stack.configure_webserver())
            .await
    }

    /// Provisions the host from scratch. With `skip_packages` the OS,
    /// runtime and precompiler toolchains are assumed to be in place.
    pub async fn install(&self, skip_packages: bool) -> Result<()> {
        self.phase(
            Phase::Install,
            self.hooked(Phase::Install, async {
                self.stop_webserver_hooked().await?;
                if !skip_packages {
                    self.stack.setup_os_dependencies().await?;
                    self.stack.setup_runtime_dependencies().await?;
                    self.stack.setup_precompilers().await?;
                }
                self.stack.init_database().await?;
                self.stack.init_dirs().await?;
                self.stack.upload(true).await?;
                self.stack.migrate_data().await?;
                self.stack.collect_static().await?;
                self.configure_webserver_hooked().await
            }),
        )
        .await
    }

    async fn update_hooked(&self) -> Result<()> {
        self.hooked(Phase::Update, async {
            self.backup_database_hooked().await?;
            self.stack.upload(true).await?;
            self.stack.migrate_data().await?;
            self.stack.collect_static().await?;
            self.restart_webserver_hooked().await
        })
        .await
    }

    pub async fn update(&self) -> Result<()> {
        self.phase(Phase::Update, self.update_hooked()).await
    }

    pub async fn update_code(&self) -> Result<()> {
        self.phase(
            Phase::UpdateCode,
            self.hooked(Phase::UpdateCode, async {
                self.stack.upload(true).await?;
                self.restart_webserver_hooked().await
            }),
        )
        .await
    }

    pub async fn update_dependencies(&self) -> Result<()> {
        self.phase(
            Phase::UpdateDependencies,
            self.stack.update_runtime_dependencies(),
        )
        .await
    }

    pub async fn restart(&self) -> Result<()> {
        self.phase(Phase::RestartWebserver, self.restart_webserver_hooked())
            .await
    }

    pub async fn stop(&self) -> Result<()> {
        self.phase(Phase::StopWebserver, self.stop_webserver_hooked())
            .await
    }

    pub async fn configure_webserver(&self) -> Result<()> {
        self.phase(Phase::ConfigureWebserver, self.configure_webserver_hooked())
            .await
    }

    pub async fn backup_database(&self) -> Result<String> {
        self.phase(Phase::BackupDatabase, self.backup_database_hooked())
            .await
    }

    pub async fn db_snapshot(&self) -> Result<PathBuf> {
        self.phase(Phase::DbSnapshot, self.stack.download_db_dump())
            .await
    }

    pub async fn db_restore(&self) -> Result<()> {
        self.phase(Phase::DbRestore, self.stack.restore_latest_db_dump())
            .await
    }

    pub async fn media_snapshot(&self) -> Result<PathBuf> {
        self.phase(Phase::MediaSnapshot, self.stack.download_media())
            .await
    }

    pub async fn media_restore(&self) -> Result<()> {
        self.phase(Phase::MediaRestore, self.stack.restore_latest_media())
            .await
    }

    pub async fn media_snapshot_local(&self) -> Result<PathBuf> {
        self.phase(Phase::MediaSnapshotLocal, async {
            self.stack.archive_local_media()
        })
        .await
    }

    pub async fn media_restore_local(&self) -> Result<()> {
        self.phase(Phase::MediaRestoreLocal, async {
            self.stack.restore_local_media()
        })
        .await
    }

    /// Media first, then the database.
    pub async fn remote_snapshot(&self) -> Result<()> {
        self.phase(Phase::RemoteSnapshot, async {
            self.stack.download_media().await?;
            self.stack.download_db_dump().await?;
            Ok(())
        })
        .await
    }

    /// Brings the host up to date, then loads the newest local media
    /// archive and database dump into it.
    pub async fn remote_restore(&self) -> Result<()> {
        self.phase(Phase::RemoteRestore, async {
            self.update_hooked().await?;
            self.stack.restore_latest_media().await?;
            self.stack.restore_latest_db_dump().await
        })
        .await
    }

    pub async fn enable_debug(&self) -> Result<()> {
        self.phase(Phase::EnableDebug, self.stack.enable_debug())
            .await
    }

    pub async fn disable_debug(&self) -> Result<()> {
        self.phase(Phase::DisableDebug, self.stack.disable_debug())
            .await
    }

    pub async fn recreate_database(&self) -> Result<()> {
        self.phase(Phase::RecreateDatabase, self.stack.recreate_database())
            .await
    }

    pub async fn enable_ntpd(&self) -> Result<()> {
        self.phase(Phase::EnableNtpd, self.stack.enable_ntpd())
            .await
    }

    pub async fn disable_ntpd(&self) -> Result<()> {
        self.phase(Phase::DisableNtpd, self.stack.disable_ntpd())
            .await
    }

    pub async fn backup(&self, destination: Option<&str>) -> Result<String> {
        self.phase(Phase::Backup, self.stack.backup(destination))
            .await
    }

    pub async fn restore(&self, name: &str, destination: Option<&str>) -> Result<()> {
        self.phase(Phase::Restore, self.stack.restore(name, destination))
            .await
    }

    pub async fn list_backups(&self, destination: Option<&str>) -> Result<Vec<String>> {
        self.phase(Phase::ListBackups, self.stack.list_backups(destination))
            .await
    }

    pub fn list_destinations(&self) -> Vec<String> {
        self.stack.list_destinations()
    }
}
