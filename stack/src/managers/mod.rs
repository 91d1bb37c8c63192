//! Capability contracts and their concrete backends.
//!
//! Managers receive the [`RemoteExecutor`] on every call and keep no
//! reference to the stack that owns them.

pub mod apache;
pub mod django;
pub mod git;
pub mod gunicorn;
pub mod nginx;
pub mod python;
pub mod sqlite;
pub mod supervisord;
pub mod tornado;
pub mod ubuntu;

use async_trait::async_trait;
use common::remote::{RemoteExecutor, ShellCommand};
use std::collections::BTreeMap;
use std::path::Path;

use crate::dependency::Dependency;
use crate::error::Result;

#[async_trait]
pub trait OsPackageManager: Send + Sync {
    /// Installs every declared package; installed packages are left alone.
    async fn setup_dependencies(&self, remote: &dyn RemoteExecutor) -> Result<()>;
    async fn refresh_sources(&self, remote: &dyn RemoteExecutor) -> Result<()>;
    async fn enable_ntpd(&self, remote: &dyn RemoteExecutor) -> Result<()>;
    async fn disable_ntpd(&self, remote: &dyn RemoteExecutor) -> Result<()>;
}

#[async_trait]
pub trait RuntimeManager: Send + Sync {
    /// Creates the isolated environment. An existing one is only recreated
    /// when `delete_if_exists` is set.
    async fn init(
        &self,
        remote: &dyn RemoteExecutor,
        delete_if_exists: bool,
        search_path: &str,
    ) -> Result<()>;
    async fn setup_dependencies(&self, remote: &dyn RemoteExecutor) -> Result<()>;
    async fn version(&self, remote: &dyn RemoteExecutor) -> Result<String>;
    async fn short_version(&self, remote: &dyn RemoteExecutor) -> Result<String>;
    /// Root of the isolated environment, if one is used.
    fn environment_dir(&self) -> Option<String>;
    /// Command that activates the environment for subsequent commands.
    fn activation(&self) -> Option<ShellCommand>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateStatus {
    Created,
    AlreadyExists,
}

#[async_trait]
pub trait DatabaseManager: Send + Sync {
    async fn create_user(&self, remote: &dyn RemoteExecutor) -> Result<()>;
    async fn create_database(
        &self,
        remote: &dyn RemoteExecutor,
        delete_if_exists: bool,
    ) -> Result<CreateStatus>;
    async fn drop_database(&self, remote: &dyn RemoteExecutor) -> Result<()>;
    async fn database_exists(&self, remote: &dyn RemoteExecutor) -> Result<bool>;
    async fn configure(&self, remote: &dyn RemoteExecutor, enable_remote_access: bool)
        -> Result<()>;
    /// Dumps the database to `folder/file_name` and returns the full path.
    async fn backup_database(
        &self,
        remote: &dyn RemoteExecutor,
        file_name: &str,
        zip: bool,
        folder: Option<&str>,
    ) -> Result<String>;
    /// Creates the database and loads `sql_file` into it.
    async fn init_database(
        &self,
        remote: &dyn RemoteExecutor,
        sql_file: &str,
        delete_if_exists: bool,
        unzip: bool,
    ) -> Result<()>;
    async fn version(&self, remote: &dyn RemoteExecutor) -> Result<String>;
    async fn short_version(&self, remote: &dyn RemoteExecutor) -> Result<String>;
}

/// Anything with a start/stop lifecycle on the target host.
#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &str;
    /// Installs the service definition.
    async fn setup(&self, _remote: &dyn RemoteExecutor) -> Result<()> {
        Ok(())
    }
    async fn start(&self, remote: &dyn RemoteExecutor) -> Result<()>;
    async fn stop(&self, remote: &dyn RemoteExecutor) -> Result<()>;
    async fn restart(&self, remote: &dyn RemoteExecutor) -> Result<()>;
    async fn is_running(&self, remote: &dyn RemoteExecutor) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebServerKind {
    Nginx,
    Apache,
}

#[async_trait]
pub trait WebServer: Service {
    fn kind(&self) -> WebServerKind;
    fn sites_dir(&self) -> &str;
    fn user(&self) -> &str;
    fn group(&self) -> &str;
    /// Writes `config` as site `name`. With `delete_other_sites` every other
    /// enabled site is removed first.
    async fn create_website(
        &self,
        remote: &dyn RemoteExecutor,
        name: &str,
        config: &str,
        delete_other_sites: bool,
    ) -> Result<()>;
}

#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Archives the working tree and, optionally, its submodules into
    /// `destination`. Returns relative module path to archive file name.
    async fn local_archive(
        &self,
        remote: &dyn RemoteExecutor,
        destination: &Path,
        include_submodules: bool,
    ) -> Result<BTreeMap<String, String>>;
}

#[async_trait]
pub trait Precompiler: Send + Sync {
    fn os_dependencies(&self) -> Vec<Dependency>;
    fn runtime_dependencies(&self) -> Vec<Dependency>;
    async fn setup(&self, remote: &dyn RemoteExecutor) -> Result<()>;
    /// Compiles `root/<from>` into `root/<to>`.
    async fn compile(&self, remote: &dyn RemoteExecutor, root: &str) -> Result<()>;
}

#[async_trait]
pub trait ApplicationManager: Send + Sync {
    fn project_name(&self) -> &str;
    fn media_root(&self) -> &str;
    /// Creates the remote directory layout and runtime hooks.
    async fn init(&self, remote: &dyn RemoteExecutor) -> Result<()>;
    /// Hooks the application settings into the runtime environment.
    async fn configure_runtime(&self, remote: &dyn RemoteExecutor) -> Result<()>;
    async fn upload_code(&self, remote: &dyn RemoteExecutor, update_submodules: bool)
        -> Result<()>;
    async fn migrate_data(&self, remote: &dyn RemoteExecutor) -> Result<()>;
    async fn collect_static(&self, remote: &dyn RemoteExecutor) -> Result<()>;
    async fn manage(&self, remote: &dyn RemoteExecutor, args: &[&str]) -> Result<String>;
    /// Rewrites the debug flag in the settings file; returns replaced lines.
    async fn set_debug(&self, remote: &dyn RemoteExecutor, debug: bool) -> Result<usize>;
    /// Writes the application server entry point.
    async fn configure_wsgi(&self, remote: &dyn RemoteExecutor) -> Result<()>;
    fn web_server_config(&self, kind: WebServerKind) -> Result<String>;
}

/// Shared implementation of `service <name> start|stop|restart|status`.
pub(crate) async fn init_service(
    remote: &dyn RemoteExecutor,
    service: &str,
    action: &str,
) -> Result<String> {
    let scope = common::remote::Scope::new(remote).sudo();
    let mut cmd = ShellCommand::new("service").arg(service).arg(action);
    if action == "status" {
        cmd = cmd.or_true();
    }
    Ok(scope.run(&cmd).await?)
}
