//! The deployment target: one manager per capability plus backup wiring.

use common::naming::{artifact_name, latest, timestamp_str};
use common::remote::{DirOptions, RemoteExecutor, Scope, ShellCommand};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{info, warn};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backup::{BackupManager, BackupPlan, DatabaseBackupManager};
use crate::error::{Result, StackError};
use crate::managers::{
    ApplicationManager, DatabaseManager, OsPackageManager, Precompiler, RuntimeManager, Service,
    WebServer,
};

const DEFAULT_TEMP_DIR: &str = "/tmp";
const MEDIA_KIND: &str = "media";
const ARCHIVE_EXT: &str = "tar.gz";

pub struct Stack {
    remote: Arc<dyn RemoteExecutor>,
    project_name: String,
    os: Arc<dyn OsPackageManager>,
    runtime: Arc<dyn RuntimeManager>,
    database: Arc<dyn DatabaseManager>,
    webserver: Arc<dyn WebServer>,
    app: Arc<dyn ApplicationManager>,
    services: Vec<Arc<dyn Service>>,
    precompilers: Vec<Arc<dyn Precompiler>>,
    backup_managers: Vec<Arc<dyn BackupManager>>,
    backup_plan: BackupPlan,
    runtime_search_path: String,
    local_media_root: PathBuf,
    local_db_dump_dir: PathBuf,
    local_media_dump_dir: PathBuf,
    remote_backup_dir: Option<String>,
    temp_dir: String,
}

/// Assembles a [`Stack`]; `build` names the first missing attribute.
#[derive(Default)]
pub struct StackBuilder {
    project_name: Option<String>,
    remote: Option<Arc<dyn RemoteExecutor>>,
    os: Option<Arc<dyn OsPackageManager>>,
    runtime: Option<Arc<dyn RuntimeManager>>,
    database: Option<Arc<dyn DatabaseManager>>,
    webserver: Option<Arc<dyn WebServer>>,
    app: Option<Arc<dyn ApplicationManager>>,
    services: Vec<Arc<dyn Service>>,
    precompilers: Vec<Arc<dyn Precompiler>>,
    backup_managers: Vec<Arc<dyn BackupManager>>,
    backup_plan: BackupPlan,
    runtime_search_path: Option<String>,
    local_media_root: Option<PathBuf>,
    local_backup_dir: Option<PathBuf>,
    remote_backup_dir: Option<String>,
    temp_dir: Option<String>,
}

impl StackBuilder {
    pub fn new(project_name: &str) -> Self {
        Self {
            project_name: Some(project_name.to_string()),
            ..Default::default()
        }
    }

    pub fn remote(mut self, remote: Arc<dyn RemoteExecutor>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn os(mut self, os: Arc<dyn OsPackageManager>) -> Self {
        self.os = Some(os);
        self
    }

    pub fn runtime(mut self, runtime: Arc<dyn RuntimeManager>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn database(mut self, database: Arc<dyn DatabaseManager>) -> Self {
        self.database = Some(database);
        self
    }

    pub fn webserver(mut self, webserver: Arc<dyn WebServer>) -> Self {
        self.webserver = Some(webserver);
        self
    }

    pub fn app(mut self, app: Arc<dyn ApplicationManager>) -> Self {
        self.app = Some(app);
        self
    }

    pub fn service(mut self, service: Arc<dyn Service>) -> Self {
        self.services.push(service);
        self
    }

    pub fn precompiler(mut self, precompiler: Arc<dyn Precompiler>) -> Self {
        self.precompilers.push(precompiler);
        self
    }

    pub fn backup_manager(mut self, manager: Arc<dyn BackupManager>) -> Self {
        self.backup_managers.push(manager);
        self
    }

    pub fn backup_plan(mut self, plan: BackupPlan) -> Self {
        self.backup_plan = plan;
        self
    }

    /// Extra module search path given to the runtime environment.
    pub fn runtime_search_path(mut self, path: &str) -> Self {
        self.runtime_search_path = Some(path.to_string());
        self
    }

    pub fn local_media_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_media_root = Some(path.into());
        self
    }

    /// Local directory holding `db_dump/` and `media_dump/`.
    pub fn local_backup_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_backup_dir = Some(path.into());
        self
    }

    pub fn remote_backup_dir(mut self, dir: Option<String>) -> Self {
        self.remote_backup_dir = dir;
        self
    }

    pub fn temp_dir(mut self, dir: &str) -> Self {
        self.temp_dir = Some(dir.trim_end_matches('/').to_string());
        self
    }

    pub fn build(self) -> Result<Stack> {
        fn required<T>(value: Option<T>, attr: &str) -> Result<T> {
            value.ok_or_else(|| StackError::Configuration(attr.to_string()))
        }

        let project_name = required(self.project_name, "project_name")?;
        let remote = required(self.remote, "remote")?;
        let os = required(self.os, "os")?;
        let runtime = required(self.runtime, "runtime")?;
        let database = required(self.database, "database")?;
        let webserver = required(self.webserver, "webserver")?;
        let app = required(self.app, "app")?;
        let runtime_search_path = required(self.runtime_search_path, "runtime_search_path")?;
        let local_media_root = required(self.local_media_root, "local_media_root")?;
        let local_backup_dir = required(self.local_backup_dir, "local_backup_dir")?;

        Ok(Stack {
            remote,
            project_name,
            os,
            runtime,
            database,
            webserver,
            app,
            services: self.services,
            precompilers: self.precompilers,
            backup_managers: self.backup_managers,
            backup_plan: self.backup_plan,
            runtime_search_path,
            local_media_root,
            local_db_dump_dir: local_backup_dir.join("db_dump"),
            local_media_dump_dir: local_backup_dir.join("media_dump"),
            remote_backup_dir: self.remote_backup_dir,
            temp_dir: self.temp_dir.unwrap_or_else(|| DEFAULT_TEMP_DIR.to_string()),
        })
    }
}

impl Stack {
    pub fn builder(project_name: &str) -> StackBuilder {
        StackBuilder::new(project_name)
    }

    pub fn host(&self) -> &str {
        self.remote.host()
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    fn remote(&self) -> &dyn RemoteExecutor {
        self.remote.as_ref()
    }

    fn scope(&self) -> Scope<'_> {
        Scope::new(self.remote())
    }

    fn db_dump_name(&self) -> String {
        artifact_name(&self.project_name, DatabaseBackupManager::KIND, DatabaseBackupManager::EXTENSION)
    }

    fn media_dump_name(&self) -> String {
        artifact_name(&self.project_name, MEDIA_KIND, ARCHIVE_EXT)
    }

    pub async fn setup_os_dependencies(&self) -> Result<()> {
        self.os.refresh_sources(self.remote()).await?;
        self.os.setup_dependencies(self.remote()).await
    }

    pub async fn setup_runtime_dependencies(&self) -> Result<()> {
        self.runtime
            .init(self.remote(), false, &self.runtime_search_path)
            .await?;
        self.runtime.setup_dependencies(self.remote()).await?;
        self.app.configure_runtime(self.remote()).await
    }

    pub async fn setup_precompilers(&self) -> Result<()> {
        for precompiler in &self.precompilers {
            precompiler.setup(self.remote()).await?;
        }
        Ok(())
    }

    pub async fn init_database(&self) -> Result<()> {
        self.database.configure(self.remote(), true).await?;
        self.database.create_user(self.remote()).await?;
        self.database.create_database(self.remote(), false).await?;
        Ok(())
    }

    pub async fn init_dirs(&self) -> Result<()> {
        self.app.init(self.remote()).await
    }

    pub async fn upload(&self, update_submodules: bool) -> Result<()> {
        self.app.upload_code(self.remote(), update_submodules).await
    }

    pub async fn migrate_data(&self) -> Result<()> {
        self.app.migrate_data(self.remote()).await
    }

    pub async fn collect_static(&self) -> Result<()> {
        self.app.collect_static(self.remote()).await
    }

    /// Web server first, then the background services in declaration order.
    pub async fn start_webserver(&self) -> Result<()> {
        self.webserver.start(self.remote()).await?;
        for service in &self.services {
            service.start(self.remote()).await?;
        }
        Ok(())
    }

    pub async fn stop_webserver(&self) -> Result<()> {
        self.webserver.stop(self.remote()).await?;
        for service in &self.services {
            service.stop(self.remote()).await?;
        }
        Ok(())
    }

    pub async fn restart_webserver(&self) -> Result<()> {
        self.webserver.restart(self.remote()).await?;
        for service in &self.services {
            service.restart(self.remote()).await?;
        }
        Ok(())
    }

    /// Stops everything, writes the entry point and site, installs the
    /// service definitions and starts everything again.
    pub async fn configure_webserver(&self) -> Result<()> {
        self.stop_webserver().await?;
        self.app.configure_wsgi(self.remote()).await?;
        let site = self.app.web_server_config(self.webserver.kind())?;
        self.webserver
            .create_website(self.remote(), &self.project_name, &site, false)
            .await?;
        self.webserver.setup(self.remote()).await?;
        for service in &self.services {
            service.setup(self.remote()).await?;
        }
        self.start_webserver().await
    }

    /// Dumps the database next to the server's other backups.
    pub async fn backup_database(&self) -> Result<String> {
        let name = self.db_dump_name();
        info!("Backing up database of {} as {}", self.project_name, name);
        self.database
            .backup_database(self.remote(), &name, true, self.remote_backup_dir.as_deref())
            .await
    }

    /// Dumps the database on the server and fetches it into the local dump folder.
    pub async fn download_db_dump(&self) -> Result<PathBuf> {
        let name = self.db_dump_name();
        self.scope()
            .sudo()
            .dir_ensure(&self.temp_dir, &DirOptions::default().mode("777"))
            .await?;
        let remote_path = self
            .database
            .backup_database(self.remote(), &name, true, Some(&self.temp_dir))
            .await?;

        std::fs::create_dir_all(&self.local_db_dump_dir)?;
        let local_path = self.local_db_dump_dir.join(&name);
        self.scope().download(&remote_path, &local_path).await?;
        self.scope().sudo().file_delete(&remote_path).await?;
        info!("Database dump saved to {}", local_path.display());
        Ok(local_path)
    }

    pub fn latest_db_dump(&self) -> Result<String> {
        latest_local_artifact(
            &self.local_db_dump_dir,
            &format!("{}_{}_", self.project_name, DatabaseBackupManager::KIND),
            &format!(".{}", DatabaseBackupManager::EXTENSION),
        )
    }

    /// Loads the newest local dump into a recreated database and migrates.
    pub async fn restore_latest_db_dump(&self) -> Result<()> {
        let basename = self.latest_db_dump()?;
        let home = self.scope().home().await?;
        let remote_path = format!("{}/{}", home, basename);
        info!("Restoring database from {}", basename);

        let result = async {
            self.scope()
                .upload(&self.local_db_dump_dir.join(&basename), &remote_path)
                .await?;
            self.database
                .init_database(self.remote(), &remote_path, true, true)
                .await?;
            self.app.migrate_data(self.remote()).await
        }
        .await;
        let cleanup = self.scope().sudo().file_delete(&remote_path).await;
        settle(result, cleanup.map_err(StackError::from), &remote_path)
    }

    /// Archives the remote media folder and fetches it into the local dump folder.
    pub async fn download_media(&self) -> Result<PathBuf> {
        let name = self.media_dump_name();
        let home = self.scope().home().await?;
        let remote_path = format!("{}/{}", home, name);

        self.scope()
            .cd(self.app.media_root())
            .run(&ShellCommand::new("tar").arg("-czf").arg(&remote_path).arg("."))
            .await?;
        self.scope().file_attribs(&remote_path, "777").await?;

        std::fs::create_dir_all(&self.local_media_dump_dir)?;
        let local_path = self.local_media_dump_dir.join(&name);
        self.scope().download(&remote_path, &local_path).await?;
        self.scope().sudo().file_delete(&remote_path).await?;
        info!("Media archive saved to {}", local_path.display());
        Ok(local_path)
    }

    /// Archives the local media folder into the local dump folder.
    pub fn archive_local_media(&self) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.local_media_dump_dir)?;
        let archive = self.local_media_dump_dir.join(self.media_dump_name());
        info!(
            "Archiving {} to {}",
            self.local_media_root.display(),
            archive.display()
        );

        let encoder = GzEncoder::new(File::create(&archive)?, Compression::default());
        let mut tar = tar::Builder::new(encoder);
        tar.append_dir_all(".", &self.local_media_root)?;
        tar.into_inner()?.finish()?;
        Ok(archive)
    }

    pub fn latest_media_dump(&self) -> Result<String> {
        latest_local_artifact(
            &self.local_media_dump_dir,
            &format!("{}_{}_", self.project_name, MEDIA_KIND),
            &format!(".{}", ARCHIVE_EXT),
        )
    }

    /// Uploads the newest local media archive and extracts it over the
    /// remote media folder.
    pub async fn restore_latest_media(&self) -> Result<()> {
        let basename = self.latest_media_dump()?;
        let media_root = self.app.media_root();
        let remote_path = format!("{}/{}", media_root.trim_end_matches('/'), basename);
        info!("Restoring media from {}", basename);

        let root = self.scope().sudo();
        root.upload(&self.local_media_dump_dir.join(&basename), &remote_path)
            .await?;
        root.cd(media_root)
            .run(&ShellCommand::new("tar").arg("-xzf").arg(&remote_path))
            .await?;
        root.dir_attribs(media_root, &DirOptions::recursive().mode("777"))
            .await?;
        root.file_delete(&remote_path).await?;
        Ok(())
    }

    /// Replaces the local media folder with the newest local archive.
    pub fn restore_local_media(&self) -> Result<()> {
        let basename = self.latest_media_dump()?;
        let archive = self.local_media_dump_dir.join(&basename);
        info!(
            "Restoring {} from {}",
            self.local_media_root.display(),
            archive.display()
        );

        if self.local_media_root.exists() {
            std::fs::remove_dir_all(&self.local_media_root)?;
        }
        std::fs::create_dir_all(&self.local_media_root)?;
        tar::Archive::new(GzDecoder::new(File::open(&archive)?)).unpack(&self.local_media_root)?;
        Ok(())
    }

    pub async fn update_runtime_dependencies(&self) -> Result<()> {
        self.setup_runtime_dependencies().await
    }

    pub async fn enable_debug(&self) -> Result<()> {
        self.set_debug(true).await
    }

    pub async fn disable_debug(&self) -> Result<()> {
        self.set_debug(false).await
    }

    async fn set_debug(&self, debug: bool) -> Result<()> {
        let replaced = self.app.set_debug(self.remote(), debug).await?;
        if replaced == 0 {
            warn!("No DEBUG line found in the settings of {}", self.project_name);
        }
        self.restart_webserver().await
    }

    /// Drops and recreates the database. Callers confirm beforehand.
    pub async fn recreate_database(&self) -> Result<()> {
        self.database.create_database(self.remote(), true).await?;
        Ok(())
    }

    pub async fn enable_ntpd(&self) -> Result<()> {
        self.os.enable_ntpd(self.remote()).await
    }

    pub async fn disable_ntpd(&self) -> Result<()> {
        self.os.disable_ntpd(self.remote()).await
    }

    /// Snapshots every backup manager into one archive and hands it to the
    /// destination's storage. Returns the archive name.
    pub async fn backup(&self, destination: Option<&str>) -> Result<String> {
        let storage = self.backup_plan.resolve(destination)?;
        let folder_name = format!("backup_{}_{}", self.project_name, timestamp_str());
        let folder = format!("{}/{}", self.temp_dir, folder_name);
        let archive = format!("{}.{}", folder, ARCHIVE_EXT);

        let root = self.scope().sudo();
        let result = async {
            root.dir_ensure(&folder, &DirOptions::default().mode("777"))
                .await?;
            for manager in &self.backup_managers {
                info!("Backing up {}", manager.name());
                manager.backup(self.remote(), &folder).await?;
            }

            root.run(
                &ShellCommand::new("tar")
                    .arg("-czf")
                    .arg(&archive)
                    .arg("-C")
                    .arg(&self.temp_dir)
                    .arg(&folder_name),
            )
            .await?;
            root.file_attribs(&archive, "666").await?;

            storage.save(self.remote(), &archive).await
        }
        .await;

        let removed_archive = root.file_delete(&archive).await;
        let removed_folder = root.dir_delete(&folder).await;
        settle(
            result,
            removed_archive.and(removed_folder).map_err(StackError::from),
            &folder,
        )?;
        Ok(format!("{}.{}", folder_name, ARCHIVE_EXT))
    }

    /// Fetches backup `name` and lets every backup manager restore from it.
    pub async fn restore(&self, name: &str, destination: Option<&str>) -> Result<()> {
        let storage = self.backup_plan.resolve(destination)?;
        let archive = storage.get(self.remote(), name, &self.temp_dir).await?;
        let Some(folder) = archive.strip_suffix(&format!(".{}", ARCHIVE_EXT)) else {
            return Err(StackError::BackupExecution(format!(
                "backup file {} does not end with .{}",
                archive, ARCHIVE_EXT
            )));
        };
        let parent = folder.rsplit_once('/').map_or(".", |(parent, _)| parent);

        let root = self.scope().sudo();
        let result = async {
            root.run(
                &ShellCommand::new("tar")
                    .arg("-xzf")
                    .arg(&archive)
                    .arg("-C")
                    .arg(parent),
            )
            .await?;
            for manager in &self.backup_managers {
                info!("Restoring {}", manager.name());
                manager.restore(self.remote(), folder).await?;
            }
            Ok::<_, StackError>(())
        }
        .await;

        let removed_folder = root.dir_delete(folder).await;
        let removed_archive = root.file_delete(&archive).await;
        settle(
            result,
            removed_folder.and(removed_archive).map_err(StackError::from),
            folder,
        )
    }

    pub async fn list_backups(&self, destination: Option<&str>) -> Result<Vec<String>> {
        self.backup_plan
            .resolve(destination)?
            .list(self.remote())
            .await
    }

    pub fn list_destinations(&self) -> Vec<String> {
        self.backup_plan.describe()
    }
}

/// The body's outcome once its scratch files are removed. A cleanup failure
/// surfaces only when the body succeeded.
fn settle<T>(result: Result<T>, cleanup: Result<()>, scratch: &str) -> Result<T> {
    match (result, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), cleanup) => {
            if let Err(cleanup_err) = cleanup {
                warn!("Failed to remove {}: {}", scratch, cleanup_err);
            }
            Err(err)
        }
    }
}

fn latest_local_artifact(dir: &Path, prefix: &str, suffix: &str) -> Result<String> {
    let names: Vec<String> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(err) => return Err(err.into()),
    };
    latest(names.iter().map(String::as_str), prefix, suffix).ok_or_else(|| {
        StackError::BackupExecution(format!(
            "no {}*{} files found in {}",
            prefix,
            suffix,
            dir.display()
        ))
    })
}
