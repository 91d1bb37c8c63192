//! Wires a [`Stack`] from the project configuration.
//!
//! The project lives under `/usr/local/share/<name>` on the host unless
//! `project.remote_root` says otherwise, and mirrors the local tree: media,
//! static and source roots keep their paths relative to the project root.
//! `site/` under the remote root holds the virtualenv, the WSGI entry point
//! and the logs.

use common::config::{expand_path, BountConfig, DatabaseConfig, PrecompilerConfig};
use common::remote::RemoteExecutor;
use futures::FutureExt;
use log::info;
use postgres::PostgresManager;
use ssh::SshExecutor;
use stack::backup::{DatabaseBackupManager, FolderBackupManager};
use stack::dependency::{merge, Dependency};
use stack::managers::apache::ApacheManager;
use stack::managers::django::DjangoManager;
use stack::managers::gunicorn::GunicornService;
use stack::managers::nginx::NginxManager;
use stack::managers::python::PythonManager;
use stack::managers::sqlite::SqliteManager;
use stack::managers::ubuntu::UbuntuManager;
use stack::managers::{DatabaseManager, Precompiler, RuntimeManager, WebServer, WebServerKind};
use stack::precompilers::{CoffeePrecompiler, LessPrecompiler};
use stack::{Result, Stack, StackError, StackRegistry};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

const OS_PACKAGES: &[&str] = &[
    "unzip",
    "python",
    "python-setuptools",
    "python-dev",
    "build-essential",
    "git",
    "python-imaging",
    "python-pip",
    "ntp",
];
const POSTGRES_PACKAGES: &[&str] = &["postgresql", "libpq-dev", "python-psycopg2"];
const SQLITE_PACKAGES: &[&str] = &["sqlite3", "python-sqlite"];
const NGINX_PACKAGES: &[&str] = &["nginx", "supervisor"];
const APACHE_PACKAGES: &[&str] = &["apache2", "libapache2-mod-wsgi"];

/// Virtualenv directory name under `site/`.
pub const VIRTUALENV_NAME: &str = "ENV";

/// Maps local project paths onto the remote project root.
#[derive(Debug, Clone)]
pub struct Layout {
    local_root: PathBuf,
    remote_root: String,
}

impl Layout {
    pub fn new(local_root: impl Into<PathBuf>, remote_root: &str) -> Self {
        Self {
            local_root: local_root.into(),
            remote_root: remote_root.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &BountConfig) -> Self {
        let expanded = expand_path(&config.project.local_root);
        let local_root =
            std::fs::canonicalize(&expanded).unwrap_or_else(|_| PathBuf::from(&expanded));
        let remote_root = config
            .project
            .remote_root
            .clone()
            .unwrap_or_else(|| format!("/usr/local/share/{}", config.project.name));
        Self::new(local_root, &remote_root)
    }

    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    pub fn remote_root(&self) -> &str {
        &self.remote_root
    }

    pub fn site(&self) -> String {
        format!("{}/site", self.remote_root)
    }

    /// Local counterpart of a configured path.
    pub fn to_local(&self, path: &str) -> PathBuf {
        self.local_root.join(expand_path(path))
    }

    /// Remote counterpart of a path given relative to, or inside, the local
    /// project root. Paths escaping the root are rejected.
    pub fn to_remote(&self, local: &str) -> Result<String> {
        let path = Path::new(local);
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.local_root)
                .map_err(|_| StackError::invalid("project path", local))?
        } else {
            path
        };

        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => return Err(StackError::invalid("project path", local)),
            }
        }

        if parts.is_empty() {
            Ok(self.remote_root.clone())
        } else {
            Ok(format!("{}/{}", self.remote_root, parts.join("/")))
        }
    }
}

fn packages(names: &[&str]) -> Vec<Dependency> {
    names.iter().map(|name| Dependency::new(name)).collect()
}

fn precompiler(config: &PrecompilerConfig) -> Result<Arc<dyn Precompiler>> {
    match config.kind.as_str() {
        "less" => Ok(Arc::new(LessPrecompiler::new(&config.from, &config.to))),
        "coffee" => Ok(Arc::new(CoffeePrecompiler::new(&config.from, &config.to))),
        other => Err(StackError::invalid("precompiler kind", other)),
    }
}

fn database(config: &DatabaseConfig, layout: &Layout) -> Result<Arc<dyn DatabaseManager>> {
    if config.engine.contains("postgresql") {
        let user = config.user.as_deref().unwrap_or(&config.name);
        let password = config.password.as_deref().unwrap_or_default();
        Ok(Arc::new(PostgresManager::new(&config.name, user, password)?))
    } else if config.engine.contains("sqlite") {
        Ok(Arc::new(SqliteManager::new(&sqlite_file(&config.name, layout)?)))
    } else {
        Err(StackError::invalid("database engine", &config.engine))
    }
}

/// Code uploads wipe the project root except `site/`, so the database file
/// is kept there under its configured file name.
fn sqlite_file(name: &str, layout: &Layout) -> Result<String> {
    let file = Path::new(name)
        .file_name()
        .map(|file| file.to_string_lossy().into_owned())
        .ok_or_else(|| StackError::invalid("sqlite database name", name))?;
    Ok(format!("{}/{}", layout.site(), file))
}

fn webserver(kind: &str) -> Result<Arc<dyn WebServer>> {
    match kind {
        "nginx" => Ok(Arc::new(NginxManager::new())),
        "apache" | "apache2" => Ok(Arc::new(ApacheManager::new())),
        other => Err(StackError::invalid("web server", other)),
    }
}

/// Builds the stack for `host` from `config`, running commands through
/// `remote`. Nothing is executed on the host here.
pub async fn build_stack(
    config: &BountConfig,
    host: &str,
    remote: Arc<dyn RemoteExecutor>,
) -> Result<Stack> {
    let project = &config.project;
    let settings = &config.settings;
    let layout = Layout::from_config(config);
    let site = layout.site();

    let src = layout.to_remote(&project.source_root)?;
    let media_root = layout.to_remote(&settings.media_root)?;
    let static_root = layout.to_remote(&settings.static_root)?;
    let log_path = match &settings.logging_path {
        Some(path) => layout.to_remote(path)?,
        None => format!("{}/logs", site),
    };

    let precompilers = project
        .precompilers
        .iter()
        .map(precompiler)
        .collect::<Result<Vec<_>>>()?;

    let database = database(&settings.database, &layout)?;
    let webserver = webserver(&project.webserver)?;
    let behind_nginx = matches!(webserver.kind(), WebServerKind::Nginx);

    let mut os_dependencies = packages(OS_PACKAGES);
    if settings.database.engine.contains("postgresql") {
        merge(&mut os_dependencies, packages(POSTGRES_PACKAGES));
    } else {
        merge(&mut os_dependencies, packages(SQLITE_PACKAGES));
    }
    if behind_nginx {
        merge(&mut os_dependencies, packages(NGINX_PACKAGES));
    } else {
        merge(&mut os_dependencies, packages(APACHE_PACKAGES));
    }
    merge(&mut os_dependencies, Dependency::from_values(&project.os_dependencies)?);
    for p in &precompilers {
        merge(&mut os_dependencies, p.os_dependencies());
    }

    let mut runtime_dependencies = packages(&["django"]);
    if behind_nginx {
        merge(&mut runtime_dependencies, packages(&["gunicorn"]));
    }
    merge(&mut runtime_dependencies, Dependency::from_values(&project.dependencies)?);
    for p in &precompilers {
        merge(&mut runtime_dependencies, p.runtime_dependencies());
    }

    let mut python = PythonManager::new(runtime_dependencies);
    if let Some(requirements) = &project.requirements {
        python = python.with_requirements(layout.to_local(requirements));
    }
    if project.use_virtualenv {
        python = python.with_virtualenv(&site, VIRTUALENV_NAME);
    }
    let python: Arc<dyn RuntimeManager> = Arc::new(python);

    let server_name = config
        .hosts
        .get(host)
        .map(|h| h.address.as_str())
        .unwrap_or("_");

    let app = DjangoManager::builder(&project.name, layout.remote_root(), layout.local_root(), &site)
        .src_root(&src)
        .settings_module(&project.settings_module)
        .media(&media_root, &settings.media_url)
        .static_files(&static_root, &settings.static_url)
        .log_path(&log_path)
        .server_admin(settings.server_admin().unwrap_or("NOBODY"))
        .server_name(server_name)
        .use_south(settings.has_app("south"))
        .owner(project.user.clone(), project.group.clone())
        .python(python.clone())
        .precompilers(precompilers.clone())
        .build()?;

    let plan = storage::backup_plan(&config.backup).await?;

    let mut builder = Stack::builder(&project.name)
        .remote(remote)
        .os(Arc::new(UbuntuManager::new(os_dependencies)))
        .runtime(python.clone())
        .database(database.clone())
        .webserver(webserver.clone())
        .app(Arc::new(app))
        .backup_manager(Arc::new(DatabaseBackupManager::new(database, &project.name)))
        .backup_manager(Arc::new(FolderBackupManager::new(&media_root, &project.name)))
        .backup_plan(plan)
        .runtime_search_path(&src)
        .local_media_root(layout.to_local(&settings.media_root))
        .local_backup_dir(layout.to_local(&project.local_backup_dir))
        .remote_backup_dir(config.backup.remote_dir.clone())
        .temp_dir(&config.backup.temp_dir);

    for p in precompilers {
        builder = builder.precompiler(p);
    }

    if behind_nginx {
        builder = builder.service(Arc::new(GunicornService::new(
            &format!("{}_gunicorn", project.name),
            webserver.user(),
            Some(webserver.group()),
            project.workers,
            python.environment_dir(),
            &src,
            &log_path,
            &site,
            project.environment.clone(),
        )));
    }

    let stack = builder.build()?;
    info!("Stack for {} ready: {} on {}", host, project.name, layout.remote_root());
    Ok(stack)
}

/// SSH executor for a configured host. The connection opens on first use.
pub fn remote_for(config: &BountConfig, host: &str) -> Result<Arc<dyn RemoteExecutor>> {
    let entry = config
        .hosts
        .get(host)
        .ok_or_else(|| StackError::invalid("host", host))?;
    let mut executor = SshExecutor::new(entry.address.clone(), entry.user.clone(), entry.port);
    if let Some(key_path) = &entry.key_path {
        executor = executor.with_private_key_path(expand_path(key_path));
    }
    if let Some(password) = &entry.password {
        executor = executor.with_password(password.clone());
    }
    Ok(Arc::new(executor))
}

/// Registry building SSH-backed stacks for the configured hosts.
pub fn registry(config: Arc<BountConfig>) -> StackRegistry {
    StackRegistry::new(move |host: String| {
        let config = config.clone();
        async move {
            let remote = remote_for(&config, &host)?;
            build_stack(&config, &host, remote).await
        }
        .boxed()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_paths_map_under_the_remote_root() {
        let layout = Layout::new("/home/dev/site", "/usr/local/share/site/");
        assert_eq!(layout.to_remote("src").unwrap(), "/usr/local/share/site/src");
        assert_eq!(layout.to_remote("./media/uploads").unwrap(), "/usr/local/share/site/media/uploads");
        assert_eq!(layout.to_remote("/home/dev/site/static").unwrap(), "/usr/local/share/site/static");
        assert_eq!(layout.to_remote(".").unwrap(), "/usr/local/share/site");
        assert_eq!(layout.site(), "/usr/local/share/site/site");
    }

    #[test]
    fn paths_outside_the_project_are_rejected() {
        let layout = Layout::new("/home/dev/site", "/usr/local/share/site");
        assert!(matches!(
            layout.to_remote("/var/www/media"),
            Err(StackError::InvalidValue { .. })
        ));
        assert!(layout.to_remote("../shared/media").is_err());
    }

    #[test]
    fn sqlite_files_live_in_the_site_folder() {
        let layout = Layout::new("/home/dev/site", "/usr/local/share/site");
        assert_eq!(
            sqlite_file("db.sqlite", &layout).unwrap(),
            "/usr/local/share/site/site/db.sqlite"
        );
        assert_eq!(
            sqlite_file("/home/dev/site/data/dev.db", &layout).unwrap(),
            "/usr/local/share/site/site/dev.db"
        );
        assert!(matches!(sqlite_file("..", &layout), Err(StackError::InvalidValue { .. })));
    }

    #[test]
    fn unknown_engines_and_servers_are_configuration_errors() {
        let layout = Layout::new("/home/dev/site", "/usr/local/share/site");
        let config = DatabaseConfig {
            engine: "django.db.backends.mysql".into(),
            name: "site".into(),
            user: None,
            password: None,
            host: None,
        };
        assert!(matches!(database(&config, &layout), Err(StackError::InvalidValue { .. })));
        assert!(webserver("lighttpd").is_err());
        assert!(precompiler(&PrecompilerConfig {
            kind: "sass".into(),
            from: "sass".into(),
            to: "css".into(),
        })
        .is_err());
    }
}
