use async_trait::async_trait;
use common::naming::timestamp_str;
use common::remote::{DirOptions, RemoteExecutor, Scope, ShellCommand};
use common::text::{ensure_line, replace_line_re, unix_eol};
use log::{info, warn};
use minijinja::context;
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::{ApplicationManager, Precompiler, RuntimeManager, SourceControl, WebServerKind};
use crate::error::{Result, StackError};
use crate::managers::git::GitManager;
use crate::managers::gunicorn::DEFAULT_BIND;
use crate::templates::{self, APACHE_DJANGO, NGINX_DJANGO, WSGI_HANDLER};

const TEMP_DIR_PREFIX: &str = "django_temp_";

/// A Django project laid out as `<project>/<src>` plus a `site/` directory
/// holding the virtualenv, logs and entry point.
pub struct DjangoManager {
    project_name: String,
    remote_project_path: String,
    local_project_path: PathBuf,
    remote_site_path: String,
    src_root: String,
    settings_module: String,
    media_root: String,
    media_url: String,
    static_root: String,
    static_url: String,
    static_dirs: Vec<String>,
    log_path: String,
    server_admin: String,
    server_name: String,
    use_south: bool,
    user: Option<String>,
    group: Option<String>,
    resolved_user: OnceCell<String>,
    python: Arc<dyn RuntimeManager>,
    scm: Box<dyn SourceControl>,
    precompilers: Vec<Arc<dyn Precompiler>>,
}

/// Collects the project's attributes; [`DjangoManagerBuilder::build`] refuses
/// to produce a manager while a required one is missing.
#[derive(Default)]
pub struct DjangoManagerBuilder {
    project_name: String,
    remote_project_path: String,
    local_project_path: PathBuf,
    remote_site_path: String,
    src_root: Option<String>,
    settings_module: Option<String>,
    media_root: Option<String>,
    media_url: Option<String>,
    static_root: Option<String>,
    static_url: Option<String>,
    static_dirs: Vec<String>,
    log_path: Option<String>,
    server_admin: Option<String>,
    server_name: Option<String>,
    use_south: bool,
    user: Option<String>,
    group: Option<String>,
    python: Option<Arc<dyn RuntimeManager>>,
    scm: Option<Box<dyn SourceControl>>,
    precompilers: Vec<Arc<dyn Precompiler>>,
}

impl DjangoManagerBuilder {
    pub fn new(
        project_name: &str,
        remote_project_path: &str,
        local_project_path: impl Into<PathBuf>,
        remote_site_path: &str,
    ) -> Self {
        Self {
            project_name: project_name.to_string(),
            remote_project_path: remote_project_path.trim_end_matches('/').to_string(),
            local_project_path: local_project_path.into(),
            remote_site_path: remote_site_path.trim_end_matches('/').to_string(),
            ..Default::default()
        }
    }

    pub fn src_root(mut self, src_root: &str) -> Self {
        self.src_root = Some(src_root.to_string());
        self
    }

    pub fn settings_module(mut self, module: &str) -> Self {
        self.settings_module = Some(module.to_string());
        self
    }

    pub fn media(mut self, root: &str, url: &str) -> Self {
        self.media_root = Some(root.to_string());
        self.media_url = Some(url.to_string());
        self
    }

    pub fn static_files(mut self, root: &str, url: &str) -> Self {
        self.static_root = Some(root.to_string());
        self.static_url = Some(url.to_string());
        self
    }

    pub fn static_dirs(mut self, dirs: Vec<String>) -> Self {
        self.static_dirs = dirs;
        self
    }

    pub fn log_path(mut self, path: &str) -> Self {
        self.log_path = Some(path.to_string());
        self
    }

    pub fn server_admin(mut self, email: &str) -> Self {
        self.server_admin = Some(email.to_string());
        self
    }

    pub fn server_name(mut self, name: &str) -> Self {
        self.server_name = Some(name.to_string());
        self
    }

    pub fn use_south(mut self, use_south: bool) -> Self {
        self.use_south = use_south;
        self
    }

    pub fn owner(mut self, user: Option<String>, group: Option<String>) -> Self {
        self.user = user;
        self.group = group;
        self
    }

    pub fn python(mut self, python: Arc<dyn RuntimeManager>) -> Self {
        self.python = Some(python);
        self
    }

    pub fn scm(mut self, scm: Box<dyn SourceControl>) -> Self {
        self.scm = Some(scm);
        self
    }

    pub fn precompilers(mut self, precompilers: Vec<Arc<dyn Precompiler>>) -> Self {
        self.precompilers = precompilers;
        self
    }

    pub fn build(self) -> Result<DjangoManager> {
        fn required<T>(value: Option<T>, attr: &str) -> Result<T> {
            value.ok_or_else(|| StackError::Configuration(attr.to_string()))
        }

        let src_root = required(self.src_root, "src_root")?;
        let python = required(self.python, "python")?;
        let media_url = required(self.media_url, "media_url")?;
        let media_root = required(self.media_root, "media_root")?;
        let static_url = required(self.static_url, "static_url")?;
        let static_root = required(self.static_root, "static_root")?;
        let server_admin = required(self.server_admin, "server_admin")?;

        let scm: Box<dyn SourceControl> = match self.scm {
            Some(scm) => scm,
            None => Box::new(GitManager::new(self.local_project_path.clone())),
        };

        Ok(DjangoManager {
            log_path: self
                .log_path
                .unwrap_or_else(|| format!("{}/logs", self.remote_site_path)),
            server_name: self.server_name.unwrap_or_else(|| "_".to_string()),
            settings_module: self.settings_module.unwrap_or_else(|| "settings".to_string()),
            project_name: self.project_name,
            remote_project_path: self.remote_project_path,
            local_project_path: self.local_project_path,
            remote_site_path: self.remote_site_path,
            src_root,
            media_root,
            media_url,
            static_root,
            static_url,
            static_dirs: self.static_dirs,
            server_admin,
            use_south: self.use_south,
            user: self.user,
            group: self.group,
            resolved_user: OnceCell::new(),
            python,
            scm,
            precompilers: self.precompilers,
        })
    }
}

impl DjangoManager {
    pub fn builder(
        project_name: &str,
        remote_project_path: &str,
        local_project_path: impl Into<PathBuf>,
        remote_site_path: &str,
    ) -> DjangoManagerBuilder {
        DjangoManagerBuilder::new(
            project_name,
            remote_project_path,
            local_project_path,
            remote_site_path,
        )
    }

    pub fn remote_project_path(&self) -> &str {
        &self.remote_project_path
    }

    pub fn remote_site_path(&self) -> &str {
        &self.remote_site_path
    }

    pub fn src_root(&self) -> &str {
        &self.src_root
    }

    pub fn log_path(&self) -> &str {
        &self.log_path
    }

    pub fn wsgi_handler_path(&self) -> String {
        format!("{}/wsgi_handler.py", self.remote_site_path)
    }

    pub fn settings_path(&self) -> String {
        format!("{}/{}.py", self.src_root, self.settings_module.replace('.', "/"))
    }

    async fn user(&self, remote: &dyn RemoteExecutor) -> Result<String> {
        if let Some(user) = &self.user {
            return Ok(user.clone());
        }
        self.resolved_user
            .get_or_try_init(|| async {
                warn!("No user is set, asking the remote host");
                Ok::<_, StackError>(Scope::new(remote).whoami().await?)
            })
            .await
            .cloned()
    }

    async fn group(&self, remote: &dyn RemoteExecutor) -> Result<String> {
        match &self.group {
            Some(group) => Ok(group.clone()),
            None => self.user(remote).await,
        }
    }

    /// Empties the project directory but keeps `site/` by parking it in
    /// `~/tmp` while the rest is removed.
    async fn clear_project_keep_site(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        let scope = Scope::new(remote);
        let home = scope.home().await?;
        let site_basename = self
            .remote_site_path
            .rsplit('/')
            .next()
            .unwrap_or("site")
            .to_string();
        let parking = format!("{}/tmp", home);
        let parked = format!("{}/{}", parking, site_basename);

        let root = scope.sudo();
        root.dir_ensure(&self.remote_site_path, &DirOptions::recursive().mode("777"))
            .await?;
        root.dir_ensure(&parking, &DirOptions::default().mode("777"))
            .await?;
        root.dir_delete(&parked).await?;
        root.run(&ShellCommand::new("mv").arg(&self.remote_site_path).arg(&parking))
            .await?;
        root.clear_dir(&self.remote_project_path).await?;
        root.run(&ShellCommand::new("mv").arg(&parked).arg(&self.remote_project_path))
            .await?;
        Ok(())
    }

    fn remove_local_temp_dirs(&self) -> Result<()> {
        let prefix = format!("{}{}", TEMP_DIR_PREFIX, self.project_name);
        if !self.local_project_path.exists() {
            return Ok(());
        }
        for entry in std::fs::read_dir(&self.local_project_path)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(&prefix) && entry.path().is_dir() {
                std::fs::remove_dir_all(entry.path())?;
            }
        }
        Ok(())
    }

    async fn wsgi_handler(&self, remote: &dyn RemoteExecutor) -> Result<String> {
        let mut search_path = Vec::new();
        if let Some(env_dir) = self.python.environment_dir() {
            let short = self.python.short_version(remote).await?;
            search_path.push(format!("{}/lib/python{}/site-packages", env_dir, short));
        }
        search_path.push(self.src_root.clone());
        templates::render(
            WSGI_HANDLER,
            &context! {
                search_path => search_path,
                settings_module => self.settings_module,
            },
        )
    }
}

#[async_trait]
impl ApplicationManager for DjangoManager {
    fn project_name(&self) -> &str {
        &self.project_name
    }

    fn media_root(&self) -> &str {
        &self.media_root
    }

    async fn init(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        let user = self.user(remote).await?;
        let group = self.group(remote).await?;
        let options = DirOptions::recursive().owner(&user).group(&group);
        let root = Scope::new(remote).sudo();
        for dir in [
            &self.remote_project_path,
            &self.remote_site_path,
            &self.log_path,
            &self.media_root,
            &self.static_root,
        ] {
            root.dir_ensure(dir, &options).await?;
        }
        self.configure_runtime(remote).await
    }

    async fn configure_runtime(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        let Some(env_dir) = self.python.environment_dir() else {
            return Ok(());
        };
        let activate = format!("{}/bin/activate", env_dir);
        let scope = Scope::new(remote).sudo();
        let text = scope.read_file(&activate).await?;
        let line = format!("export DJANGO_SETTINGS_MODULE=\"{}\"", self.settings_module);
        let updated = ensure_line(&text, &line);
        if updated != text {
            scope.write_file(&activate, &unix_eol(&updated)).await?;
        }
        Ok(())
    }

    async fn upload_code(&self, remote: &dyn RemoteExecutor, update_submodules: bool) -> Result<()> {
        info!("Uploading {} to {}", self.project_name, remote.host());
        let root = Scope::new(remote).sudo();
        root.dir_attribs(&self.remote_project_path, &DirOptions::default().mode("777"))
            .await?;

        self.clear_project_keep_site(remote).await?;

        let temp_dir = format!("{}{}_{}", TEMP_DIR_PREFIX, self.project_name, timestamp_str());
        let temp_remote = format!("{}/{}", self.remote_project_path, temp_dir);
        let temp_local = self.local_project_path.join(&temp_dir);
        std::fs::create_dir_all(&temp_local)?;
        root.dir_ensure(&temp_remote, &DirOptions::default()).await?;

        let archives = self
            .scm
            .local_archive(remote, &temp_local, update_submodules)
            .await?;

        for (dir, file) in &archives {
            let local_archive = temp_local.join(file);
            let remote_archive = format!("{}/{}", temp_remote, file);
            root.upload(&local_archive, &remote_archive).await?;
            if local_archive.exists() {
                std::fs::remove_file(&local_archive)?;
            }

            let extract_dir = if dir.is_empty() {
                self.remote_project_path.clone()
            } else {
                format!("{}/{}", self.remote_project_path, dir)
            };
            root.dir_ensure(&extract_dir, &DirOptions::recursive().mode("777"))
                .await?;
            root.run(
                &ShellCommand::new("unzip")
                    .arg("-o")
                    .arg(&remote_archive)
                    .arg("-d")
                    .arg(&extract_dir),
            )
            .await?;
            root.file_delete(&remote_archive).await?;
        }
        root.dir_delete(&temp_remote).await?;

        root.dir_attribs(&self.remote_project_path, &DirOptions::recursive().mode("777"))
            .await?;

        for precompiler in &self.precompilers {
            precompiler.compile(remote, &self.remote_project_path).await?;
        }

        self.remove_local_temp_dirs()
    }

    async fn migrate_data(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        self.manage(remote, &["syncdb", "--noinput"]).await?;
        if self.use_south {
            self.manage(remote, &["migrate"]).await?;
        }
        Ok(())
    }

    async fn collect_static(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        let root = Scope::new(remote).sudo();
        for dir in &self.static_dirs {
            root.dir_ensure(dir, &DirOptions::recursive().mode("777"))
                .await?;
        }
        self.manage(remote, &["collectstatic", "--noinput", "--clear"])
            .await
            .map(|_| ())
    }

    async fn manage(&self, remote: &dyn RemoteExecutor, args: &[&str]) -> Result<String> {
        let mut scope = Scope::new(remote).cd(&self.src_root);
        if let Some(activate) = self.python.activation() {
            scope = scope.prefix(activate);
        }
        let cmd = ShellCommand::new("django-admin.py")
            .args(args)
            .arg(format!("--pythonpath={}", self.src_root))
            .arg(format!("--settings={}", self.settings_module));
        Ok(scope.run(&cmd).await?)
    }

    async fn set_debug(&self, remote: &dyn RemoteExecutor, debug: bool) -> Result<usize> {
        let path = self.settings_path();
        let scope = Scope::new(remote).sudo();
        let text = scope.read_file(&path).await?;
        let pattern = Regex::new(r"^DEBUG\s*=")?;
        let flag = if debug { "True" } else { "False" };
        let (text, replaced) = replace_line_re(&text, &pattern, &format!("DEBUG={}", flag));
        scope.write_file(&path, &unix_eol(&text)).await?;
        Ok(replaced)
    }

    async fn configure_wsgi(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        let handler = self.wsgi_handler(remote).await?;
        Scope::new(remote)
            .sudo()
            .write_file(&self.wsgi_handler_path(), &handler)
            .await?;
        Ok(())
    }

    fn web_server_config(&self, kind: WebServerKind) -> Result<String> {
        match kind {
            WebServerKind::Nginx => templates::render(
                NGINX_DJANGO,
                &context! {
                    server_name => self.server_name,
                    media_url => self.media_url,
                    media_root => self.media_root,
                    static_url => self.static_url,
                    static_root => self.static_root,
                    upstream => DEFAULT_BIND,
                },
            ),
            WebServerKind::Apache => templates::render(
                APACHE_DJANGO,
                &context! {
                    server_admin => self.server_admin,
                    server_name => self.server_name,
                    media_url => self.media_url,
                    media_root => self.media_root,
                    static_url => self.static_url,
                    static_root => self.static_root,
                    wsgi_handler_path => self.wsgi_handler_path(),
                    project_name => self.project_name,
                },
            ),
        }
    }
}
