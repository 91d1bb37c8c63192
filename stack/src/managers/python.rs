use async_trait::async_trait;
use common::remote::{DirOptions, RemoteExecutor, Scope, ShellCommand};
use log::info;
use std::path::PathBuf;
use tokio::sync::OnceCell;

use super::RuntimeManager;
use crate::dependency::Dependency;
use crate::error::Result;
use crate::version::{parse_short_version, parse_version};

/// Python runtime, optionally isolated in a virtualenv at `path/name`.
pub struct PythonManager {
    dependencies: Vec<Dependency>,
    requirements: Option<PathBuf>,
    virtualenv: Option<(String, String)>,
    version: OnceCell<String>,
}

impl PythonManager {
    pub fn new(dependencies: Vec<Dependency>) -> Self {
        Self {
            dependencies,
            requirements: None,
            virtualenv: None,
            version: OnceCell::new(),
        }
    }

    /// Local requirements file, one `name==version` per line.
    pub fn with_requirements(mut self, path: PathBuf) -> Self {
        self.requirements = Some(path);
        self
    }

    pub fn with_virtualenv(mut self, path: &str, name: &str) -> Self {
        self.virtualenv = Some((path.trim_end_matches('/').to_string(), name.to_string()));
        self
    }

    fn read_requirements(&self) -> Result<Vec<Dependency>> {
        match &self.requirements {
            Some(path) => Ok(std::fs::read_to_string(path)?
                .lines()
                .filter_map(Dependency::from_requirement)
                .collect()),
            None => Ok(Vec::new()),
        }
    }

    fn scope<'a>(&self, remote: &'a dyn RemoteExecutor) -> Scope<'a> {
        let scope = Scope::new(remote);
        match self.activation() {
            Some(activate) => scope.prefix(activate),
            None => scope.sudo(),
        }
    }

    async fn pip_install(&self, scope: &Scope<'_>, dep: &Dependency) -> Result<()> {
        info!("Installing python package {}", dep);
        scope
            .run(&ShellCommand::new("pip").arg("install").arg(dep.pip_spec()))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RuntimeManager for PythonManager {
    async fn init(
        &self,
        remote: &dyn RemoteExecutor,
        delete_if_exists: bool,
        search_path: &str,
    ) -> Result<()> {
        let Some((path, name)) = &self.virtualenv else {
            return Ok(());
        };
        let root = Scope::new(remote).sudo();
        let env_dir = format!("{}/{}", path, name);

        if delete_if_exists && root.dir_exists(&env_dir).await? {
            info!("Removing virtualenv {}", env_dir);
            root.dir_delete(&env_dir).await?;
        }

        self.pip_install(&root, &Dependency::new("virtualenv")).await?;
        root.dir_ensure(path, &DirOptions::recursive().mode("777"))
            .await?;

        let create = ShellCommand::new("env")
            .arg(format!("VIRTUALENV_EXTRA_SEARCH_DIR={}", search_path))
            .arg("virtualenv")
            .arg(name);
        Scope::new(remote).cd(path).run(&create).await?;
        Ok(())
    }

    async fn setup_dependencies(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        let scope = self.scope(remote);
        let requirements = self.read_requirements()?;
        for dep in self.dependencies.iter().chain(requirements.iter()) {
            self.pip_install(&scope, dep).await?;
        }
        Ok(())
    }

    async fn version(&self, remote: &dyn RemoteExecutor) -> Result<String> {
        self.version
            .get_or_try_init(|| async {
                let output = Scope::new(remote)
                    .run(&ShellCommand::new("python").arg("--version").raw("2>&1"))
                    .await?;
                parse_version(&output)
            })
            .await
            .cloned()
    }

    async fn short_version(&self, remote: &dyn RemoteExecutor) -> Result<String> {
        parse_short_version(&self.version(remote).await?)
    }

    fn environment_dir(&self) -> Option<String> {
        self.virtualenv
            .as_ref()
            .map(|(path, name)| format!("{}/{}", path, name))
    }

    fn activation(&self) -> Option<ShellCommand> {
        self.environment_dir()
            .map(|dir| ShellCommand::new(".").arg(format!("{}/bin/activate", dir)))
    }
}
