//! Asset precompilers run on the target host after every code upload.

use async_trait::async_trait;
use common::remote::{DirOptions, RemoteExecutor, Scope, ShellCommand};
use log::info;
use regex::Regex;
use tokio::sync::OnceCell;

use crate::dependency::Dependency;
use crate::error::{Result, StackError};
use crate::managers::Precompiler;

/// Source and target directories, relative to the project root.
#[derive(Debug, Clone)]
pub struct Dirs {
    pub from: String,
    pub to: String,
}

impl Dirs {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.trim_matches('/').to_string(),
            to: to.trim_matches('/').to_string(),
        }
    }

    fn abs_from(&self, root: &str) -> String {
        format!("{}/{}", root.trim_end_matches('/'), self.from)
    }

    fn abs_to(&self, root: &str) -> String {
        format!("{}/{}", root.trim_end_matches('/'), self.to)
    }
}

/// Compiles every `.less` file with a `lessc` installed under the remote home.
pub struct LessPrecompiler {
    dirs: Dirs,
    lessc: OnceCell<String>,
}

impl LessPrecompiler {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            dirs: Dirs::new(from, to),
            lessc: OnceCell::new(),
        }
    }

    async fn lessc_path(&self, remote: &dyn RemoteExecutor) -> Result<String> {
        self.lessc
            .get_or_try_init(|| async {
                let home = Scope::new(remote).home().await?;
                Ok::<_, StackError>(format!("{}/node_modules/less/bin/lessc", home))
            })
            .await
            .cloned()
    }
}

#[async_trait]
impl Precompiler for LessPrecompiler {
    fn os_dependencies(&self) -> Vec<Dependency> {
        vec![Dependency::new("npm")]
    }

    fn runtime_dependencies(&self) -> Vec<Dependency> {
        Vec::new()
    }

    async fn setup(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        let lessc = self.lessc_path(remote).await?;
        let scope = Scope::new(remote);
        if scope.file_exists(&lessc).await? {
            info!("Less is already installed");
            return Ok(());
        }

        info!("Installing Node and Less");
        scope
            .sudo()
            .run(&ShellCommand::new("apt-get").args(["install", "-y", "nodejs"]))
            .await?;
        let home = scope.home().await?;
        scope
            .cd(&home)
            .run(&ShellCommand::new("npm").args(["install", "less"]))
            .await?;
        Ok(())
    }

    async fn compile(&self, remote: &dyn RemoteExecutor, root: &str) -> Result<()> {
        let from = self.dirs.abs_from(root);
        let to = self.dirs.abs_to(root);
        let root_scope = Scope::new(remote).sudo();
        root_scope.dir_ensure(&to, &DirOptions::default()).await?;

        let lessc = self.lessc_path(remote).await?;
        let less_file = Regex::new(r".*\.less$")?;
        for file in root_scope.ls_re(&from, &less_file).await? {
            let basename = file.strip_suffix(".less").unwrap_or(&file);
            let cmd = ShellCommand::new(&lessc)
                .arg(format!("{}/{}.less", from, basename))
                .arg(format!("{}/{}.css", to, basename));
            root_scope.run(&cmd).await?;
        }
        Ok(())
    }
}

/// Compiles a directory of CoffeeScript into JavaScript.
pub struct CoffeePrecompiler {
    dirs: Dirs,
}

impl CoffeePrecompiler {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            dirs: Dirs::new(from, to),
        }
    }
}

#[async_trait]
impl Precompiler for CoffeePrecompiler {
    fn os_dependencies(&self) -> Vec<Dependency> {
        vec![Dependency::new("coffeescript")]
    }

    fn runtime_dependencies(&self) -> Vec<Dependency> {
        Vec::new()
    }

    async fn setup(&self, _remote: &dyn RemoteExecutor) -> Result<()> {
        Ok(())
    }

    async fn compile(&self, remote: &dyn RemoteExecutor, root: &str) -> Result<()> {
        let to = self.dirs.abs_to(root);
        let scope = Scope::new(remote).sudo();
        scope.dir_ensure(&to, &DirOptions::default()).await?;
        let cmd = ShellCommand::new("coffee")
            .args(["--compile", "--output"])
            .arg(&to)
            .arg(self.dirs.abs_from(root));
        scope.run(&cmd).await?;
        Ok(())
    }
}
