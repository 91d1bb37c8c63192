use async_trait::async_trait;
use common::remote::{RemoteExecutor, Scope, ShellCommand};
use log::info;

use super::{init_service, OsPackageManager};
use crate::dependency::Dependency;
use crate::error::Result;

/// apt based package management.
pub struct UbuntuManager {
    dependencies: Vec<Dependency>,
}

impl UbuntuManager {
    pub fn new(dependencies: Vec<Dependency>) -> Self {
        Self { dependencies }
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Installs the package unless dpkg already reports it installed.
    fn package_ensure(dep: &Dependency) -> ShellCommand {
        let installed = ShellCommand::new("dpkg-query")
            .arg("-W")
            .arg("-f=${Status}")
            .arg(&dep.name)
            .raw("2>/dev/null")
            .pipe(ShellCommand::new("grep").arg("-q").arg("ok installed"));
        let install = ShellCommand::new("env")
            .arg("DEBIAN_FRONTEND=noninteractive")
            .arg("apt-get")
            .arg("install")
            .arg("-y")
            .arg(dep.apt_spec());
        installed.raw("||").raw(install.as_str())
    }
}

#[async_trait]
impl OsPackageManager for UbuntuManager {
    async fn setup_dependencies(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        let scope = Scope::new(remote).sudo();
        for dep in &self.dependencies {
            info!("Ensuring package {}", dep);
            scope.run(&Self::package_ensure(dep)).await?;
        }
        Ok(())
    }

    async fn refresh_sources(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        Scope::new(remote)
            .sudo()
            .run(&ShellCommand::new("apt-get").arg("update"))
            .await?;
        Ok(())
    }

    async fn enable_ntpd(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        init_service(remote, "ntp", "start").await.map(|_| ())
    }

    async fn disable_ntpd(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        init_service(remote, "ntp", "stop").await.map(|_| ())
    }
}
