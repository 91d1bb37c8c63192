use async_trait::async_trait;
use common::remote::{RemoteExecutor, Scope};
use log::info;

use super::{init_service, Service, WebServer, WebServerKind};
use crate::error::Result;

const SITES_DIR: &str = "/etc/nginx/sites-enabled";

pub struct NginxManager {
    user: String,
    group: String,
}

impl NginxManager {
    pub fn new() -> Self {
        Self {
            user: "www-data".to_string(),
            group: "www-data".to_string(),
        }
    }
}

impl Default for NginxManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes `<sites_dir>/<name>`, first clearing the directory if requested.
pub(crate) async fn write_site(
    remote: &dyn RemoteExecutor,
    sites_dir: &str,
    name: &str,
    config: &str,
    delete_other_sites: bool,
) -> Result<()> {
    let root = Scope::new(remote).sudo();
    if delete_other_sites {
        info!("Removing every site in {}", sites_dir);
        root.clear_dir(sites_dir).await?;
    }
    root.write_file(&format!("{}/{}", sites_dir, name), config)
        .await?;
    Ok(())
}

#[async_trait]
impl Service for NginxManager {
    fn name(&self) -> &str {
        "nginx"
    }

    async fn start(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        init_service(remote, "nginx", "start").await.map(|_| ())
    }

    async fn stop(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        if self.is_running(remote).await? {
            init_service(remote, "nginx", "stop").await?;
        }
        Ok(())
    }

    async fn restart(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        init_service(remote, "nginx", "restart").await.map(|_| ())
    }

    async fn is_running(&self, remote: &dyn RemoteExecutor) -> Result<bool> {
        Ok(init_service(remote, "nginx", "status")
            .await?
            .contains("is running"))
    }
}

#[async_trait]
impl WebServer for NginxManager {
    fn kind(&self) -> WebServerKind {
        WebServerKind::Nginx
    }

    fn sites_dir(&self) -> &str {
        SITES_DIR
    }

    fn user(&self) -> &str {
        &self.user
    }

    fn group(&self) -> &str {
        &self.group
    }

    async fn create_website(
        &self,
        remote: &dyn RemoteExecutor,
        name: &str,
        config: &str,
        delete_other_sites: bool,
    ) -> Result<()> {
        write_site(remote, SITES_DIR, name, config, delete_other_sites).await
    }
}
