use async_trait::async_trait;
use common::remote::RemoteExecutor;

use super::nginx::write_site;
use super::{init_service, Service, WebServer, WebServerKind};
use crate::error::Result;

const SITES_DIR: &str = "/etc/apache2/sites-enabled";

pub struct ApacheManager {
    user: String,
    group: String,
}

impl ApacheManager {
    pub fn new() -> Self {
        Self {
            user: "www-data".to_string(),
            group: "www-data".to_string(),
        }
    }
}

impl Default for ApacheManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Service for ApacheManager {
    fn name(&self) -> &str {
        "apache2"
    }

    async fn start(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        init_service(remote, "apache2", "start").await.map(|_| ())
    }

    async fn stop(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        if self.is_running(remote).await? {
            init_service(remote, "apache2", "stop").await?;
        }
        Ok(())
    }

    async fn restart(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        init_service(remote, "apache2", "restart").await.map(|_| ())
    }

    async fn is_running(&self, remote: &dyn RemoteExecutor) -> Result<bool> {
        Ok(init_service(remote, "apache2", "status")
            .await?
            .contains("is running"))
    }
}

#[async_trait]
impl WebServer for ApacheManager {
    fn kind(&self) -> WebServerKind {
        WebServerKind::Apache
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

#[cfg(test)]
mod tests {
    use super::*;
    use common::remote::testing::RecordingExecutor;

    #[tokio::test]
    async fn running_state_comes_from_service_status() {
        let remote = RecordingExecutor::new("web1");
        remote.respond("service apache2 status", "Apache2 is running (pid 1234).");
        let apache = ApacheManager::new();
        assert!(apache.is_running(&remote).await.unwrap());
        apache.restart(&remote).await.unwrap();
        assert_eq!(remote.commands().last().unwrap(), "sudo: service apache2 restart");
    }

    #[tokio::test]
    async fn keeps_other_sites_by_default() {
        let remote = RecordingExecutor::new("web1");
        ApacheManager::new()
            .create_website(&remote, "site", "<VirtualHost *:80>\n</VirtualHost>\n", false)
            .await
            .unwrap();
        assert_eq!(remote.commands(), vec!["put[sudo]: /etc/apache2/sites-enabled/site"]);
    }
}
