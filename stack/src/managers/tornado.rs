use async_trait::async_trait;
use common::remote::{DirOptions, RemoteExecutor, Scope};
use minijinja::context;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::supervisord::SupervisordService;
use super::{Service, WebServer};
use crate::error::Result;
use crate::templates::{self, NGINX_UPSTREAM, SUPERVISOR_TORNADO};

/// A pool of Tornado processes, one per port starting at `start_port`.
pub struct TornadoService {
    supervisor: SupervisordService,
    pub script_path: String,
    pub user: String,
    pub group: Option<String>,
    pub workers: u32,
    pub start_port: u16,
    pub virtualenv_dir: Option<String>,
    pub src_path: String,
    pub log_dir: String,
    frontend: Option<(Arc<dyn WebServer>, u16)>,
}

impl TornadoService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        service_name: &str,
        script_path: &str,
        user: &str,
        group: Option<&str>,
        workers: u32,
        start_port: u16,
        virtualenv_dir: Option<String>,
        src_path: &str,
        log_dir: &str,
        environment: BTreeMap<String, String>,
    ) -> Self {
        Self {
            supervisor: SupervisordService::new(service_name, environment),
            script_path: script_path.to_string(),
            user: user.to_string(),
            group: group.map(str::to_string),
            workers,
            start_port,
            virtualenv_dir,
            src_path: src_path.to_string(),
            log_dir: log_dir.to_string(),
            frontend: None,
        }
    }

    /// Publishes the pool through `webserver` as an upstream on `listen`.
    pub fn with_frontend(mut self, webserver: Arc<dyn WebServer>, listen: u16) -> Self {
        self.frontend = Some((webserver, listen));
        self
    }

    pub fn ports(&self) -> Vec<u32> {
        let start = u32::from(self.start_port);
        (start..start + self.workers).collect()
    }

    pub fn supervisor_config(&self) -> Result<String> {
        let bin_dir = self
            .virtualenv_dir
            .as_ref()
            .map(|dir| format!("{}/bin/", dir))
            .unwrap_or_default();
        templates::render(
            SUPERVISOR_TORNADO,
            &context! {
                service_name => self.supervisor.service_name(),
                src_path => self.src_path,
                user => self.user,
                group => self.group,
                log_dir => self.log_dir,
                workers => self.workers,
                start_port => self.start_port,
                bin_dir => bin_dir,
                script_path => self.script_path,
                environment => self.supervisor.environment_str(),
            },
        )
    }

    pub fn upstream_config(&self, listen: u16) -> Result<String> {
        templates::render(
            NGINX_UPSTREAM,
            &context! {
                upstream => format!("{}_frontends", self.supervisor.service_name()),
                ports => self.ports(),
                listen => listen,
            },
        )
    }
}

#[async_trait]
impl Service for TornadoService {
    fn name(&self) -> &str {
        self.supervisor.service_name()
    }

    async fn setup(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        Scope::new(remote)
            .sudo()
            .dir_ensure(&self.log_dir, &DirOptions::recursive().mode("777"))
            .await?;
        let config = self.supervisor_config()?;
        self.supervisor.create_service(remote, &config).await?;

        if let Some((webserver, listen)) = &self.frontend {
            let site = self.upstream_config(*listen)?;
            webserver
                .create_website(remote, self.supervisor.service_name(), &site, false)
                .await?;
        }
        Ok(())
    }

    async fn start(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        self.supervisor.start(remote).await
    }

    async fn stop(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        self.supervisor.stop(remote).await
    }

    async fn restart(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        self.supervisor.restart(remote).await
    }

    async fn is_running(&self, remote: &dyn RemoteExecutor) -> Result<bool> {
        self.supervisor.is_running(remote).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managers::nginx::NginxManager;
    use common::remote::testing::RecordingExecutor;

    fn tornado() -> TornadoService {
        TornadoService::new(
            "chat",
            "/srv/chat/src/server.py",
            "www-data",
            None,
            3,
            8001,
            Some("/srv/chat/site/venv".to_string()),
            "/srv/chat/src",
            "/srv/chat/site/logs",
            BTreeMap::new(),
        )
    }

    #[test]
    fn program_block_declares_the_pool() {
        let config = tornado().supervisor_config().unwrap();
        assert!(config.contains("process_name = main-%(process_num)s\n"));
        assert!(config.contains("numprocs = 3\n"));
        assert!(config.contains("numprocs_start = 8001\n"));
        assert!(config.contains(
            "command=/srv/chat/site/venv/bin/python /srv/chat/src/server.py %(process_num)s\n"
        ));
        assert!(config.contains("stdout_logfile = /srv/chat/site/logs/tornado_out.log\n"));
    }

    #[tokio::test]
    async fn setup_publishes_an_upstream_site() {
        let remote = RecordingExecutor::new("web1");
        let service = tornado().with_frontend(Arc::new(NginxManager::new()), 80);
        service.setup(&remote).await.unwrap();

        let site = remote.file("/etc/nginx/sites-enabled/chat").unwrap();
        assert!(site.contains("upstream chat_frontends {"));
        assert!(site.contains("server 127.0.0.1:8001;\n    server 127.0.0.1:8002;\n    server 127.0.0.1:8003;\n"));
        assert!(site.contains("listen 80;"));
        assert!(remote.file("/etc/supervisor/conf.d/chat.conf").is_some());
    }
}
