use async_trait::async_trait;
use common::remote::{DirOptions, RemoteExecutor, Scope};
use minijinja::context;
use std::collections::BTreeMap;

use super::supervisord::SupervisordService;
use super::Service;
use crate::error::Result;
use crate::templates::{self, SUPERVISOR_GUNICORN};

pub const DEFAULT_BIND: &str = "127.0.0.1:8000";

/// Gunicorn serving the application's WSGI entry point under supervisord.
pub struct GunicornService {
    supervisor: SupervisordService,
    pub user: String,
    pub group: Option<String>,
    pub workers: u32,
    pub virtualenv_dir: Option<String>,
    pub src_path: String,
    pub log_dir: String,
    pub site_path: String,
    pub bind: String,
}

impl GunicornService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        service_name: &str,
        user: &str,
        group: Option<&str>,
        workers: u32,
        virtualenv_dir: Option<String>,
        src_path: &str,
        log_dir: &str,
        site_path: &str,
        environment: BTreeMap<String, String>,
    ) -> Self {
        Self {
            supervisor: SupervisordService::new(service_name, environment),
            user: user.to_string(),
            group: group.map(str::to_string),
            workers,
            virtualenv_dir,
            src_path: src_path.to_string(),
            log_dir: log_dir.to_string(),
            site_path: site_path.to_string(),
            bind: DEFAULT_BIND.to_string(),
        }
    }

    pub fn supervisor_config(&self) -> Result<String> {
        let bin_dir = self
            .virtualenv_dir
            .as_ref()
            .map(|dir| format!("{}/bin/", dir))
            .unwrap_or_default();
        templates::render(
            SUPERVISOR_GUNICORN,
            &context! {
                service_name => self.supervisor.service_name(),
                src_path => self.src_path,
                user => self.user,
                group => self.group,
                bin_dir => bin_dir,
                workers => self.workers,
                bind => self.bind,
                site_path => self.site_path,
                log_dir => self.log_dir,
                environment => self.supervisor.environment_str(),
            },
        )
    }
}

#[async_trait]
impl Service for GunicornService {
    fn name(&self) -> &str {
        self.supervisor.service_name()
    }

    async fn setup(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        Scope::new(remote)
            .sudo()
            .dir_ensure(&self.log_dir, &DirOptions::recursive().mode("777"))
            .await?;
        let config = self.supervisor_config()?;
        self.supervisor.create_service(remote, &config).await
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
