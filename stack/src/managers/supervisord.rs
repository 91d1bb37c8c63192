use common::remote::{RemoteExecutor, Scope, ShellCommand};
use log::info;
use std::collections::BTreeMap;

use crate::error::Result;

const CONF_DIR: &str = "/etc/supervisor/conf.d";

/// A program managed by supervisord.
///
/// Concrete services ([`super::gunicorn::GunicornService`],
/// [`super::tornado::TornadoService`]) render their own program block and
/// delegate control to this type.
pub struct SupervisordService {
    service_name: String,
    environment: BTreeMap<String, String>,
}

impl SupervisordService {
    pub fn new(service_name: &str, environment: BTreeMap<String, String>) -> Self {
        Self {
            service_name: service_name.to_string(),
            environment,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// `key='value'` pairs joined by commas, as supervisor expects.
    pub fn environment_str(&self) -> String {
        self.environment
            .iter()
            .map(|(key, value)| format!("{}={}", key, quote_single(value)))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn config_path(&self) -> String {
        format!("{}/{}.conf", CONF_DIR, self.service_name)
    }

    pub async fn start_daemon(remote: &dyn RemoteExecutor) -> Result<()> {
        Scope::new(remote)
            .sudo()
            .run(&ShellCommand::new("supervisord"))
            .await?;
        Ok(())
    }

    pub async fn stop_daemon(remote: &dyn RemoteExecutor) -> Result<()> {
        Scope::new(remote)
            .sudo()
            .run(&ShellCommand::new("killall").arg("supervisord").or_true())
            .await?;
        Ok(())
    }

    /// Makes a running supervisord reread its configuration.
    pub async fn reload_daemon(remote: &dyn RemoteExecutor) -> Result<()> {
        Scope::new(remote)
            .sudo()
            .run(&ShellCommand::new("killall").args(["-s", "HUP", "supervisord"]))
            .await?;
        Ok(())
    }

    pub async fn daemon_running(remote: &dyn RemoteExecutor) -> Result<bool> {
        let output = Scope::new(remote)
            .run(
                &ShellCommand::new("ps")
                    .arg("-A")
                    .pipe(ShellCommand::new("grep").arg("supervisord"))
                    .or_true(),
            )
            .await?;
        Ok(output.contains("supervisord"))
    }

    /// Installs `config` as this program's block and reloads a running daemon.
    pub async fn create_service(&self, remote: &dyn RemoteExecutor, config: &str) -> Result<()> {
        info!("Installing supervisor program {}", self.service_name);
        let root = Scope::new(remote).sudo();
        root.write_file(&self.config_path(), config).await?;
        if Self::daemon_running(remote).await? {
            Self::reload_daemon(remote).await?;
        }
        Ok(())
    }

    pub async fn control(&self, remote: &dyn RemoteExecutor, action: &str) -> Result<String> {
        let cmd = ShellCommand::new("supervisorctl")
            .arg(action)
            .arg(&self.service_name);
        Ok(Scope::new(remote).sudo().run(&cmd).await?)
    }

    pub async fn start(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        if !Self::daemon_running(remote).await? {
            Self::start_daemon(remote).await?;
        }
        self.control(remote, "start").await.map(|_| ())
    }

    pub async fn stop(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        if Self::daemon_running(remote).await? {
            self.control(remote, "stop").await?;
        }
        Ok(())
    }

    pub async fn restart(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        if !Self::daemon_running(remote).await? {
            Self::start_daemon(remote).await?;
        }
        self.control(remote, "restart").await.map(|_| ())
    }

    /// Restarts supervisord itself.
    pub async fn cold_restart(&self, remote: &dyn RemoteExecutor) -> Result<()> {
        Self::stop_daemon(remote).await?;
        Self::start_daemon(remote).await
    }

    pub async fn is_running(&self, remote: &dyn RemoteExecutor) -> Result<bool> {
        if !Self::daemon_running(remote).await? {
            return Ok(false);
        }
        Ok(self.control(remote, "status").await?.contains("RUNNING"))
    }
}

fn quote_single(value: &str) -> String {
    format!("'{}'", value.replace('\'', "\\'"))
}
