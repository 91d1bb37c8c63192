use async_trait::async_trait;
use common::remote::{quote, RemoteError, RemoteExecutor};
use log;
use russh::keys::*;
use russh::*;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::SshError;

/// Runs commands on a remote host over a single, lazily opened SSH session.
pub struct SshExecutor {
    pub host: String,
    pub user: String,
    private_key_path: Option<String>,
    password: Option<String>,
    port: u16,
    session: Mutex<Option<client::Handle<Client>>>,
}

struct Client;

impl client::Handler for Client {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// What a finished exec channel produced.
struct Output {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    status: u32,
}

impl SshExecutor {
    pub fn new(host: String, user: String, port: Option<u16>) -> Self {
        Self {
            host,
            user,
            private_key_path: None,
            password: None,
            port: port.unwrap_or(22),
            session: Mutex::new(None),
        }
    }

    pub fn with_private_key_path(mut self, private_key_path: String) -> Self {
        self.private_key_path = Some(private_key_path);
        self
    }

    pub fn with_password(mut self, password: String) -> Self {
        self.password = Some(password);
        self
    }

    async fn connect(&self) -> Result<client::Handle<Client>, SshError> {
        let config = Arc::new(client::Config::default());
        let mut session = client::connect(config, (self.host.as_str(), self.port), Client)
            .await
            .map_err(|e| SshError::ConnectionError(e.to_string()))?;

        let authenticated = match (&self.private_key_path, &self.password) {
            (Some(key_path), _) => {
                let key_path = common::config::expand_path(key_path);
                let key_pair = load_secret_key(&key_path, None)
                    .map_err(|e| SshError::ConfigurationError(format!("{}: {}", key_path, e)))?;
                let hash = session
                    .best_supported_rsa_hash()
                    .await
                    .map_err(|e| SshError::AuthenticationError(e.to_string()))?
                    .flatten();
                session
                    .authenticate_publickey(
                        &self.user,
                        PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash),
                    )
                    .await
                    .map_err(|e| SshError::AuthenticationError(e.to_string()))?
                    .success()
            }
            (None, Some(password)) => session
                .authenticate_password(&self.user, password)
                .await
                .map_err(|e| SshError::AuthenticationError(e.to_string()))?
                .success(),
            (None, None) => {
                return Err(SshError::ConfigurationError(format!(
                    "no private key or password configured for {}@{}",
                    self.user, self.host
                )))
            }
        };

        if !authenticated {
            return Err(SshError::AuthenticationError(format!(
                "authentication failed for {}@{}",
                self.user, self.host
            )));
        }

        log::info!("Connected to {}@{}:{}", self.user, self.host, self.port);
        Ok(session)
    }

    /// Executes `command` on a fresh channel, optionally feeding `stdin`.
    async fn exec(&self, command: &str, stdin: Option<&[u8]>) -> Result<Output, SshError> {
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }
        let session = guard
            .as_ref()
            .ok_or_else(|| SshError::ConnectionError("session unavailable".to_string()))?;

        let mut channel = session
            .channel_open_session()
            .await
            .map_err(|e| SshError::ChannelError(e.to_string()))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| SshError::ChannelError(e.to_string()))?;

        if let Some(payload) = stdin {
            channel
                .data(payload)
                .await
                .map_err(|e| SshError::ChannelError(e.to_string()))?;
            channel
                .eof()
                .await
                .map_err(|e| SshError::ChannelError(e.to_string()))?;
        }

        let mut output = Output {
            stdout: Vec::new(),
            stderr: Vec::new(),
            status: 0,
        };
        let mut status = None;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => output.stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext: 1 } => {
                    output.stderr.extend_from_slice(data)
                }
                ChannelMsg::ExitStatus { exit_status } => status = Some(exit_status),
                ChannelMsg::Close => break,
                _ => {}
            }
        }

        output.status = status.ok_or_else(|| {
            SshError::ChannelError(format!("no exit status received for `{}`", command))
        })?;
        Ok(output)
    }

    async fn checked(&self, command: &str, stdin: Option<&[u8]>) -> Result<Output, RemoteError> {
        let output = self
            .exec(command, stdin)
            .await
            .map_err(|e| e.into_remote(&self.host))?;
        if output.status != 0 {
            return Err(RemoteError::CommandFailed {
                host: self.host.clone(),
                command: command.to_string(),
                status: output.status as i32,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}

fn sudo_line(command: &str, as_user: Option<&str>) -> String {
    match as_user {
        Some(user) => format!("sudo -n -u {} sh -c {}", quote(user), quote(command)),
        None => format!("sudo -n sh -c {}", quote(command)),
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    fn host(&self) -> &str {
        &self.host
    }

    async fn run(&self, command: &str) -> Result<String, RemoteError> {
        let output = self.checked(command, None).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run_privileged(
        &self,
        command: &str,
        as_user: Option<&str>,
    ) -> Result<String, RemoteError> {
        let output = self.checked(&sudo_line(command, as_user), None).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run_local(&self, command: &str) -> Result<String, RemoteError> {
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await?;
        if !output.status.success() {
            return Err(RemoteError::CommandFailed {
                host: "localhost".to_string(),
                command: command.to_string(),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn upload_file(
        &self,
        local: &Path,
        remote: &str,
        privileged: bool,
    ) -> Result<(), RemoteError> {
        let contents = tokio::fs::read(local).await?;
        let command = if privileged {
            format!("sudo -n tee {} > /dev/null", quote(remote))
        } else {
            format!("cat > {}", quote(remote))
        };
        log::debug!("Uploading {} to {}:{}", local.display(), self.host, remote);
        self.checked(&command, Some(&contents))
            .await
            .map_err(|e| RemoteError::Transfer {
                path: remote.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn download_file(&self, remote: &str, local: &Path) -> Result<(), RemoteError> {
        log::debug!("Downloading {}:{} to {}", self.host, remote, local.display());
        let output = self
            .checked(&format!("cat {}", quote(remote)), None)
            .await
            .map_err(|e| RemoteError::Transfer {
                path: remote.to_string(),
                reason: e.to_string(),
            })?;
        tokio::fs::write(local, output.stdout).await?;
        Ok(())
    }
}
