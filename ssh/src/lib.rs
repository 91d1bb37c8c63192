use common::remote::RemoteError;
use thiserror::Error;

mod ssh;

pub use ssh::SshExecutor;

#[derive(Error, Debug)]
pub enum SshError {
    #[error("SSH configuration error: {0}")]
    ConfigurationError(String),
    #[error("SSH connection error: {0}")]
    ConnectionError(String),
    #[error("SSH authentication error: {0}")]
    AuthenticationError(String),
    #[error("SSH channel error: {0}")]
    ChannelError(String),
}

impl From<std::io::Error> for SshError {
    fn from(err: std::io::Error) -> Self {
        SshError::ConnectionError(err.to_string())
    }
}

impl SshError {
    pub fn into_remote(self, host: &str) -> RemoteError {
        RemoteError::Connection {
            host: host.to_string(),
            reason: self.to_string(),
        }
    }
}
