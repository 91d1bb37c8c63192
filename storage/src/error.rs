use stack::StackError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("S3 error: {0}")]
    Aws(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for StackError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => {
                StackError::BackupExecution(format!("backup {} not found", what))
            }
            StorageError::Configuration(reason) => StackError::BackupConfiguration(reason),
            other => StackError::Storage(other.to_string()),
        }
    }
}
