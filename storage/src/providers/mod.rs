pub mod client;
pub mod s3;
pub mod server;

pub use client::ClientStorage;
pub use s3::{S3Settings, S3Storage};
pub use server::ServerStorage;

/// Last path component of a remote file.
pub(crate) fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
