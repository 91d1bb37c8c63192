//! Backup destinations.
//!
//! Every destination implements [`stack::backup::BackupStorage`]: a folder on
//! the machine running the deployment, a folder on the target host, or an
//! S3-compatible bucket. [`backup_plan`] turns the `[backup]` configuration
//! section into the named destinations a stack resolves against.

mod error;
pub mod providers;

pub use error::StorageError;
pub use providers::*;

use common::config::{expand_path, BackupConfig, DestinationConfig};
use log::debug;
use stack::backup::{BackupPlan, BackupStorage};
use std::sync::Arc;

/// Builds the storage described by one destination entry.
pub async fn create_storage(
    config: &DestinationConfig,
) -> Result<Arc<dyn BackupStorage>, StorageError> {
    let storage: Arc<dyn BackupStorage> = match config {
        DestinationConfig::Client { folder } => Arc::new(ClientStorage::new(expand_path(folder))),
        DestinationConfig::Server { folder } => Arc::new(ServerStorage::new(folder)),
        DestinationConfig::S3 {
            bucket,
            prefix,
            region,
            endpoint,
            access_key,
            secret_key,
        } => Arc::new(
            S3Storage::new(S3Settings {
                bucket: bucket.clone(),
                prefix: prefix.clone(),
                region: region.clone(),
                endpoint: endpoint.clone(),
                access_key: access_key.clone(),
                secret_key: secret_key.clone(),
            })
            .await?,
        ),
    };
    Ok(storage)
}

/// All configured destinations. A default that names no destination is a
/// configuration error.
pub async fn backup_plan(config: &BackupConfig) -> Result<BackupPlan, StorageError> {
    let mut plan = BackupPlan::new();
    for (name, destination) in &config.destinations {
        let storage = create_storage(destination).await?;
        debug!("Backup destination {}: {}", name, storage.describe());
        plan = plan.with_destination(name, storage);
    }
    if let Some(default) = &config.default {
        if !config.destinations.contains_key(default) {
            return Err(StorageError::Configuration(format!(
                "default destination {} is not configured",
                default
            )));
        }
        plan = plan.with_default(default);
    }
    Ok(plan)
}
