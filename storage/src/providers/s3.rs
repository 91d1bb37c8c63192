use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use common::remote::{RemoteExecutor, Scope};
use log::{debug, error, info};
use stack::backup::BackupStorage;
use stack::Result;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::StorageError;
use crate::providers::file_name;

const PART_SIZE: usize = 5 * 1024 * 1024; // S3 minimum

/// Connection settings for an S3-compatible endpoint.
#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    pub bucket: String,
    pub prefix: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

/// Keeps archives in a bucket. Transfers go through a local temporary file,
/// the target host never talks to S3 itself.
pub struct S3Storage {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Storage {
    pub async fn new(settings: S3Settings) -> std::result::Result<Self, StorageError> {
        if settings.bucket.is_empty() {
            return Err(StorageError::Configuration("S3 destination needs a bucket".into()));
        }
        let region = settings.region.clone().unwrap_or_else(|| "us-east-1".to_string());
        let mut config_builder = aws_config::defaults(BehaviorVersion::v2025_01_17())
            .region(Region::new(region.clone()))
            .retry_config(aws_config::retry::RetryConfig::standard().with_max_attempts(3));

        if let (Some(access_key), Some(secret_key)) =
            (settings.access_key.clone(), settings.secret_key.clone())
        {
            let credentials = aws_credential_types::Credentials::new(
                access_key, secret_key, None, None, "bount-config",
            );
            config_builder =
                config_builder.credentials_provider(SharedCredentialsProvider::new(credentials));
        }

        match &settings.endpoint {
            Some(endpoint) => {
                info!("Using custom S3 endpoint: {endpoint}");
                config_builder = config_builder.endpoint_url(endpoint);
            }
            None => debug!("Using default S3 endpoint for region {region}"),
        }

        let sdk_config = config_builder.load().await;
        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        // MinIO and friends only speak path-style addressing
        if settings.endpoint.is_some() {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(s3_config_builder.build()),
            bucket: settings.bucket,
            prefix: normalize_prefix(settings.prefix.as_deref()),
        })
    }

    fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    async fn upload(&self, key: &str, file_path: &Path) -> std::result::Result<(), StorageError> {
        let file = tokio::fs::File::open(file_path).await?;
        let file_size = file.metadata().await?.len();
        let mut reader = tokio::io::BufReader::new(file);

        if file_size <= PART_SIZE as u64 {
            let mut buffer = Vec::with_capacity(file_size as usize);
            reader.read_to_end(&mut buffer).await?;
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .content_type("application/gzip")
                .body(ByteStream::from(buffer))
                .send()
                .await
                .map_err(|e| self.failure("put_object", key, &e))?;
            info!("Uploaded {} to s3://{}/{} ({} bytes)", file_path.display(), self.bucket, key, file_size);
            return Ok(());
        }

        let upload_id = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/gzip")
            .send()
            .await
            .map_err(|e| self.failure("create_multipart_upload", key, &e))?
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| StorageError::Aws("no upload id returned".to_string()))?;

        let mut parts: Vec<CompletedPart> = Vec::new();
        let mut part_number = 1;
        loop {
            let mut buf = vec![0u8; PART_SIZE];
            let mut filled = 0;
            while filled < PART_SIZE {
                let n = reader.read(&mut buf[filled..]).await?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled == 0 {
                break;
            }
            debug!("Uploading part {part_number} ({filled} bytes)");
            let part = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(&upload_id)
                .part_number(part_number)
                .body(ByteStream::from(buf[..filled].to_vec()))
                .send()
                .await;
            let part = match part {
                Ok(part) => part,
                Err(e) => {
                    let err = self.failure("upload_part", key, &e);
                    self.abort(key, &upload_id).await;
                    return Err(err);
                }
            };
            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(part.e_tag().map(str::to_string))
                    .build(),
            );
            part_number += 1;
            if filled < PART_SIZE {
                break;
            }
        }

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(parts)).build())
            .send()
            .await
            .map_err(|e| self.failure("complete_multipart_upload", key, &e))?;
        info!("Multipart upload completed: s3://{}/{}", self.bucket, key);
        Ok(())
    }

    async fn abort(&self, key: &str, upload_id: &str) {
        let aborted = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await;
        if let Err(e) = aborted {
            error!("Failed to abort multipart upload of {key}: {e}");
        }
    }

    async fn download(&self, key: &str, destination: &Path) -> std::result::Result<(), StorageError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("NoSuchKey") || msg.contains("404") {
                    StorageError::NotFound(format!("s3://{}/{}", self.bucket, key))
                } else {
                    self.failure("get_object", key, &e)
                }
            })?;

        let mut file = tokio::fs::File::create(destination).await?;
        let mut body = resp.body.into_async_read();
        tokio::io::copy(&mut body, &mut file).await?;
        file.flush().await?;
        Ok(())
    }

    async fn list_keys(&self) -> std::result::Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.bucket);
            if !self.prefix.is_empty() {
                request = request.prefix(&self.prefix);
            }
            if let Some(token) = continuation.take() {
                request = request.continuation_token(token);
            }
            let page = request
                .send()
                .await
                .map_err(|e| self.failure("list_objects_v2", &self.prefix, &e))?;
            names.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .filter_map(|key| artifact_name(&self.prefix, key)),
            );
            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string())
                }
                _ => break,
            }
        }
        names.sort();
        Ok(names)
    }

    fn failure(&self, operation: &str, key: &str, err: &dyn std::error::Error) -> StorageError {
        error!("S3 {operation} failed for s3://{}/{key}: {err}", self.bucket);
        report_s3_error_to_sentry(operation, err, &self.bucket, key);
        StorageError::Aws(format!("{operation}: {err}"))
    }
}

#[async_trait]
impl BackupStorage for S3Storage {
    fn describe(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.prefix)
    }

    async fn save(&self, remote: &dyn RemoteExecutor, file: &str) -> Result<()> {
        let scratch = tempfile::tempdir()?;
        let name = file_name(file);
        let local = scratch.path().join(name);
        Scope::new(remote).download(file, &local).await?;
        self.upload(&self.key(name), &local).await?;
        Ok(())
    }

    async fn list(&self, _remote: &dyn RemoteExecutor) -> Result<Vec<String>> {
        Ok(self.list_keys().await?)
    }

    async fn get(&self, remote: &dyn RemoteExecutor, name: &str, destination: &str) -> Result<String> {
        let scratch = tempfile::tempdir()?;
        let local = scratch.path().join(name);
        self.download(&self.key(name), &local).await?;
        let target = format!("{}/{}", destination.trim_end_matches('/'), name);
        Scope::new(remote).upload(&local, &target).await?;
        Ok(target)
    }
}

fn normalize_prefix(prefix: Option<&str>) -> String {
    match prefix.map(|p| p.trim_matches('/')) {
        Some(p) if !p.is_empty() => format!("{}/", p),
        _ => String::new(),
    }
}

/// Name of the artifact stored under `key`, ignoring nested "folders".
fn artifact_name(prefix: &str, key: &str) -> Option<String> {
    let name = key.strip_prefix(prefix)?;
    (!name.is_empty() && !name.contains('/')).then(|| name.to_string())
}

fn report_s3_error_to_sentry(operation: &str, error: &dyn std::error::Error, bucket: &str, key: &str) {
    sentry::with_scope(
        |scope| {
            scope.set_tag("s3.operation", operation);
            scope.set_extra("bucket", bucket.into());
            scope.set_extra("key", key.into());
        },
        || sentry::capture_message(&format!("{operation}: {error}"), sentry::Level::Error),
    );
}
