//! Cloud Storage download support.
//!
//! Report artifacts live in buckets the reporting API owns; all this
//! module needs is a full-object download keyed by bucket and path,
//! authenticated with the caller's service account key.

use async_trait::async_trait;
use bytes::Bytes;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path;
use object_store::ObjectStore;
use snafu::prelude::*;
use std::time::Instant;
use tracing::debug;

use crate::emit;
use crate::error::{ArtifactError, DownloadSnafu, StorageClientSnafu};
use crate::metrics::events::{ArtifactDownloadCompleted, RequestStatus, StorageRequest};

/// Full-object download from a bucket.
#[async_trait]
pub trait ObjectDownloader: Send + Sync {
    async fn download(&self, bucket: &str, path: &str) -> Result<Bytes, ArtifactError>;
}

/// GCS-backed downloader authenticated with a service account key.
pub struct GcsDownloader {
    service_account_key: String,
}

impl GcsDownloader {
    pub fn new(service_account_key: impl Into<String>) -> Self {
        Self {
            service_account_key: service_account_key.into(),
        }
    }
}

#[async_trait]
impl ObjectDownloader for GcsDownloader {
    async fn download(&self, bucket: &str, path: &str) -> Result<Bytes, ArtifactError> {
        let store = GoogleCloudStorageBuilder::new()
            .with_bucket_name(bucket)
            .with_service_account_key(&self.service_account_key)
            .build()
            .context(StorageClientSnafu {
                bucket: bucket.to_string(),
            })?;

        let uri = format!("gs://{bucket}/{path}");
        let start = Instant::now();
        let result = store.get(&Path::from(path)).await;

        let status = if result.is_ok() {
            RequestStatus::Success
        } else {
            RequestStatus::Error
        };
        emit!(StorageRequest { status });

        let bytes = result
            .context(DownloadSnafu { uri: uri.clone() })?
            .bytes()
            .await
            .context(DownloadSnafu { uri: uri.clone() })?;

        emit!(ArtifactDownloadCompleted {
            duration: start.elapsed()
        });
        debug!("Downloaded {} ({} bytes)", uri, bytes.len());
        Ok(bytes)
    }
}
