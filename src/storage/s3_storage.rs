use super::integrity::read_chunk;
use super::ObjectStorage;
use crate::config::S3Settings;
use crate::error::S3Error;
use crate::prelude::*;
use aws_sdk_s3::client::Waiters;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, ObjectCannedAcl};
use aws_sdk_s3::Client;
use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Smallest part S3 accepts in a multipart upload, and the part size used by default.
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Most parts a single multipart upload may have.
pub const MAX_UPLOAD_PARTS: u64 = 10_000;

/// Upper bound for confirming a deletion (20 polls, 5 seconds apart).
const DELETE_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(100);

const DEFAULT_REGION: &str = "us-east-1";

pub struct S3Storage {
    client: Client,
    bucket: String,
}

/// Part size for an object of `size` bytes: the minimum, grown just enough to stay under
/// the part count limit.
pub fn part_size_for(size: u64) -> u64 {
    if size / MIN_PART_SIZE >= MAX_UPLOAD_PARTS {
        size / MAX_UPLOAD_PARTS + 1
    } else {
        MIN_PART_SIZE
    }
}

impl S3Storage {
    pub async fn new(settings: &S3Settings) -> Result<Self> {
        if settings.bucket.is_empty() {
            return Err(S3Error::Config("bucket name is empty".to_string()).into());
        }
        let region = if settings.region.is_empty() {
            DEFAULT_REGION.to_string()
        } else {
            settings.region.clone()
        };
        let credentials = Credentials::new(
            &settings.access_key_id,
            &settings.secret_access_key,
            None,
            None,
            "os-database-backup",
        );

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::v2024_03_28())
            .region(Region::new(region))
            .credentials_provider(credentials);
        if let Some(endpoint) = &settings.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        // Custom endpoints (Ceph RGW, MinIO) generally only serve path-style requests.
        let config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(settings.endpoint.is_some())
            .build();

        Ok(Self {
            client: Client::from_conf(config),
            bucket: settings.bucket.clone(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_single(&self, key: &str, path: &Path) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| S3Error::Upload(format!("failed to read {:?}: {}", path, e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .acl(ObjectCannedAcl::Private)
            .body(body)
            .send()
            .await
            .map_err(|e| S3Error::Upload(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }

    async fn put_multipart(&self, key: &str, path: &Path, part_size: u64) -> Result<()> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .acl(ObjectCannedAcl::Private)
            .send()
            .await
            .map_err(|e| S3Error::Upload(DisplayErrorContext(&e).to_string()))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| S3Error::Upload(format!("no upload id returned for {key}")))?
            .to_string();

        let parts = match self.upload_parts(key, &upload_id, path, part_size).await {
            Ok(parts) => parts,
            Err(e) => {
                self.abort_multipart(key, &upload_id).await;
                return Err(e);
            }
        };

        let completed = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await;
        if let Err(e) = completed {
            self.abort_multipart(key, &upload_id).await;
            return Err(S3Error::Upload(DisplayErrorContext(&e).to_string()).into());
        }
        Ok(())
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        path: &Path,
        part_size: u64,
    ) -> Result<Vec<CompletedPart>> {
        let mut file = File::open(path)
            .map_err(|e| S3Error::Upload(format!("failed to open {:?}: {}", path, e)))?;
        let mut buf = vec![0u8; part_size as usize];
        let mut parts = Vec::new();
        let mut part_number = 1;

        loop {
            let n = read_chunk(&mut file, &mut buf)
                .map_err(|e| S3Error::Upload(format!("failed to read {:?}: {}", path, e)))?;
            if n == 0 {
                break;
            }

            let uploaded = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(buf[..n].to_vec()))
                .send()
                .await
                .map_err(|e| S3Error::Upload(DisplayErrorContext(&e).to_string()))?;

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(uploaded.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );
            part_number += 1;

            if n < buf.len() {
                break;
            }
        }

        Ok(parts)
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) {
        warn!("Aborting multipart upload {} of {}", upload_id, key);
        if let Err(e) = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
        {
            error!("Failed to abort multipart upload of {}: {}", key, DisplayErrorContext(&e));
        }
    }
}

#[async_trait::async_trait]
impl ObjectStorage for S3Storage {
    async fn upload(&self, key: &str, path: &Path) -> Result<u64> {
        let size = fs::metadata(path)
            .map_err(|e| {
                error!("Failed to open {:?} for upload: {}", path, e);
                S3Error::Upload(format!("failed to open {:?}: {}", path, e))
            })?
            .len();
        let part_size = part_size_for(size);

        info!("Uploading backup to s3 starting...");
        let started = Instant::now();
        let result = if size <= part_size {
            self.put_single(key, path).await
        } else {
            self.put_multipart(key, path, part_size).await
        };
        if let Err(e) = result {
            error!("Upload of {} failed: {}", key, e);
            return Err(e);
        }

        info!(
            key,
            part_size,
            total_upload_time = ?started.elapsed(),
            "Backup uploaded to s3 successfully"
        );
        Ok(part_size)
    }

    async fn etag(&self, key: &str) -> Result<String> {
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                error!("Head of {} failed: {}", key, DisplayErrorContext(&e));
                S3Error::Query(DisplayErrorContext(&e).to_string())
            })?;
        Ok(head.e_tag().unwrap_or_default().to_string())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| {
                error!("Can not list objects for deletion: {}", DisplayErrorContext(&e));
                S3Error::Query(DisplayErrorContext(&e).to_string())
            })?;
            keys.extend(page.contents().iter().filter_map(|o| o.key().map(str::to_string)));
        }
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                error!("Can not delete object {}: {}", key, DisplayErrorContext(&e));
                S3Error::Deletion(DisplayErrorContext(&e).to_string())
            })?;
        Ok(())
    }

    async fn wait_until_deleted(&self, key: &str) -> Result<()> {
        self.client
            .wait_until_object_not_exists()
            .bucket(&self.bucket)
            .key(key)
            .wait(DELETE_CONFIRMATION_TIMEOUT)
            .await
            .map_err(|e| {
                error!("Problem while waiting for object {} to be deleted: {}", key, DisplayErrorContext(&e));
                S3Error::Deletion(DisplayErrorContext(&e).to_string())
            })?;
        Ok(())
    }
}
