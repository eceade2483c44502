use super::integrity::validate_remote_backup;
use super::{ObjectStorage, RetentionPolicy};
use crate::config::{IntegrityPolicy, S3Settings};
use crate::naming::{dc_prefix, is_first_of_month, object_key};
use crate::pipeline::remote_phase_outcome;
use crate::prelude::*;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// Ships a packaged backup and rotates the datacenter's remote backups.
pub struct RemoteBackupManager {
    storage: Arc<dyn ObjectStorage>,
    dc: String,
    retention: RetentionPolicy,
    first_month_retention: RetentionPolicy,
    integrity_policy: IntegrityPolicy,
}

/// Remote keys split into independently retained populations, each sorted oldest first.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Populations {
    pub regular: Vec<String>,
    pub first_of_month: Vec<String>,
}

impl Populations {
    pub fn partition(dc: &str, keys: impl IntoIterator<Item = String>) -> Self {
        let prefix = dc_prefix(dc);
        let mut populations = Self::default();
        for key in keys.into_iter().filter(|k| k.starts_with(&prefix)) {
            if is_first_of_month(dc, &key) {
                populations.first_of_month.push(key);
            } else {
                populations.regular.push(key);
            }
        }
        populations.regular.sort();
        populations.first_of_month.sort();
        populations
    }
}

impl RemoteBackupManager {
    pub fn new(dc: &str, settings: &S3Settings, storage: Arc<dyn ObjectStorage>) -> Result<Self> {
        let retention = RetentionPolicy::parse("S3_RETENTION_NUMBER", &settings.retention_number)?;
        let first_month_retention = RetentionPolicy::parse(
            "FIRST_MONTH_RETENTION_NUMBER",
            &settings.first_month_retention_number,
        )?;

        Ok(Self {
            storage,
            dc: dc.to_string(),
            retention,
            first_month_retention,
            integrity_policy: settings.integrity_policy,
        })
    }

    /// Uploads `backup`, checks the stored copy and, once it is confirmed, rotates.
    pub async fn execute(&self, backup: &Path) -> Result<()> {
        let key = object_key(backup);

        let chunk_size = self.storage.upload(&key, backup).await.map_err(|e| {
            error!("Upload backup to s3 is not successful: {}", e);
            e
        })?;

        let validation = validate_remote_backup(self.storage.as_ref(), &key, backup, chunk_size).await;
        if !remote_phase_outcome(&key, validation, self.integrity_policy)? {
            return Ok(());
        }
        info!("Backup is valid on s3");

        self.rotate().await.map(|deleted| {
            info!("Remote rotation removed {} backups", deleted.len());
        })
    }

    /// Which keys rotation would delete, in deletion order.
    pub fn evictions(&self, populations: &Populations) -> Vec<String> {
        self.retention
            .evictions(&populations.regular)
            .iter()
            .chain(self.first_month_retention.evictions(&populations.first_of_month))
            .cloned()
            .collect()
    }

    /// Deletes stale remote backups one at a time, waiting for each to disappear. The first
    /// failure stops the rotation.
    pub async fn rotate(&self) -> Result<Vec<String>> {
        let keys = self.storage.list(&dc_prefix(&self.dc)).await?;
        let populations = Populations::partition(&self.dc, keys);
        info!(
            regular = populations.regular.len(),
            first_of_month = populations.first_of_month.len(),
            "Remote backups found"
        );

        let evictions = self.evictions(&populations);
        for key in &evictions {
            self.storage.delete(key).await?;
            self.storage.wait_until_deleted(key).await?;
            info!("Object {} is successfully deleted on s3 because of remote rotation", key);
        }

        Ok(evictions)
    }
}
