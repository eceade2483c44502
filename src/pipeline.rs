//! Phase sequencing and error precedence.

use crate::backup::BackupManager;
use crate::config::{IntegrityPolicy, Settings};
use crate::error::S3Error;
use crate::naming::object_key;
use crate::prelude::*;
use crate::storage::{ObjectStorage, RemoteBackupManager, S3Storage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, warn};

/// Result of the local phase.
///
/// | packaging | rotation | outcome                                   |
/// |-----------|----------|-------------------------------------------|
/// | ok        | ok       | the packaged path                         |
/// | ok        | error    | the rotation error                        |
/// | error     | any      | the packaging error, rotation error dropped |
pub fn local_phase_outcome(packaging: Result<PathBuf>, rotation: Result<()>) -> Result<PathBuf> {
    match (packaging, rotation) {
        (Ok(path), Ok(())) => Ok(path),
        (Ok(_), Err(rotation)) => Err(rotation),
        (Err(packaging), Err(rotation)) => {
            warn!("Local rotation error superseded by packaging error: {}", rotation);
            Err(packaging)
        }
        (Err(packaging), Ok(())) => Err(packaging),
    }
}

/// Whether remote rotation may run after validating `key`.
///
/// | validation | policy  | outcome                     |
/// |------------|---------|-----------------------------|
/// | error      | any     | the validation error        |
/// | valid      | any     | rotate                      |
/// | invalid    | strict  | `S3Error::IntegrityMismatch` |
/// | invalid    | lenient | skip rotation, no error     |
pub fn remote_phase_outcome(key: &str, validation: Result<bool>, policy: IntegrityPolicy) -> Result<bool> {
    match (validation, policy) {
        (Err(e), _) => {
            error!("Validating remote backup is not successful: {}", e);
            Err(e)
        }
        (Ok(true), _) => Ok(true),
        (Ok(false), IntegrityPolicy::Strict) => {
            error!("Backup {} is not valid on s3", key);
            Err(S3Error::IntegrityMismatch { key: key.to_string() }.into())
        }
        (Ok(false), IntegrityPolicy::Lenient) => {
            error!("Backup {} is not valid on s3, skipping remote rotation", key);
            Ok(false)
        }
    }
}

/// Runs both phases against S3 and returns the shipped backup's name.
pub async fn run(settings: &Settings) -> Result<String> {
    let storage = S3Storage::new(&settings.s3).await?;
    run_with(settings, Arc::new(storage)).await
}

/// Runs both phases against `storage`. Both managers are built, and so every retention
/// count parsed, before the local phase deletes anything.
pub async fn run_with(settings: &Settings, storage: Arc<dyn ObjectStorage>) -> Result<String> {
    let backup_manager = BackupManager::new(&settings.dc, &settings.backup)?;
    let remote = RemoteBackupManager::new(&settings.dc, &settings.s3, storage)?;

    let backup = backup_manager.execute()?;
    remote.execute(&backup).await?;
    Ok(object_key(&backup))
}

/// Runs the remote phase for an already packaged backup.
pub async fn ship(settings: &Settings, storage: Arc<dyn ObjectStorage>, backup: &Path) -> Result<String> {
    let remote = RemoteBackupManager::new(&settings.dc, &settings.s3, storage)?;
    remote.execute(backup).await?;
    Ok(object_key(backup))
}
