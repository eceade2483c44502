use super::RetentionPolicy;
use crate::backup::BackupType;
use crate::error::BackupError;
use crate::naming::{backup_key, is_packaged};
use crate::prelude::*;
use chrono::{DateTime, TimeZone};
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// The local backup directory.
pub struct LocalStorage {
    storage_path: PathBuf,
}

impl LocalStorage {
    pub fn new(storage_path: PathBuf) -> Result<Self> {
        fs::create_dir_all(&storage_path).map_err(|source| BackupError::Directory {
            path: storage_path.clone(),
            source,
        })?;
        Ok(Self { storage_path })
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    /// Where the raw dump taken at `created` goes.
    pub fn backup_path<Tz>(&self, dc: &str, created: &DateTime<Tz>, backup_type: BackupType) -> PathBuf
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        self.storage_path
            .join(backup_key(dc, created, backup_type.suffix()))
    }

    /// Removes every entry that is not a packaged backup, plus all but the `retention`
    /// newest packaged backups. Returns the removed paths.
    ///
    /// An unparsable `retention` aborts before anything is listed or removed. The first
    /// failed removal aborts the rest.
    pub fn rotate(&self, retention: &str) -> Result<Vec<PathBuf>> {
        let policy = RetentionPolicy::parse("LOCAL_RETENTION_NUMBER", retention).map_err(|e| {
            error!("Local retention number can not be converted to integer: {}", e);
            e
        })?;

        let entries = fs::read_dir(&self.storage_path).map_err(|source| {
            error!("Failed to list {:?}: {}", self.storage_path, source);
            BackupError::LocalRotation {
                path: self.storage_path.clone(),
                source,
            }
        })?;

        let mut strays = Vec::new();
        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| BackupError::LocalRotation {
                path: self.storage_path.clone(),
                source,
            })?;
            // Names are only classified lossily; removal uses the path read_dir gave back.
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_packaged(&name) {
                debug!("{} exists on local", name);
                backups.push(entry.path());
            } else {
                strays.push(entry.path());
            }
        }
        strays.sort();
        backups.sort();

        let mut removed = Vec::new();
        for path in strays.iter().chain(policy.evictions(&backups)) {
            remove_entry(path).map_err(|source| {
                error!("Failed to remove {:?}: {}", path, source);
                BackupError::LocalRotation {
                    path: path.clone(),
                    source,
                }
            })?;
            if is_packaged(&path.to_string_lossy()) {
                info!("{:?} is deleted because of backup rotation", path);
            } else {
                debug!("Extra file {:?} is deleted", path);
            }
            removed.push(path.clone());
        }

        Ok(removed)
    }
}

fn remove_entry(path: &Path) -> std::io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    }
}
