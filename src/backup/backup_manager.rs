use super::{protect_compress, BackupType, DumpProducer};
use crate::config::BackupSettings;
use crate::pipeline::local_phase_outcome;
use crate::prelude::*;
use crate::storage::LocalStorage;
use chrono::{DateTime, Local, TimeZone};
use std::fmt::Display;
use std::path::PathBuf;
use tracing::{error, info};

/// Produces one packaged backup in the local directory and rotates that directory.
pub struct BackupManager {
    dc: String,
    backup_type: BackupType,
    producer: DumpProducer,
    local_storage: LocalStorage,
    zip_pass: String,
    local_retention_number: String,
}

impl BackupManager {
    pub fn new(dc: &str, settings: &BackupSettings) -> Result<Self> {
        let backup_type = settings.backup_type.parse::<BackupType>().map_err(|e| {
            error!("{}", e);
            e
        })?;
        let local_storage = LocalStorage::new(settings.local_directory.clone())?;

        Ok(Self {
            dc: dc.to_string(),
            backup_type,
            producer: DumpProducer::new(
                backup_type,
                settings.dump_script.clone(),
                settings.database.clone(),
            ),
            local_storage,
            zip_pass: settings.zip_pass.clone(),
            local_retention_number: settings.local_retention_number.clone(),
        })
    }

    pub fn backup_type(&self) -> BackupType {
        self.backup_type
    }

    /// Dumps, packages and rotates. Rotation always runs; the packaging error wins when
    /// both fail.
    pub fn execute(&self) -> Result<PathBuf> {
        self.execute_at(&Local::now())
    }

    pub fn execute_at<Tz>(&self, started: &DateTime<Tz>) -> Result<PathBuf>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let packaging = self.produce(started);
        if let Err(e) = &packaging {
            error!("Producing backup is not successful: {}", e);
        }

        let rotation = self.local_storage.rotate(&self.local_retention_number);
        if let Err(e) = &rotation {
            error!("Rotating local backup is not successful: {}", e);
        }

        local_phase_outcome(packaging, rotation.map(drop))
    }

    fn produce<Tz>(&self, started: &DateTime<Tz>) -> Result<PathBuf>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let dump = self.local_storage.backup_path(&self.dc, started, self.backup_type);
        self.producer.dump(&dump)?;
        let packaged = protect_compress(&dump, &self.zip_pass)?;
        info!("Backup {:?} is ready for shipping", packaged);
        Ok(packaged)
    }
}
