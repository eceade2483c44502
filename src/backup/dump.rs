use super::BackupType;
use crate::config::DatabaseSettings;
use crate::error::BackupError;
use crate::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;
use tracing::{error, info};

/// Runs the external dump script for one backup type.
#[derive(Debug, Clone)]
pub struct DumpProducer {
    backup_type: BackupType,
    script: PathBuf,
    database: DatabaseSettings,
}

impl DumpProducer {
    pub fn new(backup_type: BackupType, script: Option<PathBuf>, database: DatabaseSettings) -> Self {
        Self {
            backup_type,
            script: script.unwrap_or_else(|| backup_type.script().to_path_buf()),
            database,
        }
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    /// Writes a fresh dump to `destination`.
    pub fn dump(&self, destination: &Path) -> Result<()> {
        let started = Instant::now();
        info!("{} is being executed...", self.backup_type);

        let mut command = Command::new(&self.script);
        command.arg(destination);
        let forwarded = [
            ("DB_HOSTNAME", &self.database.hostname),
            ("DB_PORT", &self.database.port),
            ("DB_USERNAME", &self.database.username),
            ("DB_PASSWORD", &self.database.password),
        ];
        for (name, value) in forwarded {
            if let Some(value) = value {
                command.env(name, value);
            }
        }

        let output = command.output().map_err(|e| {
            error!("Failed to execute {:?}: {}", self.script, e);
            BackupError::Dump(format!("failed to execute {:?}: {}", self.script, e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("{} failed with {}: {}", self.backup_type, output.status, stderr.trim());
            return Err(BackupError::Dump(format!(
                "{} exited with {}: {}",
                self.backup_type,
                output.status,
                stderr.trim()
            ))
            .into());
        }

        let size = fs::metadata(destination).map_err(|e| {
            error!("Dump file {:?} is not readable: {}", destination, e);
            BackupError::Dump(format!("no dump produced at {:?}: {}", destination, e))
        })?;

        info!(
            file = %destination.display(),
            backup_time = ?started.elapsed(),
            backup_size_mb = size.len() / 1024 / 1024,
            "Backup executed successfully"
        );
        Ok(())
    }
}
