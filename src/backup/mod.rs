mod backup_manager;
pub mod dump;
pub mod packager;

pub use backup_manager::BackupManager;
pub use dump::DumpProducer;
pub use packager::protect_compress;

use crate::error::ConfigError;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupType {
    MysqlDump,
    MariaBackup,
}

impl BackupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::MysqlDump => "mysqldump",
            BackupType::MariaBackup => "mariabackup",
        }
    }

    /// Pre-installed script producing the raw dump at the path given as its first argument.
    pub fn script(&self) -> &'static Path {
        match self {
            BackupType::MysqlDump => Path::new("/mysqldump.sh"),
            BackupType::MariaBackup => Path::new("/mariabackup.sh"),
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            BackupType::MysqlDump => ".dump.sql",
            BackupType::MariaBackup => ".qp.xbc.xbs",
        }
    }
}

impl FromStr for BackupType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mysqldump" => Ok(BackupType::MysqlDump),
            "mariabackup" => Ok(BackupType::MariaBackup),
            other => Err(ConfigError::UnsupportedBackupType(other.to_string())),
        }
    }
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
