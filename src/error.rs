use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    IO(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Backup error: {0}")]
    Backup(#[from] BackupError),

    #[error("S3 error: {0}")]
    S3(#[from] S3Error),

    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Configuration parsing error: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("Missing configuration value: {0}")]
    Missing(&'static str),

    #[error("Backup type {0:?} is not supported")]
    UnsupportedBackupType(String),

    #[error("{name} must be a non-negative integer, got {value:?}")]
    InvalidRetention { name: &'static str, value: String },

    #[error("Invalid value {value:?} for {name}")]
    InvalidValue { name: &'static str, value: String },
}

#[derive(thiserror::Error, Debug)]
pub enum BackupError {
    #[error("Failed to create backup directory {path:?}: {source}")]
    Directory { path: PathBuf, source: io::Error },

    #[error("Dump failed: {0}")]
    Dump(String),

    #[error("Packaging failed: {0}")]
    Packaging(String),

    #[error("Local rotation failed on {path:?}: {source}")]
    LocalRotation { path: PathBuf, source: io::Error },
}

#[derive(thiserror::Error, Debug)]
pub enum S3Error {
    #[error("S3 config error: {0}")]
    Config(String),

    #[error("S3 upload error: {0}")]
    Upload(String),

    #[error("S3 query error: {0}")]
    Query(String),

    #[error("Integrity check error: {0}")]
    Integrity(String),

    #[error("Backup {key} on object storage does not match the local copy")]
    IntegrityMismatch { key: String },

    #[error("S3 deletion error: {0}")]
    Deletion(String),
}

#[derive(thiserror::Error, Debug)]
pub enum NotificationError {
    #[error("Failed to send notification: {0}")]
    Send(#[from] reqwest::Error),

    #[error("Webhook responded with status {0}")]
    Status(reqwest::StatusCode),
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::Backup(BackupError::Packaging(err.to_string()))
    }
}
