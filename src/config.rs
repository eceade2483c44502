use crate::error::ConfigError;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;

/// Flat view of every recognised key. Environment variables arrive lowercased
/// (`LOCAL_RETENTION_NUMBER` -> `local_retention_number`); unset keys read as empty.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    dc: String,

    local_directory: String,
    backup_type: String,
    zip_pass: String,
    local_retention_number: String,
    dump_script: String,
    db_hostname: String,
    db_port: String,
    db_username: String,
    db_password: String,

    aws_access_key_id: String,
    aws_secret_access_key: String,
    aws_region: String,
    bucket_name: String,
    ar_endpoint: String,
    s3_retention_number: String,
    first_month_retention_number: String,
    integrity_policy: String,

    slack_channel_name: String,
    slack_webhook_url: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub dc: String,
    pub backup: BackupSettings,
    pub s3: S3Settings,
    pub slack: SlackSettings,
}

#[derive(Debug, Clone)]
pub struct BackupSettings {
    pub local_directory: PathBuf,
    pub backup_type: String,
    pub zip_pass: String,
    pub local_retention_number: String,
    pub dump_script: Option<PathBuf>,
    pub database: DatabaseSettings,
}

/// Connection details handed to the dump script through its environment.
#[derive(Debug, Clone, Default)]
pub struct DatabaseSettings {
    pub hostname: Option<String>,
    pub port: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct S3Settings {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    pub bucket: String,
    pub endpoint: Option<String>,
    pub retention_number: String,
    pub first_month_retention_number: String,
    pub integrity_policy: IntegrityPolicy,
}

#[derive(Debug, Clone)]
pub struct SlackSettings {
    pub channel: String,
    pub webhook_url: Option<String>,
}

/// What the remote phase does with an upload whose ETag does not match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IntegrityPolicy {
    /// Fail the run.
    #[default]
    Strict,
    /// Log the mismatch and finish without rotating.
    Lenient,
}

impl FromStr for IntegrityPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "strict" => Ok(Self::Strict),
            "lenient" => Ok(Self::Lenient),
            _ => Err(ConfigError::InvalidValue {
                name: "INTEGRITY_POLICY",
                value: s.to_string(),
            }),
        }
    }
}

/// Reads every source without validating anything.
pub fn load() -> Result<Config, ConfigError> {
    let s = Config::builder()
        // Optional file defaults, overridden by the environment
        .add_source(File::new("config/default", FileFormat::Toml).required(false))
        .add_source(Environment::default())
        .build()?;
    Ok(s)
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_config(load()?)
    }

    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let raw: RawSettings = config.try_deserialize()?;
        let slack = SlackSettings::from_raw(&raw);

        let dc = required(raw.dc, "DC")?;
        let local_directory = required(raw.local_directory, "LOCAL_DIRECTORY")?;
        let bucket = required(raw.bucket_name, "BUCKET_NAME")?;

        Ok(Self {
            dc,
            backup: BackupSettings {
                local_directory: PathBuf::from(local_directory),
                backup_type: raw.backup_type,
                zip_pass: raw.zip_pass,
                local_retention_number: raw.local_retention_number,
                dump_script: optional(raw.dump_script).map(PathBuf::from),
                database: DatabaseSettings {
                    hostname: optional(raw.db_hostname),
                    port: optional(raw.db_port),
                    username: optional(raw.db_username),
                    password: optional(raw.db_password),
                },
            },
            s3: S3Settings {
                access_key_id: raw.aws_access_key_id,
                secret_access_key: raw.aws_secret_access_key,
                region: raw.aws_region,
                bucket,
                endpoint: optional(raw.ar_endpoint),
                retention_number: raw.s3_retention_number,
                first_month_retention_number: raw.first_month_retention_number,
                integrity_policy: raw.integrity_policy.parse()?,
            },
            slack,
        })
    }
}

impl SlackSettings {
    fn from_raw(raw: &RawSettings) -> Self {
        Self {
            channel: format!("#{}", raw.slack_channel_name),
            webhook_url: optional(raw.slack_webhook_url.clone()),
        }
    }
}

/// What a notification needs. Unlike [`Settings`] it never fails, so a run whose
/// configuration is rejected can still report that.
#[derive(Debug, Clone)]
pub struct NotificationSettings {
    pub dc: String,
    pub backup_type: String,
    pub slack: SlackSettings,
}

impl NotificationSettings {
    pub fn from_config(config: &Config) -> Self {
        let raw: RawSettings = config.clone().try_deserialize().unwrap_or_default();
        Self {
            dc: raw.dc.trim().to_string(),
            backup_type: raw.backup_type.clone(),
            slack: SlackSettings::from_raw(&raw),
        }
    }
}

impl From<&Settings> for NotificationSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            dc: settings.dc.clone(),
            backup_type: settings.backup.backup_type.clone(),
            slack: settings.slack.clone(),
        }
    }
}

fn required(value: String, name: &'static str) -> Result<String, ConfigError> {
    optional(value).ok_or(ConfigError::Missing(name))
}

fn optional(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
