//! Artifact naming.
//!
//! Keys look like `fra1_openstack-backup-20240301T020000+0100.dump.sql`. The timestamp
//! fields are fixed width and most significant first, so for one datacenter (and one UTC
//! offset) sorting keys as strings sorts them by creation time. Both rotations rely on it.

use chrono::{DateTime, TimeZone};
use std::fmt::Display;
use std::path::Path;

pub const BACKUP_PREFIX: &str = "_openstack-backup-";

/// Suffix appended to a raw dump once it has been encrypted and compressed.
pub const PACKAGED_SUFFIX: &str = ".compress";

/// Marks the first day of a month inside the timestamp (`...MM01T...`).
const FIRST_OF_MONTH_PATTERN: &str = "01T";

pub fn backup_key<Tz>(dc: &str, created: &DateTime<Tz>, suffix: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let timestamp: String = created
        .format("%Y%m%dT%H%M%S%z")
        .to_string()
        .chars()
        .filter(|c| *c != '-')
        .collect();
    format!("{dc}{BACKUP_PREFIX}{timestamp}{suffix}")
}

pub fn packaged_path(raw: &Path) -> std::path::PathBuf {
    let mut name = raw.as_os_str().to_owned();
    name.push(PACKAGED_SUFFIX);
    name.into()
}

pub fn is_packaged(name: &str) -> bool {
    name.ends_with(PACKAGED_SUFFIX)
}

/// Leading part shared by every key of one datacenter. Matching on it keeps `dc1` from
/// claiming `dc10_...` keys.
pub fn dc_prefix(dc: &str) -> String {
    format!("{dc}{BACKUP_PREFIX}")
}

/// Object key of an artifact: its file name.
pub fn object_key(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Whether the key was created on day 1 of a month. Only the part after the naming prefix
/// is inspected when present, so a datacenter tag can never trigger a match.
pub fn is_first_of_month(dc: &str, key: &str) -> bool {
    let prefix = dc_prefix(dc);
    let dated = key.strip_prefix(prefix.as_str()).unwrap_or(key);
    dated.contains(FIRST_OF_MONTH_PATTERN)
}
