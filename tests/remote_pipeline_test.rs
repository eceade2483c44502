mod common;

use common::MemoryStorage;
use config::Config;
use os_database_backup::backup::protect_compress;
use os_database_backup::config::Settings;
use os_database_backup::error::S3Error;
use os_database_backup::naming::object_key;
use os_database_backup::pipeline;
use os_database_backup::prelude::*;
use os_database_backup::storage::integrity::validate_remote_backup;
use os_database_backup::storage::{ObjectStorage, RemoteBackupManager, MIN_PART_SIZE};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

const SMALL_PART: u64 = 1024;

fn settings(retention: &str, first_month_retention: &str, integrity_policy: &str) -> Settings {
    let config = Config::builder()
        .set_override("dc", "dc1")
        .unwrap()
        .set_override("local_directory", "/var/backups")
        .unwrap()
        .set_override("bucket_name", "openstack-backups")
        .unwrap()
        .set_override("s3_retention_number", retention)
        .unwrap()
        .set_override("first_month_retention_number", first_month_retention)
        .unwrap()
        .set_override("integrity_policy", integrity_policy)
        .unwrap()
        .build()
        .unwrap();
    Settings::from_config(config).unwrap()
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    StdRng::seed_from_u64(42).fill_bytes(&mut data);
    data
}

fn key(date: &str) -> String {
    format!("dc1_openstack-backup-{date}T020000+0000.dump.sql.compress")
}

async fn seed(storage: &MemoryStorage, keys: &[String]) {
    for key in keys {
        storage.insert(key, b"old backup".to_vec()).await;
    }
}

fn write_backup(dir: &Path, date: &str, len: usize) -> std::path::PathBuf {
    let path = dir.join(key(date));
    fs::write(&path, random_bytes(len)).unwrap();
    path
}

#[tokio::test]
async fn test_ten_megabyte_backup_validates_as_two_parts() -> Result<()> {
    let dir = tempdir()?;
    let raw = dir.path().join("dc1_openstack-backup-20240310T020000+0000.dump.sql");
    fs::write(&raw, random_bytes(10_000_000))?;
    let packaged = protect_compress(&raw, "zip-pass")?;

    let storage = Arc::new(MemoryStorage::new(MIN_PART_SIZE));
    let key = object_key(&packaged);
    let chunk_size = storage.upload(&key, &packaged).await?;
    assert_eq!(chunk_size, MIN_PART_SIZE);

    let reported = storage.etag(&key).await?;
    assert!(reported.ends_with("-2\""), "unexpected etag {reported}");
    assert!(validate_remote_backup(&*storage, &key, &packaged, chunk_size).await?);

    // Flip a single byte of the local copy.
    let mut corrupted = fs::read(&packaged)?;
    corrupted[4096] ^= 0x01;
    fs::write(&packaged, corrupted)?;
    assert!(!validate_remote_backup(&*storage, &key, &packaged, chunk_size).await?);

    Ok(())
}

#[tokio::test]
async fn test_wrong_chunk_size_does_not_validate() -> Result<()> {
    let dir = tempdir()?;
    let backup = write_backup(dir.path(), "20240310", 5000);
    let storage = MemoryStorage::new(SMALL_PART);
    let key = object_key(&backup);
    let chunk_size = storage.upload(&key, &backup).await?;

    assert!(validate_remote_backup(&storage, &key, &backup, chunk_size).await?);
    assert!(!validate_remote_backup(&storage, &key, &backup, chunk_size * 2).await?);
    Ok(())
}

#[tokio::test]
async fn test_tampered_remote_tag_does_not_validate() -> Result<()> {
    let dir = tempdir()?;
    let backup = write_backup(dir.path(), "20240310", 3000);
    let storage = Arc::new(MemoryStorage::new(SMALL_PART));
    let key = object_key(&backup);
    storage.upload(&key, &backup).await?;
    assert!(validate_remote_backup(&*storage, &key, &backup, SMALL_PART).await?);

    storage.set_etag(&key, "\"d41d8cd98f00b204e9800998ecf8427e-3\"").await;
    assert!(!validate_remote_backup(&*storage, &key, &backup, SMALL_PART).await?);
    Ok(())
}

#[tokio::test]
async fn test_validation_of_missing_object_is_query_error() {
    let dir = tempdir().unwrap();
    let backup = write_backup(dir.path(), "20240310", 10);
    let storage = MemoryStorage::new(SMALL_PART);

    let err = validate_remote_backup(&storage, "absent", &backup, SMALL_PART)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::S3(S3Error::Query(_))));
}

#[tokio::test]
async fn test_rotation_evicts_each_population_independently() -> Result<()> {
    let storage = Arc::new(MemoryStorage::new(SMALL_PART));
    let regular = vec![key("20240302"), key("20240303"), key("20240304")];
    let first_of_month = vec![key("20240301")];
    let other_dc = "dc2_openstack-backup-20240302T020000+0000.dump.sql.compress".to_string();
    seed(&storage, &regular).await;
    seed(&storage, &first_of_month).await;
    seed(&storage, &[other_dc.clone()]).await;

    let manager = RemoteBackupManager::new("dc1", &settings("1", "2", "strict").s3, storage.clone())?;
    let deleted = manager.rotate().await?;

    assert_eq!(deleted, vec![key("20240302"), key("20240303")]);
    assert_eq!(storage.keys().await, vec![key("20240301"), key("20240304"), other_dc]);
    Ok(())
}

#[tokio::test]
async fn test_rotation_ignores_datacenters_sharing_a_name_prefix() -> Result<()> {
    let storage = Arc::new(MemoryStorage::new(SMALL_PART));
    let neighbours = vec![
        "dc10_openstack-backup-20240302T020000+0000.dump.sql.compress".to_string(),
        "dc10_openstack-backup-20240303T020000+0000.dump.sql.compress".to_string(),
    ];
    seed(&storage, &neighbours).await;
    seed(&storage, &[key("20240310")]).await;

    let manager = RemoteBackupManager::new("dc1", &settings("1", "1", "strict").s3, storage.clone())?;
    let deleted = manager.rotate().await?;

    assert!(deleted.is_empty());
    assert_eq!(storage.keys().await.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_rotation_trims_first_of_month_population() -> Result<()> {
    let storage = Arc::new(MemoryStorage::new(SMALL_PART));
    seed(
        &storage,
        &[key("20240101"), key("20240201"), key("20240301"), key("20240315")],
    )
    .await;

    let manager = RemoteBackupManager::new("dc1", &settings("5", "2", "strict").s3, storage.clone())?;
    let deleted = manager.rotate().await?;

    assert_eq!(deleted, vec![key("20240101")]);
    Ok(())
}

#[tokio::test]
async fn test_first_deletion_failure_aborts_rotation() {
    let storage = Arc::new(MemoryStorage::new(SMALL_PART));
    seed(
        &storage,
        &[key("20240302"), key("20240303"), key("20240304"), key("20240305")],
    )
    .await;
    storage.fail_deletes_of(&key("20240303")).await;

    let manager = RemoteBackupManager::new("dc1", &settings("1", "1", "strict").s3, storage.clone()).unwrap();
    let err = manager.rotate().await.unwrap_err();

    assert!(matches!(err, Error::S3(S3Error::Deletion(_))));
    assert_eq!(
        storage.keys().await,
        vec![key("20240303"), key("20240304"), key("20240305")]
    );
}

#[test]
fn test_unparsable_remote_retention_fails_construction() {
    let storage = Arc::new(MemoryStorage::new(SMALL_PART));
    let result = RemoteBackupManager::new("dc1", &settings("1", "many", "strict").s3, storage);
    assert!(matches!(
        result,
        Err(Error::Config(os_database_backup::error::ConfigError::InvalidRetention {
            name: "FIRST_MONTH_RETENTION_NUMBER",
            ..
        }))
    ));
}

#[tokio::test]
async fn test_ship_uploads_validates_and_rotates() -> Result<()> {
    let dir = tempdir()?;
    let backup = write_backup(dir.path(), "20240310", 3000);
    let storage = Arc::new(MemoryStorage::new(SMALL_PART));
    seed(&storage, &[key("20240307"), key("20240308"), key("20240309")]).await;

    let name = pipeline::ship(&settings("2", "2", "strict"), storage.clone(), &backup).await?;

    assert_eq!(name, key("20240310"));
    assert_eq!(storage.keys().await, vec![key("20240309"), key("20240310")]);
    assert_eq!(storage.get(&name).await, Some(fs::read(&backup)?));
    Ok(())
}

#[tokio::test]
async fn test_bad_remote_retention_leaves_local_backups_alone() {
    let dir = tempdir().unwrap();
    let older = [key("20240307"), key("20240308"), key("20240309")];
    for name in &older {
        fs::write(dir.path().join(name), b"old").unwrap();
    }
    let config = Config::builder()
        .set_override("dc", "dc1")
        .unwrap()
        .set_override("local_directory", dir.path().to_string_lossy().into_owned())
        .unwrap()
        .set_override("bucket_name", "openstack-backups")
        .unwrap()
        .set_override("backup_type", "mysqldump")
        .unwrap()
        .set_override("local_retention_number", "1")
        .unwrap()
        .set_override("s3_retention_number", "oops")
        .unwrap()
        .set_override("first_month_retention_number", "1")
        .unwrap()
        .build()
        .unwrap();
    let settings = Settings::from_config(config).unwrap();
    let storage = Arc::new(MemoryStorage::new(SMALL_PART));

    let err = pipeline::run_with(&settings, storage.clone()).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Config(os_database_backup::error::ConfigError::InvalidRetention {
            name: "S3_RETENTION_NUMBER",
            ..
        })
    ));
    let mut remaining: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    remaining.sort();
    assert_eq!(remaining, older.to_vec());
    assert!(storage.keys().await.is_empty());
}

/// Delegates to a `MemoryStorage` but misreports the part size it used.
struct MisreportedPartSize(MemoryStorage);

#[async_trait::async_trait]
impl ObjectStorage for MisreportedPartSize {
    async fn upload(&self, key: &str, path: &Path) -> Result<u64> {
        Ok(self.0.upload(key, path).await? + 1)
    }

    async fn etag(&self, key: &str) -> Result<String> {
        self.0.etag(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.0.list(prefix).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.0.delete(key).await
    }

    async fn wait_until_deleted(&self, key: &str) -> Result<()> {
        self.0.wait_until_deleted(key).await
    }
}

async fn misreporting_storage() -> Arc<MisreportedPartSize> {
    let inner = MemoryStorage::new(SMALL_PART);
    seed(&inner, &[key("20240307"), key("20240308"), key("20240309")]).await;
    Arc::new(MisreportedPartSize(inner))
}

#[tokio::test]
async fn test_invalid_upload_fails_under_strict_policy_without_rotation() {
    let dir = tempdir().unwrap();
    let backup = write_backup(dir.path(), "20240310", 3000);
    let storage = misreporting_storage().await;

    let err = pipeline::ship(&settings("1", "1", "strict"), storage.clone(), &backup)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::S3(S3Error::IntegrityMismatch { ref key }) if *key == object_key(&backup)));
    assert_eq!(storage.0.keys().await.len(), 4);
}

#[tokio::test]
async fn test_invalid_upload_is_logged_only_under_lenient_policy() {
    let dir = tempdir().unwrap();
    let backup = write_backup(dir.path(), "20240310", 3000);
    let storage = misreporting_storage().await;

    let name = pipeline::ship(&settings("1", "1", "lenient"), storage.clone(), &backup)
        .await
        .unwrap();

    assert_eq!(name, key("20240310"));
    // Rotation never runs after an invalid upload.
    assert_eq!(storage.0.keys().await.len(), 4);
}
