use os_database_backup::error::S3Error;
use os_database_backup::prelude::*;
use os_database_backup::storage::integrity::EtagBuilder;
use os_database_backup::storage::ObjectStorage;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    etag: String,
}

/// In-process object store that tags uploads the way S3 does for a fixed part size.
pub struct MemoryStorage {
    part_size: u64,
    objects: Mutex<BTreeMap<String, StoredObject>>,
    failing_deletes: Mutex<HashSet<String>>,
}

impl MemoryStorage {
    pub fn new(part_size: u64) -> Self {
        Self {
            part_size,
            objects: Mutex::new(BTreeMap::new()),
            failing_deletes: Mutex::new(HashSet::new()),
        }
    }

    fn tag(&self, data: &[u8]) -> String {
        let mut etag = EtagBuilder::new();
        if data.len() as u64 <= self.part_size {
            if !data.is_empty() {
                etag.push_part(data);
            }
        } else {
            for part in data.chunks(self.part_size as usize) {
                etag.push_part(part);
            }
        }
        format!("\"{}\"", etag.finish())
    }

    pub async fn insert(&self, key: &str, data: Vec<u8>) {
        let etag = self.tag(&data);
        self.objects
            .lock()
            .await
            .insert(key.to_string(), StoredObject { data, etag });
    }

    /// Overrides the reported tag of `key`, as if the stored bytes differed.
    pub async fn set_etag(&self, key: &str, etag: &str) {
        if let Some(object) = self.objects.lock().await.get_mut(key) {
            object.etag = etag.to_string();
        }
    }

    /// Makes every later delete of `key` fail.
    pub async fn fail_deletes_of(&self, key: &str) {
        self.failing_deletes.lock().await.insert(key.to_string());
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.lock().await.keys().cloned().collect()
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().await.get(key).map(|o| o.data.clone())
    }
}

#[async_trait::async_trait]
impl ObjectStorage for MemoryStorage {
    async fn upload(&self, key: &str, path: &Path) -> Result<u64> {
        let data = fs::read(path)
            .map_err(|e| S3Error::Upload(format!("failed to open {:?}: {}", path, e)))?;
        info!("Stored {} bytes under {}", data.len(), key);
        self.insert(key, data).await;
        Ok(self.part_size)
    }

    async fn etag(&self, key: &str) -> Result<String> {
        self.objects
            .lock()
            .await
            .get(key)
            .map(|o| o.etag.clone())
            .ok_or_else(|| S3Error::Query(format!("no such key: {key}")).into())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .objects
            .lock()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if self.failing_deletes.lock().await.contains(key) {
            return Err(S3Error::Deletion(format!("access denied deleting {key}")).into());
        }
        self.objects.lock().await.remove(key);
        Ok(())
    }

    async fn wait_until_deleted(&self, key: &str) -> Result<()> {
        if self.objects.lock().await.contains_key(key) {
            return Err(S3Error::Deletion(format!("{key} still exists")).into());
        }
        Ok(())
    }
}
