pub mod integrity;
mod local_storage;
pub mod retention;
mod s3_storage;
mod storage_manager;

pub use local_storage::LocalStorage;
pub use retention::RetentionPolicy;
pub use s3_storage::{part_size_for, S3Storage, MIN_PART_SIZE};
pub use storage_manager::{Populations, RemoteBackupManager};

use crate::prelude::*;
use std::path::Path;

/// Operations the remote phase needs from an object store.
#[async_trait::async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Uploads the file at `path` under `key` and returns the part size used, which fixes
    /// the chunk boundaries the store hashed.
    async fn upload(&self, key: &str, path: &Path) -> Result<u64>;

    /// Content-address tag the store reports for `key`, possibly quoted.
    async fn etag(&self, key: &str) -> Result<String>;

    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Blocks until `key` is confirmed gone.
    async fn wait_until_deleted(&self, key: &str) -> Result<()>;
}
