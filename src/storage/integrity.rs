//! Rebuilds an S3 ETag from a local file.
//!
//! A single-part object's ETag is the hex MD5 of its bytes. A multipart object's ETag is the
//! hex MD5 of the concatenated raw part digests followed by `-<part count>`. Recomputing it
//! needs the exact part size the upload used.

use super::ObjectStorage;
use crate::error::S3Error;
use crate::prelude::*;
use md5::{Digest, Md5};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::{debug, error, info};

/// Fills `buf` from `reader`, stopping early only at end of input.
pub(crate) fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Accumulates per-part digests in upload order.
#[derive(Debug, Default, Clone)]
pub struct EtagBuilder {
    digests: Vec<u8>,
    parts: usize,
}

impl EtagBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_part(&mut self, part: &[u8]) {
        self.digests.extend_from_slice(&Md5::digest(part));
        self.parts += 1;
    }

    pub fn finish(self) -> String {
        match self.parts {
            0 => String::new(),
            1 => hex::encode(&self.digests),
            n => format!("{}-{}", hex::encode(Md5::digest(&self.digests)), n),
        }
    }
}

/// ETag the store would assign to `path` uploaded in `chunk_size` parts.
pub fn multipart_etag(path: &Path, chunk_size: u64) -> Result<String> {
    if chunk_size == 0 {
        return Err(S3Error::Integrity("chunk size must be positive".to_string()).into());
    }
    let chunk_size = usize::try_from(chunk_size)
        .map_err(|_| S3Error::Integrity(format!("chunk size {chunk_size} is too large")))?;

    let mut file = File::open(path).map_err(|e| {
        error!("While opening {:?} for etag calculation: {}", path, e);
        S3Error::Integrity(format!("failed to open {:?}: {}", path, e))
    })?;

    let mut buf = vec![0u8; chunk_size];
    let mut etag = EtagBuilder::new();
    loop {
        let n = read_chunk(&mut file, &mut buf)
            .map_err(|e| S3Error::Integrity(format!("failed to read {:?}: {}", path, e)))?;
        if n == 0 {
            break;
        }
        etag.push_part(&buf[..n]);
        if n < chunk_size {
            break;
        }
    }
    Ok(etag.finish())
}

/// The store may wrap the tag in quotes or other formatting, so containment is enough.
pub fn etag_matches(reported: &str, derived: &str) -> bool {
    reported.contains(derived)
}

/// Compares the tag the store reports for `key` against the one derived from `path`.
/// A mismatch is `Ok(false)`, not an error.
pub async fn validate_remote_backup(
    storage: &dyn ObjectStorage,
    key: &str,
    path: &Path,
    chunk_size: u64,
) -> Result<bool> {
    let reported = storage.etag(key).await?;
    let derived = multipart_etag(path, chunk_size)?;
    debug!("ETag of protected backup is: {}", derived);

    if etag_matches(&reported, &derived) {
        info!("Backup on object storage and database are the same");
        Ok(true)
    } else {
        error!(
            reported = %reported,
            derived = %derived,
            "Backup on object storage and database are not the same!"
        );
        Ok(false)
    }
}
